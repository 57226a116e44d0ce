//! Integration tests for the JEL evaluator and session driver.
//!
//! Tests key evaluator features:
//! - expression typing and values
//! - declarations, finals and transactions
//! - control flow, functions and exceptions
//! - host classes, imports and generics
//! - cancellation, loop limits and persistence

use jel_eval::{EvalError, EvalOptions, Outcome, Session, SessionError};
use jel_model::{Class, ClassId, Primitive, Value};
use jel_types::ErrorCode;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn session() -> Session {
    Session::java(EvalOptions::default()).expect("default grammar loads")
}

/// Run `text` and return the last outcome (panics on errors).
fn last(s: &Session, text: &str) -> Outcome {
    match s.eval(text) {
        Ok(Some(outcome)) => outcome,
        Ok(None) => panic!("no statements in {text:?}"),
        Err(e) => panic!("{text:?} failed:\n{}", e.diagnostic().render()),
    }
}

fn value(s: &Session, text: &str) -> Value {
    last(s, text).value.expect("statement has a value")
}

/// Run `text` expecting an evaluation error.
fn eval_error(s: &Session, text: &str) -> EvalError {
    match s.run(text) {
        Err(SessionError::Eval(e)) => e,
        Err(other) => panic!("expected an evaluation error, got {other}"),
        Ok(outcomes) => panic!("expected an error, got {outcomes:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn arithmetic_precedence() {
    let s = session();
    let out = last(&s, "3 + 4 * 2");
    assert_eq!(out.value, Some(Value::Int(11)));
    assert_eq!(out.ty.primitive_kind(), Some(Primitive::Int));
    assert_eq!(out.display.as_deref(), Some("11"));
}

#[test]
fn string_concatenation() {
    let s = session();
    let out = last(&s, "\"a\" + 1");
    assert_eq!(out.value, Some(Value::str("a1")));
    assert!(out.ty.is_string());
    assert_eq!(value(&s, "1 + 2 + \"x\" + 1 + 2"), Value::str("3x12"));
}

#[test]
fn post_increment_then_read() {
    let s = session();
    let outcomes = s.run("int x = 5; x++;").unwrap();
    assert_eq!(outcomes[1].value, Some(Value::Int(5)));
    assert_eq!(value(&s, "x"), Value::Int(6));
    assert_eq!(value(&s, "++x"), Value::Int(7));
}

#[test]
fn conditional_unifies_numeric_branches() {
    let s = session();
    let out = last(&s, "true ? 1 : 2.0");
    assert_eq!(out.value, Some(Value::Double(1.0)));
    assert_eq!(out.ty.primitive_kind(), Some(Primitive::Double));
    assert_eq!(out.display.as_deref(), Some("1.0"));
}

#[test]
fn char_arithmetic_promotes_to_int() {
    let s = session();
    assert_eq!(value(&s, "'a' + 1"), Value::Int(98));
    assert_eq!(value(&s, "char c = 'a'; c++; c"), Value::Char(98));
    assert_eq!(value(&s, "byte b = 127; b++; b"), Value::Byte(-128));
}

#[test]
fn compound_assignment_narrows() {
    let s = session();
    assert_eq!(value(&s, "int i = 10; i += 2.7; i"), Value::Int(12));
    assert_eq!(value(&s, "String t = \"a\"; t += 1; t"), Value::str("a1"));
}

#[test]
fn short_circuit_skips_right_operand() {
    let s = session();
    assert_eq!(
        value(&s, "String n = null; n != null && n.length() > 0"),
        Value::Boolean(false)
    );
    // The right operand is still type checked.
    let err = eval_error(&s, "false && 1");
    assert_eq!(err.code(), ErrorCode::BAD_OPERANDS);
}

#[test]
fn casts_and_instanceof() {
    let s = session();
    assert_eq!(value(&s, "(int) 3.9"), Value::Int(3));
    assert_eq!(value(&s, "(char) 66"), Value::Char(66));
    assert_eq!(
        value(&s, "Object o = \"str\"; o instanceof String"),
        Value::Boolean(true)
    );
    let err = eval_error(&s, "(Integer) o");
    assert_eq!(err.code(), ErrorCode::CLASS_CAST);
    let err = eval_error(&s, "(boolean) 1");
    assert_eq!(err.code(), ErrorCode::INVALID_CAST);
}

#[test]
fn reference_equality_is_identity() {
    let s = session();
    s.run("import java.util.*; List<Integer> a = new ArrayList<Integer>(); List<Integer> b = a;")
        .unwrap();
    assert_eq!(value(&s, "a == b"), Value::Boolean(true));
    assert_eq!(value(&s, "a == new ArrayList<Integer>()"), Value::Boolean(false));
    let err = eval_error(&s, "Integer boxed = 5; \"x\" == boxed");
    assert_eq!(err.code(), ErrorCode::BAD_OPERANDS);
}

#[test]
fn class_literals_and_get_class() {
    let s = session();
    assert_eq!(value(&s, "String.class"), Value::Class(Class::Object(ClassId::STRING)));
    assert_eq!(
        value(&s, "\"x\".getClass() == String.class"),
        Value::Boolean(true)
    );
}

#[test]
fn concatenation_matches_to_string() {
    let s = session();
    assert_eq!(
        value(&s, "\"\" + \"x\".getClass()"),
        Value::str("class java.lang.String")
    );
    assert_eq!(
        value(&s, "(\"\" + \"x\".getClass()).equals(\"x\".getClass().toString())"),
        Value::Boolean(true)
    );
    let ints = last(&s, "int[] arr = new int[1]; \"\" + arr").display.unwrap();
    assert!(ints.starts_with("[I@"), "{ints}");
    let names = last(&s, "\"\" + new String[0]").display.unwrap();
    assert!(names.starts_with("[Ljava.lang.String;@"), "{names}");
    assert_eq!(value(&s, "int[][].class.getName()"), Value::str("[[I"));
}

#[test]
fn self_containing_list_displays() {
    let s = session();
    let out = last(
        &s,
        "import java.util.*; List<Object> l = new ArrayList<Object>(); l.add(l); l",
    );
    assert_eq!(out.display.as_deref(), Some("[(this Collection)]"));
    assert_eq!(value(&s, "\"\" + l"), Value::str("[(this Collection)]"));
    assert_eq!(value(&s, "l.equals(l)"), Value::Boolean(true));
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations and scoping
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn final_reassignment_is_rejected() {
    let s = session();
    s.run("final int y = 1;").unwrap();
    let err = eval_error(&s, "y = 2");
    assert!(err.is_semantic());
    assert_eq!(err.code(), ErrorCode::FINAL_REASSIGNED);
    assert!(err.to_string().contains('y'));
    assert_eq!(value(&s, "y"), Value::Int(1));
}

#[test]
fn blank_final_assigned_once() {
    let s = session();
    s.run("final int a;").unwrap();
    assert_eq!(eval_error(&s, "a + 1").code(), ErrorCode::NOT_INITIALIZED);
    s.run("a = 4;").unwrap();
    assert_eq!(value(&s, "a"), Value::Int(4));
    assert_eq!(eval_error(&s, "a = 5").code(), ErrorCode::FINAL_REASSIGNED);
}

#[test]
fn validation_never_mutates() {
    let s = session();
    let parsed = s.parser().parse("int z = 3; z = 9;").unwrap();
    let ast = std::rc::Rc::new(parsed.ast);
    for &statement in &parsed.statements[..1] {
        s.evaluator()
            .validate(&ast, statement, s.env(), None)
            .unwrap();
    }
    assert!(s.env().lookup("z").is_none());
    assert_eq!(s.env().history_len(), 0);
}

#[test]
fn failed_statement_rolls_back() {
    let s = session();
    s.run("int n = 1;").unwrap();
    let err = eval_error(&s, "n = 2; n = n / 0;");
    assert_eq!(err.code(), ErrorCode::ARITHMETIC);
    // The first statement committed; the failing one left nothing behind.
    assert_eq!(value(&s, "n"), Value::Int(2));
}

#[test]
fn undeclared_and_mismatched() {
    let s = session();
    assert_eq!(eval_error(&s, "missing + 1").code(), ErrorCode::UNDECLARED);
    assert_eq!(eval_error(&s, "int x = \"s\";").code(), ErrorCode::TYPE_MISMATCH);
    let err = eval_error(&s, "int x = 1.5;");
    assert!(err.to_string().contains("lossy"));
    assert_eq!(
        err.diagnostic().suggestion.as_deref(),
        Some("add an explicit cast: (int)")
    );
    assert_eq!(eval_error(&s, "int q = 1; int q = 2;").code(), ErrorCode::ALREADY_DECLARED);
}

#[test]
fn var_infers_from_initializer() {
    let s = session();
    s.run("var total = 2L;").unwrap();
    let var = s.env().lookup("total").unwrap();
    assert_eq!(var.ty.primitive_kind(), Some(Primitive::Long));
    assert_eq!(eval_error(&s, "var nothing = null;").code(), ErrorCode::TYPE_MISMATCH);
}

#[test]
fn incomplete_input_is_reported() {
    let s = session();
    match s.run("if (x > 0") {
        Err(SessionError::Incomplete(d)) => {
            assert_eq!(d.code.category(), ErrorCode::MORE_INPUT_NEEDED.category())
        }
        other => panic!("expected incomplete input, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Arrays
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn array_creation_and_indexing() {
    let s = session();
    assert_eq!(
        value(&s, "int[] a = new int[3]; a[1] = 7; a.length + a[1]"),
        Value::Int(10)
    );
    let err = eval_error(&s, "a[3]");
    assert_eq!(err.code(), ErrorCode::INDEX_OUT_OF_BOUNDS);
    assert!(err.to_string().contains("Index 3 out of bounds for length 3"));
    assert_eq!(eval_error(&s, "a.length = 2").code(), ErrorCode::FINAL_REASSIGNED);
}

#[test]
fn array_initializers() {
    let s = session();
    assert_eq!(
        value(&s, "String[] names = {\"x\", \"y\"}; names[0] + names[1]"),
        Value::str("xy")
    );
    assert_eq!(
        value(&s, "int[][] grid = new int[][]{{1, 2}, {3}}; grid[1][0] + grid[0].length"),
        Value::Int(5)
    );
    assert_eq!(value(&s, "int[][] jag = new int[2][]; jag[1] == null"), Value::Boolean(true));
}

// ══════════════════════════════════════════════════════════════════════════════
// Control flow
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn while_with_break_and_continue() {
    let s = session();
    let out = value(
        &s,
        "int i = 0; int n = 0;
         while (true) { i++; if (i % 2 == 0) continue; if (i > 7) break; n += i; }
         n",
    );
    assert_eq!(out, Value::Int(16));
}

#[test]
fn for_and_do_while() {
    let s = session();
    assert_eq!(
        value(&s, "int f = 1; for (int k = 1; k <= 5; k++) f *= k; f"),
        Value::Int(120)
    );
    assert_eq!(
        value(&s, "int d = 10; do { d -= 3; } while (d > 0); d"),
        Value::Int(-2)
    );
    // The loop variable does not escape.
    assert_eq!(eval_error(&s, "k").code(), ErrorCode::UNDECLARED);
}

#[test]
fn for_each_over_list_and_array() {
    let s = session();
    let out = value(
        &s,
        "import java.util.*;
         List<Integer> xs = new ArrayList<Integer>();
         for (int i = 0; i < 4; i++) xs.add(i * i);
         int sum = 0;
         for (int v : xs) sum += v;
         sum",
    );
    assert_eq!(out, Value::Int(14));
    assert_eq!(
        value(&s, "int acc = 0; for (var c : new int[]{4, 5}) acc += c; acc"),
        Value::Int(9)
    );
    assert_eq!(eval_error(&s, "for (int v : 5) {}").code(), ErrorCode::NOT_ITERABLE);
}

#[test]
fn misplaced_jumps() {
    let s = session();
    assert_eq!(eval_error(&s, "break;").code(), ErrorCode::MISPLACED_JUMP);
    assert_eq!(eval_error(&s, "return 1;").code(), ErrorCode::MISPLACED_JUMP);
}

#[test]
fn untaken_branches_are_checked() {
    let s = session();
    let err = eval_error(&s, "if (true) { 1; } else { int q = \"x\"; }");
    assert_eq!(err.code(), ErrorCode::TYPE_MISMATCH);
    let err = eval_error(&s, "while (false) { undefinedName++; }");
    assert_eq!(err.code(), ErrorCode::UNDECLARED);
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn recursive_function() {
    let s = session();
    s.run("int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }")
        .unwrap();
    assert_eq!(value(&s, "fact(5)"), Value::Int(120));
    assert!(s.env().function("fact").is_some());
}

#[test]
fn varargs_function() {
    let s = session();
    s.run("int sum(int... xs) { int t = 0; for (int x : xs) t += x; return t; }")
        .unwrap();
    assert_eq!(value(&s, "sum(1, 2, 3)"), Value::Int(6));
    assert_eq!(value(&s, "sum()"), Value::Int(0));
    assert_eq!(value(&s, "sum(new int[]{4, 4})"), Value::Int(8));
    assert_eq!(
        eval_error(&s, "sum(\"no\")").code(),
        ErrorCode::NO_APPLICABLE_OVERLOAD
    );
}

#[test]
fn function_sees_finals_only() {
    let s = session();
    s.run("final int base = 10; int loose = 1;").unwrap();
    s.run("int plus(int v) { return v + base; }").unwrap();
    assert_eq!(value(&s, "plus(5)"), Value::Int(15));
    let err = eval_error(&s, "int bad() { return loose; }");
    assert_eq!(err.code(), ErrorCode::UNDECLARED);
}

#[test]
fn missing_return_is_rejected() {
    let s = session();
    let err = eval_error(&s, "int f(int x) { if (x > 0) return 1; }");
    assert!(err.to_string().contains("missing return statement"));
    s.run("int g(int x) { while (true) { if (x > 0) return x; x++; } }")
        .unwrap();
    assert_eq!(value(&s, "g(-2)"), Value::Int(1));
}

#[test]
fn runaway_recursion_overflows() {
    let s = session();
    s.run("int down(int n) { return down(n + 1); }").unwrap();
    let err = eval_error(&s, "down(0)");
    assert!(err.exception().is_some());
    assert!(err.to_string().contains("StackOverflowError"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Exceptions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn division_by_zero_escapes() {
    let s = session();
    let err = eval_error(&s, "1 / 0");
    assert_eq!(err.code(), ErrorCode::ARITHMETIC);
    assert!(err.to_string().contains("/ by zero"));
    let Some(Value::Object(o)) = err.exception() else {
        panic!("expected an exception object");
    };
    assert_eq!(o.class, jel_model::lang::ARITHMETIC_EXCEPTION);
}

#[test]
fn try_catch_finally() {
    let s = session();
    let out = value(
        &s,
        "int r = 0;
         try { r = 10 / 0; } catch (ArithmeticException e) { r = -1; } finally { r = r * 2; }
         r",
    );
    assert_eq!(out, Value::Int(-2));
    assert_eq!(
        value(
            &s,
            "String m = \"\";
             try { throw new IllegalArgumentException(\"bad\"); }
             catch (NullPointerException | IllegalArgumentException e) { m = e.getMessage(); }
             m"
        ),
        Value::str("bad")
    );
}

#[test]
fn rethrow_keeps_original_diagnostic() {
    let s = session();
    let err = eval_error(
        &s,
        "try { Object o = null; o.toString(); } catch (NullPointerException e) { throw e; }",
    );
    assert_eq!(err.code(), ErrorCode::NULL_DEREFERENCE);
    assert!(err.diagnostic().source_line.contains("o.toString()"));
}

#[test]
fn catch_requires_throwable() {
    let s = session();
    let err = eval_error(&s, "try { } catch (String e) { }");
    assert_eq!(err.code(), ErrorCode::TYPE_MISMATCH);
}

// ══════════════════════════════════════════════════════════════════════════════
// Host classes and imports
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn static_members_and_imports() {
    let s = session();
    assert_eq!(value(&s, "Math.max(3, 9)"), Value::Int(9));
    assert_eq!(value(&s, "import static java.lang.Math.*; abs(-4)"), Value::Int(4));
    assert_eq!(value(&s, "import static java.lang.Math.PI; PI > 3"), Value::Boolean(true));
    assert_eq!(
        eval_error(&s, "import static java.lang.Math.nothing;").code(),
        ErrorCode::NO_SUCH_FIELD
    );
    assert_eq!(eval_error(&s, "import no.such.Type;").code(), ErrorCode::UNKNOWN_TYPE);
}

#[test]
fn generics_flow_through_calls() {
    let s = session();
    s.run(
        "import java.util.*;
         Map<String, List<Integer>> m = new HashMap<String, List<Integer>>();
         m.put(\"k\", new ArrayList<Integer>());
         m.get(\"k\").add(3);",
    )
    .unwrap();
    let out = last(&s, "m.get(\"k\").get(0) + 1");
    assert_eq!(out.value, Some(Value::Int(4)));
    assert_eq!(
        eval_error(&s, "m.get(\"k\").add(\"s\")").code(),
        ErrorCode::NO_APPLICABLE_OVERLOAD
    );
}

#[test]
fn unknown_members() {
    let s = session();
    assert_eq!(eval_error(&s, "\"x\".nope()").code(), ErrorCode::NO_SUCH_METHOD);
    assert_eq!(eval_error(&s, "Math.nope").code(), ErrorCode::NO_SUCH_FIELD);
    assert_eq!(eval_error(&s, "int i = 3; i.foo()").code(), ErrorCode::BAD_OPERANDS);
    assert_eq!(eval_error(&s, "new Comparable()").code(), ErrorCode::NO_SUCH_CONSTRUCTOR);
}

// ══════════════════════════════════════════════════════════════════════════════
// Limits and cancellation
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn loop_limit_aborts() {
    let s = Session::java(EvalOptions {
        max_loop_iterations: Some(100),
        ..EvalOptions::default()
    })
    .unwrap();
    let err = eval_error(&s, "int spins = 0; while (true) { spins++; }");
    assert!(matches!(err, EvalError::Aborted(_)));
    assert_eq!(err.code(), ErrorCode::LOOP_LIMIT);
    // Bounded loops under the limit still run.
    assert_eq!(value(&s, "int t = 0; for (int i = 0; i < 100; i++) t++; t"), Value::Int(100));
}

#[test]
fn cancelled_environment_stops() {
    let s = session();
    s.env().cancel();
    let err = eval_error(&s, "1 + 1");
    assert_eq!(err.code(), ErrorCode::CANCELLED);
}

#[test]
fn options_deserialize_with_defaults() {
    let options: EvalOptions = serde_json::from_str(r#"{"max_loop_iterations": 10}"#).unwrap();
    assert_eq!(options.max_loop_iterations, Some(10));
    assert!(options.public_only);
    assert_eq!(options.max_call_depth, EvalOptions::default().max_call_depth);
}

// ══════════════════════════════════════════════════════════════════════════════
// Persistence
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn save_and_load_round_trip() {
    let first = session();
    first
        .run(
            "import java.util.*;
             final int a = 3;
             String s = \"hi\";
             List<Integer> xs = new ArrayList<Integer>();
             xs.add(4);
             int twice(int v) { return v * 2; }
             twice(a)",
        )
        .unwrap();
    let mut stream = Vec::new();
    let failed = first.env().save(&mut stream).unwrap();
    assert!(failed.is_empty());
    for line in String::from_utf8(stream.clone()).unwrap().lines() {
        let json: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(json["kind"].is_string());
    }

    let second = session();
    let applied = second
        .env()
        .load(&stream[..], second.parser(), second.evaluator())
        .unwrap();
    assert!(applied >= 6);
    assert_eq!(value(&second, "twice(a) + s.length() + xs.get(0)"), Value::Int(12));
    assert_eq!(eval_error(&second, "a = 1").code(), ErrorCode::FINAL_REASSIGNED);
    assert_eq!(second.env().history(1), Some(Value::Int(6)));
}

#[test]
fn unpersistable_values_are_reported() {
    let s = session();
    s.run("RuntimeException boom = new RuntimeException(\"x\"); int keep = 1;")
        .unwrap();
    let mut stream = Vec::new();
    let failed = s.env().save(&mut stream).unwrap();
    assert_eq!(failed, vec!["boom".to_string()]);

    let restored = session();
    restored
        .env()
        .load(&stream[..], restored.parser(), restored.evaluator())
        .unwrap();
    assert_eq!(value(&restored, "keep"), Value::Int(1));
    assert!(restored.env().lookup("boom").is_none());
}

#[test]
fn self_containing_list_is_reported_on_save() {
    let s = session();
    s.run(
        "import java.util.*;
         List<Object> l = new ArrayList<Object>();
         l.add(l);
         int keep = 2;",
    )
    .unwrap();
    let mut stream = Vec::new();
    let failed = s.env().save(&mut stream).unwrap();
    assert_eq!(failed, vec!["l".to_string()]);

    let restored = session();
    restored
        .env()
        .load(&stream[..], restored.parser(), restored.evaluator())
        .unwrap();
    assert_eq!(value(&restored, "keep"), Value::Int(2));
    assert!(restored.env().lookup("l").is_none());
}

#[test]
fn shared_values_stay_shared_after_load() {
    let first = session();
    first
        .run(
            "import java.util.*;
             int[] a = {1, 2};
             int[] b = a;
             List<int[]> holder = new ArrayList<int[]>();
             holder.add(a);",
        )
        .unwrap();
    let mut stream = Vec::new();
    assert!(first.env().save(&mut stream).unwrap().is_empty());

    let second = session();
    second
        .env()
        .load(&stream[..], second.parser(), second.evaluator())
        .unwrap();
    assert_eq!(value(&second, "b[0] = 9; a[0]"), Value::Int(9));
    assert_eq!(value(&second, "holder.get(0) == b"), Value::Boolean(true));
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn evaluation_is_deterministic() {
    let script = "import java.util.*;
        Map<String, Integer> counts = new HashMap<String, Integer>();
        for (String w : new String[]{\"b\", \"a\", \"b\", \"c\"}) {
            Integer c = counts.get(w);
            counts.put(w, c == null ? 1 : c + 1);
        }
        counts";
    let first = last(&session(), script).display;
    for _ in 0..100 {
        assert_eq!(last(&session(), script).display, first);
    }
}
