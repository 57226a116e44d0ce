//! Parser tests: default grammar to AST.
//!
//! Covers: expression precedence and associativity, postfix chains,
//! literals, casts, statements and declarations, generic types, error
//! channels (syntax, incomplete, structure), custom factories and
//! determinism.

use jel_parser::{ParseError, Parsed, Parser, Registry};
use jel_types::ast::*;
use jel_types::ErrorCode;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parser() -> Parser {
    Parser::java().expect("default grammar")
}

fn parse_ok(source: &str) -> Parsed {
    match parser().parse(source) {
        Ok(parsed) => parsed,
        Err(e) => panic!("unexpected parse error for {source:?}:\n{}", e.diagnostic().render()),
    }
}

/// Compact s-expression of a subtree. Operators print as symbols, names
/// as plain text, everything else through `Debug`.
fn sexpr(ast: &Ast, id: NodeId) -> String {
    let head = match ast.kind(id) {
        NodeKind::Literal(l) => format!("{l:?}"),
        NodeKind::Name(n) => n.clone(),
        NodeKind::Binary(op) => op.symbol().to_string(),
        NodeKind::Unary(op) => op.symbol().to_string(),
        other => format!("{other:?}"),
    };
    let children = ast.children(id);
    if children.is_empty() {
        return head;
    }
    let inner: Vec<String> = children.iter().map(|c| sexpr(ast, *c)).collect();
    format!("({head} {})", inner.join(" "))
}

/// S-expression of the only statement in `source`.
fn stmt(source: &str) -> String {
    let parsed = parse_ok(source);
    assert_eq!(parsed.statements.len(), 1, "expected one statement in {source:?}");
    sexpr(&parsed.ast, parsed.statements[0])
}

/// S-expression of the expression inside a single expression statement.
fn expr(source: &str) -> String {
    let parsed = parse_ok(source);
    assert_eq!(parsed.statements.len(), 1);
    let id = parsed.statements[0];
    assert_eq!(parsed.ast.kind(id), &NodeKind::ExprStmt, "not an expression: {source:?}");
    sexpr(&parsed.ast, parsed.ast.children(id)[0])
}

fn literal(source: &str) -> Literal {
    let parsed = parse_ok(source);
    let id = parsed.ast.children(parsed.statements[0])[0];
    match parsed.ast.kind(id) {
        NodeKind::Literal(l) => l.clone(),
        other => panic!("expected a literal, got {other:?}"),
    }
}

fn error(source: &str) -> ParseError {
    match parser().parse(source) {
        Ok(parsed) => panic!(
            "expected an error for {source:?}, got {} statements",
            parsed.statements.len()
        ),
        Err(e) => e,
    }
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_precedence() {
    assert_eq!(expr("3 + 4 * 2"), "(+ Int(3) (* Int(4) Int(2)))");
    assert_eq!(expr("(3 + 4) * 2"), "(* (+ Int(3) Int(4)) Int(2))");
    assert_eq!(expr("a || b && c"), "(|| a (&& b c))");
    assert_eq!(expr("a == b < c"), "(== a (< b c))");
    assert_eq!(expr("a & b | c ^ d"), "(| (& a b) (^ c d))");
    assert_eq!(expr("1 << 2 + 3"), "(<< Int(1) (+ Int(2) Int(3)))");
}

#[test]
fn test_left_associativity() {
    assert_eq!(expr("a - b - c"), "(- (- a b) c)");
    assert_eq!(expr("a / b * c"), "(* (/ a b) c)");
}

#[test]
fn test_assignment_is_right_associative() {
    assert_eq!(
        expr("x = y = 1"),
        "(Assign(Assign) x (Assign(Assign) y Int(1)))"
    );
    assert_eq!(expr("x += 2"), "(Assign(Compound(Add)) x Int(2))");
    assert_eq!(expr("x >>>= 1"), "(Assign(Compound(UShr)) x Int(1))");
}

#[test]
fn test_comparison_not_split_from_assignment() {
    assert_eq!(expr("x == 1"), "(== x Int(1))");
    assert_eq!(expr("x <= 1"), "(<= x Int(1))");
}

#[test]
fn test_conditional() {
    assert_eq!(
        expr("b ? 1 : c ? 2 : 3"),
        "(Conditional b Int(1) (Conditional c Int(2) Int(3)))"
    );
    assert_eq!(expr("true ? 1 : 2.0"), "(Conditional Bool(true) Int(1) Double(2.0))");
}

#[test]
fn test_unary_and_steps() {
    assert_eq!(expr("!a"), "(! a)");
    assert_eq!(expr("-x"), "(- x)");
    assert_eq!(expr("~-x"), "(~ (- x))");
    assert_eq!(expr("++i"), "(Step { op: Increment, prefix: true } i)");
    assert_eq!(expr("i--"), "(Step { op: Decrement, prefix: false } i)");
    assert_eq!(expr("a - -b"), "(- a (- b))");
}

#[test]
fn test_negative_literal_limits() {
    assert_eq!(expr("-2147483648"), "Int(-2147483648)");
    assert_eq!(expr("-9223372036854775808L"), "Long(-9223372036854775808)");
    assert_eq!(expr("-5"), "Int(-5)");
}

#[test]
fn test_postfix_chain() {
    assert_eq!(
        expr("a.b.c(1)[0]++"),
        "(Step { op: Increment, prefix: false } (Index (Call { name: \"c\", qualified: true } (Field(\"b\") a) Int(1)) Int(0)))"
    );
    assert_eq!(
        expr("Math.max(1, 2)"),
        "(Call { name: \"max\", qualified: true } Math Int(1) Int(2))"
    );
    assert_eq!(expr("f()"), "Call { name: \"f\", qualified: false }");
    assert_eq!(expr("s.length"), "(Field(\"length\") s)");
}

#[test]
fn test_casts() {
    assert_eq!(
        expr("(int) 3.7"),
        "(Cast TypeRef { name: \"int\", dims: 0 } Double(3.7))"
    );
    assert_eq!(
        expr("(String) o"),
        "(Cast TypeRef { name: \"String\", dims: 0 } o)"
    );
    assert_eq!(
        expr("(long) -1"),
        "(Cast TypeRef { name: \"long\", dims: 0 } Int(-1))"
    );
    // A parenthesized name followed by a sign is arithmetic.
    assert_eq!(expr("(a) - b"), "(- a b)");
}

#[test]
fn test_instanceof() {
    assert_eq!(
        expr("x instanceof String"),
        "(InstanceOf x TypeRef { name: \"String\", dims: 0 })"
    );
    assert_eq!(
        expr("x instanceof int[] == true"),
        "(== (InstanceOf x TypeRef { name: \"int\", dims: 1 }) Bool(true))"
    );
}

#[test]
fn test_object_and_array_creation() {
    assert_eq!(
        expr("new StringBuilder(\"a\")"),
        "(New TypeRef { name: \"StringBuilder\", dims: 0 } Str(\"a\"))"
    );
    assert_eq!(
        expr("new java.util.ArrayList<>()"),
        "(New TypeRef { name: \"java.util.ArrayList\", dims: 0 })"
    );
    assert_eq!(
        expr("new int[3][]"),
        "(NewArray { dims: 2 } TypeRef { name: \"int\", dims: 0 } Int(3))"
    );
    assert_eq!(
        expr("new String[] {\"a\", \"b\"}"),
        "(NewArray { dims: 1 } TypeRef { name: \"String\", dims: 0 } (ArrayInit Str(\"a\") Str(\"b\")))"
    );
    assert_eq!(
        expr("String.class"),
        "(ClassLiteral TypeRef { name: \"String\", dims: 0 })"
    );
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_literals() {
    assert_eq!(literal("42"), Literal::Int(42));
    assert_eq!(literal("0x1F"), Literal::Int(31));
    assert_eq!(literal("0b1010"), Literal::Int(10));
    assert_eq!(literal("10L"), Literal::Long(10));
    assert_eq!(literal("1.5f"), Literal::Float(1.5));
    assert_eq!(literal("2.5"), Literal::Double(2.5));
    assert_eq!(literal("1e2"), Literal::Double(100.0));
    assert_eq!(literal("'a'"), Literal::Char(u16::from(b'a')));
    assert_eq!(literal("'\\n'"), Literal::Char(10));
    assert_eq!(literal("'\\u0041'"), Literal::Char(65));
    assert_eq!(literal("\"hi\\t!\""), Literal::Str("hi\t!".into()));
    assert_eq!(literal("\"\""), Literal::Str(String::new()));
    assert_eq!(literal("true"), Literal::Bool(true));
    assert_eq!(literal("null"), Literal::Null);
}

#[test]
fn test_malformed_literals_are_structure_errors() {
    let e = error("'ab'");
    assert!(matches!(e, ParseError::Structure(_)));
    assert_eq!(e.diagnostic().code, ErrorCode::MALFORMED_LITERAL);

    let e = error("2147483648");
    assert_eq!(e.diagnostic().code, ErrorCode::MALFORMED_LITERAL);

    let e = error("\"\\q\"");
    assert_eq!(e.diagnostic().code, ErrorCode::MALFORMED_LITERAL);
}

// ─────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_local_variables() {
    assert_eq!(
        stmt("final int y = 5;"),
        "(VarDecl { is_final: true } TypeRef { name: \"int\", dims: 0 } (Declarator { name: \"y\", dims: 0 } Int(5)))"
    );
    assert_eq!(
        stmt("int a, b = 2"),
        "(VarDecl { is_final: false } TypeRef { name: \"int\", dims: 0 } Declarator { name: \"a\", dims: 0 } (Declarator { name: \"b\", dims: 0 } Int(2)))"
    );
    assert_eq!(
        stmt("int[] xs = {1, 2}"),
        "(VarDecl { is_final: false } TypeRef { name: \"int\", dims: 1 } (Declarator { name: \"xs\", dims: 0 } (ArrayInit Int(1) Int(2))))"
    );
    assert_eq!(
        stmt("String s[]"),
        "(VarDecl { is_final: false } TypeRef { name: \"String\", dims: 0 } Declarator { name: \"s\", dims: 1 })"
    );
}

#[test]
fn test_generic_declaration() {
    assert_eq!(
        stmt("List<String> names = null"),
        "(VarDecl { is_final: false } (TypeRef { name: \"List\", dims: 0 } TypeRef { name: \"String\", dims: 0 }) (Declarator { name: \"names\", dims: 0 } Null))"
    );
}

#[test]
fn test_if_else() {
    let parsed = parse_ok("if (x > 0) { y = 1; } else y = 2;");
    let ast = &parsed.ast;
    let id = parsed.statements[0];
    assert_eq!(ast.kind(id), &NodeKind::If);
    let children = ast.children(id);
    assert_eq!(children.len(), 3);
    assert_eq!(sexpr(ast, children[0]), "(> x Int(0))");
    assert_eq!(ast.kind(children[1]), &NodeKind::Block);
    assert_eq!(ast.kind(children[2]), &NodeKind::ExprStmt);
}

#[test]
fn test_for_loop() {
    assert_eq!(
        stmt("for (int i = 0; i < 3; i++) s += i;"),
        "(For { init: 1, has_cond: true, update: 1 } \
         (VarDecl { is_final: false } TypeRef { name: \"int\", dims: 0 } (Declarator { name: \"i\", dims: 0 } Int(0))) \
         (< i Int(3)) \
         (ExprStmt (Step { op: Increment, prefix: false } i)) \
         (ExprStmt (Assign(Compound(Add)) s i)))"
    );
    assert_eq!(
        stmt("for (;;) break;"),
        "(For { init: 0, has_cond: false, update: 0 } Break)"
    );
    assert_eq!(
        stmt("for (i = 0, j = 1; ; i++, j++) {}"),
        "(For { init: 2, has_cond: false, update: 2 } \
         (ExprStmt (Assign(Assign) i Int(0))) \
         (ExprStmt (Assign(Assign) j Int(1))) \
         (ExprStmt (Step { op: Increment, prefix: false } i)) \
         (ExprStmt (Step { op: Increment, prefix: false } j)) \
         Block)"
    );
}

#[test]
fn test_for_each() {
    assert_eq!(
        stmt("for (final String s : list) { }"),
        "(ForEach { name: \"s\", is_final: true } TypeRef { name: \"String\", dims: 0 } list Block)"
    );
}

#[test]
fn test_while_and_do() {
    assert_eq!(
        stmt("while (b) x++;"),
        "(While b (ExprStmt (Step { op: Increment, prefix: false } x)))"
    );
    assert_eq!(stmt("do { } while (b)"), "(DoWhile Block b)");
}

#[test]
fn test_body_semicolon_ends_statement() {
    let parsed = parse_ok("while (b) x++; y");
    assert_eq!(parsed.statements.len(), 2);
    assert_eq!(parsed.ast.kind(parsed.statements[0]), &NodeKind::While);
    assert_eq!(sexpr(&parsed.ast, parsed.statements[1]), "(ExprStmt y)");
    // `}` and a statement's own `;` are the only text that can end it early.
    assert!(parser().parse("x + 1 y").is_err());
}

#[test]
fn test_try_catch_finally() {
    assert_eq!(
        stmt("try { f(); } catch (A | B e) { } finally { }"),
        "(Try { has_finally: true } \
         (Block (ExprStmt Call { name: \"f\", qualified: false })) \
         (Catch { name: \"e\" } TypeRef { name: \"A\", dims: 0 } TypeRef { name: \"B\", dims: 0 } Block) \
         Block)"
    );
}

#[test]
fn test_jumps() {
    assert_eq!(stmt("return"), "Return");
    assert_eq!(stmt("return x + 1;"), "(Return (+ x Int(1)))");
    assert_eq!(
        stmt("throw new RuntimeException(\"boom\")"),
        "(Throw (New TypeRef { name: \"RuntimeException\", dims: 0 } Str(\"boom\")))"
    );
}

#[test]
fn test_imports() {
    assert_eq!(
        stmt("import java.util.*"),
        "Import { is_static: false, wildcard: true, path: \"java.util\" }"
    );
    assert_eq!(
        stmt("import static java.lang.Math.max;"),
        "Import { is_static: true, wildcard: false, path: \"java.lang.Math.max\" }"
    );
}

#[test]
fn test_function_declaration() {
    assert_eq!(
        stmt("int add(int a, int... rest) { return a; }"),
        "(FunctionDecl { name: \"add\", varargs: true } \
         TypeRef { name: \"int\", dims: 0 } \
         (Param { name: \"a\", is_final: false } TypeRef { name: \"int\", dims: 0 }) \
         (Param { name: \"rest\", is_final: false } TypeRef { name: \"int\", dims: 0 }) \
         (Block (Return a)))"
    );
}

#[test]
fn test_misplaced_varargs_rejected() {
    let e = error("void f(int... a, int b) { }");
    assert!(matches!(e, ParseError::Structure(_)));
}

#[test]
fn test_multiple_statements_and_comments() {
    let parsed = parse_ok("int x = 1\nx + 1; // done\n/* tail */");
    assert_eq!(parsed.statements.len(), 2);
    assert!(matches!(parsed.ast.kind(parsed.statements[0]), NodeKind::VarDecl { .. }));
    assert_eq!(parsed.ast.kind(parsed.statements[1]), &NodeKind::ExprStmt);
}

#[test]
fn test_blank_input_has_no_statements() {
    assert!(parse_ok("").statements.is_empty());
    assert!(parse_ok("  \n ; \n").statements.is_empty());
    assert!(parse_ok("// only a comment").statements.is_empty());
}

#[test]
fn test_spans_cover_source() {
    let parsed = parse_ok("x = a + b");
    let root = parsed.ast.children(parsed.statements[0])[0];
    assert_eq!(parsed.ast.text(root), "x = a + b");
    let sum = parsed.ast.children(root)[1];
    assert_eq!(parsed.ast.text(sum), "a + b");
}

// ─────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_parse_type() {
    let (ast, id) = parser()
        .parse_type("Map<String, List<? extends Number>>[]")
        .unwrap();
    assert_eq!(
        sexpr(&ast, id),
        "(TypeRef { name: \"Map\", dims: 1 } \
         TypeRef { name: \"String\", dims: 0 } \
         (TypeRef { name: \"List\", dims: 0 } (Wildcard(Extends) TypeRef { name: \"Number\", dims: 0 })))"
    );
}

#[test]
fn test_parse_type_rejects_trailing_input() {
    assert!(parser().parse_type("int x").is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_incomplete_input() {
    for source in ["if (x > 0", "int x = ", "{ int y = 1;", "f(1, ", "\"abc"] {
        let e = error(source);
        assert!(e.is_incomplete(), "{source:?} should be incomplete, got {e}");
    }
}

#[test]
fn test_syntax_error() {
    let e = error("int x = ;");
    assert!(matches!(e, ParseError::Syntax(_)));
    assert_eq!(e.diagnostic().span.start_line, 1);
}

// ─────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_custom_factory_replaces_default() {
    fn shout(
        b: &mut jel_parser::AstBuilder<'_>,
        parent: Option<NodeId>,
        m: &jel_grammar::ParseMatch,
    ) -> Result<NodeId, jel_types::Diagnostic> {
        let name = b.text(m).to_uppercase();
        Ok(b.node(NodeKind::Name(name), m, parent))
    }

    let mut registry = Registry::java();
    assert!(registry.register("Name", shout).is_some());
    let grammar = std::sync::Arc::new(jel_parser::java::grammar().unwrap());
    let parser = Parser::new(grammar, registry).unwrap();
    let parsed = parser.parse("abc + d").unwrap();
    let root = parsed.ast.children(parsed.statements[0])[0];
    assert_eq!(sexpr(&parsed.ast, root), "(+ ABC D)");
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_determinism_100_iterations() {
    let source = "for (int i = 0; i < n; i++) { total += xs[i] * (i % 2 == 0 ? 1 : -1); }";
    let p = parser();
    let first = p.parse(source).unwrap();
    let expected = first.ast.outline(first.statements[0]);
    for _ in 0..100 {
        let parsed = p.parse(source).unwrap();
        assert_eq!(parsed.ast.outline(parsed.statements[0]), expected);
    }
}
