//! Match engine tests.
//!
//! Covers: statement splitting and terminators, round-trip of match texts,
//! trivia handling, priority and longest-match selection, negative
//! lookahead, left recursion, incomplete vs. syntax failures, JSON grammar
//! loading, and the 100-iteration determinism test.

use std::sync::Arc;

use jel_grammar::config;
use jel_grammar::dsl::*;
use jel_grammar::{
    Grammar, GrammarBuilder, GrammarRule, MatchFailure, MatchKind, Matcher, ParseMatch,
};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// A small statement language: assignments, calls, braces, comments.
fn calc_grammar() -> Grammar {
    GrammarBuilder::new("Stmt")
        .rule(GrammarRule::new(
            "Stmt",
            vec![select(vec![rule("Block"), rule("Assign"), rule("Expr")])],
        ))
        .rule(
            GrammarRule::new(
                "Block",
                vec![lit("{"), many(vec![rule("Stmt"), opt(vec![lit(";")])]), lit("}")],
            )
            .priority(2),
        )
        .rule(GrammarRule::new("Assign", vec![rule("Ident"), lit("="), rule("Expr")]).priority(1))
        .rule(GrammarRule::new(
            "Expr",
            vec![select(vec![rule("Add"), rule("Atom")])],
        ))
        .rule(
            GrammarRule::new("Add", vec![rule("Expr"), rule("AddOp"), rule("Atom")])
                .priority(1)
                .store_as("sum"),
        )
        .rule(GrammarRule::new("AddOp", vec![select(vec![lit("+"), lit("-")])]).store_as("op"))
        .rule(GrammarRule::new(
            "Atom",
            vec![select(vec![rule("Call"), rule("Number"), rule("Ident"), rule("Paren")])],
        ))
        .rule(
            GrammarRule::new(
                "Call",
                vec![rule("Ident"), lit("("), opt(vec![rule("Expr")]), lit(")")],
            )
            .priority(1),
        )
        .rule(GrammarRule::new("Paren", vec![lit("("), rule("Expr"), lit(")")]))
        .rule(GrammarRule::new("Number", vec![chars("0-9", 1, None)]).contiguous())
        .rule(
            GrammarRule::new(
                "Ident",
                vec![
                    forbid(vec![rule("Keyword")]),
                    chars(":ident_start:", 1, Some(1)),
                    chars(":ident_part:", 0, None),
                ],
            )
            .contiguous(),
        )
        .rule(
            GrammarRule::new(
                "Keyword",
                vec![lit("let"), forbid(vec![chars(":ident_part:", 1, Some(1))])],
            )
            .contiguous(),
        )
        .rule(GrammarRule::new("Comment", vec![lit("//"), chars("^\\n", 0, None)]).ignorable())
        .build()
        .expect("calc grammar builds")
}

fn matcher() -> Matcher {
    Matcher::new(Arc::new(calc_grammar()))
}

fn statements(text: &str) -> Vec<ParseMatch> {
    matcher()
        .parse_matches(text)
        .unwrap_or_else(|e| panic!("failed to match {text:?}: {e}"))
}

/// Root-rule text of every statement.
fn roots(text: &str) -> Vec<String> {
    statements(text)
        .iter()
        .filter_map(|s| s.statement_root().map(|r| r.text(text).to_string()))
        .collect()
}

fn failure(text: &str) -> MatchFailure {
    match matcher().parse_matches(text) {
        Ok(m) => panic!("expected failure for {text:?}, got {} statements", m.len()),
        Err(e) => e,
    }
}

fn rule_name(grammar: &Grammar, m: &ParseMatch) -> String {
    match m.kind {
        MatchKind::Rule(id) => grammar.rule(id).name.clone(),
        other => format!("{other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Statements & terminators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_single_expression() {
    assert_eq!(roots("1 + 2"), vec!["1 + 2"]);
}

#[test]
fn test_semicolon_and_newline_terminators() {
    assert_eq!(roots("a = 1; b = 2\nc"), vec!["a = 1", "b = 2", "c"]);
}

#[test]
fn test_block_needs_no_terminator() {
    assert_eq!(roots("{ a = 1; b = 2 } c = 3"), vec!["{ a = 1; b = 2 }", "c = 3"]);
}

#[test]
fn test_statement_spans_lines_inside_braces() {
    assert_eq!(roots("{\n  a = 1\n  b = 2\n}"), vec!["{\n  a = 1\n  b = 2\n}"]);
}

#[test]
fn test_missing_terminator_is_syntax_error() {
    let err = failure("a = 1 b = 2");
    match err {
        MatchFailure::Syntax(d) => {
            assert_eq!(d.code.0, 101);
            assert_eq!(d.span.start_col, 7);
        }
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn test_empty_input_has_no_statements() {
    assert!(statements("").is_empty());
}

#[test]
fn test_whitespace_only_input() {
    let s = statements("  \n ");
    assert_eq!(s.len(), 1);
    assert!(s[0].statement_root().is_none());
    assert_eq!(s[0].len, 4);
}

// ─────────────────────────────────────────────────────────────────────
// Round trip
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_concatenated_statements_reproduce_input() {
    for text in [
        "a = 1",
        "  a = 1 ;  b = 2  \n\n",
        "// header\nf(1 + 2) // trailing\n{ x = 1 }\n",
        ";;a\n",
    ] {
        let all: String = statements(text).iter().map(|s| s.text(text)).collect();
        assert_eq!(all, text);
    }
}

#[test]
fn test_children_are_contiguous() {
    fn check(m: &ParseMatch) {
        let mut at = m.offset;
        for c in m.children() {
            assert_eq!(c.offset, at, "gap before child at {}", c.offset);
            at = c.end();
            check(c);
        }
        if !m.children().is_empty() {
            assert_eq!(at, m.end());
        }
    }
    for s in statements("a = f( 1 +  2 ) ; { b = (3) }") {
        check(&s);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Trivia
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_comments_are_skipped_between_elements() {
    assert_eq!(roots("a = // note\n 1"), vec!["a = // note\n 1"]);
}

#[test]
fn test_trailing_comment_belongs_to_statement() {
    let text = "a = 1 // done\nb";
    let s = statements(text);
    assert_eq!(s.len(), 2);
    assert_eq!(s[0].text(text), "a = 1 // done\n");
}

#[test]
fn test_trivia_does_not_count_toward_weight() {
    let text = "a   =   1";
    let s = statements(text);
    let root = s[0].statement_root().unwrap();
    assert_eq!(root.weight, 3);
}

// ─────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_longest_alternative_wins() {
    let grammar = calc_grammar();
    let text = "f(1)";
    let s = statements(text);
    let root = s[0].statement_root().unwrap();
    let atom = root.rule_children()[0].rule_children()[0];
    assert_eq!(rule_name(&grammar, atom), "Atom");
    assert_eq!(rule_name(&grammar, atom.rule_children()[0]), "Call");
}

#[test]
fn test_assignment_preferred_over_expression() {
    let grammar = calc_grammar();
    let text = "a = 1";
    let s = statements(text);
    let stmt = s[0].statement_root().unwrap();
    assert_eq!(rule_name(&grammar, stmt.rule_children()[0]), "Assign");
}

#[test]
fn test_store_as_tags() {
    let text = "1 - 2";
    let s = statements(text);
    let expr = s[0].statement_root().unwrap().rule_children()[0];
    let sum = expr.find_tag("sum").expect("tagged sum");
    let op = sum.find_tag("op").expect("tagged operator");
    assert_eq!(op.text(text), "-");
    assert!(op.has_literal(text, "-"));
}

#[test]
fn test_forbid_rejects_keyword_identifier() {
    assert!(matches!(failure("let"), MatchFailure::Syntax(_)));
    assert_eq!(roots("letter = 1"), vec!["letter = 1"]);
}

// ─────────────────────────────────────────────────────────────────────
// Left recursion
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_left_recursive_chain_is_left_associative() {
    let grammar = calc_grammar();
    let text = "1 + 2 - 3";
    let s = statements(text);
    let expr = s[0].statement_root().unwrap().rule_children()[0];
    let outer = expr.rule_children()[0];
    assert_eq!(rule_name(&grammar, outer), "Add");
    assert_eq!(outer.text(text), "1 + 2 - 3");
    let inner = outer.rule_children()[0].rule_children()[0];
    assert_eq!(rule_name(&grammar, inner), "Add");
    assert_eq!(inner.text(text), "1 + 2");
}

// ─────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unclosed_paren_is_incomplete() {
    let err = failure("a = f(1 + 2");
    assert!(err.is_incomplete(), "got {err:?}");
    assert_eq!(err.diagnostic().code.0, 150);
}

#[test]
fn test_dangling_operator_is_incomplete() {
    assert!(failure("a = 1 +").is_incomplete());
    assert!(failure("a = 1 +   \n").is_incomplete());
}

#[test]
fn test_unclosed_block_is_incomplete() {
    assert!(failure("{ a = 1;").is_incomplete());
}

#[test]
fn test_bad_token_is_syntax_error() {
    let err = failure("a = 1 + )");
    assert!(matches!(err, MatchFailure::Syntax(_)), "got {err:?}");
    assert_eq!(err.diagnostic().span.start_col, 9);
}

#[test]
fn test_syntax_error_renders_caret() {
    let err = failure("a = #");
    let rendered = err.diagnostic().render();
    assert!(rendered.contains("a = #"));
    assert!(rendered.contains("    ^"));
}

// ─────────────────────────────────────────────────────────────────────
// Rule matching & configuration
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_match_single_rule() {
    let m = matcher();
    let id = m.grammar().lookup("Call").unwrap();
    let call = m.match_rule(" f(x) ", id).unwrap();
    assert_eq!(call.offset, 1);
    assert_eq!(call.len, 4);
    assert!(m.match_rule("f(x) y", id).is_err());
}

#[test]
fn test_json_grammar_matches() {
    let json = r#"{
        "name": "grammar",
        "attributes": { "root": "List" },
        "children": [
            { "name": "rule", "attributes": { "name": "List" }, "children": [
                { "name": "literal", "attributes": { "text": "[" } },
                { "name": "option", "children": [
                    { "name": "ref", "attributes": { "rule": "Num" } },
                    { "name": "option", "attributes": { "min": "0", "max": "*" }, "children": [
                        { "name": "literal", "attributes": { "text": "," } },
                        { "name": "ref", "attributes": { "rule": "Num" } }
                    ] }
                ] },
                { "name": "literal", "attributes": { "text": "]" } }
            ] },
            { "name": "rule", "attributes": { "name": "Num", "contiguous": "true" }, "children": [
                { "name": "chars", "attributes": { "set": ":digit:", "min": "1" } }
            ] }
        ]
    }"#;
    let grammar = config::from_json(json).unwrap();
    let matcher = Matcher::new(Arc::new(grammar));
    let text = "[1, 22, 333]\n[]";
    let s = matcher.parse_matches(text).unwrap();
    assert_eq!(s.len(), 2);
    assert_eq!(s[0].statement_root().unwrap().text(text), "[1, 22, 333]");
    assert!(matcher.parse_matches("[1,").unwrap_err().is_incomplete());
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_matching_determinism_100_iterations() {
    let text = "a = f(1 + 2) - 3 // c\n{ b = a; c = (b) }";
    let grammar = calc_grammar();
    let first = matcher().parse_matches(text).unwrap();
    let first_dump: Vec<String> = first.iter().map(|s| s.dump(&grammar, text)).collect();
    for i in 0..100 {
        let again = matcher().parse_matches(text).unwrap();
        let dump: Vec<String> = again.iter().map(|s| s.dump(&grammar, text)).collect();
        assert_eq!(first_dump, dump, "Determinism failure at iteration {i}");
    }
}
