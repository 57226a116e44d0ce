//! The default Java-like grammar.
//!
//! Statements are the root rule. Expressions follow Java precedence from
//! assignment (lowest) down to postfix and primary expressions. Operator
//! and keyword rules are contiguous and use negative lookahead so that
//! `=` never matches the first half of `==` and `int` never matches the
//! start of `interval`.

use jel_grammar::dsl::*;
use jel_grammar::{ConfigError, Element, Grammar, GrammarBuilder, GrammarRule, NamedClass};

/// Reserved words. None of these can be used as an identifier.
pub const KEYWORDS: &[&str] = &[
    "boolean", "break", "byte", "catch", "char", "class", "continue", "do", "double", "else",
    "extends", "false", "final", "finally", "float", "for", "if", "import", "instanceof", "int",
    "long", "new", "null", "return", "short", "static", "super", "throw", "true", "try", "void",
    "while",
];

/// Primitive type keywords, `void` included.
pub const PRIMITIVES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void",
];

/// Build the default grammar.
pub fn grammar() -> Result<Grammar, ConfigError> {
    builder().build()
}

/// The default grammar as a builder, for hosts that add or replace rules.
pub fn builder() -> GrammarBuilder {
    let mut b = GrammarBuilder::new("Statement");
    for rule in trivia()
        .into_iter()
        .chain(keywords())
        .chain(statements())
        .chain(types())
        .chain(expressions())
        .chain(literals())
    {
        b.add_rule(rule);
    }
    b
}

/// Reference to the rule for a keyword.
pub fn kw(word: &str) -> Element {
    rule(&format!("'{word}'"))
}

/// `symbol` not followed by any of `not_followed_by`.
fn op(symbol: &str, not_followed_by: &[&str]) -> Element {
    if not_followed_by.is_empty() {
        return lit(symbol);
    }
    group(vec![
        lit(symbol),
        forbid(vec![select(not_followed_by.iter().map(|s| lit(s)).collect())]),
    ])
}

/// `first ("," rest)*`
fn comma_list(item: &str) -> Vec<Element> {
    vec![rule(item), many(vec![lit(","), rule(item)])]
}

fn r(name: &str, elements: Vec<Element>) -> GrammarRule {
    GrammarRule::new(name, elements)
}

/// A contiguous operator rule tagged `op`.
fn operator(name: &str, alternatives: Vec<Element>) -> GrammarRule {
    r(name, vec![select(alternatives)]).contiguous().store_as("op")
}

/// `Next (Op Next)*`, folded left by the `BinaryChain` factory.
fn chain(name: &str, next: &str, op_rule: &str) -> GrammarRule {
    r(name, vec![rule(next), many(vec![rule(op_rule), rule(next)])]).implementation("BinaryChain")
}

// ══════════════════════════════════════════════════════════════════════════════
// Trivia & keywords
// ══════════════════════════════════════════════════════════════════════════════

fn trivia() -> Vec<GrammarRule> {
    vec![
        r("LineComment", vec![lit("//"), chars("^\\n", 0, None)]).ignorable(),
        r(
            "BlockComment",
            vec![
                lit("/*"),
                many(vec![forbid(vec![lit("*/")]), class(NamedClass::Any)]),
                lit("*/"),
            ],
        )
        .ignorable(),
    ]
}

fn keywords() -> Vec<GrammarRule> {
    let mut rules: Vec<GrammarRule> = KEYWORDS
        .iter()
        .map(|w| {
            r(&format!("'{w}'"), vec![lit(w), forbid(vec![class(NamedClass::IdentPart)])])
                .contiguous()
                .store_as(*w)
        })
        .collect();
    rules.push(r("Keyword", vec![select(KEYWORDS.iter().map(|w| kw(w)).collect())]).contiguous());
    rules.push(
        r(
            "Identifier",
            vec![
                forbid(vec![rule("Keyword")]),
                class(NamedClass::IdentStart),
                chars(":ident_part:", 0, None),
            ],
        )
        .contiguous(),
    );
    rules.push(r(
        "QualifiedName",
        vec![rule("Identifier"), many(vec![lit("."), rule("Identifier")])],
    ));
    rules
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

fn statements() -> Vec<GrammarRule> {
    vec![
        r(
            "Statement",
            vec![select(
                [
                    "Block",
                    "If",
                    "For",
                    "ForEach",
                    "While",
                    "DoWhile",
                    "Try",
                    "Return",
                    "Throw",
                    "Break",
                    "Continue",
                    "Import",
                    "FunctionDecl",
                    "LocalVarDecl",
                    "ExprStatement",
                    "EmptyStatement",
                ]
                .iter()
                .map(|s| rule(s))
                .collect(),
            )],
        ),
        // A nested statement may carry its own `;`.
        r("Body", vec![rule("Statement"), opt(vec![lit(";")])]),
        r("Block", vec![lit("{"), many(vec![rule("Body")]), lit("}")]).implementation("Block"),
        r("EmptyStatement", vec![lit(";")]).implementation("Empty"),
        r(
            "If",
            vec![
                kw("if"),
                lit("("),
                rule("Expression"),
                lit(")"),
                rule("Body"),
                opt(vec![kw("else"), rule("Body")]),
            ],
        )
        .implementation("If"),
        r(
            "While",
            vec![kw("while"), lit("("), rule("Expression"), lit(")"), rule("Body")],
        )
        .implementation("While"),
        r(
            "DoWhile",
            vec![
                kw("do"),
                rule("Body"),
                kw("while"),
                lit("("),
                rule("Expression"),
                lit(")"),
            ],
        )
        .implementation("DoWhile"),
        r(
            "For",
            vec![
                kw("for"),
                lit("("),
                opt(vec![rule("ForInit")]),
                lit(";"),
                opt(vec![rule("ForCondition")]),
                lit(";"),
                opt(vec![rule("ForUpdate")]),
                lit(")"),
                rule("Body"),
            ],
        )
        .implementation("For"),
        r("ForInit", vec![select(vec![rule("LocalVarDecl"), rule("ExpressionList")])])
            .store_as("init"),
        r("ForCondition", vec![rule("Expression")]).store_as("cond"),
        r("ForUpdate", vec![rule("ExpressionList")]).store_as("update"),
        r("ExpressionList", comma_list("Expression")),
        r(
            "ForEach",
            vec![
                kw("for"),
                lit("("),
                opt(vec![kw("final")]),
                rule("Type"),
                rule("Identifier"),
                lit(":"),
                rule("Expression"),
                lit(")"),
                rule("Body"),
            ],
        )
        .implementation("ForEach"),
        r(
            "Try",
            vec![
                kw("try"),
                rule("Block"),
                many(vec![rule("Catch")]),
                opt(vec![rule("Finally")]),
            ],
        )
        .implementation("Try"),
        r(
            "Catch",
            vec![
                kw("catch"),
                lit("("),
                opt(vec![kw("final")]),
                rule("Type"),
                many(vec![lit("|"), rule("Type")]),
                rule("Identifier"),
                lit(")"),
                rule("Block"),
            ],
        )
        .implementation("Catch"),
        r("Finally", vec![kw("finally"), rule("Block")]).store_as("finally"),
        r("Return", vec![kw("return"), opt(vec![rule("Expression")])]).implementation("Return"),
        r("Throw", vec![kw("throw"), rule("Expression")]).implementation("Throw"),
        r("Break", vec![kw("break")]).implementation("Break"),
        r("Continue", vec![kw("continue")]).implementation("Continue"),
        r(
            "Import",
            vec![
                kw("import"),
                opt(vec![kw("static")]),
                rule("QualifiedName"),
                opt(vec![lit("."), lit("*")]),
            ],
        )
        .implementation("Import"),
        r(
            "FunctionDecl",
            vec![
                rule("Type"),
                rule("Identifier"),
                lit("("),
                opt(comma_list("Param")),
                lit(")"),
                rule("Block"),
            ],
        )
        .implementation("FunctionDecl"),
        r(
            "Param",
            vec![
                opt(vec![kw("final")]),
                rule("Type"),
                opt(vec![lit("...")]),
                rule("Identifier"),
            ],
        )
        .implementation("Param"),
        r(
            "LocalVarDecl",
            vec![
                opt(vec![kw("final")]),
                rule("Type"),
                rule("Declarator"),
                many(vec![lit(","), rule("Declarator")]),
            ],
        )
        .implementation("VarDecl"),
        r(
            "Declarator",
            vec![
                rule("Identifier"),
                many(vec![rule("Dim")]),
                opt(vec![op("=", &["="]), rule("VarInit")]),
            ],
        )
        .implementation("Declarator"),
        r("VarInit", vec![select(vec![rule("ArrayInit"), rule("Expression")])]),
        r(
            "ArrayInit",
            vec![
                lit("{"),
                opt(comma_list("VarInit")),
                opt(vec![lit(",")]),
                lit("}"),
            ],
        )
        .implementation("ArrayInit"),
        r("ExprStatement", vec![rule("Expression")]).implementation("ExprStmt"),
    ]
}

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

fn types() -> Vec<GrammarRule> {
    vec![
        r(
            "PrimitiveType",
            vec![select(PRIMITIVES.iter().map(|p| kw(p)).collect())],
        )
        .store_as("primitive"),
        r("ClassType", vec![rule("QualifiedName"), opt(vec![rule("TypeArgs")])]).store_as("class"),
        r("Dim", vec![lit("["), lit("]")]).store_as("dim"),
        r(
            "Type",
            vec![
                select(vec![rule("PrimitiveType"), rule("ClassType")]),
                many(vec![rule("Dim")]),
            ],
        )
        .implementation("TypeRef"),
        // `<>` is allowed so that `new ArrayList<>()` parses.
        r("TypeArgs", vec![lit("<"), opt(comma_list("TypeArg")), lit(">")]),
        r("TypeArg", vec![select(vec![rule("Wildcard"), rule("Type")])]),
        r(
            "Wildcard",
            vec![
                lit("?"),
                opt(vec![select(vec![kw("extends"), kw("super")]), rule("Type")]),
            ],
        )
        .implementation("Wildcard"),
        r("ElementType", vec![select(vec![rule("PrimitiveType"), rule("ClassType")])])
            .implementation("TypeRef"),
        r("CreatedType", vec![rule("ClassType")]).implementation("TypeRef"),
        r("CastPrimitiveType", vec![rule("PrimitiveType"), many(vec![rule("Dim")])])
            .implementation("TypeRef"),
    ]
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

fn expressions() -> Vec<GrammarRule> {
    vec![
        r("Expression", vec![select(vec![rule("Assignment"), rule("Conditional")])]),
        r(
            "Assignment",
            vec![rule("Postfix"), rule("AssignOp"), rule("Expression")],
        )
        .implementation("Assign"),
        operator(
            "AssignOp",
            vec![
                op("=", &["="]),
                lit("+="),
                lit("-="),
                lit("*="),
                lit("/="),
                lit("%="),
                lit("&="),
                lit("|="),
                lit("^="),
                lit("<<="),
                lit(">>="),
                lit(">>>="),
            ],
        ),
        r("Conditional", vec![select(vec![rule("Ternary"), rule("OrExpr")])]),
        r(
            "Ternary",
            vec![
                rule("OrExpr"),
                lit("?"),
                rule("Expression"),
                lit(":"),
                rule("Conditional"),
            ],
        )
        .implementation("Conditional"),
        chain("OrExpr", "AndExpr", "OrOp"),
        operator("OrOp", vec![lit("||")]),
        chain("AndExpr", "BitOrExpr", "AndOp"),
        operator("AndOp", vec![lit("&&")]),
        chain("BitOrExpr", "BitXorExpr", "BitOrOp"),
        operator("BitOrOp", vec![op("|", &["|", "="])]),
        chain("BitXorExpr", "BitAndExpr", "BitXorOp"),
        operator("BitXorOp", vec![op("^", &["="])]),
        chain("BitAndExpr", "EqualityExpr", "BitAndOp"),
        operator("BitAndOp", vec![op("&", &["&", "="])]),
        chain("EqualityExpr", "RelationalExpr", "EqualityOp"),
        operator("EqualityOp", vec![lit("=="), lit("!=")]),
        r(
            "RelationalExpr",
            vec![
                rule("ShiftExpr"),
                many(vec![select(vec![
                    group(vec![rule("RelationalOp"), rule("ShiftExpr")]),
                    group(vec![kw("instanceof"), rule("Type")]),
                ])]),
            ],
        )
        .implementation("BinaryChain"),
        operator(
            "RelationalOp",
            vec![lit("<="), lit(">="), op("<", &["<", "="]), op(">", &[">", "="])],
        ),
        chain("ShiftExpr", "AdditiveExpr", "ShiftOp"),
        operator(
            "ShiftOp",
            vec![op("<<", &["="]), op(">>>", &["="]), op(">>", &[">", "="])],
        ),
        chain("AdditiveExpr", "MultiplicativeExpr", "AdditiveOp"),
        operator("AdditiveOp", vec![op("+", &["+", "="]), op("-", &["-", "="])]),
        chain("MultiplicativeExpr", "Unary", "MultiplicativeOp"),
        operator(
            "MultiplicativeOp",
            vec![op("*", &["="]), op("/", &["="]), op("%", &["="])],
        ),
        r(
            "Unary",
            vec![select(vec![
                rule("PreStep"),
                rule("Prefix"),
                rule("PrimitiveCast"),
                rule("ReferenceCast"),
                rule("Postfix"),
            ])],
        ),
        r("PreStep", vec![rule("StepOp"), rule("Unary")]).implementation("PreStep"),
        operator("StepOp", vec![lit("++"), lit("--")]),
        r("Prefix", vec![rule("PrefixOp"), rule("Unary")]).implementation("Prefix"),
        operator(
            "PrefixOp",
            vec![op("+", &["+"]), op("-", &["-"]), op("!", &["="]), lit("~")],
        ),
        r(
            "PrimitiveCast",
            vec![lit("("), rule("CastPrimitiveType"), lit(")"), rule("Unary")],
        )
        .implementation("Cast"),
        // `(a) - b` is a subtraction, not a cast of `-b`.
        r(
            "ReferenceCast",
            vec![
                lit("("),
                rule("Type"),
                lit(")"),
                forbid(vec![select(vec![lit("+"), lit("-")])]),
                rule("Unary"),
            ],
        )
        .implementation("Cast"),
        r(
            "Postfix",
            vec![
                rule("Primary"),
                many(vec![select(vec![
                    rule("MemberSuffix"),
                    rule("IndexSuffix"),
                    rule("StepSuffix"),
                ])]),
            ],
        )
        .implementation("Postfix"),
        r(
            "MemberSuffix",
            vec![lit("."), rule("Identifier"), opt(vec![rule("Arguments")])],
        )
        .store_as("member"),
        r("IndexSuffix", vec![lit("["), rule("Expression"), lit("]")]).store_as("index"),
        r("StepSuffix", vec![rule("StepOp")]).store_as("step"),
        r("Arguments", vec![lit("("), opt(comma_list("Expression")), lit(")")]).store_as("args"),
        r(
            "Primary",
            vec![select(
                [
                    "FloatLiteral",
                    "IntegerLiteral",
                    "CharLiteral",
                    "StringLiteral",
                    "BooleanLiteral",
                    "NullLiteral",
                    "Parens",
                    "NewArraySized",
                    "NewArrayInit",
                    "New",
                    "UnqualifiedCall",
                    "ClassLit",
                    "Name",
                ]
                .iter()
                .map(|s| rule(s))
                .collect(),
            )],
        ),
        r("Parens", vec![lit("("), rule("Expression"), lit(")")]),
        r("New", vec![kw("new"), rule("CreatedType"), rule("Arguments")]).implementation("New"),
        r(
            "NewArraySized",
            vec![
                kw("new"),
                rule("ElementType"),
                many1(vec![rule("DimExpr")]),
                many(vec![rule("Dim")]),
            ],
        )
        .implementation("NewArray"),
        r(
            "NewArrayInit",
            vec![
                kw("new"),
                rule("ElementType"),
                many1(vec![rule("Dim")]),
                rule("ArrayInit"),
            ],
        )
        .implementation("NewArray"),
        r("DimExpr", vec![lit("["), rule("Expression"), lit("]")]).store_as("dimexpr"),
        r("UnqualifiedCall", vec![rule("Identifier"), rule("Arguments")]).implementation("Call"),
        r("ClassLit", vec![rule("Type"), lit("."), kw("class")]).implementation("ClassLiteral"),
        r("Name", vec![rule("Identifier")]).implementation("Name"),
    ]
}

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

fn literals() -> Vec<GrammarRule> {
    let digits = || chars("0-9", 1, None);
    let exponent = || {
        group(vec![
            chars("eE", 1, Some(1)),
            opt(vec![chars("+\\-", 1, Some(1))]),
            digits(),
        ])
    };
    let float_suffix = || chars("fFdD", 1, Some(1));
    let not_ident = || forbid(vec![class(NamedClass::IdentPart)]);

    vec![
        r(
            "IntegerLiteral",
            vec![
                select(vec![
                    group(vec![
                        select(vec![lit("0x"), lit("0X")]),
                        chars("0-9a-fA-F_", 1, None),
                    ]),
                    group(vec![select(vec![lit("0b"), lit("0B")]), chars("01_", 1, None)]),
                    group(vec![chars("0-9", 1, Some(1)), chars("0-9_", 0, None)]),
                ]),
                opt(vec![chars("lL", 1, Some(1))]),
                not_ident(),
            ],
        )
        .contiguous()
        .implementation("IntegerLiteral"),
        r(
            "FloatLiteral",
            vec![
                select(vec![
                    group(vec![
                        digits(),
                        lit("."),
                        opt(vec![digits()]),
                        opt(vec![exponent()]),
                        opt(vec![float_suffix()]),
                    ]),
                    group(vec![
                        lit("."),
                        digits(),
                        opt(vec![exponent()]),
                        opt(vec![float_suffix()]),
                    ]),
                    group(vec![digits(), exponent(), opt(vec![float_suffix()])]),
                    group(vec![digits(), float_suffix()]),
                ]),
                not_ident(),
            ],
        )
        .contiguous()
        .implementation("FloatLiteral"),
        r(
            "CharLiteral",
            vec![
                lit("'"),
                many1(vec![select(vec![
                    group(vec![lit("\\"), class(NamedClass::Any)]),
                    chars("^'\\\\\\n", 1, Some(1)),
                ])]),
                lit("'"),
            ],
        )
        .contiguous()
        .implementation("CharLiteral"),
        r(
            "StringLiteral",
            vec![
                lit("\""),
                many(vec![select(vec![
                    group(vec![lit("\\"), class(NamedClass::Any)]),
                    chars("^\"\\\\\\n", 1, None),
                ])]),
                lit("\""),
            ],
        )
        .contiguous()
        .implementation("StringLiteral"),
        r("BooleanLiteral", vec![select(vec![kw("true"), kw("false")])])
            .implementation("BooleanLiteral"),
        r("NullLiteral", vec![kw("null")]).implementation("NullLiteral"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_builds() {
        let g = grammar().unwrap();
        assert_eq!(g.rule(g.root()).name, "Statement");
        assert_eq!(g.ignorables().len(), 2);
    }

    #[test]
    fn test_every_keyword_has_a_rule() {
        let g = grammar().unwrap();
        for w in KEYWORDS {
            let id = g.lookup(&format!("'{w}'")).unwrap();
            assert_eq!(g.rule(id).store_as.as_deref(), Some(*w));
        }
    }
}
