//! Statement and declaration factories.

use jel_grammar::ParseMatch;
use jel_types::ast::{NodeId, NodeKind};
use jel_types::{Diagnostic, ErrorCode};

use crate::builder::{AstBuilder, Registry};

pub(crate) fn register(registry: &mut Registry) {
    registry.register("Block", block);
    registry.register("If", if_stmt);
    registry.register("For", for_stmt);
    registry.register("ForEach", for_each);
    registry.register("While", while_stmt);
    registry.register("DoWhile", do_while);
    registry.register("Try", try_stmt);
    registry.register("Catch", catch);
    registry.register("Return", return_stmt);
    registry.register("Throw", throw);
    registry.register("Break", break_stmt);
    registry.register("Continue", continue_stmt);
    registry.register("Import", import);
    registry.register("FunctionDecl", function_decl);
    registry.register("Param", param);
    registry.register("VarDecl", var_decl);
    registry.register("Declarator", declarator);
    registry.register("ArrayInit", array_init);
    registry.register("ExprStmt", expr_stmt);
    registry.register("Empty", empty);
}

type Built = Result<NodeId, Diagnostic>;

/// Build `m` with every rule child (keywords excluded) as a child node.
fn simple(b: &mut AstBuilder<'_>, kind: NodeKind, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let parts = b.rules(m);
    let node = b.node(kind, m, parent);
    b.build_all(node, &parts)?;
    Ok(node)
}

fn identifier(b: &AstBuilder<'_>, m: &ParseMatch) -> Result<String, Diagnostic> {
    Ok(b.text(b.require(m, "Identifier")?).to_string())
}

// ══════════════════════════════════════════════════════════════════════════════
// Control flow
// ══════════════════════════════════════════════════════════════════════════════

fn block(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::Block, parent, m)
}

fn if_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::If, parent, m)
}

fn while_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::While, parent, m)
}

fn do_while(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::DoWhile, parent, m)
}

/// Wrap each expression of an `ExpressionList` in an `ExprStmt`.
fn expression_list(
    b: &mut AstBuilder<'_>,
    node: NodeId,
    list: &ParseMatch,
) -> Result<usize, Diagnostic> {
    let items = b.rules(list);
    for item in &items {
        let stmt = b.node(NodeKind::ExprStmt, item, Some(node));
        b.build(Some(stmt), item)?;
    }
    Ok(items.len())
}

fn for_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let node = b.node(
        NodeKind::For {
            init: 0,
            has_cond: false,
            update: 0,
        },
        m,
        parent,
    );

    let mut init = 0;
    if let Some(init_match) = m.find_tag("init") {
        let part = b
            .rules(init_match)
            .into_iter()
            .next()
            .ok_or_else(|| {
                b.error(init_match, ErrorCode::UNEXPECTED_INPUT, "empty for initializer")
            })?;
        init = if b.rule_name(part) == Some("ExpressionList") {
            expression_list(b, node, part)?
        } else {
            b.build(Some(node), part)?;
            1
        };
    }

    let cond = m.find_tag("cond");
    if let Some(cond) = cond {
        b.build(Some(node), cond)?;
    }

    let mut update = 0;
    if let Some(update_match) = m.find_tag("update") {
        let list = b.require(update_match, "ExpressionList")?;
        update = expression_list(b, node, list)?;
    }

    b.build(Some(node), b.require(m, "Body")?)?;
    b.set_kind(
        node,
        NodeKind::For {
            init,
            has_cond: cond.is_some(),
            update,
        },
    );
    Ok(node)
}

fn for_each(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let name = identifier(b, m)?;
    let is_final = m.find_tag("final").is_some();
    let ty = b.require(m, "Type")?;
    let iterable = b.require(m, "Expression")?;
    let body = b.require(m, "Body")?;
    let node = b.node(NodeKind::ForEach { name, is_final }, m, parent);
    b.build_all(node, &[ty, iterable, body])?;
    Ok(node)
}

fn try_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let finally = m.find_tag("finally");
    let node = b.node(
        NodeKind::Try {
            has_finally: finally.is_some(),
        },
        m,
        parent,
    );
    b.build(Some(node), b.require(m, "Block")?)?;
    let catches = b.children_named(m, "Catch");
    b.build_all(node, &catches)?;
    if let Some(finally) = finally {
        b.build(Some(node), b.require(finally, "Block")?)?;
    }
    Ok(node)
}

fn catch(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let name = identifier(b, m)?;
    let types = b.children_named(m, "Type");
    let body = b.require(m, "Block")?;
    let node = b.node(NodeKind::Catch { name }, m, parent);
    b.build_all(node, &types)?;
    b.build(Some(node), body)?;
    Ok(node)
}

fn break_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    Ok(b.node(NodeKind::Break, m, parent))
}

fn continue_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    Ok(b.node(NodeKind::Continue, m, parent))
}

fn return_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::Return, parent, m)
}

fn throw(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::Throw, parent, m)
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

fn import(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let path = b.compact_text(b.require(m, "QualifiedName")?);
    let is_static = m.find_tag("static").is_some();
    let wildcard = m.has_literal(&b.ast().source().source, "*");
    Ok(b.node(
        NodeKind::Import {
            is_static,
            wildcard,
            path,
        },
        m,
        parent,
    ))
}

fn function_decl(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let name = identifier(b, m)?;
    let ret = b.require(m, "Type")?;
    let params = b.children_named(m, "Param");
    let body = b.require(m, "Block")?;
    let source = &b.ast().source().source;
    let varargs = params.last().is_some_and(|p| p.has_literal(source, "..."));
    if let Some(bad) = params
        .iter()
        .rev()
        .skip(1)
        .find(|p| p.has_literal(source, "..."))
    {
        return Err(b.error(
            bad,
            ErrorCode::UNEXPECTED_INPUT,
            "only the last parameter may be variadic",
        ));
    }

    let node = b.node(NodeKind::FunctionDecl { name, varargs }, m, parent);
    b.build(Some(node), ret)?;
    b.build_all(node, &params)?;
    b.build(Some(node), body)?;
    Ok(node)
}

fn param(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let name = identifier(b, m)?;
    let is_final = m.find_tag("final").is_some();
    let ty = b.require(m, "Type")?;
    let node = b.node(NodeKind::Param { name, is_final }, m, parent);
    b.build(Some(node), ty)?;
    Ok(node)
}

fn var_decl(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let is_final = m.find_tag("final").is_some();
    let ty = b.require(m, "Type")?;
    let declarators = b.children_named(m, "Declarator");
    let node = b.node(NodeKind::VarDecl { is_final }, m, parent);
    b.build(Some(node), ty)?;
    b.build_all(node, &declarators)?;
    Ok(node)
}

fn declarator(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let name = identifier(b, m)?;
    let dims = m.find_tags("dim").len();
    let node = b.node(NodeKind::Declarator { name, dims }, m, parent);
    if let Some(init) = b.child_named(m, "VarInit") {
        b.build(Some(node), init)?;
    }
    Ok(node)
}

fn array_init(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::ArrayInit, parent, m)
}

fn empty(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    Ok(b.node(NodeKind::Empty, m, parent))
}

fn expr_stmt(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    simple(b, NodeKind::ExprStmt, parent, m)
}
