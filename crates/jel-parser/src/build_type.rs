//! Type factories: `TypeRef` and `Wildcard`.

use jel_grammar::ParseMatch;
use jel_types::ast::{NodeId, NodeKind, WildcardBound};
use jel_types::{Diagnostic, ErrorCode};

use crate::builder::{AstBuilder, Registry};

pub(crate) fn register(registry: &mut Registry) {
    registry.register("TypeRef", type_ref);
    registry.register("Wildcard", wildcard);
}

/// Any rule whose children include a `primitive` or `class` tagged match,
/// plus zero or more `dim` tagged matches.
fn type_ref(
    b: &mut AstBuilder<'_>,
    parent: Option<NodeId>,
    m: &ParseMatch,
) -> Result<NodeId, Diagnostic> {
    let dims = m.find_tags("dim").len();
    if let Some(primitive) = m.find_tag("primitive") {
        let name = b.text(primitive).to_string();
        return Ok(b.node(NodeKind::TypeRef { name, dims }, m, parent));
    }
    let class = m
        .find_tag("class")
        .ok_or_else(|| b.error(m, ErrorCode::UNKNOWN_TYPE, "malformed type"))?;
    let name = b.compact_text(b.require(class, "QualifiedName")?);
    let node = b.node(NodeKind::TypeRef { name, dims }, m, parent);
    if let Some(args) = b.child_named(class, "TypeArgs") {
        let args = b.rules(args);
        b.build_all(node, &args)?;
    }
    Ok(node)
}

fn wildcard(
    b: &mut AstBuilder<'_>,
    parent: Option<NodeId>,
    m: &ParseMatch,
) -> Result<NodeId, Diagnostic> {
    let bound = if m.find_tag("extends").is_some() {
        WildcardBound::Extends
    } else if m.find_tag("super").is_some() {
        WildcardBound::Super
    } else {
        WildcardBound::Unbounded
    };
    let node = b.node(NodeKind::Wildcard(bound), m, parent);
    if let Some(ty) = b.child_named(m, "Type") {
        b.build(Some(node), ty)?;
    }
    Ok(node)
}
