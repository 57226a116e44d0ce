//! Arena AST for JEL.
//!
//! Nodes live in a single [`Ast`] arena and refer to each other by
//! [`NodeId`]. Parent links are plain indices, so the tree never holds
//! cyclic pointers. Every node carries the [`Span`] of the match it was
//! built from.
//!
//! Child layout per [`NodeKind`] is documented on each variant; the
//! evaluator relies on it.

use crate::{Diagnostic, ErrorCode, SourceFile, Span};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Node handles
// ══════════════════════════════════════════════════════════════════════════════

/// Index of a node inside its [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single AST node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Non-owning back-reference to the enclosing node.
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Node kinds
// ══════════════════════════════════════════════════════════════════════════════

/// A literal value as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// UTF-16 code unit, like a Java `char`.
    Char(u16),
    Str(String),
    Bool(bool),
    Null,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
}

impl BinaryOp {
    /// Parse an operator symbol.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            ">>>" => Self::UShr,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "&" => Self::BitAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "&&" => Self::And,
            "||" => Self::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Prefix operators other than `++`/`--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Plus,
            "-" => Self::Neg,
            "!" => Self::Not,
            "~" => Self::BitNot,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

/// `++` or `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOp {
    Increment,
    Decrement,
}

/// `=` or a compound assignment such as `+=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

impl AssignOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        if symbol == "=" {
            return Some(Self::Assign);
        }
        let op = symbol.strip_suffix('=')?;
        match BinaryOp::from_symbol(op)? {
            BinaryOp::And | BinaryOp::Or => None,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => None,
            BinaryOp::Eq | BinaryOp::Ne => None,
            op => Some(Self::Compound(op)),
        }
    }
}

/// Bound of a wildcard type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WildcardBound {
    Unbounded,
    Extends,
    Super,
}

/// The tagged kind of an AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ── Expressions ──
    /// No children.
    Literal(Literal),
    /// Simple identifier. No children.
    Name(String),
    /// `target.name`. Children: `[target]`.
    Field(String),
    /// `name(args)` or `target.name(args)`.
    /// Children: `[target?, args...]`; `qualified` says whether a target is present.
    Call { name: String, qualified: bool },
    /// `array[index]`. Children: `[array, index]`.
    Index,
    /// `new T(args)`. Children: `[TypeRef, args...]`.
    New,
    /// `new T[d1][d2][]...` or `new T[]{...}`.
    /// Children: `[TypeRef, dim exprs..., ArrayInit?]`; `dims` counts every bracket pair.
    NewArray { dims: usize },
    /// `{a, b, c}`. Children: elements.
    ArrayInit,
    /// `T.class`. Children: `[TypeRef]`.
    ClassLiteral,
    /// Children: `[left, right]`.
    Binary(BinaryOp),
    /// Children: `[operand]`.
    Unary(UnaryOp),
    /// `++x`, `x--`. Children: `[target]`.
    Step { op: StepOp, prefix: bool },
    /// Children: `[target, value]`.
    Assign(AssignOp),
    /// `c ? a : b`. Children: `[c, a, b]`.
    Conditional,
    /// `(T) expr`. Children: `[TypeRef, expr]`.
    Cast,
    /// `expr instanceof T`. Children: `[expr, TypeRef]`.
    InstanceOf,

    // ── Types ──
    /// Possibly qualified type name with array dimensions.
    /// Children: type arguments (`TypeRef` or `Wildcard`).
    TypeRef { name: String, dims: usize },
    /// `?`, `? extends T`, `? super T`. Children: `[TypeRef?]`.
    Wildcard(WildcardBound),

    // ── Statements ──
    /// `[final] T a = 1, b[] = {..}`. Children: `[TypeRef, Declarator...]`.
    VarDecl { is_final: bool },
    /// One declared name. Children: `[initializer?]`.
    Declarator { name: String, dims: usize },
    /// Children: statements.
    Block,
    /// Children: `[cond, then, else?]`.
    If,
    /// Children: `[init..., cond?, update..., body]`.
    For {
        init: usize,
        has_cond: bool,
        update: usize,
    },
    /// `for (T x : iterable) body`. Children: `[TypeRef, iterable, body]`.
    ForEach { name: String, is_final: bool },
    /// Children: `[cond, body]`.
    While,
    /// Children: `[body, cond]`.
    DoWhile,
    Break,
    Continue,
    /// Children: `[value?]`.
    Return,
    /// Children: `[value]`.
    Throw,
    /// Children: `[block, Catch..., finally?]`.
    Try { has_finally: bool },
    /// `catch (A | B e) block`. Children: `[TypeRef..., block]`.
    Catch { name: String },
    /// No children.
    Import {
        is_static: bool,
        wildcard: bool,
        path: String,
    },
    /// `R name(params) block`. Children: `[TypeRef, Param..., block]`.
    FunctionDecl { name: String, varargs: bool },
    /// Children: `[TypeRef]`.
    Param { name: String, is_final: bool },
    /// Children: `[expr]`.
    ExprStmt,
    /// A lone `;`.
    Empty,
}

impl NodeKind {
    /// Short name used in diagnostics and debug output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::Name(_) => "name",
            Self::Field(_) => "field access",
            Self::Call { .. } => "method call",
            Self::Index => "array access",
            Self::New => "constructor call",
            Self::NewArray { .. } => "array creation",
            Self::ArrayInit => "array initializer",
            Self::ClassLiteral => "class literal",
            Self::Binary(_) => "binary expression",
            Self::Unary(_) => "unary expression",
            Self::Step { .. } => "increment/decrement",
            Self::Assign(_) => "assignment",
            Self::Conditional => "conditional expression",
            Self::Cast => "cast",
            Self::InstanceOf => "instanceof",
            Self::TypeRef { .. } => "type",
            Self::Wildcard(_) => "wildcard",
            Self::VarDecl { .. } => "variable declaration",
            Self::Declarator { .. } => "declarator",
            Self::Block => "block",
            Self::If => "if statement",
            Self::For { .. } => "for statement",
            Self::ForEach { .. } => "for-each statement",
            Self::While => "while statement",
            Self::DoWhile => "do statement",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::Throw => "throw",
            Self::Try { .. } => "try statement",
            Self::Catch { .. } => "catch clause",
            Self::Import { .. } => "import",
            Self::FunctionDecl { .. } => "function declaration",
            Self::Param { .. } => "parameter",
            Self::ExprStmt => "expression statement",
            Self::Empty => "empty statement",
        }
    }

    /// Whether this node is a statement rather than an expression or type.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Self::VarDecl { .. }
                | Self::Block
                | Self::If
                | Self::For { .. }
                | Self::ForEach { .. }
                | Self::While
                | Self::DoWhile
                | Self::Break
                | Self::Continue
                | Self::Return
                | Self::Throw
                | Self::Try { .. }
                | Self::Import { .. }
                | Self::FunctionDecl { .. }
                | Self::ExprStmt
                | Self::Empty
        )
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Arena
// ══════════════════════════════════════════════════════════════════════════════

/// Owning arena of nodes built from one parse call.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    source: SourceFile,
}

impl Ast {
    /// Create an empty arena over the given source text.
    pub fn new(source: SourceFile) -> Self {
        Self {
            nodes: Vec::new(),
            source,
        }
    }

    /// Allocate a node and link it under `parent` (if any).
    pub fn alloc(&mut self, kind: NodeKind, span: Span, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            span,
        });
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        id
    }

    /// Move `child` under `parent`, detaching it from its previous parent.
    pub fn reparent(&mut self, child: NodeId, parent: NodeId) {
        if let Some(old) = self.nodes[child.index()].parent {
            self.nodes[old.index()].children.retain(|c| *c != child);
        }
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Replace a node's kind (used by factories that refine a node after
    /// its children are known).
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// The `i`-th child, if present.
    pub fn child(&self, id: NodeId, i: usize) -> Option<NodeId> {
        self.nodes[id.index()].children.get(i).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    /// Source text covered by a node.
    pub fn text(&self, id: NodeId) -> &str {
        self.source.slice(self.span(id))
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Build a diagnostic located at a node.
    pub fn diagnostic(
        &self,
        id: NodeId,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Diagnostic {
        let span = self.span(id);
        let line = self.source.line(span.start_line).unwrap_or("");
        Diagnostic::new(code, message, span, line)
    }

    /// Render a node and its subtree as an indented outline (debugging and tests).
    pub fn outline(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.outline_into(id, 0, &mut out);
        out
    }

    fn outline_into(&self, id: NodeId, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&format!("{:?}\n", self.kind(id)));
        for child in self.children(id) {
            self.outline_into(*child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_links_parent_and_children() {
        let mut ast = Ast::new(SourceFile::new("repl", "a + b"));
        let src = ast.source().clone();
        let bin = ast.alloc(NodeKind::Binary(BinaryOp::Add), src.span(0, 5), None);
        let a = ast.alloc(NodeKind::Name("a".into()), src.span(0, 1), Some(bin));
        let b = ast.alloc(NodeKind::Name("b".into()), src.span(4, 1), Some(bin));
        assert_eq!(ast.children(bin), &[a, b]);
        assert_eq!(ast.parent(a), Some(bin));
        assert_eq!(ast.text(b), "b");
        assert_eq!(ast.text(bin), "a + b");
    }

    #[test]
    fn test_reparent() {
        let mut ast = Ast::new(SourceFile::new("repl", "x"));
        let span = ast.source().span(0, 1);
        let first = ast.alloc(NodeKind::Block, span, None);
        let second = ast.alloc(NodeKind::Block, span, None);
        let leaf = ast.alloc(NodeKind::Name("x".into()), span, Some(first));
        ast.reparent(leaf, second);
        assert!(ast.children(first).is_empty());
        assert_eq!(ast.children(second), &[leaf]);
        assert_eq!(ast.parent(leaf), Some(second));
    }

    #[test]
    fn test_assign_op_symbols() {
        assert_eq!(AssignOp::from_symbol("="), Some(AssignOp::Assign));
        assert_eq!(
            AssignOp::from_symbol("+="),
            Some(AssignOp::Compound(BinaryOp::Add))
        );
        assert_eq!(
            AssignOp::from_symbol(">>>="),
            Some(AssignOp::Compound(BinaryOp::UShr))
        );
        assert_eq!(AssignOp::from_symbol("=="), None);
        assert_eq!(AssignOp::from_symbol("<="), None);
    }

    #[test]
    fn test_diagnostic_at_node() {
        let mut ast = Ast::new(SourceFile::new("repl", "int x;\ny = 2;"));
        let span = ast.source().span(7, 1);
        let id = ast.alloc(NodeKind::Name("y".into()), span, None);
        let d = ast.diagnostic(id, ErrorCode::UNDECLARED, "cannot find symbol 'y'");
        assert_eq!(d.span.start_line, 2);
        assert_eq!(d.source_line, "y = 2;");
    }
}
