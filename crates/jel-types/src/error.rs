use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Incomplete,
    Type,
    Scope,
    Member,
    Execution,
    Configuration,
}

/// Numeric error code (E100–E699).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E149) ──
    pub const UNEXPECTED_INPUT: Self = Self(100);
    pub const EXPECTED_TERMINATOR: Self = Self(101);
    pub const FORBIDDEN_INPUT: Self = Self(102);
    pub const MALFORMED_LITERAL: Self = Self(103);

    // ── Incomplete input (E150–E199) ──
    pub const MORE_INPUT_NEEDED: Self = Self(150);

    // ── Type errors (E200–E299) ──
    pub const TYPE_MISMATCH: Self = Self(200);
    pub const NOT_BOOLEAN: Self = Self(201);
    pub const NOT_NUMERIC: Self = Self(202);
    pub const BAD_OPERANDS: Self = Self(203);
    pub const INVALID_CAST: Self = Self(204);
    pub const NO_COMMON_TYPE: Self = Self(205);
    pub const UNKNOWN_TYPE: Self = Self(206);
    pub const NOT_AN_ARRAY: Self = Self(207);
    pub const NOT_ITERABLE: Self = Self(208);
    pub const VOID_VALUE: Self = Self(209);

    // ── Scope errors (E300–E399) ──
    pub const UNDECLARED: Self = Self(300);
    pub const ALREADY_DECLARED: Self = Self(301);
    pub const FINAL_REASSIGNED: Self = Self(302);
    pub const NOT_INITIALIZED: Self = Self(303);
    pub const NOT_ASSIGNABLE: Self = Self(304);
    pub const MISPLACED_JUMP: Self = Self(305);
    pub const NOT_DROPPABLE: Self = Self(306);

    // ── Member errors (E400–E499) ──
    pub const NO_SUCH_FIELD: Self = Self(400);
    pub const NO_SUCH_METHOD: Self = Self(401);
    pub const NO_APPLICABLE_OVERLOAD: Self = Self(402);
    pub const INACCESSIBLE: Self = Self(403);
    pub const STATIC_CONTEXT: Self = Self(404);
    pub const NO_SUCH_CONSTRUCTOR: Self = Self(405);

    // ── Execution errors (E500–E599) ──
    pub const HOST_EXCEPTION: Self = Self(500);
    pub const ARITHMETIC: Self = Self(501);
    pub const INDEX_OUT_OF_BOUNDS: Self = Self(502);
    pub const NULL_DEREFERENCE: Self = Self(503);
    pub const CLASS_CAST: Self = Self(504);
    pub const CANCELLED: Self = Self(505);
    pub const LOOP_LIMIT: Self = Self(506);

    // ── Configuration errors (E600–E699) ──
    pub const DUPLICATE_RULE: Self = Self(600);
    pub const UNRESOLVED_RULE: Self = Self(601);
    pub const UNKNOWN_IMPLEMENTATION: Self = Self(602);
    pub const MALFORMED_GRAMMAR: Self = Self(603);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=149 => ErrorCategory::Syntax,
            150..=199 => ErrorCategory::Incomplete,
            200..=299 => ErrorCategory::Type,
            300..=399 => ErrorCategory::Scope,
            400..=499 => ErrorCategory::Member,
            500..=599 => ErrorCategory::Execution,
            600..=699 => ErrorCategory::Configuration,
            _ => ErrorCategory::Syntax, // fallback
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured JEL diagnostic.
///
/// Every error channel (syntax, incomplete input, semantic, execution,
/// configuration) carries one of these. Hosts render them with
/// [`Diagnostic::render`] or serialize them as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error code (e.g., E200).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Source location.
    #[serde(flatten)]
    pub span: Span,
    /// The exact source line for context.
    pub source_line: String,
    /// Optional fix suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic.
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    /// Create a diagnostic with no source context (host-side failures).
    pub fn detached(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, Span::point(1, 1), "")
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Render the diagnostic with its source line and a caret marker.
    ///
    /// ```text
    /// 1:5: E302 [scope] cannot assign a value to final variable 'y'
    ///   y = 2;
    ///   ^
    /// ```
    pub fn render(&self) -> String {
        let mut out = format!("{self}");
        if self.source_line.is_empty() {
            return out;
        }
        let indent: String = self
            .source_line
            .chars()
            .take(self.span.start_col.saturating_sub(1) as usize)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        let width = if self.span.start_line == self.span.end_line {
            self.span.end_col.saturating_sub(self.span.start_col).max(1) as usize
        } else {
            1
        };
        out.push('\n');
        out.push_str(&self.source_line);
        out.push('\n');
        out.push_str(&indent);
        out.push_str(&"^".repeat(width));
        if let Some(suggestion) = &self.suggestion {
            out.push_str("\nhelp: ");
            out.push_str(suggestion);
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::Type => write!(f, "type"),
            Self::Scope => write!(f, "scope"),
            Self::Member => write!(f, "member"),
            Self::Execution => write!(f, "execution"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
