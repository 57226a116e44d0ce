use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// Line/column values are 1-based for human-readable error messages.
/// `offset` and `len` are byte positions into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "line")]
    pub start_line: u32,
    #[serde(rename = "column")]
    pub start_col: u32,
    pub end_line: u32,
    #[serde(rename = "end_column")]
    pub end_col: u32,
    pub offset: usize,
    pub len: usize,
}

impl Span {
    /// Create a new span without byte offsets.
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
            offset: 0,
            len: 0,
        }
    }

    /// Create a zero-width span at a single position.
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// Attach byte offsets to this span.
    pub fn with_offsets(mut self, offset: usize, len: usize) -> Self {
        self.offset = offset;
        self.len = len;
        self
    }

    /// Byte offset one past the end of the span.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Holds the source text for error reporting.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Cached line start byte offsets for fast line lookup.
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// The text of a 1-based line, without its line break.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = (line_number as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)?;
        let end = match self.line_starts.get(idx + 1) {
            Some(&next) => next - 1,
            None => self.source.len(),
        };
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    /// 1-based line and column of a byte offset.
    ///
    /// Offsets past the end clamp to the end of the text.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[idx];
        let col = self.source[start..offset].chars().count() + 1;
        (idx as u32 + 1, col as u32)
    }

    /// Build a span covering `len` bytes starting at `offset`.
    pub fn span(&self, offset: usize, len: usize) -> Span {
        let (start_line, start_col) = self.position(offset);
        let (end_line, end_col) = self.position(offset + len);
        Span::new(start_line, start_col, end_line, end_col).with_offsets(offset, len)
    }

    /// The text covered by a span's byte offsets.
    pub fn slice(&self, span: Span) -> &str {
        let start = span.offset.min(self.source.len());
        let end = span.end().min(self.source.len());
        &self.source[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_point() {
        let s = Span::point(1, 5);
        assert_eq!(s.start_line, 1);
        assert_eq!(s.start_col, 5);
        assert_eq!(s.end_line, 1);
        assert_eq!(s.end_col, 5);
    }

    #[test]
    fn test_span_display() {
        let s = Span::new(3, 7, 3, 15);
        assert_eq!(format!("{s}"), "3:7");
    }

    #[test]
    fn test_source_file_line_extraction() {
        let src = SourceFile::new("repl", "int x = 1;\nx++;\nx");
        assert_eq!(src.line(1), Some("int x = 1;"));
        assert_eq!(src.line(2), Some("x++;"));
        assert_eq!(src.line(3), Some("x"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
    }

    #[test]
    fn test_source_file_crlf() {
        let src = SourceFile::new("repl", "a = 1;\r\nb = 2;\r\n");
        assert_eq!(src.line(1), Some("a = 1;"));
        assert_eq!(src.line(2), Some("b = 2;"));
    }

    #[test]
    fn test_source_file_empty() {
        let src = SourceFile::new("repl", "");
        assert_eq!(src.line(1), Some(""));
        assert_eq!(src.line(2), None);
    }

    #[test]
    fn test_position_and_span() {
        let src = SourceFile::new("repl", "int x;\n  x = 5;");
        assert_eq!(src.position(0), (1, 1));
        assert_eq!(src.position(4), (1, 5));
        assert_eq!(src.position(9), (2, 3));
        assert_eq!(src.position(1_000), (2, 9));
        let span = src.span(9, 5);
        assert_eq!(span.start_line, 2);
        assert_eq!(span.start_col, 3);
        assert_eq!(src.slice(span), "x = 5");
    }

    #[test]
    fn test_span_determinism_100_iterations() {
        let src = SourceFile::new("repl", "for (int i = 0; i < 3; i++)\n  x += i;");
        let first = src.span(30, 6);
        for i in 0..100 {
            assert_eq!(first, src.span(30, 6), "Determinism failure at iteration {i}");
        }
    }
}
