use serde::Serialize;
use std::fmt;

/// A byte offset into a document's text with its 1-based line and column.
///
/// Ordering follows the offset; line and column are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    /// Counted in characters, not bytes.
    pub column: usize,
}

impl Position {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open interval `[start, end)` over a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        debug_assert!(start.offset <= end.offset, "range start after end");
        Self { start, end }
    }

    /// Empty range located at `at`.
    pub fn collapsed(at: Position) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start.offset == self.end.offset
    }

    pub fn len(&self) -> usize {
        self.end.offset - self.start.offset
    }

    pub fn span(&self) -> std::ops::Range<usize> {
        self.start.offset..self.end.offset
    }
}

/// Maps byte offsets to line/column positions.
#[derive(Debug, Clone)]
pub(crate) struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts }
    }

    pub(crate) fn position(&self, text: &str, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = text
            .get(line_start..offset)
            .map_or(offset - line_start, |prefix| prefix.chars().count());
        Position::new(offset, line + 1, column + 1)
    }
}
