//! Line-oriented view of a file.
//!
//! Splitters work on line indices; byte offsets are derived only when chunks
//! are materialized.

use super::Strategy;
use std::ops::Range;

/// Line start offsets and per-line character counts of one text.
///
/// Line `i` spans `starts[i]..starts[i + 1]` and includes its `\n`. A text
/// without a trailing newline still ends its last line at `text.len()`.
/// Empty text has zero lines.
#[derive(Debug)]
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
    chars: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts = Vec::new();
        if !text.is_empty() {
            starts.push(0);
            for (i, b) in text.bytes().enumerate() {
                if b == b'\n' && i + 1 < text.len() {
                    starts.push(i + 1);
                }
            }
        }

        let mut index = Self {
            text,
            starts,
            chars: Vec::new(),
        };
        index.chars = (0..index.len())
            .map(|i| index.raw(i).chars().count())
            .collect();
        index
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Byte range `[start, end)` covered by lines `range`.
    pub fn byte_range(&self, range: Range<usize>) -> Range<usize> {
        let start = self.starts.get(range.start).copied().unwrap_or(self.text.len());
        let end = self.starts.get(range.end).copied().unwrap_or(self.text.len());
        start..end
    }

    /// Text of lines `range`, newlines included.
    pub fn slice(&self, range: Range<usize>) -> &'a str {
        let bytes = self.byte_range(range);
        &self.text[bytes]
    }

    /// Line `i` including its newline.
    fn raw(&self, i: usize) -> &'a str {
        self.slice(i..i + 1)
    }

    /// Line `i` without its line terminator.
    pub fn line(&self, i: usize) -> &'a str {
        self.raw(i).trim_end_matches(|c: char| c == '\n' || c == '\r')
    }

    /// Characters in line `i`, newline included.
    pub fn line_chars(&self, i: usize) -> usize {
        self.chars[i]
    }

    pub fn chars_in(&self, range: Range<usize>) -> usize {
        self.chars[range].iter().sum()
    }

    pub fn is_blank(&self, i: usize) -> bool {
        self.line(i).trim().is_empty()
    }

    pub fn is_blank_range(&self, range: Range<usize>) -> bool {
        range.into_iter().all(|i| self.is_blank(i))
    }

    /// Leading whitespace width of line `i`; tabs count as four columns.
    pub fn indent(&self, i: usize) -> usize {
        self.line(i)
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum()
    }
}

/// Size limits for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_lines: usize,
    pub max_chars: usize,
}

impl Budget {
    pub fn fits(&self, lines: &LineIndex<'_>, range: Range<usize>) -> bool {
        range.len() <= self.max_lines && lines.chars_in(range) <= self.max_chars
    }
}

/// A proposed chunk: a line range plus what produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Line indices, 0-based, `[start, end)`
    pub lines: Range<usize>,
    pub symbol: Option<String>,
    /// Declaration of the enclosing symbol when the span starts past it
    pub signature: Option<String>,
    pub strategy: Strategy,
    pub oversized: bool,
}

impl Span {
    pub fn new(lines: Range<usize>, strategy: Strategy) -> Self {
        Self {
            lines,
            symbol: None,
            signature: None,
            strategy,
            oversized: false,
        }
    }

    pub fn with_symbol(mut self, symbol: Option<String>) -> Self {
        self.symbol = symbol;
        self
    }

    pub fn with_signature(mut self, signature: Option<String>) -> Self {
        self.signature = signature;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_has_no_lines() {
        let index = LineIndex::new("");
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_lines_and_offsets() {
        let text = "ab\ncd\r\n\nlast";
        let index = LineIndex::new(text);
        assert_eq!(index.len(), 4);
        assert_eq!(index.line(1), "cd");
        assert!(index.is_blank(2));
        assert_eq!(index.byte_range(1..3), 3..8);
        assert_eq!(index.slice(3..4), "last");
        assert_eq!(index.slice(0..4), text);
    }

    #[test]
    fn test_trailing_newline_does_not_add_line() {
        let index = LineIndex::new("a\nb\n");
        assert_eq!(index.len(), 2);
        assert_eq!(index.slice(1..2), "b\n");
    }

    #[test]
    fn test_chars_count_unicode() {
        let index = LineIndex::new("héllo\n🎮\n");
        assert_eq!(index.line_chars(0), 6);
        assert_eq!(index.line_chars(1), 2);
        assert_eq!(index.chars_in(0..2), 8);
    }

    #[test]
    fn test_indent_and_budget() {
        let index = LineIndex::new("def f():\n\treturn 1\n    pass\n");
        assert_eq!(index.indent(0), 0);
        assert_eq!(index.indent(1), 4);
        assert_eq!(index.indent(2), 4);

        let budget = Budget {
            max_lines: 2,
            max_chars: 100,
        };
        assert!(budget.fits(&index, 0..2));
        assert!(!budget.fits(&index, 0..3));
    }
}
