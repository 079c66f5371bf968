//! Statement-block splitting: blank-line and dedent boundaries, packed
//! greedily up to the budget.

use super::fixed::windows;
use super::SpanSplitter;
use crate::chunk::lines::{Budget, LineIndex, Span};
use crate::chunk::Strategy;
use crate::walker::Language;
use locodata_core::{AppError, AppResult};
use std::ops::Range;

/// Average non-blank line length above which text counts as minified.
const MINIFIED_LINE_CHARS: usize = 300;

/// Keywords that continue the block above them after a dedent.
const CLOSERS: [&str; 10] = [
    "end", "else", "elif", "except", "finally", "catch", "fi", "done", "esac", "rescue",
];

pub struct BlockSplitter;

impl SpanSplitter for BlockSplitter {
    fn strategy(&self) -> Strategy {
        Strategy::Block
    }

    fn split(
        &self,
        lines: &LineIndex<'_>,
        _language: Language,
        budget: &Budget,
    ) -> AppResult<Vec<Span>> {
        split_range(lines, 0..lines.len(), budget, &[])
    }
}

/// Split `range` into blocks and pack them.
///
/// Lines in `preferred` always start a new block. Fails on minified text.
pub fn split_range(
    lines: &LineIndex<'_>,
    range: Range<usize>,
    budget: &Budget,
    preferred: &[usize],
) -> AppResult<Vec<Span>> {
    if is_minified(lines, range.clone()) {
        return Err(AppError::Chunking(
            "content looks minified, no block structure".to_string(),
        ));
    }

    let blocks = find_blocks(lines, range, preferred);
    Ok(pack(lines, blocks, budget))
}

fn is_minified(lines: &LineIndex<'_>, range: Range<usize>) -> bool {
    let (count, chars) = range
        .filter(|&i| !lines.is_blank(i))
        .fold((0usize, 0usize), |(n, c), i| (n + 1, c + lines.line_chars(i)));
    count > 0 && chars / count > MINIFIED_LINE_CHARS
}

fn is_closer(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with(['}', ')', ']']) {
        return true;
    }
    let word = trimmed
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default();
    CLOSERS.contains(&word)
}

fn find_blocks(lines: &LineIndex<'_>, range: Range<usize>, preferred: &[usize]) -> Vec<Range<usize>> {
    let base = range
        .clone()
        .filter(|&i| !lines.is_blank(i))
        .map(|i| lines.indent(i))
        .min()
        .unwrap_or(0);

    let mut blocks = Vec::new();
    let mut block_start = range.start;
    let mut previous_indent: Option<usize> = None;

    for i in range.clone() {
        if lines.is_blank(i) {
            continue;
        }
        let indent = lines.indent(i);

        if let Some(prev) = previous_indent {
            let after_blank = i > range.start && lines.is_blank(i - 1);
            let dedent = indent <= base && prev > base && !is_closer(lines.line(i));
            if (after_blank || dedent || preferred.contains(&i)) && i > block_start {
                blocks.push(block_start..i);
                block_start = i;
            }
        }
        previous_indent = Some(indent);
    }

    if block_start < range.end {
        blocks.push(block_start..range.end);
    }
    blocks
}

/// Greedy packing; a block that cannot fit alone is windowed.
fn pack(lines: &LineIndex<'_>, blocks: Vec<Range<usize>>, budget: &Budget) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut current: Option<Range<usize>> = None;

    for block in blocks {
        if let Some(open) = current.as_mut() {
            if budget.fits(lines, open.start..block.end) {
                open.end = block.end;
                continue;
            }
        }
        if let Some(done) = current.take() {
            spans.push(Span::new(done, Strategy::Block));
        }
        if budget.fits(lines, block.clone()) {
            current = Some(block);
        } else {
            spans.extend(windows(lines, block, budget));
        }
    }

    if let Some(done) = current {
        spans.push(Span::new(done, Strategy::Block));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max_lines: usize) -> Budget {
        Budget {
            max_lines,
            max_chars: 10_000,
        }
    }

    fn ranges(spans: &[Span]) -> Vec<Range<usize>> {
        spans.iter().map(|s| s.lines.clone()).collect()
    }

    #[test]
    fn test_blank_lines_delimit_blocks() {
        let text = "a = 1\nb = 2\n\nc = 3\nd = 4\n\ne = 5\n";
        let lines = LineIndex::new(text);
        let spans = split_range(&lines, 0..lines.len(), &budget(3), &[]).unwrap();
        assert_eq!(ranges(&spans), vec![0..3, 3..6, 6..7]);
        assert!(spans.iter().all(|s| s.strategy == Strategy::Block));
    }

    #[test]
    fn test_blocks_are_packed_without_splitting() {
        let text = "a\nb\n\nc\nd\n\ne\nf\n";
        let lines = LineIndex::new(text);
        let spans = split_range(&lines, 0..lines.len(), &budget(6), &[]).unwrap();
        assert_eq!(ranges(&spans), vec![0..6, 6..8]);
    }

    #[test]
    fn test_dedent_starts_block_but_closers_do_not() {
        let text = "if x:\n    y()\nelse:\n    z()\nw = 1\n";
        let lines = LineIndex::new(text);
        let blocks = find_blocks(&lines, 0..lines.len(), &[]);
        assert_eq!(blocks, vec![0..4, 4..5]);
    }

    #[test]
    fn test_preferred_boundaries() {
        let text = "a\nb\nc\nd\n";
        let lines = LineIndex::new(text);
        let blocks = find_blocks(&lines, 0..4, &[2]);
        assert_eq!(blocks, vec![0..2, 2..4]);
    }

    #[test]
    fn test_large_block_is_windowed() {
        let text = "x\n".repeat(7);
        let lines = LineIndex::new(&text);
        let spans = split_range(&lines, 0..7, &budget(3), &[]).unwrap();
        assert_eq!(ranges(&spans), vec![0..3, 3..6, 6..7]);
        assert!(spans.iter().all(|s| s.strategy == Strategy::Fixed));
    }

    #[test]
    fn test_minified_is_not_applicable() {
        let text = format!("{}\n", "var a=1;".repeat(100));
        let lines = LineIndex::new(&text);
        assert!(split_range(&lines, 0..1, &budget(10), &[]).is_err());
    }
}
