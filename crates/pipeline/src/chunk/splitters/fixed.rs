//! Fixed-size line windows, the last resort of the cascade.

use super::SpanSplitter;
use crate::chunk::lines::{Budget, LineIndex, Span};
use crate::chunk::Strategy;
use crate::walker::Language;
use locodata_core::AppResult;
use std::ops::Range;

pub struct FixedSplitter;

impl SpanSplitter for FixedSplitter {
    fn strategy(&self) -> Strategy {
        Strategy::Fixed
    }

    fn split(
        &self,
        lines: &LineIndex<'_>,
        _language: Language,
        budget: &Budget,
    ) -> AppResult<Vec<Span>> {
        Ok(windows(lines, 0..lines.len(), budget))
    }
}

/// Cut `range` into consecutive windows of at most `max_lines` lines, ending
/// a window early when the next line would exceed `max_chars`.
///
/// A line that alone exceeds `max_chars` becomes its own oversized window.
pub fn windows(lines: &LineIndex<'_>, range: Range<usize>, budget: &Budget) -> Vec<Span> {
    let max_lines = budget.max_lines.max(1);
    let mut spans = Vec::new();
    let mut start = range.start;

    while start < range.end {
        if lines.line_chars(start) > budget.max_chars {
            let mut span = Span::new(start..start + 1, Strategy::Fixed);
            span.oversized = true;
            spans.push(span);
            start += 1;
            continue;
        }

        let mut end = start;
        let mut chars = 0;
        while end < range.end && end - start < max_lines {
            let next = lines.line_chars(end);
            if chars + next > budget.max_chars {
                break;
            }
            chars += next;
            end += 1;
        }

        spans.push(Span::new(start..end, Strategy::Fixed));
        start = end;
    }

    spans
}
