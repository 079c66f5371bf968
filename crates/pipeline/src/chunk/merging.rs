//! Span post-processing: whitespace merging and coverage checks.

use super::lines::{LineIndex, Span};
use super::Strategy;
use locodata_core::{AppError, AppResult};

/// Fold whitespace-only spans into their neighbors.
///
/// A blank span joins the span before it; blank spans at the head of the
/// file join the first non-blank span after them.
pub fn merge_whitespace(lines: &LineIndex<'_>, spans: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    let mut leading_start: Option<usize> = None;

    for mut span in spans {
        if lines.is_blank_range(span.lines.clone()) {
            match merged.last_mut() {
                Some(prev) => prev.lines.end = span.lines.end,
                None => {
                    leading_start.get_or_insert(span.lines.start);
                }
            }
            continue;
        }
        if let Some(start) = leading_start.take() {
            span.lines.start = start;
        }
        merged.push(span);
    }

    // Nothing but blank spans: keep them as one so coverage still holds
    if let Some(start) = leading_start {
        merged.push(Span::new(start..lines.len(), Strategy::Fixed));
    }

    merged
}

/// Check that `spans` are non-empty, contiguous and cover `0..total` exactly.
pub fn verify_coverage(spans: &[Span], total: usize) -> AppResult<()> {
    let mut expected = 0;
    for (i, span) in spans.iter().enumerate() {
        if span.lines.start != expected {
            return Err(AppError::Chunking(format!(
                "span {} starts at line {} but line {} was expected",
                i, span.lines.start, expected
            )));
        }
        if span.lines.is_empty() {
            return Err(AppError::Chunking(format!("span {} is empty", i)));
        }
        expected = span.lines.end;
    }

    if expected != total {
        return Err(AppError::Chunking(format!(
            "spans cover {} of {} lines",
            expected, total
        )));
    }
    Ok(())
}
