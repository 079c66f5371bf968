//! Symbol-boundary splitting driven by the per-language profile table.
//!
//! Top-level declarations become one span each (with their doc comments,
//! decorators and attributes). Text between symbols is packed by the block
//! splitter. A symbol over budget is split on its own lines, nested
//! declarations acting as preferred boundaries, and every piece keeps the
//! symbol name.

use super::block::split_range;
use super::fixed::windows;
use super::SpanSplitter;
use crate::chunk::languages::{build_profiles, Boundary, LanguageProfile};
use crate::chunk::lexer::{self, LineDepth};
use crate::chunk::lines::{Budget, LineIndex, Span};
use crate::chunk::Strategy;
use crate::walker::Language;
use locodata_core::{AppError, AppResult};
use std::collections::HashMap;
use std::ops::Range;

/// How far below a declaration its opening brace may appear.
const MAX_SIGNATURE_LINES: usize = 8;

/// A located top-level symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SymbolExtent {
    name: String,
    /// Declaration line
    decl: usize,
    /// Lines including the attached leading lines
    lines: Range<usize>,
}

pub struct SymbolSplitter {
    profiles: HashMap<Language, LanguageProfile>,
}

impl SymbolSplitter {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            profiles: build_profiles()?,
        })
    }
}

impl SpanSplitter for SymbolSplitter {
    fn strategy(&self) -> Strategy {
        Strategy::Symbol
    }

    fn split(
        &self,
        lines: &LineIndex<'_>,
        language: Language,
        budget: &Budget,
    ) -> AppResult<Vec<Span>> {
        let profile = self.profiles.get(&language).ok_or_else(|| {
            AppError::Chunking(format!("no symbol table for {}", language))
        })?;

        let depths = match profile.boundary {
            Boundary::Braces => Some(lexer::scan(lines, &profile.lex)?),
            _ => None,
        };

        let symbols = match (profile.boundary, depths.as_deref()) {
            (Boundary::Braces, Some(depths)) => brace_symbols(lines, profile, depths),
            (Boundary::Indentation { closing }, _) => indent_symbols(lines, profile, closing),
            (Boundary::Headings, _) => heading_symbols(lines, profile),
            (Boundary::Braces, None) => Vec::new(),
        };

        if symbols.is_empty() {
            return Err(AppError::Chunking("no symbols detected".to_string()));
        }

        let mut spans = Vec::new();
        let mut cursor = 0;
        for symbol in &symbols {
            if symbol.lines.start > cursor {
                spans.extend(pack_gap(lines, cursor..symbol.lines.start, budget));
            }
            spans.extend(symbol_spans(lines, profile, depths.as_deref(), symbol, budget));
            cursor = symbol.lines.end;
        }
        if cursor < lines.len() {
            spans.extend(pack_gap(lines, cursor..lines.len(), budget));
        }

        Ok(spans)
    }
}

fn pack_gap(lines: &LineIndex<'_>, range: Range<usize>, budget: &Budget) -> Vec<Span> {
    split_range(lines, range.clone(), budget, &[]).unwrap_or_else(|_| windows(lines, range, budget))
}

fn symbol_spans(
    lines: &LineIndex<'_>,
    profile: &LanguageProfile,
    depths: Option<&[LineDepth]>,
    symbol: &SymbolExtent,
    budget: &Budget,
) -> Vec<Span> {
    let name = Some(symbol.name.clone());
    if budget.fits(lines, symbol.lines.clone()) {
        return vec![Span::new(symbol.lines.clone(), Strategy::Symbol).with_symbol(name)];
    }

    let preferred = nested_starts(lines, profile, depths, symbol);
    let pieces = split_range(lines, symbol.lines.clone(), budget, &preferred)
        .unwrap_or_else(|_| windows(lines, symbol.lines.clone(), budget));

    let signature = lines.line(symbol.decl).trim().to_string();
    pieces
        .into_iter()
        .map(|piece| {
            let detached = piece.lines.start > symbol.decl;
            piece
                .with_symbol(name.clone())
                .with_signature(detached.then(|| signature.clone()))
        })
        .collect()
}

/// Lines inside `symbol` where a nested declaration (with its leading
/// lines) begins.
fn nested_starts(
    lines: &LineIndex<'_>,
    profile: &LanguageProfile,
    depths: Option<&[LineDepth]>,
    symbol: &SymbolExtent,
) -> Vec<usize> {
    let floor = symbol.decl + 1;
    (floor..symbol.lines.end)
        .filter(|&i| depths.map_or(true, |d| !d[i].starts_in_literal))
        .filter(|&i| profile.declared_name(lines.line(i)).is_some())
        .map(|i| leading_start(lines, profile, i, floor))
        .collect()
}

/// Walk up from `decl` over directly attached leading lines, never past
/// `floor`.
fn leading_start(lines: &LineIndex<'_>, profile: &LanguageProfile, decl: usize, floor: usize) -> usize {
    let mut start = decl;
    while start > floor && !lines.is_blank(start - 1) && profile.is_leading(lines.line(start - 1)) {
        start -= 1;
    }
    start
}

fn brace_symbols(
    lines: &LineIndex<'_>,
    profile: &LanguageProfile,
    depths: &[LineDepth],
) -> Vec<SymbolExtent> {
    let mut symbols = Vec::new();
    let mut floor = 0;
    let mut i = 0;

    while i < lines.len() {
        let depth = depths[i];
        if depth.start == 0 && !depth.starts_in_literal {
            if let Some(name) = profile.declared_name(lines.line(i)) {
                if let Some(end) = brace_body_end(lines, profile, depths, i) {
                    symbols.push(SymbolExtent {
                        name,
                        decl: i,
                        lines: leading_start(lines, profile, i, floor)..end,
                    });
                    floor = end;
                    i = end;
                    continue;
                }
            }
        }
        i += 1;
    }

    symbols
}

/// End (exclusive) of the braced body declared on line `decl`, if the
/// declaration has one.
fn brace_body_end(
    lines: &LineIndex<'_>,
    profile: &LanguageProfile,
    depths: &[LineDepth],
    decl: usize,
) -> Option<usize> {
    let limit = (decl + MAX_SIGNATURE_LINES).min(lines.len());
    for j in decl..limit {
        if j > decl && (lines.is_blank(j) || profile.declared_name(lines.line(j)).is_some()) {
            return None;
        }
        if depths[j].terminated_at_zero {
            return None;
        }
        if depths[j].opens_at_zero {
            return (j..lines.len())
                .find(|&k| depths[k].end == 0)
                .map(|k| k + 1);
        }
    }
    None
}

fn indent_symbols(
    lines: &LineIndex<'_>,
    profile: &LanguageProfile,
    closing: Option<&'static str>,
) -> Vec<SymbolExtent> {
    let mut symbols = Vec::new();
    let mut floor = 0;
    let mut i = 0;

    while i < lines.len() {
        if lines.is_blank(i) || lines.indent(i) > 0 {
            i += 1;
            continue;
        }
        let Some(name) = profile.declared_name(lines.line(i)) else {
            i += 1;
            continue;
        };

        let mut last = i;
        let mut k = i + 1;
        while k < lines.len() {
            if lines.is_blank(k) {
                k += 1;
                continue;
            }
            let trimmed = lines.line(k).trim_start();
            if lines.indent(k) > 0 || trimmed.starts_with([')', ']', '}']) {
                last = k;
                k += 1;
                continue;
            }
            if let Some(keyword) = closing {
                let word = trimmed
                    .split(|c: char| !c.is_alphanumeric() && c != '_')
                    .next()
                    .unwrap_or_default();
                if word == keyword {
                    last = k;
                }
            }
            break;
        }

        let end = last + 1;
        symbols.push(SymbolExtent {
            name,
            decl: i,
            lines: leading_start(lines, profile, i, floor)..end,
        });
        floor = end;
        i = end;
    }

    symbols
}

fn heading_symbols(lines: &LineIndex<'_>, profile: &LanguageProfile) -> Vec<SymbolExtent> {
    let mut headings = Vec::new();
    let mut in_fence = false;

    for i in 0..lines.len() {
        let trimmed = lines.line(i).trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(name) = profile.declared_name(lines.line(i)) {
            headings.push((i, name));
        }
    }

    let ends: Vec<usize> = headings
        .iter()
        .skip(1)
        .map(|(i, _)| *i)
        .chain(std::iter::once(lines.len()))
        .collect();

    headings
        .into_iter()
        .zip(ends)
        .map(|((decl, name), end)| SymbolExtent {
            name,
            decl,
            lines: decl..end,
        })
        .collect()
}
