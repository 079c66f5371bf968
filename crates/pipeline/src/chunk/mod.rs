//! Chunking: one source file into ordered, budget-bounded chunks.
//!
//! Strategies are tried in order (symbol boundaries, statement blocks, fixed
//! windows). The first one whose spans survive whitespace merging and the
//! coverage check wins. Chunks of one file are contiguous, non-overlapping and
//! cover every line.

mod languages;
mod lexer;
mod lines;
mod merging;
mod metadata;
pub mod splitters;

pub use lines::{Budget, LineIndex, Span};
pub use metadata::{calculate_hash, chunk_id};

use crate::walker::{Language, SourceFile};
use locodata_core::{AppError, AppResult, ChunkingConfig};
use merging::{merge_whitespace, verify_coverage};
use serde::{Deserialize, Serialize};
use splitters::{BlockSplitter, FixedSplitter, SpanSplitter, SymbolSplitter};

/// Which strategy produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Symbol,
    Block,
    Fixed,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Symbol => "symbol",
            Strategy::Block => "block",
            Strategy::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous slice of one file's lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Stable id derived from path, byte range and text
    pub id: String,

    /// Owning file path, relative to the repository root
    pub path: String,

    /// Position within the file (0-indexed)
    pub ordinal: usize,

    /// First line, 1-based, inclusive
    pub start_line: usize,

    /// Last line, 1-based, inclusive
    pub end_line: usize,

    /// Byte offset of the first character
    pub start_byte: usize,

    /// Byte offset one past the last character
    pub end_byte: usize,

    pub text: String,

    /// Enclosing symbol name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Declaration line of the enclosing symbol, when the chunk starts
    /// below it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    pub strategy: Strategy,

    /// Larger than the budget (a single overlong line)
    #[serde(default)]
    pub oversized: bool,

    pub language: Language,

    /// SHA-256 hash of the text
    pub hash: String,
}

impl Chunk {
    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }

    /// `path:start-end` for logs and prompts.
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.path, self.start_line, self.end_line)
    }
}

/// The strategy cascade for one budget.
pub struct Chunker {
    budget: Budget,
    strategies: Vec<Box<dyn SpanSplitter>>,
}

impl Chunker {
    /// Build the default cascade: symbol, block, fixed.
    pub fn new(config: &ChunkingConfig) -> AppResult<Self> {
        let strategies: Vec<Box<dyn SpanSplitter>> = vec![
            Box::new(SymbolSplitter::new()?),
            Box::new(BlockSplitter),
            Box::new(FixedSplitter),
        ];
        Self::with_strategies(config, strategies)
    }

    /// Build a cascade from explicit strategies, tried in order.
    pub fn with_strategies(
        config: &ChunkingConfig,
        strategies: Vec<Box<dyn SpanSplitter>>,
    ) -> AppResult<Self> {
        if config.max_lines == 0 || config.max_chars == 0 {
            return Err(AppError::Config(
                "chunking maxLines and maxChars must be positive".to_string(),
            ));
        }
        if strategies.is_empty() {
            return Err(AppError::Config("no chunking strategies".to_string()));
        }

        Ok(Self {
            budget: Budget {
                max_lines: config.max_lines,
                max_chars: config.max_chars,
            },
            strategies,
        })
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    pub fn chunk_file(&self, file: &SourceFile) -> AppResult<Vec<Chunk>> {
        self.chunk_text(&file.path, file.language, &file.text)
    }

    /// Chunk `text` as the content of `path`.
    ///
    /// Empty and whitespace-only text yields no chunks. Fails only when every
    /// strategy fails.
    pub fn chunk_text(&self, path: &str, language: Language, text: &str) -> AppResult<Vec<Chunk>> {
        let lines = LineIndex::new(text);
        if lines.is_blank_range(0..lines.len()) {
            return Ok(Vec::new());
        }

        let mut failures = Vec::new();
        for splitter in &self.strategies {
            let attempt = splitter
                .split(&lines, language, &self.budget)
                .and_then(|spans| {
                    let spans = merge_whitespace(&lines, spans);
                    verify_coverage(&spans, lines.len())?;
                    Ok(spans)
                });

            match attempt {
                Ok(spans) => {
                    let chunks = self.materialize(path, language, &lines, spans);
                    tracing::debug!(
                        path,
                        strategy = %splitter.strategy(),
                        chunks = chunks.len(),
                        "Chunked file"
                    );
                    return Ok(chunks);
                }
                Err(e) => {
                    tracing::debug!(
                        path,
                        strategy = %splitter.strategy(),
                        error = %e,
                        "Strategy not applicable, falling back"
                    );
                    failures.push(format!("{}: {}", splitter.strategy(), e));
                }
            }
        }

        Err(AppError::Chunking(format!(
            "every strategy failed for {} ({})",
            path,
            failures.join("; ")
        )))
    }

    fn materialize(
        &self,
        path: &str,
        language: Language,
        lines: &LineIndex<'_>,
        spans: Vec<Span>,
    ) -> Vec<Chunk> {
        spans
            .into_iter()
            .enumerate()
            .map(|(ordinal, span)| {
                let bytes = lines.byte_range(span.lines.clone());
                let text = lines.slice(span.lines.clone()).to_string();
                let oversized = span.oversized || !self.budget.fits(lines, content_lines(lines, &span));
                Chunk {
                    id: chunk_id(path, &bytes, &text),
                    path: path.to_string(),
                    ordinal,
                    start_line: span.lines.start + 1,
                    end_line: span.lines.end,
                    start_byte: bytes.start,
                    end_byte: bytes.end,
                    hash: calculate_hash(&text),
                    text,
                    symbol: span.symbol,
                    signature: span.signature,
                    strategy: span.strategy,
                    oversized,
                    language,
                }
            })
            .collect()
    }
}

/// The span without the blank lines merged onto its edges.
fn content_lines(lines: &LineIndex<'_>, span: &Span) -> std::ops::Range<usize> {
    let mut range = span.lines.clone();
    while range.start < range.end && lines.is_blank(range.start) {
        range.start += 1;
    }
    while range.end > range.start && lines.is_blank(range.end - 1) {
        range.end -= 1;
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_lines: usize, max_chars: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_lines,
            max_chars,
        })
        .unwrap()
    }

    /// Fails every time, to exercise the cascade.
    struct Broken;

    impl SpanSplitter for Broken {
        fn strategy(&self) -> Strategy {
            Strategy::Symbol
        }

        fn split(&self, _: &LineIndex<'_>, _: Language, _: &Budget) -> AppResult<Vec<Span>> {
            Err(AppError::Chunking("broken".into()))
        }
    }

    /// Returns a span list with a gap.
    struct Gappy;

    impl SpanSplitter for Gappy {
        fn strategy(&self) -> Strategy {
            Strategy::Block
        }

        fn split(&self, lines: &LineIndex<'_>, _: Language, _: &Budget) -> AppResult<Vec<Span>> {
            Ok(vec![Span::new(1..lines.len(), Strategy::Block)])
        }
    }

    #[test]
    fn test_empty_and_blank_files_have_no_chunks() {
        let c = chunker(10, 1000);
        assert!(c.chunk_text("a.py", Language::Python, "").unwrap().is_empty());
        assert!(c
            .chunk_text("a.py", Language::Python, "\n  \n\t\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_chunk_offsets_and_lines() {
        let text = "def a():\n    return 1\n\ndef b():\n    return 2\n";
        let chunks = chunker(10, 1000)
            .chunk_text("m.py", Language::Python, text)
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
        assert_eq!(chunks[1].start_line, 4);
        assert_eq!(chunks[1].end_line, 5);
        assert_eq!(&text[chunks[1].start_byte..chunks[1].end_byte], chunks[1].text);
        assert_eq!(chunks[1].symbol.as_deref(), Some("b"));
        assert_eq!(chunks[1].ordinal, 1);
        assert_eq!(chunks[1].location(), "m.py:4-5");
    }

    #[test]
    fn test_single_long_line_is_oversized() {
        let text = "x".repeat(500);
        let chunks = chunker(10, 100)
            .chunk_text("min.js", Language::JavaScript, &text)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].oversized);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_blank_separator_does_not_mark_symbol_oversized() {
        let text = "def a():\n    x = 1\n    return x\n\ndef b():\n    return 2\n";
        let chunks = chunker(3, 1000)
            .chunk_text("m.py", Language::Python, text)
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 4));
        assert_eq!(chunks[0].symbol.as_deref(), Some("a"));
        assert!(chunks.iter().all(|c| !c.oversized));
    }

    #[test]
    fn test_split_symbol_pieces_carry_signature() {
        let mut text = String::from("def long(a, b):\n");
        for n in 0..9 {
            text.push_str(&format!("    v{} = a + {}\n", n, n));
        }
        let chunks = chunker(4, 1000)
            .chunk_text("m.py", Language::Python, &text)
            .unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].signature, None);
        for chunk in &chunks[1..] {
            assert_eq!(chunk.symbol.as_deref(), Some("long"));
            assert_eq!(chunk.signature.as_deref(), Some("def long(a, b):"));
        }
    }

    #[test]
    fn test_failed_strategies_fall_through() {
        let c = Chunker::with_strategies(
            &ChunkingConfig {
                max_lines: 2,
                max_chars: 1000,
            },
            vec![Box::new(Broken), Box::new(Gappy), Box::new(FixedSplitter)],
        )
        .unwrap();
        let chunks = c.chunk_text("a.txt", Language::Text, "a\nb\nc\n").unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.strategy == Strategy::Fixed));
    }

    #[test]
    fn test_all_strategies_failing_is_chunking_error() {
        let c = Chunker::with_strategies(&ChunkingConfig::default(), vec![Box::new(Broken)]).unwrap();
        let err = c.chunk_text("a.rs", Language::Rust, "fn a() {}\n").unwrap_err();
        assert!(matches!(err, AppError::Chunking(_)));
    }

    #[test]
    fn test_zero_budget_is_config_error() {
        let result = Chunker::new(&ChunkingConfig {
            max_lines: 0,
            max_chars: 100,
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let text = "fn a() {\n}\n\nfn b() {\n}\n";
        let c = chunker(10, 1000);
        let first = c.chunk_text("lib.rs", Language::Rust, text).unwrap();
        let second = c.chunk_text("lib.rs", Language::Rust, text).unwrap();
        assert_eq!(first, second);
        assert_ne!(first[0].id, first[1].id);
    }
}
