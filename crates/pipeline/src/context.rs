//! Context assembly: a chunk plus bounded supporting context.

use crate::chunk::Chunk;
use crate::summary::RepoSummary;
use locodata_core::{AppError, AppResult, ContextConfig};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Requirement words that carry no relevance signal.
const STOPWORDS: [&str; 24] = [
    "the", "and", "for", "with", "that", "this", "from", "into", "add", "new", "should", "must",
    "when", "then", "have", "has", "are", "was", "will", "can", "all", "any", "use", "support",
];

/// How a neighbor relates to the target chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relation {
    Preceding,
    Following,
    SameSymbol,
    Relevant,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Preceding => "preceding",
            Relation::Following => "following",
            Relation::SameSymbol => "same-symbol",
            Relation::Relevant => "relevant",
        }
    }
}

/// An excerpt of another chunk, cut at a line boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborExcerpt {
    pub relation: Relation,
    pub chunk_id: String,
    pub path: String,
    pub start_line: usize,
    /// Last line actually included
    pub end_line: usize,
    pub text: String,
    pub truncated: bool,
}

/// A chunk ready for one generation call.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub chunk: Chunk,
    pub neighbors: Vec<NeighborExcerpt>,
    /// Dropped when the chunk alone leaves no room for it
    pub summary: Option<Arc<RepoSummary>>,
}

impl ContextBundle {
    /// A bundle with no surrounding context.
    pub fn bare(chunk: Chunk) -> Self {
        Self {
            chunk,
            neighbors: Vec::new(),
            summary: None,
        }
    }

    /// Ids of the focus chunk and every neighbor, focus first.
    pub fn context_chunk_ids(&self) -> Vec<String> {
        std::iter::once(self.chunk.id.clone())
            .chain(self.neighbors.iter().map(|n| n.chunk_id.clone()))
            .collect()
    }

    pub fn rendered_summary(&self) -> Option<String> {
        self.summary.as_ref().map(|s| s.render())
    }

    /// Characters of chunk, excerpts and rendered summary.
    pub fn total_chars(&self) -> usize {
        self.chunk.text.chars().count()
            + self
                .neighbors
                .iter()
                .map(|n| n.text.chars().count())
                .sum::<usize>()
            + self.rendered_summary().map_or(0, |s| s.chars().count())
    }
}

/// Builds bundles over every chunk of one run.
pub struct ContextAssembler {
    config: ContextConfig,
    chunks: Vec<Chunk>,
    /// (path, ordinal) to index in `chunks`
    positions: HashMap<(String, usize), usize>,
    by_symbol: HashMap<String, Vec<usize>>,
    summary: Arc<RepoSummary>,
    summary_chars: usize,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig, chunks: Vec<Chunk>, summary: RepoSummary) -> Self {
        let mut positions = HashMap::with_capacity(chunks.len());
        let mut by_symbol: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            positions.insert((chunk.path.clone(), chunk.ordinal), i);
            if let Some(symbol) = &chunk.symbol {
                by_symbol.entry(symbol.clone()).or_default().push(i);
            }
        }
        for indices in by_symbol.values_mut() {
            indices.sort_by(|&a, &b| order_key(&chunks[a]).cmp(&order_key(&chunks[b])));
        }

        let summary_chars = summary.render().chars().count();
        Self {
            config,
            chunks,
            positions,
            by_symbol,
            summary: Arc::new(summary),
            summary_chars,
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn summary(&self) -> &RepoSummary {
        &self.summary
    }

    /// Bundle for the chunk at `index` in `chunks()`.
    pub fn bundle(&self, index: usize) -> AppResult<ContextBundle> {
        let chunk = self
            .chunks
            .get(index)
            .ok_or_else(|| AppError::Other(format!("No chunk at index {}", index)))?;

        let mut candidates: Vec<(Relation, usize)> = Vec::new();
        if chunk.ordinal > 0 {
            if let Some(&i) = self.positions.get(&(chunk.path.clone(), chunk.ordinal - 1)) {
                candidates.push((Relation::Preceding, i));
            }
        }
        if let Some(&i) = self.positions.get(&(chunk.path.clone(), chunk.ordinal + 1)) {
            candidates.push((Relation::Following, i));
        }
        if let Some(symbol) = &chunk.symbol {
            let taken: HashSet<usize> = candidates.iter().map(|(_, i)| *i).collect();
            for &i in self.by_symbol.get(symbol).into_iter().flatten() {
                if i != index && !taken.contains(&i) {
                    candidates.push((Relation::SameSymbol, i));
                }
            }
        }

        Ok(self.assemble(chunk.clone(), candidates))
    }

    /// Bundle for a design requirement: the most relevant chunk is the
    /// focus, the next `design_top_k - 1` become `relevant` neighbors.
    pub fn design_bundle(&self, requirement: &str) -> AppResult<ContextBundle> {
        let ranked = self.relevant(requirement, self.config.design_top_k.max(1));
        let (&focus, rest) = ranked.split_first().ok_or_else(|| {
            AppError::Validation(
                "invalid task input: the repository has no chunks to design against".to_string(),
            )
        })?;

        let candidates = rest.iter().map(|&i| (Relation::Relevant, i)).collect();
        Ok(self.assemble(self.chunks[focus].clone(), candidates))
    }

    /// Indices of the `k` chunks most relevant to `requirement`.
    ///
    /// Score is term overlap with the text, weighted up for symbol and path
    /// hits. Ties go to path then ordinal.
    pub fn relevant(&self, requirement: &str, k: usize) -> Vec<usize> {
        let terms = terms(requirement);
        let mut scored: Vec<(usize, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (score(chunk, &terms), i))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| order_key(&self.chunks[*a]).cmp(&order_key(&self.chunks[*b])))
        });
        scored.into_iter().take(k).map(|(_, i)| i).collect()
    }

    /// Fill neighbors in priority order under the character budget.
    fn assemble(&self, chunk: Chunk, candidates: Vec<(Relation, usize)>) -> ContextBundle {
        let mut used = chunk.text.chars().count();
        let summary = if used + self.summary_chars <= self.config.budget_chars {
            used += self.summary_chars;
            Some(Arc::clone(&self.summary))
        } else {
            None
        };

        let mut neighbors = Vec::new();
        for (relation, i) in candidates {
            if neighbors.len() >= self.config.max_neighbors {
                break;
            }
            let Some(excerpt) = excerpt(&self.chunks[i], relation, self.config.excerpt_chars)
            else {
                continue;
            };
            let size = excerpt.text.chars().count();
            if used + size > self.config.budget_chars {
                tracing::trace!(
                    chunk = %chunk.id,
                    neighbor = %excerpt.chunk_id,
                    "Neighbor skipped, context budget exhausted"
                );
                continue;
            }
            used += size;
            neighbors.push(excerpt);
        }

        ContextBundle {
            chunk,
            neighbors,
            summary,
        }
    }
}

fn order_key(chunk: &Chunk) -> (&str, usize) {
    (chunk.path.as_str(), chunk.ordinal)
}

/// Whole lines of `chunk` up to `max_chars`; `None` if not even one fits.
fn excerpt(chunk: &Chunk, relation: Relation, max_chars: usize) -> Option<NeighborExcerpt> {
    let mut text = String::new();
    let mut used = 0;
    let mut lines = 0;

    for line in chunk.text.split_inclusive('\n') {
        let size = line.chars().count();
        if used + size > max_chars {
            break;
        }
        text.push_str(line);
        used += size;
        lines += 1;
    }

    if lines == 0 {
        return None;
    }
    let truncated = text.len() < chunk.text.len();
    Some(NeighborExcerpt {
        relation,
        chunk_id: chunk.id.clone(),
        path: chunk.path.clone(),
        start_line: chunk.start_line,
        end_line: chunk.start_line + lines - 1,
        text,
        truncated,
    })
}

fn terms(requirement: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    requirement
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn score(chunk: &Chunk, terms: &[String]) -> usize {
    let text = chunk.text.to_lowercase();
    let path = chunk.path.to_lowercase();
    let symbol = chunk.symbol.as_deref().unwrap_or_default().to_lowercase();

    terms
        .iter()
        .map(|term| {
            let mut s = 0;
            if text.contains(term.as_str()) {
                s += 1;
            }
            if path.contains(term.as_str()) {
                s += 2;
            }
            if symbol.contains(term.as_str()) {
                s += 3;
            }
            s
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Strategy;
    use crate::walker::Language;

    fn chunk(path: &str, ordinal: usize, start_line: usize, symbol: Option<&str>, text: &str) -> Chunk {
        let lines = text.lines().count().max(1);
        Chunk {
            id: format!("{}#{}", path, ordinal),
            path: path.to_string(),
            ordinal,
            start_line,
            end_line: start_line + lines - 1,
            start_byte: 0,
            end_byte: text.len(),
            text: text.to_string(),
            symbol: symbol.map(String::from),
            signature: None,
            strategy: Strategy::Symbol,
            oversized: false,
            language: Language::Python,
            hash: String::new(),
        }
    }

    fn config(max_neighbors: usize, excerpt_chars: usize, budget_chars: usize) -> ContextConfig {
        ContextConfig {
            max_neighbors,
            excerpt_chars,
            budget_chars,
            design_top_k: 3,
        }
    }

    fn repo() -> Vec<Chunk> {
        vec![
            chunk("a.py", 0, 1, Some("load"), "def load():\n    pass\n"),
            chunk("a.py", 1, 3, Some("save"), "def save():\n    pass\n"),
            chunk("a.py", 2, 5, Some("close"), "def close():\n    pass\n"),
            chunk("b.py", 0, 1, Some("save"), "def save():\n    return 1\n"),
            chunk("c/d.py", 0, 1, Some("save"), "def save():\n    return 2\n"),
        ]
    }

    fn relations(bundle: &ContextBundle) -> Vec<(Relation, String)> {
        bundle
            .neighbors
            .iter()
            .map(|n| (n.relation, n.chunk_id.clone()))
            .collect()
    }

    #[test]
    fn test_neighbor_order() {
        let assembler = ContextAssembler::new(config(4, 1000, 10_000), repo(), RepoSummary::default());
        let bundle = assembler.bundle(1).unwrap();
        assert_eq!(
            relations(&bundle),
            vec![
                (Relation::Preceding, "a.py#0".to_string()),
                (Relation::Following, "a.py#2".to_string()),
                (Relation::SameSymbol, "b.py#0".to_string()),
                (Relation::SameSymbol, "c/d.py#0".to_string()),
            ]
        );
        assert!(bundle.summary.is_some());
        assert_eq!(bundle.context_chunk_ids()[0], "a.py#1");
    }

    #[test]
    fn test_max_neighbors() {
        let assembler = ContextAssembler::new(config(2, 1000, 10_000), repo(), RepoSummary::default());
        let bundle = assembler.bundle(1).unwrap();
        assert_eq!(bundle.neighbors.len(), 2);
        assert_eq!(bundle.neighbors[1].relation, Relation::Following);
    }

    #[test]
    fn test_over_budget_neighbor_is_skipped_not_reordered() {
        let mut chunks = repo();
        chunks[0].text = format!("def load():\n{}\n", "    x = 1\n".repeat(20));
        let budget = chunks[1].text.chars().count()
            + RepoSummary::default().render().chars().count()
            + 60;
        let assembler = ContextAssembler::new(config(4, 10_000, budget), chunks, RepoSummary::default());
        let bundle = assembler.bundle(1).unwrap();
        let ids: Vec<_> = relations(&bundle).into_iter().map(|(_, id)| id).collect();
        assert!(!ids.contains(&"a.py#0".to_string()));
        assert_eq!(ids[0], "a.py#2");
        assert!(bundle.total_chars() <= budget);
    }

    #[test]
    fn test_excerpt_cut_at_line_boundary() {
        let c = chunk("x.py", 0, 10, None, "line one\nline two\nline three\n");
        let e = excerpt(&c, Relation::Following, 20).unwrap();
        assert_eq!(e.text, "line one\nline two\n");
        assert!(e.truncated);
        assert_eq!(e.end_line, 11);
        assert!(excerpt(&c, Relation::Following, 3).is_none());
    }

    #[test]
    fn test_design_bundle_ranks_by_terms() {
        let assembler = ContextAssembler::new(config(4, 1000, 10_000), repo(), RepoSummary::default());
        let bundle = assembler.design_bundle("Add retry when the save fails").unwrap();
        assert_eq!(bundle.chunk.id, "a.py#1");
        assert!(bundle
            .neighbors
            .iter()
            .all(|n| n.relation == Relation::Relevant));
        assert_eq!(bundle.neighbors[0].chunk_id, "b.py#0");
    }

    #[test]
    fn test_design_without_chunks_is_invalid() {
        let assembler = ContextAssembler::new(config(4, 1000, 10_000), Vec::new(), RepoSummary::default());
        assert!(matches!(
            assembler.design_bundle("anything"),
            Err(AppError::Validation(_))
        ));
    }
}
