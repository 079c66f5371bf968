//! Strategy implementations for the chunk cascade.

mod block;
mod fixed;
mod symbol;

pub use block::BlockSplitter;
pub use fixed::FixedSplitter;
pub use symbol::SymbolSplitter;

use super::lines::{Budget, LineIndex, Span};
use super::Strategy;
use crate::walker::Language;
use locodata_core::AppResult;

/// One chunking strategy.
///
/// Returning an error means the strategy does not apply to this text and
/// the next strategy in the cascade is tried.
pub trait SpanSplitter: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Split the whole text into ordered spans covering every line.
    fn split(&self, lines: &LineIndex<'_>, language: Language, budget: &Budget)
        -> AppResult<Vec<Span>>;
}
