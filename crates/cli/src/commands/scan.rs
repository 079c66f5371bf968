//! Scan command handler.
//!
//! Walks and chunks the repository, printing what generation would see.

use clap::Args;
use locodata_core::{AppConfig, AppResult};
use locodata_pipeline::{Chunker, RepoWalker, SummaryBuilder};

/// Walk and chunk the repository without generating anything
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// List every chunk
    #[arg(long)]
    pub chunks: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ScanCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        config.pipeline.validate()?;
        let root = &config.repo_path;
        tracing::info!("Scanning {:?}", root);

        let walker = RepoWalker::new(root, &config.pipeline.walker)?;
        let chunker = Chunker::new(&config.pipeline.chunking)?;
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let mut summary = SummaryBuilder::new(name);

        let mut chunks = Vec::new();
        let mut chunk_failures = Vec::new();
        let mut walk = walker.walk();
        for file in walk.by_ref() {
            summary.observe(&file);
            match chunker.chunk_file(&file) {
                Ok(file_chunks) => chunks.extend(file_chunks),
                Err(e) => chunk_failures.push((file.path.clone(), e.to_string())),
            }
        }
        let stats = walk.into_stats();
        let summary = summary.finish();
        let oversized = chunks.iter().filter(|c| c.oversized).count();

        if self.json {
            let mut output = serde_json::json!({
                "summary": summary,
                "filesWalked": stats.files_walked,
                "skipped": stats.skipped,
                "chunkFailures": chunk_failures
                    .iter()
                    .map(|(path, error)| serde_json::json!({ "path": path, "error": error }))
                    .collect::<Vec<_>>(),
                "chunksProduced": chunks.len(),
                "chunksOversized": oversized,
            });
            if self.chunks {
                output["chunks"] = serde_json::json!(chunks
                    .iter()
                    .map(|c| serde_json::json!({
                        "id": c.id,
                        "location": c.location(),
                        "symbol": c.symbol,
                        "strategy": c.strategy,
                        "oversized": c.oversized,
                    }))
                    .collect::<Vec<_>>());
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!("{}", summary.render());
        println!();
        println!(
            "Files: {} walked, {} binary, {} oversize, {} unreadable{}",
            stats.files_walked,
            stats.skipped_binary,
            stats.skipped_oversize,
            stats.skipped_unreadable,
            if stats.limit_reached {
                " (file limit reached)"
            } else {
                ""
            }
        );
        println!("Chunks: {} produced, {} oversized", chunks.len(), oversized);

        for (path, error) in &chunk_failures {
            println!("  chunking failed: {} ({})", path, error);
        }

        if self.chunks {
            println!();
            for chunk in &chunks {
                println!(
                    "{:<48} {:<8} {}{}",
                    chunk.location(),
                    chunk.strategy.as_str(),
                    chunk.symbol.as_deref().unwrap_or("-"),
                    if chunk.oversized { " (oversized)" } else { "" }
                );
            }
        }

        Ok(())
    }
}
