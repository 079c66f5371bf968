//! Export command handler.

use clap::{Args, ValueEnum};
use locodata_core::{AppConfig, AppResult};
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StoreKind {
    Qa,
    Design,
    Codeqa,
}

impl StoreKind {
    fn file(self) -> &'static str {
        match self {
            StoreKind::Qa => "qa.jsonl",
            StoreKind::Design => "design.jsonl",
            StoreKind::Codeqa => "codeqa.jsonl",
        }
    }
}

/// Convert a JSONL artifact store to a JSON array
#[derive(Args, Debug)]
pub struct ExportCommand {
    /// Output file
    pub output: PathBuf,

    /// Store under the artifacts directory to read
    #[arg(short, long, value_enum, default_value = "qa")]
    pub kind: StoreKind,

    /// Explicit input file, instead of --kind
    #[arg(short, long, conflicts_with = "kind")]
    pub input: Option<PathBuf>,
}

impl ExportCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let input = self
            .input
            .clone()
            .unwrap_or_else(|| config.artifacts_dir.join(self.kind.file()));
        tracing::info!("Exporting {:?} to {:?}", input, self.output);

        let count = locodata_pipeline::writer::export_json(&input, &self.output)?;
        println!("Exported {} records to {}", count, self.output.display());
        Ok(())
    }
}
