//! Command handlers for the locodata CLI.

pub mod codeqa;
pub mod export;
pub mod generate;
pub mod scan;

pub use codeqa::{AnswerCodeqaCommand, AnswerDatasetCommand};
pub use export::ExportCommand;
pub use generate::{DesignCommand, GenerateQaCommand};
pub use scan::ScanCommand;

use locodata_core::{AppConfig, AppResult};
use locodata_pipeline::{JsonlArtifactStore, Pipeline, ProgressReporter, RunReport};
use std::sync::Arc;

/// Open `<artifacts_dir>/<file>`, creating the directory.
fn open_store(config: &AppConfig, file: &str) -> AppResult<JsonlArtifactStore> {
    config.ensure_artifacts_dir()?;
    let path = config.artifacts_dir.join(file);
    tracing::info!("Artifact store: {}", path.display());
    JsonlArtifactStore::open(path)
}

/// Build the pipeline and cancel it on Ctrl-C.
fn pipeline(config: &AppConfig, show_progress: bool) -> AppResult<Pipeline> {
    let mut pipeline = Pipeline::from_app_config(config)?;
    if show_progress {
        pipeline = pipeline.with_progress(ProgressReporter::new(Arc::new(|event| {
            eprintln!("{}", event.format_simple());
        })));
    }

    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight tasks");
            token.cancel();
        }
    });

    Ok(pipeline)
}

fn print_report(report: &RunReport, json: bool) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", report.render());
    if !report.failures.is_empty() {
        println!("\nFailures:");
        for failure in &report.failures {
            println!(
                "  [{:?}] {} ({}): {}",
                failure.stage, failure.subject, failure.kind, failure.detail
            );
        }
    }
    Ok(())
}
