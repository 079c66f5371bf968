//! Repository generation commands: question-answer pairs and designs.

use super::{open_store, pipeline, print_report};
use clap::Args;
use locodata_core::{AppConfig, AppResult};
use locodata_pipeline::RunPlan;

/// Generate a question-answer pair for every chunk
#[derive(Args, Debug)]
pub struct GenerateQaCommand {
    /// Stop after this many tasks
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Print progress events to stderr
    #[arg(long)]
    pub progress: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl GenerateQaCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Generating QA pairs for {:?}", config.repo_path);

        let plan = RunPlan {
            qa: true,
            design: Vec::new(),
            limit: self.limit,
        };
        let pipeline = pipeline(config, self.progress)?;
        let mut store = open_store(config, "qa.jsonl")?;

        let report = pipeline.run(&config.repo_path, &plan, &mut store).await?;
        print_report(&report, self.json)
    }
}

/// Generate designs for feature requirements
#[derive(Args, Debug)]
pub struct DesignCommand {
    /// Feature requirement(s), one task each
    #[arg(required = true)]
    pub requirements: Vec<String>,

    /// Print progress events to stderr
    #[arg(long)]
    pub progress: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl DesignCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!(
            "Generating {} design(s) for {:?}",
            self.requirements.len(),
            config.repo_path
        );

        let plan = RunPlan::design(self.requirements.iter().cloned());
        let pipeline = pipeline(config, self.progress)?;
        let mut store = open_store(config, "design.jsonl")?;

        let report = pipeline.run(&config.repo_path, &plan, &mut store).await?;
        print_report(&report, self.json)
    }
}
