//! CodeQA answering: one snippet, or a whole dataset split.

use super::{open_store, pipeline, print_report};
use clap::Args;
use locodata_core::{AppConfig, AppError, AppResult};
use locodata_pipeline::{Language, Payload};
use std::path::PathBuf;

/// Answer questions about a code snippet
#[derive(Args, Debug)]
pub struct AnswerCodeqaCommand {
    /// Code snippet, @path to read it from a file, or - for stdin
    pub code: String,

    /// Questions about the snippet, answered as one batch
    #[arg(required = true)]
    pub questions: Vec<String>,

    /// Language of the snippet (python, java, ...)
    #[arg(long)]
    pub language: Option<String>,

    /// Output the full results as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnswerCodeqaCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let code = match self.code.as_str() {
            "-" => std::io::read_to_string(std::io::stdin())?,
            other => match other.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)?,
                None => other.to_string(),
            },
        };
        let language = self
            .language
            .as_deref()
            .map(Language::from_name)
            .unwrap_or(Language::Unknown);

        let pipeline = pipeline(config, false)?;
        let results = pipeline
            .answer_questions(&code, &self.questions, language)
            .await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }

        let mut answered = 0;
        for (i, result) in results.iter().enumerate() {
            if results.len() > 1 {
                println!(
                    "--- Question {}: {} ---",
                    i + 1,
                    result.input.as_deref().unwrap_or_default()
                );
            }
            match &result.payload {
                Some(Payload::Answer { answer }) => {
                    answered += 1;
                    println!("{}", answer);
                    if !result.reasoning.is_empty() {
                        println!("\nReasoning:");
                        for (n, step) in result.reasoning.iter().enumerate() {
                            println!("  {}. {}", n + 1, step);
                        }
                    }
                }
                _ => println!(
                    "No answer: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                ),
            }
            if i + 1 < results.len() {
                println!();
            }
        }

        if answered == 0 {
            return Err(AppError::Other("No question was answered".to_string()));
        }
        Ok(())
    }
}

/// Answer every item of a CodeQA split directory
#[derive(Args, Debug)]
pub struct AnswerDatasetCommand {
    /// Split directory, e.g. data/python/test
    pub dir: PathBuf,

    /// Answer at most this many items
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Print progress events to stderr
    #[arg(long)]
    pub progress: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnswerDatasetCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Answering dataset split {:?}", self.dir);

        let pipeline = pipeline(config, self.progress)?;
        let mut store = open_store(config, "codeqa.jsonl")?;

        let report = pipeline
            .answer_dataset(&self.dir, self.limit, &mut store)
            .await?;
        print_report(&report, self.json)
    }
}
