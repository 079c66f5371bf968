//! Locodata CLI
//!
//! Main entry point for the locodata command-line tool.
//! Turns a repository into question-answer, design and CodeQA datasets.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    AnswerCodeqaCommand, AnswerDatasetCommand, DesignCommand, ExportCommand, GenerateQaCommand,
    ScanCommand,
};
use locodata_core::{
    logging::{self, LogFormat},
    AppConfig, AppResult, ConfigOverrides,
};
use std::path::PathBuf;
use tracing::Instrument;

/// Locodata - repository-grounded dataset generation
#[derive(Parser, Debug)]
#[command(name = "locodata")]
#[command(about = "Generate training data from a code repository", long_about = None)]
#[command(version)]
struct Cli {
    /// Project directory holding .locodata/ (default: current directory)
    #[arg(short = 'd', long, global = true, env = "LOCODATA_PROJECT_ROOT")]
    project_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "LOCODATA_CONFIG")]
    config: Option<PathBuf>,

    /// Repository to ingest (default: the project directory)
    #[arg(short, long, global = true)]
    repo: Option<PathBuf>,

    /// Generation provider (ollama, openai, qwen, mock)
    #[arg(short, long, global = true, env = "LOCODATA_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "LOCODATA_MODEL")]
    model: Option<String>,

    /// Custom provider endpoint
    #[arg(long, global = true, env = "LOCODATA_ENDPOINT")]
    endpoint: Option<String>,

    /// Prompt language (en, cn)
    #[arg(long, global = true, env = "LOCODATA_SYSTEM_LANG")]
    lang: Option<String>,

    /// Concurrent backend calls
    #[arg(short = 'j', long, global = true)]
    concurrency: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk and chunk the repository without generating anything
    Scan(ScanCommand),

    /// Generate a question-answer pair for every chunk
    GenerateQa(GenerateQaCommand),

    /// Generate designs for feature requirements grounded in the repository
    Design(DesignCommand),

    /// Answer questions about a code snippet
    AnswerCodeqa(AnswerCodeqaCommand),

    /// Answer every item of a CodeQA split directory
    AnswerCodeqaDataset(AnswerDatasetCommand),

    /// Convert a JSONL artifact store to a JSON array
    Export(ExportCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from file and environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(ConfigOverrides {
        project_dir: cli.project_dir,
        config_file: cli.config,
        repo_path: cli.repo,
        provider: cli.provider,
        model: cli.model,
        endpoint: cli.endpoint,
        system_lang: cli.lang,
        concurrency: cli.concurrency,
        log_level: cli.log_level,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("Locodata CLI starting");
    tracing::debug!("Project: {:?}", config.project_dir);
    tracing::debug!("Repository: {:?}", config.repo_path);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    let command_name = match &cli.command {
        Commands::Scan(_) => "scan",
        Commands::GenerateQa(_) => "generate-qa",
        Commands::Design(_) => "design",
        Commands::AnswerCodeqa(_) => "answer-codeqa",
        Commands::AnswerCodeqaDataset(_) => "answer-codeqa-dataset",
        Commands::Export(_) => "export",
    };
    let span = tracing::info_span!("command", name = command_name);

    let result = async {
        match cli.command {
            Commands::Scan(cmd) => cmd.execute(&config),
            Commands::GenerateQa(cmd) => cmd.execute(&config).await,
            Commands::Design(cmd) => cmd.execute(&config).await,
            Commands::AnswerCodeqa(cmd) => cmd.execute(&config).await,
            Commands::AnswerCodeqaDataset(cmd) => cmd.execute(&config).await,
            Commands::Export(cmd) => cmd.execute(&config),
        }
    }
    .instrument(span.clone())
    .await;

    span.in_scope(|| match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    });

    result
}
