//! Configuration management for locodata.
//!
//! Configuration is merged from several sources, later sources winning:
//! - Built-in defaults
//! - Config file (`.locodata/config.yaml` under the project directory)
//! - Environment variables
//! - Command-line flags
//!
//! The pipeline settings (`PipelineConfig`) are plain values; the core crates
//! never read the environment themselves.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the backend factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 4] = ["ollama", "openai", "qwen", "mock"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Project directory (contains .locodata/ and, by default, artifacts/)
    pub project_dir: PathBuf,

    /// Repository to ingest
    pub repo_path: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider ("ollama", "openai", "qwen", "mock")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Custom provider endpoint
    pub endpoint: Option<String>,

    /// API key for the provider
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Prompt language ("en" or "cn")
    pub system_lang: String,

    /// Directory receiving artifact stores
    pub artifacts_dir: PathBuf,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Pipeline tuning
    pub pipeline: PipelineConfig,
}

/// Every value the pipeline consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub walker: WalkerConfig,
    pub chunking: ChunkingConfig,
    pub context: ContextConfig,
    pub generation: GenerationConfig,
}

/// Repository walker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WalkerConfig {
    /// Glob patterns a file must match (empty: any file with a known language)
    pub include: Vec<String>,

    /// Glob patterns that exclude a file
    pub exclude: Vec<String>,

    /// Files above this size are skipped and reported
    pub max_file_size: u64,

    /// Stop walking after this many files
    pub max_files: Option<usize>,

    /// Traverse symbolic links (each real path is still visited once)
    pub follow_symlinks: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_size: 1024 * 1024,
            max_files: None,
            follow_symlinks: true,
        }
    }
}

/// Chunk size budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkingConfig {
    pub max_lines: usize,
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: 80,
            max_chars: 4000,
        }
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextConfig {
    /// Maximum neighbor excerpts per bundle
    pub max_neighbors: usize,

    /// Maximum characters of a single neighbor excerpt
    pub excerpt_chars: usize,

    /// Total characters of chunk + excerpts + summary
    pub budget_chars: usize,

    /// Chunks considered for a design bundle
    pub design_top_k: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_neighbors: 4,
            excerpt_chars: 1200,
            budget_chars: 12_000,
            design_top_k: 8,
        }
    }
}

/// Backend call, retry and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Total attempts per backend call, first attempt included
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// Concurrent backend calls
    pub concurrency: usize,
    pub call_timeout_secs: u64,

    /// Whole-run deadline; cancels dispatch when reached
    pub run_timeout_secs: Option<u64>,

    /// How long in-flight tasks may finish after cancellation
    pub grace_timeout_secs: u64,

    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            concurrency: 4,
            call_timeout_secs: 120,
            run_timeout_secs: None,
            grace_timeout_secs: 10,
            max_output_tokens: 1024,
            temperature: 0.2,
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunking.max_lines == 0 || self.chunking.max_chars == 0 {
            return Err(AppError::Config(
                "chunking.maxLines and chunking.maxChars must be positive".to_string(),
            ));
        }
        if self.generation.max_attempts == 0 {
            return Err(AppError::Config(
                "generation.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.generation.concurrency == 0 {
            return Err(AppError::Config(
                "generation.concurrency must be at least 1".to_string(),
            ));
        }
        if self.generation.call_timeout_secs == 0 {
            return Err(AppError::Config(
                "generation.callTimeoutSecs must be positive".to_string(),
            ));
        }
        if self.context.budget_chars == 0 {
            return Err(AppError::Config(
                "context.budgetChars must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(AppError::Config(format!(
                "generation.temperature out of range: {}",
                self.generation.temperature
            )));
        }
        Ok(())
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    project: Option<ProjectSection>,
    llm: Option<LlmSection>,
    logging: Option<LoggingSection>,
    pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSection {
    repo_path: Option<String>,
    artifacts_dir: Option<String>,
    system_lang: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub repo_path: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub system_lang: Option<String>,
    pub concurrency: Option<usize>,
    pub log_level: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let project_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            repo_path: project_dir.clone(),
            artifacts_dir: project_dir.join("artifacts"),
            project_dir,
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key: None,
            api_key_env: None,
            system_lang: "en".to_string(),
            log_level: None,
            verbose: false,
            no_color: false,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and environment variables.
    ///
    /// Environment variables:
    /// - `LOCODATA_PROJECT_ROOT`: project directory
    /// - `LOCODATA_CONFIG`: path to config file
    /// - `LOCODATA_REPO`: repository to ingest (relative to the project directory)
    /// - `LOCODATA_PROVIDER`, `LOCODATA_MODEL`, `LOCODATA_ENDPOINT`, `LOCODATA_API_KEY`
    /// - `LOCODATA_SYSTEM_LANG`: prompt language (`en`, `cn`)
    /// - `LOCODATA_MAX_TOKENS`, `LOCODATA_TEMPERATURE`
    /// - `RUST_LOG`, `NO_COLOR`
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("LOCODATA_PROJECT_ROOT") {
            config.project_dir = PathBuf::from(root);
            config.repo_path = config.project_dir.clone();
            config.artifacts_dir = config.project_dir.join("artifacts");
        }

        if let Ok(config_file) = std::env::var("LOCODATA_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.project_dir.exists() {
            return Err(AppError::Config(format!(
                "Project directory does not exist: {:?}",
                config.project_dir
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.locodata_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;

        Ok(config)
    }

    /// Environment variables override the config file.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(repo) = std::env::var("LOCODATA_REPO") {
            self.repo_path = self.project_dir.join(repo);
        }
        if let Ok(provider) = std::env::var("LOCODATA_PROVIDER") {
            self.provider = provider;
        }
        if let Ok(model) = std::env::var("LOCODATA_MODEL") {
            self.model = model;
        }
        if let Ok(endpoint) = std::env::var("LOCODATA_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("LOCODATA_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(lang) = std::env::var("LOCODATA_SYSTEM_LANG") {
            self.system_lang = lang;
        }
        if let Ok(tokens) = std::env::var("LOCODATA_MAX_TOKENS") {
            self.pipeline.generation.max_output_tokens = tokens.parse().map_err(|e| {
                AppError::Config(format!("Invalid LOCODATA_MAX_TOKENS '{}': {}", tokens, e))
            })?;
        }
        if let Ok(temp) = std::env::var("LOCODATA_TEMPERATURE") {
            self.pipeline.generation.temperature = temp.parse().map_err(|e| {
                AppError::Config(format!("Invalid LOCODATA_TEMPERATURE '{}': {}", temp, e))
            })?;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }
        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
        Ok(())
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.merged_with(config_file))
    }

    fn merged_with(&self, config_file: ConfigFile) -> Self {
        let mut result = self.clone();

        if let Some(project) = config_file.project {
            if let Some(repo) = project.repo_path {
                result.repo_path = result.project_dir.join(repo);
            }
            if let Some(dir) = project.artifacts_dir {
                result.artifacts_dir = result.project_dir.join(dir);
            }
            if let Some(lang) = project.system_lang {
                result.system_lang = lang;
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
            if llm.api_key_env.is_some() {
                result.api_key_env = llm.api_key_env;
            }
        }

        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }

        result
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and the
    /// config file.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(project_dir) = overrides.project_dir {
            self.project_dir = project_dir;
        }
        if let Some(config_file) = overrides.config_file {
            self.config_file = Some(config_file);
        }
        if let Some(repo) = overrides.repo_path {
            self.repo_path = repo;
        }
        if let Some(provider) = overrides.provider {
            self.provider = provider;
        }
        if let Some(model) = overrides.model {
            self.model = model;
        }
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = Some(endpoint);
        }
        if let Some(lang) = overrides.system_lang {
            self.system_lang = lang;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.pipeline.generation.concurrency = concurrency;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = Some(log_level);
        }

        if overrides.verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .locodata directory.
    pub fn locodata_dir(&self) -> PathBuf {
        self.project_dir.join(".locodata")
    }

    /// Directory holding user prompt overrides.
    pub fn prompts_dir(&self) -> PathBuf {
        self.locodata_dir().join("prompts")
    }

    /// Ensure the artifacts directory exists.
    pub fn ensure_artifacts_dir(&self) -> AppResult<()> {
        if !self.artifacts_dir.exists() {
            std::fs::create_dir_all(&self.artifacts_dir).map_err(|e| {
                AppError::Config(format!(
                    "Failed to create artifacts directory {:?}: {}",
                    self.artifacts_dir, e
                ))
            })?;
        }
        Ok(())
    }

    /// Resolve the API key: explicit key first, then the configured variable,
    /// then the provider's conventional variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        let env_var = self
            .api_key_env
            .clone()
            .or_else(|| default_key_env(&self.provider).map(str::to_string))?;

        std::env::var(env_var).ok()
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.to_lowercase();

        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if matches!(provider.as_str(), "openai" | "qwen") && self.resolve_api_key().is_none() {
            return Err(AppError::Config(format!(
                "Provider '{}' requires an API key (LOCODATA_API_KEY or {})",
                self.provider,
                self.api_key_env
                    .as_deref()
                    .or_else(|| default_key_env(&provider))
                    .unwrap_or("an apiKeyEnv entry")
            )));
        }

        if !matches!(self.system_lang.as_str(), "en" | "cn") {
            return Err(AppError::Config(format!(
                "Unknown system language '{}'. Supported: en, cn",
                self.system_lang
            )));
        }

        self.pipeline.validate()
    }
}

fn default_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "qwen" => Some("DASHSCOPE_API_KEY"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.system_lang, "en");
        assert!(config.artifacts_dir.ends_with("artifacts"));
        assert!(!config.verbose);
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(ConfigOverrides {
            provider: Some("mock".to_string()),
            model: Some("test-model".to_string()),
            concurrency: Some(9),
            verbose: true,
            ..Default::default()
        });

        assert_eq!(config.provider, "mock");
        assert_eq!(config.model, "test-model");
        assert_eq!(config.pipeline.generation.concurrency, 9);
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_mock_and_ollama() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());
        config.provider = "mock".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = AppConfig::default();
        config.pipeline.chunking.max_lines = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.generation.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_merge_partial_pipeline() {
        let yaml = r#"
project:
  repoPath: src
  systemLang: cn
llm:
  provider: qwen
  model: qwen-turbo
  apiKeyEnv: MY_KEY
pipeline:
  chunking:
    maxLines: 30
  generation:
    concurrency: 2
"#;
        let file: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        let base = AppConfig::default();
        let merged = base.merged_with(file);

        assert_eq!(merged.provider, "qwen");
        assert_eq!(merged.model, "qwen-turbo");
        assert_eq!(merged.system_lang, "cn");
        assert_eq!(merged.api_key_env.as_deref(), Some("MY_KEY"));
        assert!(merged.repo_path.ends_with("src"));
        assert_eq!(merged.pipeline.chunking.max_lines, 30);
        assert_eq!(merged.pipeline.chunking.max_chars, 4000);
        assert_eq!(merged.pipeline.generation.concurrency, 2);
        assert_eq!(merged.pipeline.generation.max_attempts, 4);
    }

    #[test]
    fn test_merge_yaml_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "logging:\n  level: warn\n  color: false\n").unwrap();

        let merged = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(merged.log_level.as_deref(), Some("warn"));
        assert!(merged.no_color);
    }

    #[test]
    fn test_merge_yaml_invalid_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pipeline: [not, a, map]").unwrap();

        assert!(matches!(
            AppConfig::default().merge_yaml(&path),
            Err(AppError::Config(_))
        ));
    }
}
