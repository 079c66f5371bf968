//! Repository-to-dataset pipeline.
//!
//! Walks a repository, chunks every text file, attaches context, dispatches
//! generation tasks to a backend and appends the successful results to an
//! artifact store:
//!
//! ```text
//! RepoWalker -> Chunker -> ContextAssembler -> Orchestrator -> ArtifactStore
//! ```
//!
//! Only configuration errors abort a run. Every other failure is counted and
//! enumerated in the returned [`RunReport`].

pub mod chunk;
pub mod codeqa;
pub mod context;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod summary;
pub mod task;
pub mod walker;
pub mod writer;

#[cfg(test)]
mod tests;

pub use chunk::{Chunk, Chunker, Strategy};
pub use codeqa::{snippet_task, snippet_tasks, CodeqaDataset};
pub use context::{ContextAssembler, ContextBundle, NeighborExcerpt, Relation};
pub use orchestrator::{BatchOutcome, Orchestrator, OrchestratorSettings, RetryPolicy};
pub use progress::{Phase, ProgressCallback, ProgressEvent, ProgressReporter};
pub use report::{FailureEntry, RunReport, SkipReason, SkippedFile, Stage};
pub use summary::{RepoSummary, SummaryBuilder};
pub use task::{GenerationResult, GenerationTask, Payload, Provenance, TaskKind, TaskState};
pub use walker::{Language, RepoWalker, SourceFile};
pub use writer::{ArtifactRecord, ArtifactStore, JsonlArtifactStore, MemoryArtifactStore};

use locodata_core::{AppConfig, AppError, AppResult, PipelineConfig};
use locodata_llm::{create_client, LlmClient};
use locodata_prompt::{PromptLibrary, SystemLang};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What to generate in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPlan {
    /// One `qa` task per chunk
    pub qa: bool,

    /// One `design` task per requirement
    pub design: Vec<String>,

    /// Cap on planned tasks
    pub limit: Option<usize>,
}

impl RunPlan {
    pub fn qa() -> Self {
        Self {
            qa: true,
            ..Default::default()
        }
    }

    pub fn design(requirements: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            design: requirements.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Store file used by [`run`] for this plan.
    pub fn store_file(&self) -> &'static str {
        match (self.qa, self.design.is_empty()) {
            (true, true) => "qa.jsonl",
            (false, _) => "design.jsonl",
            (true, false) => "dataset.jsonl",
        }
    }
}

/// A configured pipeline: backend, prompts, progress and cancellation.
pub struct Pipeline {
    config: PipelineConfig,
    backend: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    settings: OrchestratorSettings,
    progress: ProgressReporter,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn LlmClient>,
        prompts: PromptLibrary,
        model: impl Into<String>,
        lang: SystemLang,
    ) -> AppResult<Self> {
        config.validate()?;
        let settings = OrchestratorSettings::from_config(model, lang, &config.generation);
        Ok(Self {
            config,
            backend,
            prompts: Arc::new(prompts),
            settings,
            progress: ProgressReporter::noop(),
            cancel: CancellationToken::new(),
        })
    }

    /// Build the backend and prompt library named by `config`.
    pub fn from_app_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let lang = SystemLang::parse(&config.system_lang).ok_or_else(|| {
            AppError::Config(format!("Unknown system language '{}'", config.system_lang))
        })?;
        let api_key = config.resolve_api_key();
        let backend = create_client(
            &config.provider,
            config.endpoint.as_deref(),
            api_key.as_deref(),
            Duration::from_secs(config.pipeline.generation.call_timeout_secs),
        )?;
        let prompts = PromptLibrary::load(&config.prompts_dir())?;

        Self::new(config.pipeline.clone(), backend, prompts, config.model.clone(), lang)
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops dispatch for every run of this pipeline.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.prompts),
            self.settings.clone(),
        )
    }

    /// Walk, chunk and generate over `repo_root`, appending to `store`.
    pub async fn run(
        &self,
        repo_root: &Path,
        plan: &RunPlan,
        store: &mut dyn ArtifactStore,
    ) -> AppResult<RunReport> {
        let span = tracing::info_span!(
            "run",
            root = %repo_root.display(),
            qa = plan.qa,
            designs = plan.design.len(),
        );
        self.run_inner(repo_root, plan, store).instrument(span).await
    }

    async fn run_inner(
        &self,
        repo_root: &Path,
        plan: &RunPlan,
        store: &mut dyn ArtifactStore,
    ) -> AppResult<RunReport> {
        let started = Instant::now();
        let walker = RepoWalker::new(repo_root, &self.config.walker)?;
        let chunker = Chunker::new(&self.config.chunking)?;
        let mut report = RunReport::default();

        let name = repo_root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| repo_root.display().to_string());
        let mut summary = SummaryBuilder::new(name);
        let mut chunks = Vec::new();

        tracing::info!("Walking repository");
        let mut walk = walker.walk();
        let mut files = 0u64;
        for file in walk.by_ref() {
            files += 1;
            self.progress.walk(files, &file.path);
            summary.observe(&file);

            match chunker.chunk_file(&file) {
                Ok(file_chunks) => {
                    report.chunks_produced += file_chunks.len();
                    report.chunks_oversized += file_chunks.iter().filter(|c| c.oversized).count();
                    self.progress.chunk(files, None, file_chunks.len());
                    chunks.extend(file_chunks);
                }
                Err(e) => {
                    tracing::warn!(path = %file.path, error = %e, "Chunking failed, skipping file");
                    report.files_chunk_failed += 1;
                    report.record_failure(Stage::Chunk, file.path.clone(), &e);
                }
            }

            if self.cancel.is_cancelled() {
                tracing::info!("Cancelled during walk");
                break;
            }
        }

        let stats = walk.into_stats();
        report.files_walked = stats.files_walked;
        report.files_skipped_binary = stats.skipped_binary;
        report.files_skipped_oversize = stats.skipped_oversize;
        report.files_skipped_unreadable = stats.skipped_unreadable;
        report.file_limit_reached = stats.limit_reached;
        report.skipped = stats.skipped;
        report.failures.extend(stats.failures);

        tracing::info!(
            files = report.files_walked,
            chunks = report.chunks_produced,
            "Repository chunked"
        );

        let assembler = ContextAssembler::new(self.config.context.clone(), chunks, summary.finish());
        let tasks = plan_tasks(&assembler, plan, &mut report);

        self.execute(tasks, store, &mut report).await;
        report.duration_secs = started.elapsed().as_secs_f64();

        tracing::info!(
            succeeded = report.tasks_succeeded,
            failed = report.tasks_failed,
            deduplicated = report.tasks_deduplicated,
            duration_secs = report.duration_secs,
            "Run complete"
        );
        Ok(report)
    }

    /// Answer every item of a CodeQA split directory.
    pub async fn answer_dataset(
        &self,
        dir: &Path,
        limit: Option<usize>,
        store: &mut dyn ArtifactStore,
    ) -> AppResult<RunReport> {
        let span = tracing::info_span!("run", dataset = %dir.display());
        self.answer_dataset_inner(dir, limit, store)
            .instrument(span)
            .await
    }

    async fn answer_dataset_inner(
        &self,
        dir: &Path,
        limit: Option<usize>,
        store: &mut dyn ArtifactStore,
    ) -> AppResult<RunReport> {
        let started = Instant::now();
        let dataset = CodeqaDataset::load(dir, limit)?;
        let mut report = RunReport::default();

        self.execute(dataset.tasks(), store, &mut report).await;
        report.duration_secs = started.elapsed().as_secs_f64();

        tracing::info!(
            succeeded = report.tasks_succeeded,
            failed = report.tasks_failed,
            "Dataset answered"
        );
        Ok(report)
    }

    /// Answer one code/question pair; nothing is persisted.
    pub async fn answer_snippet(&self, code: &str, question: &str, language: Language) -> GenerationResult {
        let task = snippet_task(code, question, language);
        self.orchestrator().execute(&task).await
    }

    /// Answer several questions about one snippet as a single batch; nothing
    /// is persisted. Results come back in question order.
    pub async fn answer_questions(
        &self,
        code: &str,
        questions: &[String],
        language: Language,
    ) -> Vec<GenerationResult> {
        let tasks = snippet_tasks(code, questions, language);
        let span = tracing::info_span!("run", snippet_questions = tasks.len());
        let mut scratch = MemoryArtifactStore::new();

        let outcome = self
            .orchestrator()
            .run_batch(tasks, &self.cancel, &mut scratch, &self.progress)
            .instrument(span)
            .await;

        let mut results = outcome.results;
        results.sort_by_key(|r| r.extra["questionIndex"].as_u64().unwrap_or(u64::MAX));
        results
    }

    /// Dispatch `tasks`, resuming from keys already in `store`.
    async fn execute(
        &self,
        tasks: Vec<GenerationTask>,
        store: &mut dyn ArtifactStore,
        report: &mut RunReport,
    ) {
        let orchestrator = self.orchestrator();
        match store.list_existing_keys() {
            Ok(keys) => {
                if !keys.is_empty() {
                    tracing::info!(records = keys.len(), "Resuming, existing records are skipped");
                }
                orchestrator.preload_keys(keys);
            }
            Err(e) => tracing::warn!(error = %e, "Could not read existing records, not resuming"),
        }

        let cancel = self.cancel.child_token();
        let timer = self.config.generation.run_timeout_secs.map(|secs| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                tracing::warn!(timeout_secs = secs, "Run timeout reached, cancelling");
                cancel.cancel();
            })
        });

        tracing::info!(tasks = tasks.len(), "Dispatching generation tasks");
        let outcome = orchestrator
            .run_batch(tasks, &cancel, store, &self.progress)
            .await;
        if let Some(timer) = timer {
            timer.abort();
        }
        outcome.merge_into(report);
    }
}

/// Turn a plan into tasks, recording tasks that could not be built.
fn plan_tasks(assembler: &ContextAssembler, plan: &RunPlan, report: &mut RunReport) -> Vec<GenerationTask> {
    let mut tasks = Vec::new();

    if plan.qa {
        for (index, chunk) in assembler.chunks().iter().enumerate() {
            match assembler.bundle(index) {
                Ok(bundle) => tasks.push(GenerationTask::qa(bundle)),
                Err(e) => {
                    report.tasks_planned += 1;
                    report.tasks_failed += 1;
                    report.record_failure(Stage::Generate, chunk.location(), &e);
                }
            }
        }
    }

    for requirement in &plan.design {
        match assembler.design_bundle(requirement) {
            Ok(bundle) => tasks.push(GenerationTask::design(bundle, requirement.clone())),
            Err(e) => {
                tracing::warn!(requirement = %requirement, error = %e, "Cannot plan design task");
                report.tasks_planned += 1;
                report.tasks_failed += 1;
                report.record_failure(Stage::Generate, format!("design: {}", requirement), &e);
            }
        }
    }

    if let Some(limit) = plan.limit {
        tasks.truncate(limit);
    }
    tasks
}

/// Run `plan` over `repo_root` with the backend and store named by `config`.
///
/// Records go to `<artifacts_dir>/<plan.store_file()>`; keys already there
/// are not generated again.
pub async fn run(repo_root: &Path, config: &AppConfig, plan: RunPlan) -> AppResult<RunReport> {
    let pipeline = Pipeline::from_app_config(config)?;
    config.ensure_artifacts_dir()?;
    let mut store = JsonlArtifactStore::open(config.artifacts_dir.join(plan.store_file()))?;
    pipeline.run(repo_root, &plan, &mut store).await
}
