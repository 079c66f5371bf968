//! Generation orchestration.
//!
//! Each task runs inside its own failure boundary: backend errors, timeouts
//! and invalid output become a failed `GenerationResult`, never an error of
//! the batch. Dispatch is bounded by a semaphore; results are collected by a
//! single loop that also appends records, so writes are serialized.

mod dedup;
mod retry;
mod validate;

pub use dedup::{Claim, DedupIndex, Settled};
pub use retry::RetryPolicy;
pub use validate::{extract_json, validate, ParsedOutput};

use crate::context::NeighborExcerpt;
use crate::progress::ProgressReporter;
use crate::report::{FailureEntry, RunReport, Stage};
use crate::task::{GenerationResult, GenerationTask, TaskKind, TaskState};
use crate::writer::{ArtifactRecord, ArtifactStore};
use dedup::wait_settled;
use locodata_core::{AppError, AppResult, GenerationConfig};
use locodata_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use locodata_prompt::{build_prompt, build_repair_prompt, BuiltPrompt, PromptLibrary, SystemLang};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Knobs for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub lang: SystemLang,
    pub max_tokens: u32,
    pub temperature: f32,
    pub call_timeout: Duration,
    pub grace_timeout: Duration,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl OrchestratorSettings {
    pub fn from_config(model: impl Into<String>, lang: SystemLang, config: &GenerationConfig) -> Self {
        Self {
            model: model.into(),
            lang,
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            grace_timeout: Duration::from_secs(config.grace_timeout_secs),
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Template variables shared by every task prompt.
#[derive(Debug, Serialize)]
struct PromptVars<'a> {
    path: &'a str,
    language: &'a str,
    start_line: usize,
    end_line: usize,
    symbol: Option<&'a str>,
    signature: Option<&'a str>,
    code: &'a str,
    neighbors: &'a [NeighborExcerpt],
    summary: Option<String>,
    requirement: Option<&'a str>,
    question: Option<&'a str>,
}

/// Runs single tasks: prompt, call with retries, validate, repair once.
struct Executor {
    backend: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    settings: OrchestratorSettings,
}

fn transition(from: TaskState, to: TaskState) {
    tracing::debug!(from = ?from, to = ?to, "Task state");
}

fn check_input(task: &GenerationTask) -> AppResult<()> {
    if task.bundle.chunk.text.trim().is_empty() {
        return Err(AppError::Validation(
            "invalid task input: empty code".to_string(),
        ));
    }
    let needs = match task.kind {
        TaskKind::Qa => return Ok(()),
        TaskKind::Design => "requirement",
        TaskKind::CodeqaAnswer => "question",
    };
    match task.input.as_deref().map(str::trim) {
        Some(input) if !input.is_empty() => Ok(()),
        _ => Err(AppError::Validation(format!(
            "invalid task input: {} needs a non-empty {}",
            task.kind, needs
        ))),
    }
}

impl Executor {
    async fn execute(&self, task: &GenerationTask) -> GenerationResult {
        let short_key = &task.key[..task.key.len().min(12)];
        let span = tracing::info_span!(
            "task",
            key = %short_key,
            kind = %task.kind,
            location = %task.bundle.chunk.location(),
        );
        self.execute_inner(task).instrument(span).await
    }

    async fn execute_inner(&self, task: &GenerationTask) -> GenerationResult {
        let prompt = match check_input(task).and_then(|_| self.build(task)) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(error = %e, "Task rejected before dispatch");
                transition(TaskState::Pending, TaskState::Failed);
                return GenerationResult::failed(task, &e, 0, LlmUsage::default());
            }
        };

        transition(TaskState::Pending, TaskState::InFlight);
        let (outcome, mut attempts) = self.call_with_retry(task.kind, &prompt).await;
        let response = match outcome {
            Ok(response) => response,
            Err(e) => return self.fail(task, &e, attempts, LlmUsage::default()),
        };
        let mut usage = response.usage;

        let problem = match validate(task.kind, &response) {
            Ok(parsed) => return self.succeed(task, parsed, attempts, usage, response.model),
            Err(problem) => problem,
        };

        tracing::warn!(error = %problem, "Output rejected, sending repair prompt");
        let repair = match self
            .prompts
            .get("repair")
            .and_then(|def| build_repair_prompt(def, &prompt, &response.content, &problem.to_string()))
        {
            Ok(repair) => repair,
            Err(e) => return self.fail(task, &e, attempts, usage),
        };

        transition(TaskState::InFlight, TaskState::Retrying);
        transition(TaskState::Retrying, TaskState::InFlight);
        let (outcome, repair_attempts) = self.call_with_retry(task.kind, &repair).await;
        attempts += repair_attempts;
        let response = match outcome {
            Ok(response) => response,
            Err(e) => return self.fail(task, &e, attempts, usage),
        };
        usage = usage.add(response.usage);

        match validate(task.kind, &response) {
            Ok(parsed) => self.succeed(task, parsed, attempts, usage, response.model),
            Err(e) => self.fail(task, &e, attempts, usage),
        }
    }

    fn succeed(
        &self,
        task: &GenerationTask,
        parsed: ParsedOutput,
        attempts: u32,
        usage: LlmUsage,
        model: String,
    ) -> GenerationResult {
        transition(TaskState::InFlight, TaskState::Succeeded);
        tracing::debug!(attempts, tokens = usage.total_tokens, "Task succeeded");
        GenerationResult::succeeded(task, parsed.payload, parsed.reasoning, attempts, usage, model)
    }

    fn fail(&self, task: &GenerationTask, error: &AppError, attempts: u32, usage: LlmUsage) -> GenerationResult {
        transition(TaskState::InFlight, TaskState::Failed);
        tracing::warn!(attempts, error = %error, "Task failed");
        GenerationResult::failed(task, error, attempts, usage)
    }

    fn build(&self, task: &GenerationTask) -> AppResult<BuiltPrompt> {
        let chunk = &task.bundle.chunk;
        let vars = PromptVars {
            path: &chunk.path,
            language: chunk.language.as_str(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            symbol: chunk.symbol.as_deref(),
            signature: chunk.signature.as_deref(),
            code: &chunk.text,
            neighbors: &task.bundle.neighbors,
            summary: task.bundle.rendered_summary(),
            requirement: matches!(task.kind, TaskKind::Design)
                .then_some(task.input.as_deref())
                .flatten(),
            question: matches!(task.kind, TaskKind::CodeqaAnswer)
                .then_some(task.input.as_deref())
                .flatten(),
        };

        let definition = self.prompts.get(task.kind.prompt_id())?;
        build_prompt(definition, self.settings.lang, &vars)
    }

    fn request(&self, kind: TaskKind, prompt: &BuiltPrompt) -> LlmRequest {
        let mut request = LlmRequest::new(prompt.user.clone(), self.settings.model.clone())
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
            .with_task_kind(kind.prompt_id());
        if let Some(system) = &prompt.system {
            request = request.with_system(system.clone());
        }
        if prompt.metadata.expects_json {
            request = request.with_json_mode();
        }
        request
    }

    /// One logical call: the first attempt plus transient retries.
    async fn call_with_retry(&self, kind: TaskKind, prompt: &BuiltPrompt) -> (AppResult<LlmResponse>, u32) {
        let request = self.request(kind, prompt);
        let policy = self.settings.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome =
                match tokio::time::timeout(self.settings.call_timeout, self.backend.complete(&request))
                    .await
                {
                    Ok(Ok(response)) if !response.done => Err(AppError::BackendTransient(
                        "response ended before completion".to_string(),
                    )),
                    Ok(outcome) => outcome,
                    Err(_) => Err(AppError::BackendTransient(format!(
                        "call timed out after {}s",
                        self.settings.call_timeout.as_secs()
                    ))),
                };

            match outcome {
                Err(e) if e.is_transient() && policy.allows_retry(attempt) => {
                    let delay = policy.delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient backend failure, retrying"
                    );
                    transition(TaskState::InFlight, TaskState::Retrying);
                    tokio::time::sleep(delay).await;
                    transition(TaskState::Retrying, TaskState::InFlight);
                }
                other => return (other, attempt),
            }
        }
    }
}

/// What a spawned task hands back to the collector.
#[derive(Debug)]
struct TaskOutcome {
    seq: usize,
    result: GenerationResult,
    /// The task executed the backend call itself (it owned its key)
    owner: bool,
    /// A duplicate that became owner after the first owner let go
    took_over: bool,
}

/// Counts and results of one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub planned: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deduplicated: usize,
    pub abandoned: usize,
    pub not_dispatched: usize,
    pub writer_failures: usize,
    pub cancelled: bool,
    pub failures: Vec<FailureEntry>,
    /// Every settled result, in completion order
    pub results: Vec<GenerationResult>,
}

impl BatchOutcome {
    /// Every planned task is counted exactly once.
    pub fn accounted(&self) -> usize {
        self.succeeded + self.failed + self.deduplicated + self.abandoned + self.not_dispatched
    }

    /// Add the counts to a run report.
    pub fn merge_into(self, report: &mut RunReport) {
        report.tasks_planned += self.planned;
        report.tasks_dispatched += self.dispatched;
        report.tasks_succeeded += self.succeeded;
        report.tasks_failed += self.failed;
        report.tasks_deduplicated += self.deduplicated;
        report.tasks_abandoned += self.abandoned;
        report.tasks_not_dispatched += self.not_dispatched;
        report.writer_failures += self.writer_failures;
        report.cancelled |= self.cancelled;
        report.failures.extend(self.failures);
    }
}

/// The single consumer of task outcomes.
struct Collector<'a> {
    store: &'a mut dyn ArtifactStore,
    index: &'a DedupIndex,
    progress: &'a ProgressReporter,
    /// Spawned but not yet collected, seq to key
    outstanding: HashMap<usize, String>,
    /// Join-set task id to seq, so a panicked task can still be settled
    spawned: HashMap<Id, usize>,
    outcome: BatchOutcome,
}

impl Collector<'_> {
    fn joined(&mut self, joined: Result<TaskOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.settle(outcome),
            Err(e) if e.is_panic() => {
                tracing::error!(error = %e, "Generation task panicked");
                let seq = self.spawned.remove(&e.id());
                if let Some(key) = seq.and_then(|seq| self.outstanding.remove(&seq)) {
                    // waiters on this key would otherwise never wake
                    self.index.release(&key);
                    self.panicked(key);
                }
            }
            Err(_) => {}
        }
    }

    fn panicked(&mut self, key: String) {
        self.outcome.failed += 1;
        self.outcome.failures.push(FailureEntry {
            stage: Stage::Generate,
            subject: key,
            kind: "other".to_string(),
            detail: "generation task panicked".to_string(),
        });
    }

    fn settle(&mut self, outcome: TaskOutcome) {
        self.outstanding.remove(&outcome.seq);
        let TaskOutcome {
            mut result,
            owner,
            took_over,
            ..
        } = outcome;
        if took_over {
            self.outcome.dispatched += 1;
        }

        match result.state {
            TaskState::Succeeded => {
                match ArtifactRecord::from_result(&result).and_then(|r| self.store.append(&r)) {
                    Ok(record_id) => {
                        self.outcome.succeeded += 1;
                        self.progress.write(self.outcome.succeeded as u64, &record_id);
                        self.index.succeed(result.clone());
                    }
                    Err(e) => {
                        tracing::error!(key = %result.key, error = %e, "Failed to persist result");
                        self.outcome.writer_failures += 1;
                        self.index.release(&result.key);
                        result = result.into_failed(&e);
                        self.fail(&result, Stage::Write);
                    }
                }
            }
            TaskState::Deduplicated => {
                tracing::debug!(key = %result.key, "Task deduplicated");
                self.outcome.deduplicated += 1;
            }
            _ => {
                if owner {
                    self.index.release(&result.key);
                }
                self.fail(&result, Stage::Generate);
            }
        }

        let settled = self.outcome.accounted() as u64;
        self.progress.generate(
            settled,
            self.outcome.planned as u64,
            &format!("{:?} {}", result.state, result.provenance.path),
        );
        self.outcome.results.push(result);
    }

    fn fail(&mut self, result: &GenerationResult, stage: Stage) {
        self.outcome.failed += 1;
        self.outcome.failures.push(FailureEntry {
            stage,
            subject: format!(
                "{}:{}-{} [{}]",
                result.provenance.path,
                result.provenance.start_line,
                result.provenance.end_line,
                result.kind
            ),
            kind: result.error_kind.clone().unwrap_or_else(|| "other".to_string()),
            detail: result.error.clone().unwrap_or_default(),
        });
    }
}

/// Dispatches tasks to a backend with bounded concurrency.
pub struct Orchestrator {
    executor: Arc<Executor>,
    index: Arc<DedupIndex>,
    semaphore: Arc<Semaphore>,
    grace_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        settings: OrchestratorSettings,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        let grace_timeout = settings.grace_timeout;
        Self {
            executor: Arc::new(Executor {
                backend,
                prompts,
                settings,
            }),
            index: Arc::new(DedupIndex::new()),
            semaphore,
            grace_timeout,
        }
    }

    pub fn dedup_index(&self) -> &DedupIndex {
        &self.index
    }

    /// Treat keys already in the artifact store as done.
    pub fn preload_keys(&self, keys: HashSet<String>) {
        self.index.preload(keys);
    }

    /// Run one task outside any batch, without deduplication.
    pub async fn execute(&self, task: &GenerationTask) -> GenerationResult {
        self.executor.execute(task).await
    }

    /// Run `tasks` in order with at most `concurrency` in flight.
    ///
    /// Cancelling `cancel` stops dispatch at once. In-flight tasks get the
    /// grace timeout to finish; the rest are aborted, counted as abandoned
    /// and never written.
    pub async fn run_batch(
        &self,
        tasks: Vec<GenerationTask>,
        cancel: &CancellationToken,
        store: &mut dyn ArtifactStore,
        progress: &ProgressReporter,
    ) -> BatchOutcome {
        let mut collector = Collector {
            store,
            index: &self.index,
            progress,
            outstanding: HashMap::new(),
            spawned: HashMap::new(),
            outcome: BatchOutcome {
                planned: tasks.len(),
                ..Default::default()
            },
        };

        let mut queue = tasks.into_iter().enumerate();
        let mut next = queue.next();
        let mut set: JoinSet<TaskOutcome> = JoinSet::new();

        loop {
            if cancel.is_cancelled() || (next.is_none() && set.is_empty()) {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = set.join_next(), if !set.is_empty() => collector.joined(joined),
                permit = Arc::clone(&self.semaphore).acquire_owned(), if next.is_some() => {
                    let Ok(permit) = permit else { break };
                    if let Some((seq, task)) = next.take() {
                        self.dispatch(&mut set, &mut collector, seq, task, permit);
                    }
                    next = queue.next();
                }
                else => break,
            }
        }

        if cancel.is_cancelled() {
            collector.outcome.cancelled = true;
            collector.outcome.not_dispatched = usize::from(next.is_some()) + queue.len();
            tracing::info!(
                in_flight = set.len(),
                not_dispatched = collector.outcome.not_dispatched,
                grace_secs = self.grace_timeout.as_secs(),
                "Dispatch cancelled, waiting for in-flight tasks"
            );

            let drained = tokio::time::timeout(self.grace_timeout, async {
                while let Some(joined) = set.join_next().await {
                    collector.joined(joined);
                }
            })
            .await;

            if drained.is_err() {
                set.abort_all();
                while let Some(joined) = set.join_next().await {
                    collector.joined(joined);
                }
            }
        }

        let cancelled = collector.outcome.cancelled;
        let leftovers: Vec<String> = collector.outstanding.drain().map(|(_, key)| key).collect();
        for key in leftovers {
            self.index.release(&key);
            if cancelled {
                tracing::warn!(key = %key, "Task abandoned after grace timeout");
                collector.outcome.abandoned += 1;
            } else {
                collector.panicked(key);
            }
        }

        collector.outcome
    }

    fn dispatch(
        &self,
        set: &mut JoinSet<TaskOutcome>,
        collector: &mut Collector<'_>,
        seq: usize,
        task: GenerationTask,
        permit: OwnedSemaphorePermit,
    ) {
        match self.index.claim(&task.key) {
            Claim::Owner => {
                collector.outcome.dispatched += 1;
                collector.outstanding.insert(seq, task.key.clone());
                let executor = Arc::clone(&self.executor);
                let handle = set.spawn(async move {
                    let result = executor.execute(&task).await;
                    drop(permit);
                    TaskOutcome {
                        seq,
                        result,
                        owner: true,
                        took_over: false,
                    }
                });
                collector.spawned.insert(handle.id(), seq);
            }
            Claim::Wait(receiver) => {
                drop(permit);
                collector.outstanding.insert(seq, task.key.clone());
                let handle = set.spawn(wait_then_run(
                    Arc::clone(&self.executor),
                    Arc::clone(&self.index),
                    Arc::clone(&self.semaphore),
                    seq,
                    task,
                    receiver,
                ));
                collector.spawned.insert(handle.id(), seq);
            }
            Claim::Done(prior) => {
                drop(permit);
                let result = GenerationResult::deduplicated(&task, prior.as_deref());
                collector.settle(TaskOutcome {
                    seq,
                    result,
                    owner: false,
                    took_over: false,
                });
            }
        }
    }
}

/// A duplicate waits for the owner of its key; if the owner gives the key
/// up, the duplicate claims it and runs itself.
async fn wait_then_run(
    executor: Arc<Executor>,
    index: Arc<DedupIndex>,
    semaphore: Arc<Semaphore>,
    seq: usize,
    task: GenerationTask,
    receiver: tokio::sync::watch::Receiver<Settled>,
) -> TaskOutcome {
    let mut receiver = Some(receiver);
    loop {
        let waiting = match receiver.take() {
            Some(waiting) => waiting,
            None => match index.claim(&task.key) {
                Claim::Wait(waiting) => waiting,
                Claim::Done(prior) => {
                    return TaskOutcome {
                        seq,
                        result: GenerationResult::deduplicated(&task, prior.as_deref()),
                        owner: false,
                        took_over: false,
                    }
                }
                Claim::Owner => {
                    tracing::debug!(key = %task.key, "Taking over released key");
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => executor.execute(&task).await,
                        Err(e) => GenerationResult::failed(
                            &task,
                            &AppError::Other(format!("dispatch pool closed: {}", e)),
                            0,
                            LlmUsage::default(),
                        ),
                    };
                    return TaskOutcome {
                        seq,
                        result,
                        owner: true,
                        took_over: true,
                    };
                }
            },
        };

        if let Some(prior) = wait_settled(waiting).await {
            return TaskOutcome {
                seq,
                result: GenerationResult::deduplicated(&task, Some(prior.as_ref())),
                owner: false,
                took_over: false,
            };
        }
    }
}
