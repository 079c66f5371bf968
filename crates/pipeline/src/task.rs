//! Generation tasks and their results.

use crate::chunk::Chunk;
use crate::context::ContextBundle;
use crate::walker::Language;
use locodata_core::AppError;
use locodata_llm::LlmUsage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a task asks the backend to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Qa,
    Design,
    CodeqaAnswer,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Qa => "qa",
            TaskKind::Design => "design",
            TaskKind::CodeqaAnswer => "codeqa-answer",
        }
    }

    /// Id of the prompt definition that drives this kind.
    pub fn prompt_id(&self) -> &'static str {
        match self {
            TaskKind::Qa => "qa",
            TaskKind::Design => "design",
            TaskKind::CodeqaAnswer => "codeqa",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic task key over chunk id, kind and input.
pub fn task_key(chunk_id: &str, kind: TaskKind, input: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    if let Some(input) = input {
        hasher.update(input.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// One unit of generation work.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub key: String,
    pub kind: TaskKind,
    pub bundle: ContextBundle,
    /// Question for `codeqa-answer`, requirement for `design`
    pub input: Option<String>,
    /// Carried into the record unchanged
    pub extra: serde_json::Value,
}

impl GenerationTask {
    pub fn new(kind: TaskKind, bundle: ContextBundle, input: Option<String>) -> Self {
        let key = task_key(&bundle.chunk.id, kind, input.as_deref());
        Self {
            key,
            kind,
            bundle,
            input,
            extra: serde_json::Value::Null,
        }
    }

    pub fn qa(bundle: ContextBundle) -> Self {
        Self::new(TaskKind::Qa, bundle, None)
    }

    pub fn design(bundle: ContextBundle, requirement: impl Into<String>) -> Self {
        Self::new(TaskKind::Design, bundle, Some(requirement.into()))
    }

    pub fn codeqa(bundle: ContextBundle, question: impl Into<String>) -> Self {
        Self::new(TaskKind::CodeqaAnswer, bundle, Some(question.into()))
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

/// Lifecycle of a task.
///
/// `pending -> in_flight -> {succeeded | retrying -> in_flight | failed}`;
/// the orchestrator may also settle a task as deduplicated, abandoned or
/// not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InFlight,
    Retrying,
    Succeeded,
    Failed,
    Deduplicated,
    Abandoned,
    NotDispatched,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::InFlight | TaskState::Retrying)
    }
}

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub chunk_ordinal: usize,
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub language: Language,
}

impl From<&Chunk> for Provenance {
    fn from(chunk: &Chunk) -> Self {
        Self {
            path: chunk.path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            start_byte: chunk.start_byte,
            end_byte: chunk.end_byte,
            chunk_ordinal: chunk.ordinal,
            chunk_id: chunk.id.clone(),
            symbol: chunk.symbol.clone(),
            language: chunk.language,
        }
    }
}

/// Validated output of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Qa { question: String, answer: String },
    Design { design: String },
    Answer { answer: String },
}

/// Outcome of one task, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub key: String,
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub reasoning: Vec<String>,
    pub provenance: Provenance,
    pub context_chunk_ids: Vec<String>,
    pub state: TaskState,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    #[serde(default)]
    pub usage: LlmUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl GenerationResult {
    fn base(task: &GenerationTask, state: TaskState) -> Self {
        Self {
            key: task.key.clone(),
            kind: task.kind,
            input: task.input.clone(),
            payload: None,
            reasoning: Vec::new(),
            provenance: Provenance::from(&task.bundle.chunk),
            context_chunk_ids: task.bundle.context_chunk_ids(),
            state,
            success: false,
            error_kind: None,
            error: None,
            attempts: 0,
            usage: LlmUsage::default(),
            model: None,
            extra: task.extra.clone(),
        }
    }

    pub fn succeeded(
        task: &GenerationTask,
        payload: Payload,
        reasoning: Vec<String>,
        attempts: u32,
        usage: LlmUsage,
        model: String,
    ) -> Self {
        Self {
            payload: Some(payload),
            reasoning,
            success: true,
            attempts,
            usage,
            model: Some(model),
            ..Self::base(task, TaskState::Succeeded)
        }
    }

    pub fn failed(task: &GenerationTask, error: &AppError, attempts: u32, usage: LlmUsage) -> Self {
        Self::settled(task, TaskState::Failed, error, attempts, usage)
    }

    /// A non-success outcome with an explicit final state.
    pub fn settled(
        task: &GenerationTask,
        state: TaskState,
        error: &AppError,
        attempts: u32,
        usage: LlmUsage,
    ) -> Self {
        Self {
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            attempts,
            usage,
            ..Self::base(task, state)
        }
    }

    /// Turn a success that could not be persisted into a failure.
    pub fn into_failed(mut self, error: &AppError) -> Self {
        self.state = TaskState::Failed;
        self.success = false;
        self.payload = None;
        self.error_kind = Some(error.kind().to_string());
        self.error = Some(error.to_string());
        self
    }

    /// A reuse of `prior` for a task with the same key.
    pub fn deduplicated(task: &GenerationTask, prior: Option<&GenerationResult>) -> Self {
        let mut result = Self::base(task, TaskState::Deduplicated);
        result.success = true;
        if let Some(prior) = prior {
            result.payload = prior.payload.clone();
            result.reasoning = prior.reasoning.clone();
            result.model = prior.model.clone();
        }
        result
    }
}
