//! Run statistics.

use locodata_core::AppError;
use serde::{Deserialize, Serialize};

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Walk,
    Chunk,
    Generate,
    Write,
}

/// One failed file or task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub stage: Stage,
    /// File path or task key
    pub subject: String,
    /// `AppError::kind` label
    pub kind: String,
    pub detail: String,
}

impl FailureEntry {
    pub fn new(stage: Stage, subject: impl Into<String>, error: &AppError) -> Self {
        Self {
            stage,
            subject: subject.into(),
            kind: error.kind().to_string(),
            detail: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Binary,
    Oversize,
    Unreadable,
}

/// A file the walker did not yield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Summary of one pipeline execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub files_walked: usize,
    pub files_skipped_binary: usize,
    pub files_skipped_oversize: usize,
    pub files_skipped_unreadable: usize,
    /// The walk stopped at `maxFiles`
    pub file_limit_reached: bool,
    pub files_chunk_failed: usize,

    pub chunks_produced: usize,
    pub chunks_oversized: usize,

    pub tasks_planned: usize,
    pub tasks_dispatched: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub tasks_deduplicated: usize,
    /// In flight when the grace period ran out
    pub tasks_abandoned: usize,
    /// Never started because the run was cancelled
    pub tasks_not_dispatched: usize,

    pub writer_failures: usize,

    pub failures: Vec<FailureEntry>,
    pub skipped: Vec<SkippedFile>,

    pub cancelled: bool,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn record_failure(&mut self, stage: Stage, subject: impl Into<String>, error: &AppError) {
        self.failures.push(FailureEntry::new(stage, subject, error));
    }

    /// Every planned task is accounted for exactly once.
    pub fn tasks_accounted(&self) -> usize {
        self.tasks_succeeded
            + self.tasks_failed
            + self.tasks_deduplicated
            + self.tasks_abandoned
            + self.tasks_not_dispatched
    }

    /// Short human-readable summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Files: {} walked, {} binary, {} oversize, {} unreadable, {} chunk-failed{}\n",
            self.files_walked,
            self.files_skipped_binary,
            self.files_skipped_oversize,
            self.files_skipped_unreadable,
            self.files_chunk_failed,
            if self.file_limit_reached {
                " (file limit reached)"
            } else {
                ""
            }
        ));
        out.push_str(&format!(
            "Chunks: {} produced, {} oversized\n",
            self.chunks_produced, self.chunks_oversized
        ));
        out.push_str(&format!(
            "Tasks: {} planned, {} dispatched, {} succeeded, {} failed, {} deduplicated, {} abandoned, {} not dispatched\n",
            self.tasks_planned,
            self.tasks_dispatched,
            self.tasks_succeeded,
            self.tasks_failed,
            self.tasks_deduplicated,
            self.tasks_abandoned,
            self.tasks_not_dispatched
        ));
        if self.writer_failures > 0 {
            out.push_str(&format!("Writer failures: {}\n", self.writer_failures));
        }
        if self.cancelled {
            out.push_str("Run was cancelled\n");
        }
        out.push_str(&format!("Duration: {:.1}s", self.duration_secs));
        out
    }
}
