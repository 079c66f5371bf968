//! Artifact writer: the only sink that mutates state.
//!
//! Records are JSON Lines. Each append is one write of one line followed by
//! `sync_data`, so an interrupted run can leave at most one torn line at the
//! end of the file; opening the store cuts it off.

use crate::task::{GenerationResult, Payload, Provenance, TaskKind, TaskState};
use chrono::{DateTime, Utc};
use locodata_core::{AppError, AppResult};
use locodata_llm::LlmUsage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Persisted form of a successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// UUID v4
    pub record_id: String,

    /// Task key, used for resume
    pub key: String,

    pub kind: TaskKind,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    pub payload: Payload,

    #[serde(default)]
    pub reasoning: Vec<String>,

    pub provenance: Provenance,

    #[serde(default)]
    pub context_chunk_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub attempts: u32,

    #[serde(default)]
    pub usage: LlmUsage,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl ArtifactRecord {
    /// Build a record from a succeeded result.
    pub fn from_result(result: &GenerationResult) -> AppResult<Self> {
        let payload = match (&result.state, &result.payload) {
            (TaskState::Succeeded, Some(payload)) if result.success => payload.clone(),
            _ => {
                return Err(AppError::Writer(format!(
                    "task {} did not succeed and cannot be persisted",
                    result.key
                )))
            }
        };

        Ok(Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            key: result.key.clone(),
            kind: result.kind,
            created_at: Utc::now(),
            input: result.input.clone(),
            payload,
            reasoning: result.reasoning.clone(),
            provenance: result.provenance.clone(),
            context_chunk_ids: result.context_chunk_ids.clone(),
            model: result.model.clone(),
            attempts: result.attempts,
            usage: result.usage,
            extra: result.extra.clone(),
        })
    }
}

/// Append-only store of artifact records.
pub trait ArtifactStore: Send {
    /// Append one record; returns its record id.
    fn append(&mut self, record: &ArtifactRecord) -> AppResult<String>;

    /// Task keys of every readable record.
    fn list_existing_keys(&self) -> AppResult<HashSet<String>>;
}

/// JSON Lines file store.
#[derive(Debug)]
pub struct JsonlArtifactStore {
    path: PathBuf,
    file: File,
}

impl JsonlArtifactStore {
    /// Open or create the store, cutting off a torn trailing line.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Writer(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Writer(format!("Failed to open {}: {}", path.display(), e)))?;

        repair_tail(&mut file, &path)?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncate everything after the last newline.
fn repair_tail(file: &mut File, path: &Path) -> AppResult<()> {
    let io_err = |e: std::io::Error| AppError::Writer(format!("{}: {}", path.display(), e));

    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;
    file.read_to_end(&mut contents).map_err(io_err)?;

    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(());
    }

    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = contents.len() - keep,
        "Truncating torn trailing record"
    );
    file.set_len(keep as u64).map_err(io_err)?;
    file.sync_data().map_err(io_err)?;
    Ok(())
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl ArtifactStore for JsonlArtifactStore {
    fn append(&mut self, record: &ArtifactRecord) -> AppResult<String> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let io_err = |e: std::io::Error| {
            AppError::Writer(format!("Failed to append to {}: {}", self.path.display(), e))
        };

        let mut start = self.file.metadata().map_err(io_err)?.len();
        if !ends_with_newline(&mut self.file, start).map_err(io_err)? {
            repair_tail(&mut self.file, &self.path)?;
            start = self.file.metadata().map_err(io_err)?.len();
        }

        if let Err(e) = self
            .file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.sync_data())
        {
            // a partial line would corrupt the next record appended after it
            if let Err(rollback) = self.file.set_len(start).and_then(|_| self.file.sync_data()) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial append"
                );
            }
            return Err(io_err(e));
        }

        Ok(record.record_id.clone())
    }

    fn list_existing_keys(&self) -> AppResult<HashSet<String>> {
        #[derive(Deserialize)]
        struct KeyOnly {
            key: String,
        }

        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| AppError::Writer(format!("Failed to read {}: {}", self.path.display(), e)))?;

        let mut keys = HashSet::new();
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<KeyOnly>(line) {
                Ok(entry) => {
                    keys.insert(entry.key);
                }
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = i + 1,
                    error = %e,
                    "Skipping corrupt record"
                ),
            }
        }
        Ok(keys)
    }
}

/// In-memory store with the same contract.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    records: Vec<ArtifactRecord>,
    fail_appends: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose appends always fail.
    pub fn failing() -> Self {
        Self {
            records: Vec::new(),
            fail_appends: true,
        }
    }

    pub fn records(&self) -> &[ArtifactRecord] {
        &self.records
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn append(&mut self, record: &ArtifactRecord) -> AppResult<String> {
        if self.fail_appends {
            return Err(AppError::Writer("store rejects appends".to_string()));
        }
        self.records.push(record.clone());
        Ok(record.record_id.clone())
    }

    fn list_existing_keys(&self) -> AppResult<HashSet<String>> {
        Ok(self.records.iter().map(|r| r.key.clone()).collect())
    }
}

/// Read every parseable record of a JSON Lines store.
pub fn read_records(path: &Path) -> AppResult<Vec<ArtifactRecord>> {
    let contents = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ArtifactRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = i + 1,
                error = %e,
                "Skipping corrupt record"
            ),
        }
    }
    Ok(records)
}

/// Write the records of a JSON Lines store as one pretty JSON array.
pub fn export_json(input: &Path, output: &Path) -> AppResult<usize> {
    let records = read_records(input)?;
    let json = serde_json::to_string_pretty(&records)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, json)?;
    tracing::info!(
        records = records.len(),
        output = %output.display(),
        "Exported artifacts"
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, Strategy};
    use crate::context::ContextBundle;
    use crate::task::GenerationTask;
    use crate::walker::Language;
    use tempfile::TempDir;

    fn task(id: &str) -> GenerationTask {
        GenerationTask::qa(ContextBundle::bare(Chunk {
            id: id.to_string(),
            path: "src/app.py".to_string(),
            ordinal: 2,
            start_line: 10,
            end_line: 20,
            start_byte: 100,
            end_byte: 300,
            text: "def f():\n    pass\n".to_string(),
            symbol: Some("f".to_string()),
            signature: None,
            strategy: Strategy::Symbol,
            oversized: false,
            language: Language::Python,
            hash: String::new(),
        }))
    }

    fn record(id: &str) -> ArtifactRecord {
        let result = GenerationResult::succeeded(
            &task(id),
            Payload::Qa {
                question: "What does f do?".to_string(),
                answer: "Nothing.".to_string(),
            },
            vec!["It passes.".to_string()],
            1,
            LlmUsage::new(10, 5),
            "mock".to_string(),
        );
        ArtifactRecord::from_result(&result).unwrap()
    }

    #[test]
    fn test_failed_result_is_not_persisted() {
        let result = GenerationResult::failed(
            &task("c1"),
            &AppError::Validation("empty".into()),
            2,
            LlmUsage::default(),
        );
        assert!(matches!(
            ArtifactRecord::from_result(&result),
            Err(AppError::Writer(_))
        ));
    }

    #[test]
    fn test_append_and_list_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/qa.jsonl");
        let mut store = JsonlArtifactStore::open(&path).unwrap();

        let a = record("c1");
        let b = record("c2");
        let id = store.append(&a).unwrap();
        store.append(&b).unwrap();
        assert_eq!(id, a.record_id);

        let keys = store.list_existing_keys().unwrap();
        assert_eq!(keys, HashSet::from([a.key.clone(), b.key.clone()]));

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].provenance.start_line, 10);
        assert_ne!(records[0].record_id, records[1].record_id);
    }

    #[test]
    fn test_torn_tail_is_truncated_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qa.jsonl");
        {
            let mut store = JsonlArtifactStore::open(&path).unwrap();
            store.append(&record("c1")).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"recordId\": \"half").unwrap();
        drop(file);

        let mut store = JsonlArtifactStore::open(&path).unwrap();
        assert_eq!(store.list_existing_keys().unwrap().len(), 1);
        store.append(&record("c2")).unwrap();
        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_torn_bytes_between_appends_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qa.jsonl");
        let mut store = JsonlArtifactStore::open(&path).unwrap();
        let first = record("c1");
        let second = record("c2");
        store.append(&first).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"recordId\":\"torn").unwrap();
        drop(file);

        store.append(&second).unwrap();
        let keys = store.list_existing_keys().unwrap();
        assert_eq!(keys, HashSet::from([first.key.clone(), second.key.clone()]));
        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qa.jsonl");
        let good = serde_json::to_string(&record("c1")).unwrap();
        std::fs::write(&path, format!("{}\nnot json\n", good)).unwrap();

        let store = JsonlArtifactStore::open(&path).unwrap();
        assert_eq!(store.list_existing_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_export_json_array() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("qa.jsonl");
        let output = dir.path().join("qa.json");
        let mut store = JsonlArtifactStore::open(&input).unwrap();
        store.append(&record("c1")).unwrap();

        assert_eq!(export_json(&input, &output).unwrap(), 1);
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(parsed[0]["payload"]["question"], "What does f do?");
        assert_eq!(parsed[0]["provenance"]["path"], "src/app.py");
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryArtifactStore::new();
        store.append(&record("c1")).unwrap();
        assert_eq!(store.records().len(), 1);
        assert!(MemoryArtifactStore::failing().append(&record("c1")).is_err());
    }
}
