//! Orchestrator behavior against scripted backends.

use super::{chunk, settings, ScriptedClient, Step};
use crate::chunk::Chunker;
use crate::context::ContextBundle;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressReporter;
use crate::task::{GenerationTask, Payload, TaskState};
use crate::walker::Language;
use crate::writer::{ArtifactRecord, ArtifactStore, MemoryArtifactStore};
use locodata_core::ChunkingConfig;
use locodata_prompt::PromptLibrary;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn orchestrator(client: Arc<ScriptedClient>, concurrency: usize, max_attempts: u32) -> Orchestrator {
    Orchestrator::new(
        client,
        Arc::new(PromptLibrary::builtin().unwrap()),
        settings(concurrency, max_attempts),
    )
}

fn qa_task(ordinal: usize) -> GenerationTask {
    let text = format!("def f{}(x):\n    return x + {}\n", ordinal, ordinal);
    GenerationTask::qa(ContextBundle::bare(chunk("m.py", ordinal, &text)))
}

#[tokio::test]
async fn test_transient_failures_below_limit_succeed() {
    let client = Arc::new(ScriptedClient::new([
        Step::Transient,
        Step::Transient,
        Step::Transient,
    ]));
    let result = orchestrator(client.clone(), 1, 4).execute(&qa_task(0)).await;

    assert!(result.success);
    assert_eq!(result.state, TaskState::Succeeded);
    assert_eq!(result.attempts, 4);
    assert_eq!(client.calls(), 4);
}

#[tokio::test]
async fn test_transient_failures_past_limit_fail() {
    let client = Arc::new(ScriptedClient::new(vec![Step::Transient; 5]));
    let result = orchestrator(client.clone(), 1, 3).execute(&qa_task(0)).await;

    assert!(!result.success);
    assert_eq!(result.state, TaskState::Failed);
    assert_eq!(result.error_kind.as_deref(), Some("backend_transient"));
    assert_eq!(result.attempts, 3);
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let client = Arc::new(ScriptedClient::new([Step::Permanent]));
    let result = orchestrator(client.clone(), 1, 4).execute(&qa_task(0)).await;

    assert_eq!(result.error_kind.as_deref(), Some("backend_permanent"));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_truncated_response_is_retried() {
    let client = Arc::new(ScriptedClient::new([Step::Truncated]));
    let result = orchestrator(client.clone(), 1, 2).execute(&qa_task(0)).await;

    assert!(result.success);
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_call_timeout_counts_as_transient() {
    let client = Arc::new(ScriptedClient::ok().with_delay(Duration::from_millis(500)));
    let mut settings = settings(1, 2);
    settings.call_timeout = Duration::from_millis(20);
    let orchestrator = Orchestrator::new(
        client.clone(),
        Arc::new(PromptLibrary::builtin().unwrap()),
        settings,
    );

    let result = orchestrator.execute(&qa_task(0)).await;
    assert_eq!(result.error_kind.as_deref(), Some("backend_transient"));
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn test_invalid_output_gets_one_repair() {
    let client = Arc::new(ScriptedClient::new([
        Step::Text("I think this code adds numbers.".into()),
        Step::Text(r#"{"question": "What does f0 return?", "answer": "x plus zero"}"#.into()),
    ]));
    let result = orchestrator(client.clone(), 1, 4).execute(&qa_task(0)).await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(
        result.payload,
        Some(Payload::Qa {
            question: "What does f0 return?".into(),
            answer: "x plus zero".into()
        })
    );
}

#[tokio::test]
async fn test_repair_failure_is_validation_error() {
    let client = Arc::new(ScriptedClient::new([
        Step::Text("no json".into()),
        Step::Text(r#"{"question": "", "answer": "x"}"#.into()),
    ]));
    let result = orchestrator(client.clone(), 1, 4).execute(&qa_task(0)).await;

    assert_eq!(result.state, TaskState::Failed);
    assert_eq!(result.error_kind.as_deref(), Some("validation"));
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_without_calls() {
    let client = Arc::new(ScriptedClient::ok());
    let task = GenerationTask::design(ContextBundle::bare(chunk("m.py", 0, "x = 1\n")), "   ");
    let result = orchestrator(client.clone(), 1, 4).execute(&task).await;

    assert_eq!(result.error_kind.as_deref(), Some("validation"));
    assert_eq!(result.attempts, 0);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_tasks_call_backend_once() {
    let client = Arc::new(ScriptedClient::ok().with_delay(Duration::from_millis(20)));
    let orchestrator = orchestrator(client.clone(), 4, 4);
    let mut store = MemoryArtifactStore::new();

    let outcome = orchestrator
        .run_batch(
            vec![qa_task(7), qa_task(7), qa_task(7)],
            &CancellationToken::new(),
            &mut store,
            &ProgressReporter::noop(),
        )
        .await;

    assert_eq!(client.calls(), 1);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.deduplicated, 2);
    assert_eq!(store.records().len(), 1);
    let dedup = outcome
        .results
        .iter()
        .find(|r| r.state == TaskState::Deduplicated)
        .unwrap();
    assert!(dedup.payload.is_some());
}

#[tokio::test]
async fn test_waiter_takes_over_after_owner_fails() {
    let client = Arc::new(ScriptedClient::new([Step::Permanent]).with_delay(Duration::from_millis(20)));
    let orchestrator = orchestrator(client.clone(), 2, 1);
    let mut store = MemoryArtifactStore::new();

    let outcome = orchestrator
        .run_batch(
            vec![qa_task(1), qa_task(1)],
            &CancellationToken::new(),
            &mut store,
            &ProgressReporter::noop(),
        )
        .await;

    assert_eq!(client.calls(), 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.dispatched, 2);
    assert_eq!(store.records().len(), 1);
}

#[tokio::test]
async fn test_owner_panic_fails_task_and_releases_key() {
    let client = Arc::new(ScriptedClient::new([Step::Panic]).with_delay(Duration::from_millis(20)));
    let orchestrator = orchestrator(client.clone(), 1, 1);
    let mut store = MemoryArtifactStore::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        orchestrator.run_batch(
            vec![qa_task(1), qa_task(1), qa_task(2)],
            &CancellationToken::new(),
            &mut store,
            &ProgressReporter::noop(),
        ),
    )
    .await
    .expect("batch finishes after a panicked task");

    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.accounted(), 3);
    assert!(outcome
        .failures
        .iter()
        .any(|f| f.detail == "generation task panicked"));
    assert_eq!(store.records().len(), 2);
}

#[tokio::test]
async fn test_existing_keys_are_not_generated_again() {
    let client = Arc::new(ScriptedClient::ok());
    let orchestrator = orchestrator(client.clone(), 2, 4);
    let done = qa_task(3);
    orchestrator.preload_keys(HashSet::from([done.key.clone()]));

    let mut store = MemoryArtifactStore::new();
    let outcome = orchestrator
        .run_batch(
            vec![done, qa_task(4)],
            &CancellationToken::new(),
            &mut store,
            &ProgressReporter::noop(),
        )
        .await;

    assert_eq!(client.calls(), 1);
    assert_eq!(outcome.deduplicated, 1);
    assert_eq!(outcome.succeeded, 1);
}

#[tokio::test]
async fn test_writer_failure_fails_task() {
    let client = Arc::new(ScriptedClient::ok());
    let orchestrator = orchestrator(client.clone(), 2, 4);
    let mut store = MemoryArtifactStore::failing();

    let outcome = orchestrator
        .run_batch(
            vec![qa_task(0), qa_task(1)],
            &CancellationToken::new(),
            &mut store,
            &ProgressReporter::noop(),
        )
        .await;

    assert_eq!(outcome.writer_failures, 2);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.succeeded, 0);
    assert!(outcome.failures.iter().all(|f| f.kind == "writer"));
    assert!(outcome.results.iter().all(|r| !r.success));
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let client = Arc::new(ScriptedClient::ok().with_delay(Duration::from_millis(15)));
    let orchestrator = orchestrator(client.clone(), 3, 4);
    let mut store = MemoryArtifactStore::new();

    let tasks = (0..12).map(qa_task).collect();
    let outcome = orchestrator
        .run_batch(tasks, &CancellationToken::new(), &mut store, &ProgressReporter::noop())
        .await;

    assert_eq!(outcome.succeeded, 12);
    assert!(client.max_in_flight() <= 3);
    assert!(client.max_in_flight() >= 2);
    assert_eq!(outcome.accounted(), 12);
}

#[tokio::test]
async fn test_cancellation_abandons_in_flight_tasks() {
    let cancel = CancellationToken::new();
    let client = Arc::new(
        ScriptedClient::ok()
            .with_delay(Duration::from_secs(30))
            .cancel_at(10, cancel.clone()),
    );
    let mut settings = settings(10, 4);
    settings.grace_timeout = Duration::from_millis(50);
    let orchestrator = Orchestrator::new(
        client.clone(),
        Arc::new(PromptLibrary::builtin().unwrap()),
        settings,
    );
    let mut store = MemoryArtifactStore::new();

    let tasks: Vec<_> = (0..100).map(qa_task).collect();
    let keys: HashSet<String> = tasks.iter().map(|t| t.key.clone()).collect();
    let outcome = orchestrator
        .run_batch(tasks, &cancel, &mut store, &ProgressReporter::noop())
        .await;

    assert!(outcome.cancelled);
    assert_eq!(outcome.dispatched, 10);
    assert_eq!(outcome.abandoned, 10);
    assert_eq!(outcome.not_dispatched, 90);
    assert_eq!(outcome.accounted(), 100);
    assert!(outcome.succeeded + outcome.failed + outcome.abandoned <= 100);
    assert!(store.records().is_empty());

    // Abandoned keys are free for a later run.
    let released: HashSet<String> = keys
        .into_iter()
        .filter(|k| matches!(orchestrator.dedup_index().claim(k), crate::orchestrator::Claim::Owner))
        .collect();
    assert_eq!(released.len(), 100);
}

#[tokio::test]
async fn test_records_match_results() {
    let client = Arc::new(ScriptedClient::ok());
    let orchestrator = orchestrator(client, 2, 4);
    let mut store = MemoryArtifactStore::new();

    let outcome = orchestrator
        .run_batch(
            (0..3).map(qa_task).collect(),
            &CancellationToken::new(),
            &mut store,
            &ProgressReporter::noop(),
        )
        .await;

    let record_keys: HashSet<&str> = store.records().iter().map(|r| r.key.as_str()).collect();
    let result_keys: HashSet<&str> = outcome.results.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(record_keys, result_keys);

    let ids: HashSet<&str> = store
        .records()
        .iter()
        .map(|r: &ArtifactRecord| r.record_id.as_str())
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(store.list_existing_keys().unwrap().len(), 3);
}

#[tokio::test]
async fn test_split_function_prompt_names_its_declaration() {
    let mut text = String::from("def handler(event, context):\n");
    for n in 0..12 {
        text.push_str(&format!("    step{} = event.get({})\n", n, n));
    }
    let chunker = Chunker::new(&ChunkingConfig {
        max_lines: 5,
        max_chars: 1000,
    })
    .unwrap();
    let chunks = chunker.chunk_text("lambda.py", Language::Python, &text).unwrap();
    let tail = chunks.last().unwrap().clone();
    assert!(tail.start_line > 1);

    let client = Arc::new(ScriptedClient::ok());
    let result = orchestrator(client.clone(), 1, 1)
        .execute(&GenerationTask::qa(ContextBundle::bare(tail)))
        .await;

    assert!(result.success);
    let prompts = client.prompts();
    assert!(prompts[0].contains("ENCLOSING SIGNATURE: def handler(event, context):"));
}
