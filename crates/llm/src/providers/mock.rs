//! Deterministic offline backend.
//!
//! Produces well-formed structured output derived from the prompt, so the
//! whole pipeline can run without a model server.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use locodata_core::AppResult;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MockClient {
    calls: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `complete` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn payload(kind: &str, prompt: &str) -> serde_json::Value {
        let subject = prompt
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("the code")
            .chars()
            .take(80)
            .collect::<String>();

        match kind {
            "design" => json!({
                "design": format!("Proposed design for: {}", subject),
                "reasoning": [
                    "Identify the modules touched by the requirement",
                    "Extend the existing structure rather than adding a parallel one",
                ],
            }),
            "codeqa" => json!({
                "answer": format!("The snippet handles: {}", subject),
                "reasoning": ["Read the snippet", "Relate it to the question"],
            }),
            _ => json!({
                "question": format!("What does this code do: {}?", subject),
                "answer": format!("It implements {}", subject),
                "reasoning": ["Locate the definition", "Summarize its behavior"],
            }),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let kind = request.task_kind.as_deref().unwrap_or("qa");
        let payload = Self::payload(kind, &request.prompt);
        let content = payload.to_string();
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(prompt_tokens, completion_tokens),
            done: true,
            structured: Some(payload),
        })
    }
}
