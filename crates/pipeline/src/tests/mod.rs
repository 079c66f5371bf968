//! Cross-module scenarios and their shared fixtures.

mod chunk_properties;
mod orchestration;

use crate::chunk::{calculate_hash, chunk_id, Chunk, Strategy};
use crate::orchestrator::{OrchestratorSettings, RetryPolicy};
use crate::walker::Language;
use locodata_core::{AppError, AppResult};
use locodata_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage, MockClient};
use locodata_prompt::SystemLang;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One scripted backend reply.
#[derive(Debug, Clone)]
pub enum Step {
    Transient,
    Permanent,
    /// Raw content with no structured payload
    Text(String),
    /// A response cut off before completion
    Truncated,
    /// The backend call panics
    Panic,
}

/// Backend that replays a script, then behaves like `MockClient`.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Step>>,
    fallback: MockClient,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    cancel_at: Option<(usize, CancellationToken)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            fallback: MockClient::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            cancel_at: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Self {
        Self::new([])
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancel `token` when call number `call` starts.
    pub fn cancel_at(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((call, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// User prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if let Some((at, token)) = &self.cancel_at {
            if call == *at {
                token.cancel();
            }
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let step = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            Some(Step::Transient) => Err(AppError::BackendTransient("503 overloaded".into())),
            Some(Step::Permanent) => Err(AppError::BackendPermanent("400 bad request".into())),
            Some(Step::Text(content)) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: LlmUsage::new(10, 5),
                done: true,
                structured: None,
            }),
            Some(Step::Panic) => panic!("scripted backend panic"),
            Some(Step::Truncated) => {
                let mut response = self.fallback.complete(request).await?;
                response.done = false;
                Ok(response)
            }
            None => self.fallback.complete(request).await,
        }
    }
}

/// Fast retries, generous timeouts.
pub fn settings(concurrency: usize, max_attempts: u32) -> OrchestratorSettings {
    OrchestratorSettings {
        model: "scripted-model".to_string(),
        lang: SystemLang::En,
        max_tokens: 256,
        temperature: 0.0,
        call_timeout: Duration::from_secs(5),
        grace_timeout: Duration::from_secs(5),
        concurrency,
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
    }
}

/// A standalone chunk with a real id.
pub fn chunk(path: &str, ordinal: usize, text: &str) -> Chunk {
    let bytes = 0..text.len();
    Chunk {
        id: chunk_id(path, &bytes, text),
        path: path.to_string(),
        ordinal,
        start_line: 1,
        end_line: text.lines().count().max(1),
        start_byte: bytes.start,
        end_byte: bytes.end,
        text: text.to_string(),
        symbol: None,
        signature: None,
        strategy: Strategy::Block,
        oversized: false,
        language: Language::Python,
        hash: calculate_hash(text),
    }
}
