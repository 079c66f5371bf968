//! Generation backend abstraction and request/response types.

use locodata_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Generation request sent to a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The user prompt
    pub prompt: String,

    /// Model identifier (e.g., "llama3.2", "qwen-turbo")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Task kind ("qa", "design", "codeqa"); used by providers that shape
    /// output per task, such as the mock backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_kind: Option<String>,

    /// Ask the backend for a JSON object
    #[serde(default)]
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            system: None,
            task_kind: None,
            json_mode: false,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_task_kind(mut self, kind: impl Into<String>) -> Self {
        self.task_kind = Some(kind.into());
        self
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Backend response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Raw generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    #[serde(default)]
    pub usage: LlmUsage,

    /// False when the backend stopped early (length cap, unfinished stream)
    #[serde(default = "default_true")]
    pub done: bool,

    /// Already-parsed structured payload, when the backend produces one directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Sum of two usages, for tasks that needed a repair call.
    pub fn add(self, other: LlmUsage) -> Self {
        Self::new(
            self.prompt_tokens + other.prompt_tokens,
            self.completion_tokens + other.completion_tokens,
        )
    }
}

/// A generation backend.
///
/// Implementations classify their failures: `AppError::BackendTransient`
/// for anything worth retrying, `AppError::BackendPermanent` otherwise.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name (e.g., "ollama", "openai").
    fn provider_name(&self) -> &str;

    /// Perform a single completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

/// Map an HTTP error status to the error taxonomy.
///
/// Rate limiting, request timeouts and server errors are transient;
/// every other status is permanent.
pub fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> AppError {
    let message = format!("{} API error ({}): {}", provider, status, body.trim());
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        AppError::BackendTransient(message)
    } else {
        AppError::BackendPermanent(message)
    }
}

/// Map a transport failure to the error taxonomy.
pub fn classify_transport(provider: &str, err: &reqwest::Error) -> AppError {
    let message = format!("Failed to reach {}: {}", provider, err);
    if err.is_builder() {
        AppError::BackendPermanent(message)
    } else {
        // connect failures, timeouts, dropped bodies
        AppError::BackendTransient(message)
    }
}

/// Remove `<think>...</think>` blocks some reasoning models emit before the answer.
pub fn strip_thinking(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(classify_status("x", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status("x", StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(classify_status("x", StatusCode::REQUEST_TIMEOUT, "").is_transient());
        assert!(!classify_status("x", StatusCode::UNAUTHORIZED, "").is_transient());
        assert!(!classify_status("x", StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn test_strip_thinking() {
        assert_eq!(strip_thinking("<think>hmm</think>\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_thinking("plain"), "plain");
        assert_eq!(strip_thinking("x<think>unterminated"), "x");
    }

    #[test]
    fn test_usage_add() {
        let total = LlmUsage::new(10, 5).add(LlmUsage::new(3, 2));
        assert_eq!(total, LlmUsage::new(13, 7));
        assert_eq!(total.total_tokens, 20);
    }
}
