//! Ollama provider.
//!
//! Uses the non-streaming `/api/generate` endpoint.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{
    classify_status, classify_transport, strip_thinking, LlmClient, LlmRequest, LlmResponse,
    LlmUsage,
};
use locodata_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Serialize, Default)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Client for a local Ollama at http://localhost:11434.
    pub fn new() -> AppResult<Self> {
        Self::with_base_url("http://localhost:11434", Duration::from_secs(120))
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            format: request.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            stream: false,
        }
    }

    /// A response that stopped on the length cap is truncated and worth retrying.
    fn convert_response(&self, response: OllamaResponse) -> AppResult<LlmResponse> {
        if !response.done || response.done_reason.as_deref() == Some("length") {
            return Err(AppError::BackendTransient(format!(
                "Ollama response truncated (done_reason: {})",
                response.done_reason.as_deref().unwrap_or("none")
            )));
        }

        Ok(LlmResponse {
            content: strip_thinking(&response.response),
            model: response.model,
            usage: LlmUsage::new(
                response.prompt_eval_count.unwrap_or(0),
                response.eval_count.unwrap_or(0),
            ),
            done: true,
            structured: None,
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Ollama");

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.to_ollama_request(request))
            .send()
            .await
            .map_err(|e| classify_transport("Ollama", &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("Ollama", status, &body));
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            AppError::BackendTransient(format!("Failed to parse Ollama response: {}", e))
        })?;

        tracing::debug!(
            prompt_tokens = ?ollama_response.prompt_eval_count,
            completion_tokens = ?ollama_response.eval_count,
            "Received completion from Ollama"
        );

        self.convert_response(ollama_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(done: bool, reason: Option<&str>) -> OllamaResponse {
        OllamaResponse {
            model: "llama3".to_string(),
            response: "{\"answer\":\"x\"}".to_string(),
            done,
            done_reason: reason.map(str::to_string),
            prompt_eval_count: Some(12),
            eval_count: Some(4),
        }
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = OllamaClient::new().unwrap();
        let request = LlmRequest::new("Hello", "llama3")
            .with_temperature(0.7)
            .with_max_tokens(100)
            .with_json_mode();

        let ollama_req = client.to_ollama_request(&request);
        assert_eq!(ollama_req.model, "llama3");
        assert_eq!(ollama_req.format, Some("json"));
        assert_eq!(ollama_req.options.temperature, Some(0.7));
        assert_eq!(ollama_req.options.num_predict, Some(100));
        assert!(!ollama_req.stream);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client =
            OllamaClient::with_base_url("http://host:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "http://host:11434");
    }

    #[test]
    fn test_truncated_response_is_transient() {
        let client = OllamaClient::new().unwrap();
        assert!(client
            .convert_response(response(false, None))
            .unwrap_err()
            .is_transient());
        assert!(client
            .convert_response(response(true, Some("length")))
            .unwrap_err()
            .is_transient());

        let ok = client.convert_response(response(true, Some("stop"))).unwrap();
        assert_eq!(ok.usage.total_tokens, 16);
    }
}
