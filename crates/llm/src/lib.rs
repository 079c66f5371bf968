//! Generation backends for locodata.
//!
//! A provider-agnostic `LlmClient` trait with implementations for:
//! - **Ollama**: local model runtime (default)
//! - **OpenAI / Qwen**: OpenAI-compatible chat completions
//! - **Mock**: deterministic offline output
//!
//! # Example
//! ```no_run
//! use locodata_llm::{create_client, LlmRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> locodata_core::AppResult<()> {
//! let client = create_client("ollama", None, None, Duration::from_secs(60))?;
//! let request = LlmRequest::new("Summarize this module", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{MockClient, OllamaClient, OpenAiCompatClient};
pub use types::ProviderType;
