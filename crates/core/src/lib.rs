//! Locodata core library
//!
//! Shared foundations for the other crates:
//! - Error taxonomy (`AppError`, `AppResult`)
//! - Logging setup
//! - Layered configuration

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    AppConfig, ChunkingConfig, ConfigOverrides, ContextConfig, GenerationConfig, PipelineConfig,
    WalkerConfig,
};
pub use error::{AppError, AppResult};
