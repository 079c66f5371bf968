//! Prompt system for locodata.
//!
//! - Built-in YAML prompt definitions for each task kind, in English and Chinese
//! - Workspace overrides from `.locodata/prompts/`
//! - Handlebars rendering

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::{build_prompt, build_repair_prompt};
pub use loader::{builtin_prompt, list_prompts, load_prompt, PromptLibrary};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec, SystemLang};
