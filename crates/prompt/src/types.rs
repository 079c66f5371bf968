//! Prompt definitions and rendered prompts.

use serde::{Deserialize, Serialize};

/// Language of the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemLang {
    #[default]
    En,
    Cn,
}

impl SystemLang {
    /// Parse "en" / "cn"; anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Some(Self::En),
            "cn" | "zh" | "chinese" => Some(Self::Cn),
            _ => None,
        }
    }
}

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier ("qa", "design", "codeqa", "repair")
    pub id: String,

    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// System prompt per language
    pub system: SystemPrompts,

    /// Handlebars template for the user message
    pub template: String,

    pub output: PromptOutputSpec,
}

/// System prompt texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompts {
    pub en: String,

    /// Falls back to `en` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,
}

impl SystemPrompts {
    pub fn for_lang(&self, lang: SystemLang) -> &str {
        match lang {
            SystemLang::En => &self.en,
            SystemLang::Cn => self.cn.as_deref().unwrap_or(&self.en),
        }
    }
}

/// Expected output shape for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format ("json" or "text")
    pub format: String,

    /// Keys a JSON response must carry
    #[serde(rename = "requiredKeys", default)]
    pub required_keys: Vec<String>,
}

/// A rendered prompt ready for a backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub system: Option<String>,

    pub user: String,

    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    pub lang: SystemLang,

    /// Whether the backend should be asked for a JSON object
    #[serde(rename = "expectsJson")]
    pub expects_json: bool,

    #[serde(rename = "requiredKeys")]
    pub required_keys: Vec<String>,
}
