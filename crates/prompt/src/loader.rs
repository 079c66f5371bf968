//! Loading prompt definitions.
//!
//! Every prompt ships built in. A YAML file `<id>.yml` in the workspace
//! prompts directory (`.locodata/prompts/`) replaces the built-in definition
//! with the same id.

use crate::types::PromptDefinition;
use locodata_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_PROMPTS: [(&str, &str); 4] = [
    ("qa", include_str!("../prompts/qa.yml")),
    ("design", include_str!("../prompts/design.yml")),
    ("codeqa", include_str!("../prompts/codeqa.yml")),
    ("repair", include_str!("../prompts/repair.yml")),
];

/// Parse one of the bundled definitions.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, source) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("No built-in prompt '{}'", prompt_id)))?;

    parse_prompt(source, prompt_id)
}

/// Load a prompt definition by id from a prompts directory.
pub fn load_prompt(prompts_dir: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir.join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    parse_prompt(&contents, &prompt_file.display().to_string())
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// List prompt ids overridden in a prompts directory.
pub fn list_prompts(prompts_dir: &Path) -> AppResult<Vec<String>> {
    if !prompts_dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(prompts_dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    Ok(prompt_ids)
}

/// All prompts in effect: built-ins, with workspace overrides applied.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptLibrary {
    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for (id, _) in BUILTIN_PROMPTS {
            prompts.insert(id.to_string(), builtin_prompt(id)?);
        }
        Ok(Self { prompts })
    }

    /// Built-in prompts overridden by any `<id>.yml` in `prompts_dir`.
    pub fn load(prompts_dir: &Path) -> AppResult<Self> {
        let mut library = Self::builtin()?;

        for id in list_prompts(prompts_dir)? {
            let definition = load_prompt(prompts_dir, &id)?;
            if definition.id != id {
                return Err(AppError::Prompt(format!(
                    "Prompt file {}.yml declares id '{}'",
                    id, definition.id
                )));
            }
            tracing::info!("Using workspace prompt override: {}", id);
            library.prompts.insert(id, definition);
        }

        Ok(library)
    }

    pub fn get(&self, prompt_id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt '{}'", prompt_id)))
    }
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' template cannot be empty",
            def.id
        )));
    }

    if def.system.en.trim().is_empty() {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' needs an English system prompt",
            def.id
        )));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if !matches!(def.output.format.as_str(), "json" | "text") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' has unknown output format '{}'",
            def.id, def.output.format
        )));
    }

    Ok(())
}
