//! Rendering prompt definitions into backend-ready prompts.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, SystemLang};
use handlebars::Handlebars;
use locodata_core::{AppError, AppResult};
use serde::Serialize;

/// Render a prompt definition with the given template variables.
///
/// Variables may be any serializable value; templates iterate lists such as
/// `neighbors` with `{{#each}}`. Missing variables render as empty strings.
///
/// # Example
/// ```no_run
/// use locodata_prompt::{build_prompt, PromptLibrary, SystemLang};
/// use serde_json::json;
///
/// # fn example() -> locodata_core::AppResult<()> {
/// let library = PromptLibrary::builtin()?;
/// let vars = json!({ "code": "fn main() {}", "question": "What runs first?" });
/// let built = build_prompt(library.get("codeqa")?, SystemLang::En, &vars)?;
/// println!("{}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt<T: Serialize>(
    definition: &PromptDefinition,
    lang: SystemLang,
    variables: &T,
) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    let user = render_template(&definition.template, variables)?;

    Ok(BuiltPrompt {
        system: Some(definition.system.for_lang(lang).to_string()),
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            lang,
            expects_json: definition.output.format == "json",
            required_keys: definition.output.required_keys.clone(),
        },
    })
}

/// Variables of the corrective prompt sent after an unusable response.
#[derive(Debug, Serialize)]
pub struct RepairInput<'a> {
    pub problem: &'a str,
    pub required_keys: String,
    pub original: &'a str,
    pub rejected: &'a str,
}

/// Build the corrective prompt for a rejected response to `original`.
///
/// The result keeps the original prompt's required keys so the repaired
/// output is validated against the same shape.
pub fn build_repair_prompt(
    repair: &PromptDefinition,
    original: &BuiltPrompt,
    rejected: &str,
    problem: &str,
) -> AppResult<BuiltPrompt> {
    let input = RepairInput {
        problem,
        required_keys: original.metadata.required_keys.join(", "),
        original: &original.user,
        rejected,
    };

    let mut built = build_prompt(repair, original.metadata.lang, &input)?;
    built.metadata.required_keys = original.metadata.required_keys.clone();
    built.metadata.expects_json = true;
    Ok(built)
}

fn render_template<T: Serialize>(template: &str, variables: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
