//! Backend output validation.
//!
//! Output is expected to be a JSON object. It may arrive wrapped in a code
//! fence or surrounded by prose; the first object found is used.

use crate::task::{Payload, TaskKind};
use locodata_core::{AppError, AppResult};
use locodata_llm::LlmResponse;
use serde_json::{Map, Value};

/// Payload and reasoning trace extracted from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub payload: Payload,
    pub reasoning: Vec<String>,
}

/// Parse and check a response against the shape `kind` requires.
pub fn validate(kind: TaskKind, response: &LlmResponse) -> AppResult<ParsedOutput> {
    let value = match &response.structured {
        Some(value) => value.clone(),
        None => extract_json(&response.content).ok_or_else(|| {
            AppError::Validation("response does not contain a JSON object".to_string())
        })?,
    };

    let object = value
        .as_object()
        .ok_or_else(|| AppError::Validation("response JSON is not an object".to_string()))?;

    let payload = match kind {
        TaskKind::Qa => Payload::Qa {
            question: required(object, "question")?,
            answer: required(object, "answer")?,
        },
        TaskKind::Design => Payload::Design {
            design: required(object, "design")?,
        },
        TaskKind::CodeqaAnswer => Payload::Answer {
            answer: required(object, "answer")?,
        },
    };

    Ok(ParsedOutput {
        payload,
        reasoning: reasoning(object.get("reasoning")),
    })
}

/// Find a JSON object in free-form model output.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    // ```json ... ``` fences
    let mut rest = trimmed;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body_start = after.find('\n').map_or(0, |i| i + 1);
        let body = &after[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        if let Ok(value) = serde_json::from_str::<Value>(body[..close].trim()) {
            if value.is_object() {
                return Some(value);
            }
        }
        rest = &body[close + 3..];
    }

    // Outermost braces in surrounding prose
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn required(object: &Map<String, Value>, key: &str) -> AppResult<String> {
    let text = match object.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other @ (Value::Array(_) | Value::Object(_))) => {
            if other.as_array().is_some_and(Vec::is_empty)
                || other.as_object().is_some_and(Map::is_empty)
            {
                String::new()
            } else {
                serde_json::to_string_pretty(other)?
            }
        }
        Some(other) => other.to_string(),
    };

    if text.is_empty() {
        return Err(AppError::Validation(format!(
            "missing or empty \"{}\"",
            key
        )));
    }
    Ok(text)
}

/// Reasoning may be a list of steps or one block of text.
fn reasoning(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(steps)) => steps
            .iter()
            .map(|step| match step {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(text)) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locodata_llm::LlmUsage;
    use serde_json::json;

    fn response(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            model: "test".to_string(),
            usage: LlmUsage::default(),
            done: true,
            structured: None,
        }
    }

    #[test]
    fn test_plain_json() {
        let parsed = validate(
            TaskKind::Qa,
            &response(r#"{"question": "What?", "answer": "This.", "reasoning": ["a", "b"]}"#),
        )
        .unwrap();
        assert_eq!(
            parsed.payload,
            Payload::Qa {
                question: "What?".to_string(),
                answer: "This.".to_string()
            }
        );
        assert_eq!(parsed.reasoning, vec!["a", "b"]);
    }

    #[test]
    fn test_fenced_and_prose_wrapped_json() {
        let fenced = "Here you go:\n```json\n{\"answer\": \"42\"}\n```\nDone.";
        assert!(validate(TaskKind::CodeqaAnswer, &response(fenced)).is_ok());

        let prose = "Sure! {\"design\": \"Add a cache\", \"reasoning\": \"step one\\nstep two\"} hope it helps";
        let parsed = validate(TaskKind::Design, &response(prose)).unwrap();
        assert_eq!(parsed.reasoning, vec!["step one", "step two"]);
    }

    #[test]
    fn test_missing_or_empty_fields_fail() {
        let err = validate(TaskKind::Qa, &response(r#"{"question": "What?", "answer": "  "}"#))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(validate(TaskKind::Design, &response("no json here")).is_err());
        assert!(validate(TaskKind::Design, &response("[1, 2]")).is_err());
    }

    #[test]
    fn test_structured_payload_wins() {
        let mut r = response("garbage");
        r.structured = Some(json!({ "design": { "steps": ["x"] } }));
        let parsed = validate(TaskKind::Design, &r).unwrap();
        match parsed.payload {
            Payload::Design { design } => assert!(design.contains("steps")),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
