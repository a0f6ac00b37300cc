//! Turns whatever the understanding engine said into one of three shapes.

use serde::Deserialize;
use serde_json::{Map, Value};

const CLARIFY: &str = "clarify";
const PLACEHOLDER_PREFIX: &str = "please provide";

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Resolved {
        operation: String,
        arguments: Map<String, Value>,
    },
    Unresolved {
        message: String,
    },
    Malformed {
        reason: String,
    },
}

pub fn normalize(raw: &str) -> Interpretation {
    let text = raw.trim();
    let (candidate, looked_like_json) = match fenced_block(text) {
        Some(inner) => (inner, true),
        None if text.starts_with('{') => (text, true),
        None => match embedded_object(text) {
            Some(inner) => (inner, false),
            None => return unresolved(text),
        },
    };

    let value: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(err) if looked_like_json => {
            return Interpretation::Malformed {
                reason: format!("engine output is not valid JSON: {}", err),
            }
        }
        Err(_) => return unresolved(text),
    };
    let Value::Object(obj) = value else {
        return Interpretation::Malformed {
            reason: "engine output is not a JSON object".into(),
        };
    };

    let name = match obj.get("function_name").or_else(|| obj.get("operation_name")) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            return Interpretation::Malformed {
                reason: "operation name is not a string".into(),
            }
        }
    };
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    let name = match name {
        Some(n) if !n.is_empty() && !n.eq_ignore_ascii_case(CLARIFY) => n,
        _ => {
            return Interpretation::Unresolved {
                message: message.unwrap_or_else(|| {
                    "I could not tell which operation you want. Please rephrase or add details."
                        .to_string()
                }),
            }
        }
    };

    let arguments = match obj.get("parameters").or_else(|| obj.get("arguments")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params
            .iter()
            .filter(|(_, v)| !is_placeholder(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Some(_) => {
            return Interpretation::Malformed {
                reason: "parameters are not a JSON object".into(),
            }
        }
    };

    Interpretation::Resolved {
        operation: name,
        arguments,
    }
}

/// Verdict of the second engine pass over a first-pass call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(default)]
    pub feedback: String,
    /// Parameters the request implies but the first pass left out.
    #[serde(default, rename = "missing_parameters_based_on_intent")]
    pub missing_by_intent: Vec<String>,
    #[serde(default)]
    pub suggested_corrections: Map<String, Value>,
}

/// Parses a validation reply. `None` when no object with an `is_valid` flag can be found;
/// placeholder corrections are dropped.
pub fn parse_validation(raw: &str) -> Option<ValidationReport> {
    let text = raw.trim();
    let candidate = fenced_block(text).or_else(|| embedded_object(text))?;
    let mut report: ValidationReport = serde_json::from_str(candidate).ok()?;
    report.suggested_corrections.retain(|_, v| !is_placeholder(v));
    Some(report)
}

fn unresolved(text: &str) -> Interpretation {
    let message = if text.is_empty() {
        "I could not tell which operation you want. Please rephrase or add details.".to_string()
    } else {
        text.to_string()
    };
    Interpretation::Unresolved { message }
}

fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().to_ascii_lowercase().starts_with(PLACEHOLDER_PREFIX),
        _ => false,
    }
}

/// Contents of the first ``` fence (with or without a `json` tag).
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let end = after.find("```").unwrap_or(after.len());
    Some(after[..end].trim())
}

/// A `{...}` span inside prose, e.g. `Sure! {"function_name": ...}`.
fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_plain_and_fenced_json() {
        let plain = normalize(r#"{"function_name": "list_servers", "parameters": {}}"#);
        assert_eq!(
            plain,
            Interpretation::Resolved {
                operation: "list_servers".into(),
                arguments: Map::new()
            }
        );
        let fenced = normalize(
            "```json\n{\"operation_name\": \"delete_server\", \"arguments\": {\"server_id_or_name\": \"vm-123\"}}\n```",
        );
        match fenced {
            Interpretation::Resolved { operation, arguments } => {
                assert_eq!(operation, "delete_server");
                assert_eq!(arguments["server_id_or_name"], json!("vm-123"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clarify_and_prose_are_unresolved() {
        assert!(matches!(
            normalize(r#"{"function_name": "clarify", "parameters": {}}"#),
            Interpretation::Unresolved { .. }
        ));
        assert_eq!(
            normalize("Hello! I manage servers, volumes and networks."),
            Interpretation::Unresolved {
                message: "Hello! I manage servers, volumes and networks.".into()
            }
        );
    }

    #[test]
    fn broken_shapes_are_malformed() {
        assert!(matches!(normalize("{\"function_name\": "), Interpretation::Malformed { .. }));
        assert!(matches!(
            normalize(r#"{"function_name": 7}"#),
            Interpretation::Malformed { .. }
        ));
        assert!(matches!(
            normalize(r#"{"function_name": "list_servers", "parameters": [1]}"#),
            Interpretation::Malformed { .. }
        ));
    }

    #[test]
    fn validation_reply_keeps_real_corrections_only() {
        let report = parse_validation(
            "```json\n{\"is_valid\": false, \"feedback\": \"size was stated\", \
             \"missing_parameters_based_on_intent\": [\"volume_size\"], \
             \"suggested_corrections\": {\"image_name\": \"Ubuntu-22.04\", \"name\": \"Please provide a name\"}}\n```",
        )
        .unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.missing_by_intent, vec!["volume_size"]);
        assert_eq!(report.suggested_corrections.len(), 1);
        assert_eq!(report.suggested_corrections["image_name"], json!("Ubuntu-22.04"));

        let bare = parse_validation(r#"{"is_valid": true}"#).unwrap();
        assert!(bare.missing_by_intent.is_empty());
        assert!(parse_validation("looks fine to me").is_none());
        assert!(parse_validation(r#"{"feedback": "no verdict"}"#).is_none());
    }

    #[test]
    fn placeholders_and_nulls_are_dropped() {
        let out = normalize(
            r#"{"function_name": "create_server", "parameters": {"name": "Please provide a name", "image_name": null, "flavor_name": "m1.tiny"}}"#,
        );
        match out {
            Interpretation::Resolved { arguments, .. } => {
                assert_eq!(arguments.len(), 1);
                assert_eq!(arguments["flavor_name"], json!("m1.tiny"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
