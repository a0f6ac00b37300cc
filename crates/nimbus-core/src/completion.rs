//! Parameter completion: merges caller answers into a pending call and decides
//! whether it is ready or still collecting.

use crate::call::OperationCall;
use crate::response::MissingParam;
use serde_json::{Map, Value};

/// Outcome of evaluating a call after a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Ready,
    Collecting {
        message: String,
        missing_params: Vec<MissingParam>,
    },
}

/// Applies a batch of answers. Keywords `default` / `your choice` pick the declared
/// default; `skip` / `none` leave an optional parameter unset and re-prompt a required one.
pub fn apply_answers(call: &mut OperationCall, answers: &Map<String, Value>) {
    for (name, value) in answers {
        let keyword = value
            .as_str()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match keyword.as_str() {
            "default" | "your choice" => {
                if !call.apply_default(name) && call.operation().parameter(name).is_some() {
                    call.reject(name, "no default is available, please give a value");
                }
            }
            "skip" | "none" => {
                if !call.skip(name) && call.operation().parameter(name).is_some() {
                    call.reject(name, "this parameter is required and cannot be skipped");
                }
            }
            _ => {
                if let Err(err) = call.supply(name, value) {
                    tracing::debug!(target: "nimbus::session", operation = %call.name(), error = %err, "answer rejected");
                }
            }
        }
    }
}

/// Treats a plain utterance as the answer to the next outstanding parameter.
pub fn apply_free_text(call: &mut OperationCall, text: &str) {
    let Some(next) = call.outstanding().first().map(|p| p.name.clone()) else {
        return;
    };
    let mut answers = Map::new();
    answers.insert(next, Value::String(text.trim().to_string()));
    apply_answers(call, &answers);
}

pub fn evaluate(call: &OperationCall) -> Progress {
    if call.is_ready() {
        return Progress::Ready;
    }
    let outstanding = call.outstanding();
    let missing_params = outstanding
        .iter()
        .map(|p| MissingParam {
            name: p.name.clone(),
            prompt: prompt_for(p.description.as_str(), p.default.as_ref()),
            type_label: p.param_type.label().to_string(),
        })
        .collect();

    let first_rejected = outstanding
        .iter()
        .find_map(|p| call.rejected().get(&p.name).map(|reason| (&p.name, reason)));
    let message = match first_rejected {
        Some((name, reason)) => format!(
            "Invalid value for '{}': {}. Please provide it again.",
            name, reason
        ),
        None => {
            let names: Vec<&str> = outstanding.iter().map(|p| p.name.as_str()).collect();
            format!(
                "To {} I still need: {}.",
                call.name().replace('_', " "),
                names.join(", ")
            )
        }
    };
    Progress::Collecting {
        message,
        missing_params,
    }
}

fn prompt_for(description: &str, default: Option<&Value>) -> String {
    match default {
        Some(d) => format!(
            "{} (or say 'default' for {})",
            description,
            crate::call::render_value(d)
        ),
        None => description.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationCatalog;
    use serde_json::json;

    fn create_server() -> OperationCall {
        let op = OperationCatalog::standard().lookup("create_server").unwrap();
        OperationCall::new(op, &Map::new())
    }

    #[test]
    fn free_text_answers_parameters_one_at_a_time() {
        let mut call = create_server();
        match evaluate(&call) {
            Progress::Collecting { missing_params, .. } => {
                assert_eq!(missing_params[0].name, "name");
                assert_eq!(missing_params[1].name, "image_name");
            }
            Progress::Ready => panic!("expected collecting"),
        }
        apply_free_text(&mut call, "web-1");
        assert_eq!(call.arguments()["name"], json!("web-1"));
        apply_free_text(&mut call, "Ubuntu-22.04");
        assert_eq!(evaluate(&call), Progress::Ready);
    }

    #[test]
    fn invalid_answer_is_reprompted_first_with_reason() {
        let op = OperationCatalog::standard().lookup("create_volume").unwrap();
        let mut call = OperationCall::new(op, &Map::new());
        let answers = json!({"name": "logs", "size_gb": "-4"});
        apply_answers(&mut call, answers.as_object().unwrap());
        match evaluate(&call) {
            Progress::Collecting {
                message,
                missing_params,
            } => {
                assert_eq!(missing_params.len(), 1);
                assert_eq!(missing_params[0].name, "size_gb");
                assert_eq!(missing_params[0].type_label, "integer");
                assert!(message.contains("must be at least 1"));
            }
            Progress::Ready => panic!("expected collecting"),
        }
        apply_free_text(&mut call, "default");
        assert_eq!(call.arguments()["size_gb"], json!(10));
        assert!(call.is_ready());
    }

    #[test]
    fn default_keyword_without_default_is_reprompted() {
        let mut call = create_server();
        let answers = json!({"name": "your choice"});
        apply_answers(&mut call, answers.as_object().unwrap());
        assert!(call.rejected().contains_key("name"));
        assert_eq!(call.outstanding()[0].name, "name");
    }

    #[test]
    fn reprompt_names_the_first_parameter_asked_for() {
        let op = OperationCatalog::standard().lookup("attach_volume").unwrap();
        let mut call = OperationCall::new(op, &Map::new());
        let answers = json!({"server_id_or_name": "  ", "device": {}});
        apply_answers(&mut call, answers.as_object().unwrap());
        assert_eq!(call.rejected().len(), 2);
        match evaluate(&call) {
            Progress::Collecting {
                message,
                missing_params,
            } => {
                assert_eq!(missing_params[0].name, "server_id_or_name");
                assert!(
                    message.starts_with("Invalid value for 'server_id_or_name'"),
                    "{message}"
                );
            }
            Progress::Ready => panic!("expected collecting"),
        }
    }

    #[test]
    fn skipping_a_required_parameter_is_refused() {
        let mut call = create_server();
        let answers = json!({"name": "none", "image_name": "skip"});
        apply_answers(&mut call, answers.as_object().unwrap());
        assert!(!call.arguments().contains_key("name"));
        assert!(!call.arguments().contains_key("image_name"));
        match evaluate(&call) {
            Progress::Collecting { message, .. } => {
                assert_eq!(
                    message,
                    "Invalid value for 'name': this parameter is required and cannot be skipped. Please provide it again."
                );
            }
            Progress::Ready => panic!("expected collecting"),
        }

        apply_free_text(&mut call, "web-1");
        apply_free_text(&mut call, "Ubuntu-22.04");
        assert!(call.is_ready());
    }
}
