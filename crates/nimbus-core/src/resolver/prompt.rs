use crate::call::render_value;
use crate::catalog::OperationCatalog;
use serde_json::{Map, Value};
use std::fmt::Write;

/// System preamble sent with every interpretation request.
pub const SYSTEM_PROMPT: &str = "You translate cloud operator requests into exactly one \
operation call. Reply with JSON only, no commentary.";

/// Renders the catalog and the utterance into the user message for the engine.
pub fn build_instruction(catalog: &OperationCatalog, utterance: &str) -> String {
    let mut out = String::new();
    write_operations(&mut out, catalog);
    let _ = write!(
        out,
        "\nUser request: \"{}\"\n\n\
         Instructions:\n\
         - Pick the single operation that best matches the request.\n\
         - Extract only the parameter values stated or clearly implied by the request.\n\
         - Omit parameters you cannot determine. Do NOT include placeholder values like 'Please provide...'.\n\
         - Answer with only: {{\"function_name\": \"<operation>\", \"parameters\": {{...}}}}\n\
         - If the request is unclear or matches no operation, answer: \
         {{\"function_name\": \"clarify\", \"parameters\": {{}}}}\n",
        utterance.trim()
    );
    out
}

/// User message for the second pass that checks a first-pass call against the request.
pub fn build_validation_instruction(
    catalog: &OperationCatalog,
    utterance: &str,
    operation: &str,
    arguments: &Map<String, Value>,
) -> String {
    let mut out = format!(
        "Validate whether the generated command reflects the user's request: \"{}\"\n\
         Generated command:\n  Function: {}\n  Parameters: {}\n\n",
        utterance.trim(),
        operation,
        Value::Object(arguments.clone())
    );
    write_operations(&mut out, catalog);
    out.push_str(
        "\nInstructions:\n\
         - Answer with only: {\"is_valid\": <bool>, \"feedback\": \"<text>\", \
         \"missing_parameters_based_on_intent\": [<parameter names>], \
         \"suggested_corrections\": {<parameter>: <value>}}\n\
         - List parameters the request implies but the command lacks in missing_parameters_based_on_intent.\n\
         - Only suggest corrections for values explicitly inferable from the request.\n\
         - Do NOT suggest placeholder values like 'Please provide...'.\n",
    );
    out
}

fn write_operations(out: &mut String, catalog: &OperationCatalog) {
    out.push_str("Available operations:\n");
    for (i, op) in catalog.all().iter().enumerate() {
        let _ = writeln!(out, "{}. {}: {}", i + 1, op.name, op.description);
        if op.parameters.is_empty() {
            let _ = writeln!(out, "   Parameters: none");
            continue;
        }
        let _ = writeln!(out, "   Parameters:");
        for p in &op.parameters {
            let requirement = match (&p.default, p.required) {
                (Some(d), _) => format!("Optional (default: {})", render_value(d)),
                (None, true) => "Required".to_string(),
                (None, false) => "Optional".to_string(),
            };
            let _ = writeln!(
                out,
                "   - {} ({}): {} [{}]",
                p.name,
                p.param_type.label(),
                p.description,
                requirement
            );
        }
    }
}
