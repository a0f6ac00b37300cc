//! OperationCall: an operation plus the arguments collected for it so far.

use crate::catalog::{OperationSpec, ParameterSpec};
use crate::error::CommandError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A call under assembly.
///
/// `missing` always equals the required parameter names (declaration order) minus the keys of
/// `arguments`. Every mutator recomputes it; nothing outside this type can touch either field.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationCall {
    operation: Arc<OperationSpec>,
    arguments: Map<String, Value>,
    missing: Vec<String>,
    /// Parameters whose last supplied value failed coercion, with the reason.
    rejected: BTreeMap<String, String>,
    /// Optional parameters the caller must still answer or skip.
    requested: Vec<String>,
}

impl OperationCall {
    /// Builds a call from raw (engine or caller) values. Invalid values are recorded as
    /// rejected and re-prompted; defaults fill everything that was neither supplied nor rejected.
    pub fn new(operation: Arc<OperationSpec>, raw: &Map<String, Value>) -> Self {
        let mut call = Self {
            operation,
            arguments: Map::new(),
            missing: Vec::new(),
            rejected: BTreeMap::new(),
            requested: Vec::new(),
        };
        for (name, value) in raw {
            let _ = call.supply(name, value);
        }
        let defaults: Vec<(String, Value)> = call
            .operation
            .parameters
            .iter()
            .filter(|p| !call.arguments.contains_key(&p.name) && !call.rejected.contains_key(&p.name))
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();
        for (name, value) in defaults {
            call.arguments.insert(name, value);
        }
        call.recompute_missing();
        call
    }

    pub fn operation(&self) -> &Arc<OperationSpec> {
        &self.operation
    }

    pub fn name(&self) -> &str {
        &self.operation.name
    }

    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn rejected(&self) -> &BTreeMap<String, String> {
        &self.rejected
    }

    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    /// Fully specified: nothing missing, requested or invalid.
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty() && self.rejected.is_empty() && self.requested.is_empty()
    }

    /// Parameters still needing input: rejected ones first, then missing or requested ones,
    /// each group in declaration order.
    pub fn outstanding(&self) -> Vec<&ParameterSpec> {
        let params = &self.operation.parameters;
        params
            .iter()
            .filter(|p| self.rejected.contains_key(&p.name))
            .chain(params.iter().filter(|p| {
                !self.rejected.contains_key(&p.name)
                    && (self.missing.contains(&p.name) || self.requested.contains(&p.name))
            }))
            .collect()
    }

    /// Asks for an unset optional parameter before the call may run. Returns false when the
    /// name is unknown or already covered by `missing` or `arguments`.
    pub fn request(&mut self, name: &str) -> bool {
        if self.operation.parameter(name).is_none()
            || self.arguments.contains_key(name)
            || self.missing.iter().any(|m| m == name)
            || self.requested.iter().any(|r| r == name)
        {
            return false;
        }
        self.requested.push(name.to_string());
        true
    }

    /// Sets one parameter. Unknown names are ignored; `null` counts as not supplied.
    pub fn supply(&mut self, name: &str, raw: &Value) -> Result<(), CommandError> {
        let Some(spec) = self.operation.parameter(name) else {
            tracing::debug!(
                target: "nimbus::session",
                operation = %self.operation.name,
                parameter = name,
                "ignoring unknown parameter"
            );
            return Ok(());
        };
        if raw.is_null() {
            return Ok(());
        }
        let result = match spec.param_type.coerce(raw) {
            Ok(value) => {
                self.rejected.remove(name);
                self.requested.retain(|r| r != name);
                self.arguments.insert(name.to_string(), value);
                Ok(())
            }
            Err(reason) => {
                self.arguments.remove(name);
                self.rejected.insert(name.to_string(), reason.clone());
                Err(CommandError::validation(name, reason))
            }
        };
        self.recompute_missing();
        result
    }

    /// Applies the declared default for `name`. Returns false when there is none.
    pub fn apply_default(&mut self, name: &str) -> bool {
        let Some(default) = self.operation.parameter(name).and_then(|p| p.default.clone()) else {
            return false;
        };
        self.rejected.remove(name);
        self.requested.retain(|r| r != name);
        self.arguments.insert(name.to_string(), default);
        self.recompute_missing();
        true
    }

    /// Leaves an optional parameter unset. Returns false for required parameters.
    pub fn skip(&mut self, name: &str) -> bool {
        match self.operation.parameter(name) {
            Some(spec) if !spec.required => {
                self.rejected.remove(name);
                self.requested.retain(|r| r != name);
                self.arguments.remove(name);
                self.recompute_missing();
                true
            }
            _ => false,
        }
    }

    /// Marks `name` as needing a fresh value, keeping the invariant intact.
    pub fn reject(&mut self, name: &str, reason: impl Into<String>) {
        if self.operation.parameter(name).is_none() {
            return;
        }
        self.arguments.remove(name);
        self.rejected.insert(name.to_string(), reason.into());
        self.recompute_missing();
    }

    /// `delete_server(server_id_or_name=vm-123)`, arguments in declaration order.
    pub fn summary(&self) -> String {
        let args: Vec<String> = self
            .operation
            .parameters
            .iter()
            .filter_map(|p| {
                self.arguments
                    .get(&p.name)
                    .map(|v| format!("{}={}", p.name, render_value(v)))
            })
            .collect();
        format!("{}({})", self.operation.name, args.join(", "))
    }

    fn recompute_missing(&mut self) {
        self.missing = self
            .operation
            .parameters
            .iter()
            .filter(|p| p.required && !self.arguments.contains_key(&p.name))
            .map(|p| p.name.clone())
            .collect();
    }
}

/// Text form of an argument without JSON quoting.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationCatalog;
    use serde_json::json;

    fn expected_missing(call: &OperationCall) -> Vec<String> {
        call.operation()
            .parameters
            .iter()
            .filter(|p| p.required && !call.arguments().contains_key(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_set_tracks_every_transition() {
        let catalog = OperationCatalog::standard();
        let op = catalog.lookup("create_server").unwrap();
        let mut call = OperationCall::new(op, &Map::new());
        assert_eq!(call.missing(), expected_missing(&call).as_slice());
        assert_eq!(call.missing(), ["name", "image_name"]);

        call.supply("name", &json!("web-1")).unwrap();
        assert_eq!(call.missing(), expected_missing(&call).as_slice());

        assert!(call.supply("flavor_name", &json!("   ")).is_err());
        assert_eq!(call.missing(), expected_missing(&call).as_slice());
        assert!(call.missing().contains(&"flavor_name".to_string()));

        assert!(call.apply_default("flavor_name"));
        call.supply("image_name", &json!("Ubuntu-22.04")).unwrap();
        assert_eq!(call.missing(), expected_missing(&call).as_slice());
        assert!(call.is_ready());
    }

    #[test]
    fn defaults_fill_only_unsupplied_and_unrejected() {
        let catalog = OperationCatalog::standard();
        let op = catalog.lookup("create_volume").unwrap();
        let call = OperationCall::new(op.clone(), &args(json!({"name": "data"})));
        assert_eq!(call.arguments()["size_gb"], json!(10));
        assert!(call.is_ready());

        let call = OperationCall::new(op, &args(json!({"name": "data", "size_gb": "lots"})));
        assert!(!call.arguments().contains_key("size_gb"));
        assert_eq!(call.missing(), ["size_gb"]);
        assert_eq!(call.outstanding()[0].name, "size_gb");
    }

    #[test]
    fn unknown_and_null_parameters_are_ignored() {
        let catalog = OperationCatalog::standard();
        let op = catalog.lookup("delete_server").unwrap();
        let call = OperationCall::new(
            op,
            &args(json!({"server_id_or_name": null, "force": true})),
        );
        assert!(!call.arguments().contains_key("force"));
        assert_eq!(call.missing(), ["server_id_or_name"]);
    }

    #[test]
    fn invalid_optional_value_blocks_until_fixed_or_skipped() {
        let catalog = OperationCatalog::standard();
        let op = catalog.lookup("create_server").unwrap();
        let mut call = OperationCall::new(
            op,
            &args(json!({"name": "a", "image_name": "CentOS-8", "volume_size": "huge"})),
        );
        assert!(call.missing().is_empty());
        assert!(!call.is_ready());
        assert!(call.skip("volume_size"));
        assert!(call.is_ready());
        assert!(!call.skip("name"));
    }

    #[test]
    fn requested_optional_blocks_until_answered_or_skipped() {
        let catalog = OperationCatalog::standard();
        let op = catalog.lookup("create_server").unwrap();
        let mut call = OperationCall::new(
            op,
            &args(json!({"name": "a", "image_name": "CentOS-8"})),
        );
        assert!(call.is_ready());
        assert!(call.request("volume_size"));
        assert!(!call.request("volume_size"));
        assert!(!call.request("flavor_name"));
        assert!(!call.request("no_such_param"));
        assert!(!call.is_ready());
        assert_eq!(call.missing(), expected_missing(&call).as_slice());
        assert_eq!(call.outstanding()[0].name, "volume_size");

        call.supply("volume_size", &json!(20)).unwrap();
        assert!(call.requested().is_empty());
        assert!(call.is_ready());

        let mut skipped = call.clone();
        skipped.skip("volume_size");
        assert!(skipped.request("volume_size"));
        assert!(skipped.skip("volume_size"));
        assert!(skipped.is_ready());
    }

    #[test]
    fn summary_lists_arguments_in_declaration_order() {
        let catalog = OperationCatalog::standard();
        let op = catalog.lookup("resize_server").unwrap();
        let call = OperationCall::new(
            op,
            &args(json!({"flavor_name": "m1.large", "server_id_or_name": "vm-123"})),
        );
        assert_eq!(
            call.summary(),
            "resize_server(server_id_or_name=vm-123, flavor_name=m1.large)"
        );
    }
}
