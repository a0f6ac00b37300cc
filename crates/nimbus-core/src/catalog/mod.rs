//! Operation Catalog: static registry of every supported operation and its parameter schema.
//!
//! Pure data. Adding an operation means registering an [`OperationSpec`] here and an
//! [`crate::OperationHandler`] with the same name in the gateway registry; nothing in the
//! completion loop or confirmation gate changes.

mod builtin;
mod param;

pub use param::ParamType;

use serde::Serialize;
use std::sync::Arc;

/// One parameter of an operation, in catalog declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    /// Applied at call creation when the caller did not supply a value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Shown to the user when the value is missing.
    pub description: String,
}

impl ParameterSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            default: None,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Immutable description of one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    /// Destructive operations are never dispatched without a confirmed token.
    pub destructive: bool,
}

impl OperationSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: Vec::new(),
            destructive: false,
        }
    }

    pub fn param(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("operation '{0}' is already registered")]
    DuplicateOperation(String),
}

/// Ordered, read-only (after startup) set of operations. Safe to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct OperationCatalog {
    operations: Vec<Arc<OperationSpec>>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: OperationSpec) -> Result<(), CatalogError> {
        if self.lookup(&spec.name).is_some() {
            return Err(CatalogError::DuplicateOperation(spec.name));
        }
        self.operations.push(Arc::new(spec));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<OperationSpec>> {
        self.operations.iter().find(|op| op.name == name).cloned()
    }

    /// All operations in registration order (for presenting to the understanding engine).
    pub fn all(&self) -> &[Arc<OperationSpec>] {
        &self.operations
    }

    pub fn names(&self) -> Vec<String> {
        self.operations.iter().map(|op| op.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_stable_across_calls() {
        let catalog = OperationCatalog::standard();
        for name in catalog.names() {
            let first = catalog.lookup(&name).unwrap();
            let second = catalog.lookup(&name).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.name, name);
        }
        assert!(catalog.lookup("reboot_planet").is_none());
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let mut catalog = OperationCatalog::new();
        catalog
            .register(OperationSpec::new("list_servers", "List servers"))
            .unwrap();
        let err = catalog
            .register(OperationSpec::new("list_servers", "again"))
            .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateOperation("list_servers".into()));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn destructive_flag_is_explicit_per_entry() {
        let catalog = OperationCatalog::standard();
        let destructive: Vec<String> = catalog
            .all()
            .iter()
            .filter(|op| op.destructive)
            .map(|op| op.name.clone())
            .collect();
        assert_eq!(
            destructive,
            vec![
                "delete_server",
                "resize_server",
                "delete_volume",
                "detach_volume",
                "delete_network"
            ]
        );
        assert!(!catalog.lookup("create_server").unwrap().destructive);
    }
}
