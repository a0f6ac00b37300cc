use super::{optional_str, HandlerError};
use crate::cloud::CloudApi;
use nimbus_core::{ExecutionOutput, OperationHandler, ResourceKind};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Serves the `list_*` operations; one instance per resource kind.
pub struct ListResources {
    name: &'static str,
    kind: ResourceKind,
    cloud: Arc<dyn CloudApi>,
}

impl ListResources {
    pub fn new(name: &'static str, kind: ResourceKind, cloud: Arc<dyn CloudApi>) -> Self {
        Self { name, kind, cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for ListResources {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let items = self.cloud.list(self.kind).await?;
        Ok(ExecutionOutput::Resources {
            kind: self.kind,
            items,
        })
    }
}

pub struct GetUsage {
    cloud: Arc<dyn CloudApi>,
}

impl GetUsage {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for GetUsage {
    fn name(&self) -> &str {
        "get_usage"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let usage = self.cloud.usage(optional_str(args, "identifier")).await?;
        Ok(ExecutionOutput::Resource(usage))
    }
}
