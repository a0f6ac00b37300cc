use super::{optional_str, required_str, HandlerError};
use crate::cloud::{CloudApi, ServerRequest};
use nimbus_core::{ExecutionOutput, OperationHandler};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct GetServerDetails {
    cloud: Arc<dyn CloudApi>,
}

impl GetServerDetails {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for GetServerDetails {
    fn name(&self) -> &str {
        "get_server_details"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let target = required_str(args, "server_id_or_name")?;
        Ok(ExecutionOutput::Resource(self.cloud.get_server(target).await?))
    }
}

pub struct CreateServer {
    cloud: Arc<dyn CloudApi>,
}

impl CreateServer {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for CreateServer {
    fn name(&self) -> &str {
        "create_server"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let request = ServerRequest {
            name: required_str(args, "name")?.to_string(),
            image_name: required_str(args, "image_name")?.to_string(),
            flavor_name: required_str(args, "flavor_name")?.to_string(),
            network_name: required_str(args, "network_name")?.to_string(),
            volume_size: args.get("volume_size").and_then(Value::as_i64),
        };
        let server = self.cloud.create_server(&request).await?;
        Ok(ExecutionOutput::Resource(server))
    }
}

pub struct DeleteServer {
    cloud: Arc<dyn CloudApi>,
}

impl DeleteServer {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for DeleteServer {
    fn name(&self) -> &str {
        "delete_server"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let target = required_str(args, "server_id_or_name")?;
        let (server, volumes) = self.cloud.delete_server(target).await?;
        let name = server.attr_str("name").unwrap_or(target);
        let mut text = format!("Server '{}' (ID: {}) deleted.", name, server.id);
        if !volumes.is_empty() {
            text.push_str(&format!(" Removed attached volumes: {}.", volumes.join(", ")));
        }
        Ok(ExecutionOutput::Acknowledged(text))
    }
}

pub struct ResizeServer {
    cloud: Arc<dyn CloudApi>,
}

impl ResizeServer {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for ResizeServer {
    fn name(&self) -> &str {
        "resize_server"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let target = required_str(args, "server_id_or_name")?;
        let flavor = required_str(args, "flavor_name")?;
        let server = self.cloud.resize_server(target, flavor).await?;
        Ok(ExecutionOutput::Acknowledged(format!(
            "Server '{}' resized to flavor '{}'.",
            server.attr_str("name").unwrap_or(target),
            optional_str(&server.attributes, "flavor").unwrap_or(flavor)
        )))
    }
}
