use super::{optional_str, required_str, HandlerError};
use crate::cloud::CloudApi;
use nimbus_core::{ExecutionOutput, OperationHandler};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct CreateNetwork {
    cloud: Arc<dyn CloudApi>,
}

impl CreateNetwork {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for CreateNetwork {
    fn name(&self) -> &str {
        "create_network"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let name = required_str(args, "network_name")?;
        let cidr = required_str(args, "subnet_cidr")?;
        let subnet_name = optional_str(args, "subnet_name");
        let network = self.cloud.create_network(name, cidr, subnet_name).await?;
        Ok(ExecutionOutput::Resource(network))
    }
}

pub struct DeleteNetwork {
    cloud: Arc<dyn CloudApi>,
}

impl DeleteNetwork {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for DeleteNetwork {
    fn name(&self) -> &str {
        "delete_network"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let target = required_str(args, "network_id_or_name")?;
        let network = self.cloud.delete_network(target).await?;
        Ok(ExecutionOutput::Acknowledged(format!(
            "Network '{}' (ID: {}) and its subnets deleted.",
            network.attr_str("name").unwrap_or(target),
            network.id
        )))
    }
}
