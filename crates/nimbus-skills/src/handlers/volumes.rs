use super::{optional_str, required_int, required_str, HandlerError};
use crate::cloud::CloudApi;
use nimbus_core::{ExecutionOutput, OperationHandler};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct CreateVolume {
    cloud: Arc<dyn CloudApi>,
}

impl CreateVolume {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for CreateVolume {
    fn name(&self) -> &str {
        "create_volume"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let name = required_str(args, "name")?;
        let size_gb = required_int(args, "size_gb")?;
        Ok(ExecutionOutput::Resource(
            self.cloud.create_volume(name, size_gb).await?,
        ))
    }
}

pub struct DeleteVolume {
    cloud: Arc<dyn CloudApi>,
}

impl DeleteVolume {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for DeleteVolume {
    fn name(&self) -> &str {
        "delete_volume"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let target = required_str(args, "volume_id_or_name")?;
        let volume = self.cloud.delete_volume(target).await?;
        Ok(ExecutionOutput::Acknowledged(format!(
            "Volume '{}' (ID: {}) deleted.",
            volume.attr_str("name").unwrap_or(target),
            volume.id
        )))
    }
}

pub struct AttachVolume {
    cloud: Arc<dyn CloudApi>,
}

impl AttachVolume {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for AttachVolume {
    fn name(&self) -> &str {
        "attach_volume"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let server = required_str(args, "server_id_or_name")?;
        let volume = required_str(args, "volume_id_or_name")?;
        let device = optional_str(args, "device");
        let attached = self.cloud.attach_volume(server, volume, device).await?;
        Ok(ExecutionOutput::Acknowledged(format!(
            "Volume '{}' attached to server '{}' at {}.",
            attached.attr_str("name").unwrap_or(volume),
            attached.attr_str("attached_to").unwrap_or(server),
            attached.attr_str("device").unwrap_or("an automatic device")
        )))
    }
}

pub struct DetachVolume {
    cloud: Arc<dyn CloudApi>,
}

impl DetachVolume {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }
}

#[async_trait::async_trait]
impl OperationHandler for DetachVolume {
    fn name(&self) -> &str {
        "detach_volume"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ExecutionOutput, HandlerError> {
        let server = required_str(args, "server_id_or_name")?;
        let volume = required_str(args, "volume_id_or_name")?;
        let detached = self.cloud.detach_volume(server, volume).await?;
        Ok(ExecutionOutput::Acknowledged(format!(
            "Volume '{}' detached from server '{}'.",
            detached.attr_str("name").unwrap_or(volume),
            server
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::ServerRequest;
    use crate::FixtureCloud;
    use serde_json::json;

    #[tokio::test]
    async fn attach_reports_assigned_device() {
        let cloud: Arc<dyn CloudApi> = Arc::new(FixtureCloud::temporary().unwrap());
        cloud
            .create_server(&ServerRequest {
                name: "worker".into(),
                image_name: "CentOS-8".into(),
                flavor_name: "m1.tiny".into(),
                network_name: "private-net".into(),
                volume_size: None,
            })
            .await
            .unwrap();
        let created = CreateVolume::new(cloud.clone())
            .execute(json!({"name": "cache", "size_gb": 8}).as_object().unwrap())
            .await
            .unwrap();
        assert!(created.output_lines()[0].contains("Size: 8 GB"));

        let attached = AttachVolume::new(cloud)
            .execute(
                json!({"server_id_or_name": "worker", "volume_id_or_name": "cache"})
                    .as_object()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            attached.raw_output().as_deref(),
            Some("Volume 'cache' attached to server 'worker' at /dev/vdb.")
        );
    }
}
