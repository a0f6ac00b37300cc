//! Capability interface of the infrastructure control plane.

use nimbus_core::{CloudError, Resource, ResourceKind};

/// Everything needed to boot a server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRequest {
    pub name: String,
    pub image_name: String,
    pub flavor_name: String,
    pub network_name: String,
    /// Size of an attached boot volume; none means ephemeral disk only.
    pub volume_size: Option<i64>,
}

/// Control-plane calls used by the operation handlers. Resources are addressed by id or name.
#[async_trait::async_trait]
pub trait CloudApi: Send + Sync {
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, CloudError>;
    async fn get_server(&self, id_or_name: &str) -> Result<Resource, CloudError>;
    async fn create_server(&self, request: &ServerRequest) -> Result<Resource, CloudError>;
    /// Returns the deleted server plus the names of the volumes removed with it.
    async fn delete_server(&self, id_or_name: &str) -> Result<(Resource, Vec<String>), CloudError>;
    async fn resize_server(&self, id_or_name: &str, flavor_name: &str)
        -> Result<Resource, CloudError>;
    async fn create_volume(&self, name: &str, size_gb: i64) -> Result<Resource, CloudError>;
    async fn delete_volume(&self, id_or_name: &str) -> Result<Resource, CloudError>;
    async fn attach_volume(
        &self,
        server: &str,
        volume: &str,
        device: Option<&str>,
    ) -> Result<Resource, CloudError>;
    async fn detach_volume(&self, server: &str, volume: &str) -> Result<Resource, CloudError>;
    async fn create_network(
        &self,
        name: &str,
        cidr: &str,
        subnet_name: Option<&str>,
    ) -> Result<Resource, CloudError>;
    async fn delete_network(&self, id_or_name: &str) -> Result<Resource, CloudError>;
    /// Project-wide totals, or one server's share when `identifier` names a server.
    async fn usage(&self, identifier: Option<&str>) -> Result<Resource, CloudError>;
}
