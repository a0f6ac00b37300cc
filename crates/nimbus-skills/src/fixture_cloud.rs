//! Sled-backed stand-in for a cloud control plane, one tree per resource kind.
//!
//! Seeded on first open with a small image, flavor and network inventory so a fresh
//! gateway can create servers immediately.

use crate::cloud::{CloudApi, ServerRequest};
use nimbus_core::{CloudError, FailureKind, Resource, ResourceKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sled::Db;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

trait Record: Serialize + DeserializeOwned {
    const TREE: &'static str;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

macro_rules! record {
    ($ty:ty, $tree:literal) => {
        impl Record for $ty {
            const TREE: &'static str = $tree;
            fn id(&self) -> &str {
                &self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerRecord {
    id: String,
    name: String,
    status: String,
    image: String,
    flavor: String,
    /// network name -> fixed IP
    addresses: BTreeMap<String, String>,
    created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageRecord {
    id: String,
    name: String,
    min_disk_gb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlavorRecord {
    id: String,
    name: String,
    vcpus: i64,
    ram_mb: i64,
    disk_gb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkRecord {
    id: String,
    name: String,
    status: String,
    subnet_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubnetRecord {
    id: String,
    name: String,
    cidr: String,
    network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VolumeRecord {
    id: String,
    name: String,
    status: String,
    size_gb: i64,
    /// Server id.
    attached_to: Option<String>,
    device: Option<String>,
}

record!(ServerRecord, "servers");
record!(ImageRecord, "images");
record!(FlavorRecord, "flavors");
record!(NetworkRecord, "networks");
record!(SubnetRecord, "subnets");
record!(VolumeRecord, "volumes");

const SEED_IMAGES: [(&str, i64); 4] = [
    ("Ubuntu-20.04", 10),
    ("Ubuntu-22.04", 10),
    ("CentOS-8", 10),
    ("Debian-12", 8),
];

const SEED_FLAVORS: [(&str, i64, i64, i64); 5] = [
    ("m1.tiny", 1, 512, 1),
    ("m1.small", 1, 2048, 20),
    ("m1.medium", 2, 4096, 40),
    ("m1.large", 4, 8192, 80),
    ("m1.xlarge", 8, 16384, 160),
];

const SEED_NETWORKS: [(&str, &str, &str); 2] = [
    ("private-net", "private-subnet", "10.0.0.0/24"),
    ("public-net", "public-subnet", "172.24.4.0/24"),
];

fn storage(err: sled::Error) -> CloudError {
    CloudError::unavailable(format!("inventory storage error: {}", err))
}

fn corrupt(err: serde_json::Error) -> CloudError {
    CloudError::new(FailureKind::Internal, format!("inventory record is corrupt: {}", err))
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Fixture cloud over a sled database.
pub struct FixtureCloud {
    db: Db,
    /// Serializes check-then-write sequences (duplicate names, attachment state).
    write_lock: Mutex<()>,
}

impl FixtureCloud {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, CloudError> {
        let db = sled::open(path).map_err(storage)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop; used by tests and `--verify`.
    pub fn temporary() -> Result<Self, CloudError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, CloudError> {
        let cloud = Self {
            db,
            write_lock: Mutex::new(()),
        };
        cloud.seed_if_empty()?;
        Ok(cloud)
    }

    fn seed_if_empty(&self) -> Result<(), CloudError> {
        let images = self.db.open_tree(ImageRecord::TREE).map_err(storage)?;
        if !images.is_empty() {
            return Ok(());
        }
        tracing::info!(target: "nimbus::cloud", "seeding fixture inventory");
        for (name, min_disk_gb) in SEED_IMAGES {
            self.put(&ImageRecord {
                id: new_id(),
                name: name.to_string(),
                min_disk_gb,
            })?;
        }
        for (i, (name, vcpus, ram_mb, disk_gb)) in SEED_FLAVORS.into_iter().enumerate() {
            self.put(&FlavorRecord {
                id: (i + 1).to_string(),
                name: name.to_string(),
                vcpus,
                ram_mb,
                disk_gb,
            })?;
        }
        for (name, subnet_name, cidr) in SEED_NETWORKS {
            self.insert_network(name, subnet_name, cidr)?;
        }
        self.db.flush().map_err(storage)?;
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn all<R: Record>(&self) -> Result<Vec<R>, CloudError> {
        let tree = self.db.open_tree(R::TREE).map_err(storage)?;
        let mut records = Vec::new();
        for item in tree.iter() {
            let (_, bytes) = item.map_err(storage)?;
            records.push(serde_json::from_slice::<R>(&bytes).map_err(corrupt)?);
        }
        records.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(records)
    }

    fn find<R: Record>(&self, id_or_name: &str) -> Result<Option<R>, CloudError> {
        let needle = id_or_name.trim();
        Ok(self
            .all::<R>()?
            .into_iter()
            .find(|r| r.id() == needle || r.name() == needle))
    }

    fn require<R: Record>(&self, label: &str, id_or_name: &str) -> Result<R, CloudError> {
        self.find::<R>(id_or_name)?
            .ok_or_else(|| CloudError::not_found(format!("{} '{}' not found", label, id_or_name)))
    }

    fn reject_duplicate<R: Record>(&self, label: &str, name: &str) -> Result<(), CloudError> {
        if self.all::<R>()?.iter().any(|r| r.name() == name) {
            return Err(CloudError::rejected(format!(
                "a {} named '{}' already exists",
                label, name
            )));
        }
        Ok(())
    }

    fn put<R: Record>(&self, record: &R) -> Result<(), CloudError> {
        let tree = self.db.open_tree(R::TREE).map_err(storage)?;
        let bytes = serde_json::to_vec(record).map_err(corrupt)?;
        let prev = tree.insert(record.id().as_bytes(), bytes).map_err(storage)?;
        tracing::info!(
            target: "nimbus::cloud",
            tree = R::TREE,
            id = record.id(),
            name = record.name(),
            action = if prev.is_some() { "UPDATE" } else { "INSERT" },
            "inventory write"
        );
        Ok(())
    }

    fn remove<R: Record>(&self, record: &R) -> Result<(), CloudError> {
        let tree = self.db.open_tree(R::TREE).map_err(storage)?;
        tree.remove(record.id().as_bytes()).map_err(storage)?;
        tracing::info!(
            target: "nimbus::cloud",
            tree = R::TREE,
            id = record.id(),
            name = record.name(),
            action = "REMOVE",
            "inventory write"
        );
        Ok(())
    }

    fn insert_network(
        &self,
        name: &str,
        subnet_name: &str,
        cidr: &str,
    ) -> Result<NetworkRecord, CloudError> {
        let network_id = new_id();
        let subnet = SubnetRecord {
            id: format!("subnet-{}", new_id()),
            name: subnet_name.to_string(),
            cidr: cidr.to_string(),
            network_id: network_id.clone(),
        };
        let network = NetworkRecord {
            id: network_id,
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            subnet_ids: vec![subnet.id.clone()],
        };
        self.put(&subnet)?;
        self.put(&network)?;
        Ok(network)
    }

    fn server_resource(&self, server: &ServerRecord) -> Result<Resource, CloudError> {
        let volumes: Vec<String> = self
            .all::<VolumeRecord>()?
            .into_iter()
            .filter(|v| v.attached_to.as_deref() == Some(server.id.as_str()))
            .map(|v| v.name)
            .collect();
        Ok(Resource {
            id: server.id.clone(),
            kind: ResourceKind::Server,
            status: server.status.clone(),
            attributes: object(json!({
                "name": server.name,
                "image": server.image,
                "flavor": server.flavor,
                "addresses": server.addresses,
                "volumes": volumes,
                "created_at": server.created_at,
            })),
        })
    }

    fn volume_resource(&self, volume: &VolumeRecord) -> Result<Resource, CloudError> {
        let mut attributes = object(json!({
            "name": volume.name,
            "size_gb": volume.size_gb,
        }));
        if let Some(server_id) = &volume.attached_to {
            let server_name = self
                .find::<ServerRecord>(server_id)?
                .map(|s| s.name)
                .unwrap_or_else(|| server_id.clone());
            attributes.insert("attached_to".into(), Value::String(server_name));
        }
        if let Some(device) = &volume.device {
            attributes.insert("device".into(), Value::String(device.clone()));
        }
        Ok(Resource {
            id: volume.id.clone(),
            kind: ResourceKind::Volume,
            status: volume.status.clone(),
            attributes,
        })
    }

    fn network_resource(&self, network: &NetworkRecord) -> Result<Resource, CloudError> {
        let subnets: Vec<Value> = self
            .all::<SubnetRecord>()?
            .into_iter()
            .filter(|s| network.subnet_ids.contains(&s.id))
            .map(|s| json!({"id": s.id, "name": s.name, "cidr": s.cidr}))
            .collect();
        Ok(Resource {
            id: network.id.clone(),
            kind: ResourceKind::Network,
            status: network.status.clone(),
            attributes: object(json!({"name": network.name, "subnets": subnets})),
        })
    }

    fn usage_resource(
        &self,
        id: &str,
        name: &str,
        servers: &[ServerRecord],
        volumes: &[VolumeRecord],
    ) -> Result<Resource, CloudError> {
        let flavors = self.all::<FlavorRecord>()?;
        let (mut vcpus, mut ram_mb, mut disk_gb) = (0, 0, 0);
        for server in servers {
            if let Some(f) = flavors.iter().find(|f| f.name == server.flavor) {
                vcpus += f.vcpus;
                ram_mb += f.ram_mb;
                disk_gb += f.disk_gb;
            }
        }
        let volume_gb: i64 = volumes.iter().map(|v| v.size_gb).sum();
        Ok(Resource {
            id: id.to_string(),
            kind: ResourceKind::Usage,
            status: "ok".to_string(),
            attributes: object(json!({
                "name": name,
                "servers": servers.len(),
                "vcpus": vcpus,
                "ram_mb": ram_mb,
                "disk_gb": disk_gb,
                "volumes": volumes.len(),
                "volume_gb": volume_gb,
            })),
        })
    }
}

#[async_trait::async_trait]
impl CloudApi for FixtureCloud {
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, CloudError> {
        match kind {
            ResourceKind::Server => self
                .all::<ServerRecord>()?
                .iter()
                .map(|s| self.server_resource(s))
                .collect(),
            ResourceKind::Image => Ok(self
                .all::<ImageRecord>()?
                .into_iter()
                .map(|i| Resource {
                    id: i.id,
                    kind: ResourceKind::Image,
                    status: "active".to_string(),
                    attributes: object(json!({"name": i.name, "min_disk_gb": i.min_disk_gb})),
                })
                .collect()),
            ResourceKind::Flavor => Ok(self
                .all::<FlavorRecord>()?
                .into_iter()
                .map(|f| Resource {
                    id: f.id,
                    kind: ResourceKind::Flavor,
                    status: "available".to_string(),
                    attributes: object(json!({
                        "name": f.name,
                        "vcpus": f.vcpus,
                        "ram_mb": f.ram_mb,
                        "disk_gb": f.disk_gb,
                    })),
                })
                .collect()),
            ResourceKind::Network => self
                .all::<NetworkRecord>()?
                .iter()
                .map(|n| self.network_resource(n))
                .collect(),
            ResourceKind::Subnet => Ok(self
                .all::<SubnetRecord>()?
                .into_iter()
                .map(|s| Resource {
                    id: s.id,
                    kind: ResourceKind::Subnet,
                    status: "ACTIVE".to_string(),
                    attributes: object(json!({
                        "name": s.name,
                        "cidr": s.cidr,
                        "network_id": s.network_id,
                    })),
                })
                .collect()),
            ResourceKind::Volume => self
                .all::<VolumeRecord>()?
                .iter()
                .map(|v| self.volume_resource(v))
                .collect(),
            ResourceKind::Usage => Ok(vec![self.usage(None).await?]),
        }
    }

    async fn get_server(&self, id_or_name: &str) -> Result<Resource, CloudError> {
        let server = self.require::<ServerRecord>("server", id_or_name)?;
        self.server_resource(&server)
    }

    async fn create_server(&self, request: &ServerRequest) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        self.reject_duplicate::<ServerRecord>("server", &request.name)?;
        let image = self.require::<ImageRecord>("image", &request.image_name)?;
        let flavor = self.require::<FlavorRecord>("flavor", &request.flavor_name)?;
        let network = self.require::<NetworkRecord>("network", &request.network_name)?;
        let boot_volume = match request.volume_size {
            Some(size) => {
                let name = format!("{}-boot-volume", request.name);
                self.reject_duplicate::<VolumeRecord>("volume", &name)?;
                Some((name, size))
            }
            None => None,
        };

        let existing = self.all::<ServerRecord>()?.len();
        let mut addresses = BTreeMap::new();
        addresses.insert(network.name.clone(), format!("192.168.{}.100", existing + 1));
        let server = ServerRecord {
            id: new_id(),
            name: request.name.clone(),
            status: "ACTIVE".to_string(),
            image: image.name,
            flavor: flavor.name,
            addresses,
            created_at: unix_now(),
        };
        self.put(&server)?;

        if let Some((name, size_gb)) = boot_volume {
            self.put(&VolumeRecord {
                id: new_id(),
                name,
                status: "in-use".to_string(),
                size_gb,
                attached_to: Some(server.id.clone()),
                device: Some("/dev/vda".to_string()),
            })?;
        }
        self.server_resource(&server)
    }

    async fn delete_server(&self, id_or_name: &str) -> Result<(Resource, Vec<String>), CloudError> {
        let _guard = self.guard();
        let server = self.require::<ServerRecord>("server", id_or_name)?;
        let resource = self.server_resource(&server)?;
        let mut removed = Vec::new();
        for volume in self.all::<VolumeRecord>()? {
            if volume.attached_to.as_deref() == Some(server.id.as_str()) {
                self.remove(&volume)?;
                removed.push(volume.name);
            }
        }
        self.remove(&server)?;
        Ok((resource, removed))
    }

    async fn resize_server(
        &self,
        id_or_name: &str,
        flavor_name: &str,
    ) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        let mut server = self.require::<ServerRecord>("server", id_or_name)?;
        let flavor = self.require::<FlavorRecord>("flavor", flavor_name)?;
        if server.flavor == flavor.name {
            return Err(CloudError::rejected(format!(
                "server '{}' already uses flavor '{}'",
                server.name, flavor.name
            )));
        }
        server.flavor = flavor.name;
        self.put(&server)?;
        self.server_resource(&server)
    }

    async fn create_volume(&self, name: &str, size_gb: i64) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        self.reject_duplicate::<VolumeRecord>("volume", name)?;
        let volume = VolumeRecord {
            id: new_id(),
            name: name.to_string(),
            status: "available".to_string(),
            size_gb,
            attached_to: None,
            device: None,
        };
        self.put(&volume)?;
        self.volume_resource(&volume)
    }

    async fn delete_volume(&self, id_or_name: &str) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        let volume = self.require::<VolumeRecord>("volume", id_or_name)?;
        if volume.attached_to.is_some() {
            let resource = self.volume_resource(&volume)?;
            return Err(CloudError::rejected(format!(
                "volume '{}' is attached to server '{}'; detach it first",
                volume.name,
                resource.attr_str("attached_to").unwrap_or("?")
            )));
        }
        let resource = self.volume_resource(&volume)?;
        self.remove(&volume)?;
        Ok(resource)
    }

    async fn attach_volume(
        &self,
        server: &str,
        volume: &str,
        device: Option<&str>,
    ) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        let server = self.require::<ServerRecord>("server", server)?;
        let mut volume = self.require::<VolumeRecord>("volume", volume)?;
        if volume.attached_to.is_some() {
            return Err(CloudError::rejected(format!(
                "volume '{}' is already in use",
                volume.name
            )));
        }
        let used: Vec<String> = self
            .all::<VolumeRecord>()?
            .into_iter()
            .filter(|v| v.attached_to.as_deref() == Some(server.id.as_str()))
            .filter_map(|v| v.device)
            .collect();
        let device = match device {
            Some(d) if used.iter().any(|u| u == d) => {
                return Err(CloudError::rejected(format!(
                    "device {} is already used on server '{}'",
                    d, server.name
                )))
            }
            Some(d) => d.to_string(),
            None => (b'b'..=b'z')
                .map(|c| format!("/dev/vd{}", c as char))
                .find(|d| !used.contains(d))
                .ok_or_else(|| {
                    CloudError::rejected(format!("server '{}' has no free device slot", server.name))
                })?,
        };
        volume.status = "in-use".to_string();
        volume.attached_to = Some(server.id.clone());
        volume.device = Some(device);
        self.put(&volume)?;
        self.volume_resource(&volume)
    }

    async fn detach_volume(&self, server: &str, volume: &str) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        let server = self.require::<ServerRecord>("server", server)?;
        let mut volume = self.require::<VolumeRecord>("volume", volume)?;
        if volume.attached_to.as_deref() != Some(server.id.as_str()) {
            return Err(CloudError::rejected(format!(
                "volume '{}' is not attached to server '{}'",
                volume.name, server.name
            )));
        }
        volume.status = "available".to_string();
        volume.attached_to = None;
        volume.device = None;
        self.put(&volume)?;
        self.volume_resource(&volume)
    }

    async fn create_network(
        &self,
        name: &str,
        cidr: &str,
        subnet_name: Option<&str>,
    ) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        self.reject_duplicate::<NetworkRecord>("network", name)?;
        let subnet_name = subnet_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-subnet", name));
        let network = self.insert_network(name, &subnet_name, cidr)?;
        self.network_resource(&network)
    }

    async fn delete_network(&self, id_or_name: &str) -> Result<Resource, CloudError> {
        let _guard = self.guard();
        let network = self.require::<NetworkRecord>("network", id_or_name)?;
        let attached = self
            .all::<ServerRecord>()?
            .iter()
            .filter(|s| s.addresses.contains_key(&network.name))
            .count();
        if attached > 0 {
            return Err(CloudError::rejected(format!(
                "network '{}' still has {} server(s) attached",
                network.name, attached
            )));
        }
        let resource = self.network_resource(&network)?;
        for subnet in self.all::<SubnetRecord>()? {
            if subnet.network_id == network.id {
                self.remove(&subnet)?;
            }
        }
        self.remove(&network)?;
        Ok(resource)
    }

    async fn usage(&self, identifier: Option<&str>) -> Result<Resource, CloudError> {
        let identifier = identifier.map(str::trim).filter(|s| !s.is_empty());
        match identifier {
            None => {
                let servers = self.all::<ServerRecord>()?;
                let volumes = self.all::<VolumeRecord>()?;
                self.usage_resource("project", "project", &servers, &volumes)
            }
            Some(id) if id.eq_ignore_ascii_case("project") => {
                let servers = self.all::<ServerRecord>()?;
                let volumes = self.all::<VolumeRecord>()?;
                self.usage_resource("project", "project", &servers, &volumes)
            }
            Some(id) => {
                let server = self
                    .find::<ServerRecord>(id)?
                    .ok_or_else(|| CloudError::not_found(format!("'{}' not found", id)))?;
                let volumes: Vec<VolumeRecord> = self
                    .all::<VolumeRecord>()?
                    .into_iter()
                    .filter(|v| v.attached_to.as_deref() == Some(server.id.as_str()))
                    .collect();
                let name = server.name.clone();
                self.usage_resource(&server.id, &name, std::slice::from_ref(&server), &volumes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, volume_size: Option<i64>) -> ServerRequest {
        ServerRequest {
            name: name.to_string(),
            image_name: "Ubuntu-22.04".to_string(),
            flavor_name: "m1.small".to_string(),
            network_name: "private-net".to_string(),
            volume_size,
        }
    }

    #[tokio::test]
    async fn seeds_inventory_once() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cloud = FixtureCloud::open_path(dir.path()).unwrap();
            assert_eq!(cloud.list(ResourceKind::Image).await.unwrap().len(), 4);
            assert_eq!(cloud.list(ResourceKind::Flavor).await.unwrap().len(), 5);
            assert_eq!(cloud.list(ResourceKind::Network).await.unwrap().len(), 2);
        }
        let reopened = FixtureCloud::open_path(dir.path()).unwrap();
        assert_eq!(reopened.list(ResourceKind::Image).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn create_server_assigns_address_and_boot_volume() {
        let cloud = FixtureCloud::temporary().unwrap();
        let server = cloud.create_server(&request("web-1", Some(15))).await.unwrap();
        assert_eq!(server.status, "ACTIVE");
        assert_eq!(
            server.attributes["addresses"]["private-net"],
            json!("192.168.1.100")
        );
        assert_eq!(server.attributes["volumes"], json!(["web-1-boot-volume"]));

        let second = cloud.create_server(&request("web-2", None)).await.unwrap();
        assert_eq!(
            second.attributes["addresses"]["private-net"],
            json!("192.168.2.100")
        );

        let dup = cloud.create_server(&request("web-1", None)).await.unwrap_err();
        assert_eq!(dup.kind, FailureKind::Rejected);

        let mut bad = request("web-3", None);
        bad.image_name = "Windows-95".into();
        let err = cloud.create_server(&bad).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
        assert_eq!(err.message, "image 'Windows-95' not found");
    }

    #[tokio::test]
    async fn delete_server_removes_attached_volumes() {
        let cloud = FixtureCloud::temporary().unwrap();
        let server = cloud.create_server(&request("db-1", Some(20))).await.unwrap();
        cloud.create_volume("scratch", 5).await.unwrap();
        let (_, removed) = cloud.delete_server(&server.id).await.unwrap();
        assert_eq!(removed, vec!["db-1-boot-volume"]);
        let volumes = cloud.list(ResourceKind::Volume).await.unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].attr_str("name"), Some("scratch"));

        let missing = cloud.delete_server("db-1").await.unwrap_err();
        assert_eq!(missing.kind, FailureKind::NotFound);
    }

    #[tokio::test]
    async fn attach_detach_and_delete_volume() {
        let cloud = FixtureCloud::temporary().unwrap();
        cloud.create_server(&request("app", None)).await.unwrap();
        cloud.create_volume("data", 50).await.unwrap();

        let attached = cloud.attach_volume("app", "data", None).await.unwrap();
        assert_eq!(attached.status, "in-use");
        assert_eq!(attached.attr_str("device"), Some("/dev/vdb"));
        assert_eq!(attached.attr_str("attached_to"), Some("app"));

        let busy = cloud.delete_volume("data").await.unwrap_err();
        assert_eq!(busy.kind, FailureKind::Rejected);

        cloud.detach_volume("app", "data").await.unwrap();
        let again = cloud.detach_volume("app", "data").await.unwrap_err();
        assert_eq!(again.kind, FailureKind::Rejected);
        cloud.delete_volume("data").await.unwrap();
    }

    #[tokio::test]
    async fn networks_in_use_cannot_be_deleted() {
        let cloud = FixtureCloud::temporary().unwrap();
        let net = cloud.create_network("lab-net", "10.9.0.0/24", None).await.unwrap();
        assert_eq!(net.attributes["subnets"][0]["name"], json!("lab-net-subnet"));

        let mut req = request("probe", None);
        req.network_name = "lab-net".into();
        cloud.create_server(&req).await.unwrap();
        let err = cloud.delete_network("lab-net").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Rejected);

        cloud.delete_server("probe").await.unwrap();
        cloud.delete_network("lab-net").await.unwrap();
        assert_eq!(cloud.list(ResourceKind::Subnet).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn usage_aggregates_flavors_and_volumes() {
        let cloud = FixtureCloud::temporary().unwrap();
        cloud.create_server(&request("a", Some(10))).await.unwrap();
        let mut big = request("b", None);
        big.flavor_name = "m1.large".into();
        cloud.create_server(&big).await.unwrap();
        cloud.create_volume("loose", 5).await.unwrap();

        let project = cloud.usage(None).await.unwrap();
        assert_eq!(project.attributes["servers"], json!(2));
        assert_eq!(project.attributes["vcpus"], json!(5));
        assert_eq!(project.attributes["ram_mb"], json!(10240));
        assert_eq!(project.attributes["volume_gb"], json!(15));

        let one = cloud.usage(Some("a")).await.unwrap();
        assert_eq!(one.attributes["vcpus"], json!(1));
        assert_eq!(one.attributes["volume_gb"], json!(10));

        let err = cloud.usage(Some("ghost")).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
    }
}
