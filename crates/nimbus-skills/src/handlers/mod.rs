//! One [`OperationHandler`] per catalog operation, all backed by a [`CloudApi`].

mod inventory;
mod networks;
mod servers;
mod volumes;

pub use inventory::{GetUsage, ListResources};
pub use networks::{CreateNetwork, DeleteNetwork};
pub use servers::{CreateServer, DeleteServer, GetServerDetails, ResizeServer};
pub use volumes::{AttachVolume, CreateVolume, DeleteVolume, DetachVolume};

use crate::cloud::CloudApi;
use nimbus_core::{HandlerRegistry, OperationHandler, ResourceKind};
use serde_json::{Map, Value};
use std::sync::Arc;

type HandlerError = Box<dyn std::error::Error + Send + Sync>;

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, HandlerError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing argument '{}'", key).into())
}

fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn required_int(args: &Map<String, Value>, key: &str) -> Result<i64, HandlerError> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("missing integer argument '{}'", key).into())
}

/// Registers a handler for every operation in the standard catalog.
pub fn register_all(registry: &mut HandlerRegistry, cloud: Arc<dyn CloudApi>) {
    let handlers: Vec<Arc<dyn OperationHandler>> = vec![
        Arc::new(ListResources::new("list_servers", ResourceKind::Server, cloud.clone())),
        Arc::new(ListResources::new("list_images", ResourceKind::Image, cloud.clone())),
        Arc::new(ListResources::new("list_flavors", ResourceKind::Flavor, cloud.clone())),
        Arc::new(ListResources::new("list_networks", ResourceKind::Network, cloud.clone())),
        Arc::new(ListResources::new("list_volumes", ResourceKind::Volume, cloud.clone())),
        Arc::new(GetServerDetails::new(cloud.clone())),
        Arc::new(CreateServer::new(cloud.clone())),
        Arc::new(DeleteServer::new(cloud.clone())),
        Arc::new(ResizeServer::new(cloud.clone())),
        Arc::new(CreateVolume::new(cloud.clone())),
        Arc::new(DeleteVolume::new(cloud.clone())),
        Arc::new(AttachVolume::new(cloud.clone())),
        Arc::new(DetachVolume::new(cloud.clone())),
        Arc::new(CreateNetwork::new(cloud.clone())),
        Arc::new(DeleteNetwork::new(cloud.clone())),
        Arc::new(GetUsage::new(cloud)),
    ];
    for handler in handlers {
        registry.register(handler);
    }
}
