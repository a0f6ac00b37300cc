//! Resource gateway: dispatch by operation name and normalize results and failures.

use crate::call::OperationCall;
use crate::catalog::OperationCatalog;
use crate::error::{CloudError, CommandError, FailureKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Server,
    Image,
    Flavor,
    Network,
    Subnet,
    Volume,
    Usage,
}

impl ResourceKind {
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Server => "servers",
            ResourceKind::Image => "images",
            ResourceKind::Flavor => "flavors",
            ResourceKind::Network => "networks",
            ResourceKind::Subnet => "subnets",
            ResourceKind::Volume => "volumes",
            ResourceKind::Usage => "usage reports",
        }
    }
}

/// Normalized infrastructure object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    pub status: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    fn attr_num(&self, key: &str) -> i64 {
        self.attributes.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    /// One human-readable line, e.g. `Name: web-1, ID: 3f.., Status: ACTIVE, Networks: private-net: 192.168.1.100`.
    pub fn display_line(&self) -> String {
        let name = self.attr_str("name").unwrap_or("-");
        let head = format!("Name: {}, ID: {}, Status: {}", name, self.id, self.status);
        match self.kind {
            ResourceKind::Server => {
                let networks = self
                    .attributes
                    .get("addresses")
                    .and_then(Value::as_object)
                    .map(|addrs| {
                        addrs
                            .iter()
                            .map(|(net, ip)| format!("{}: {}", net, ip.as_str().unwrap_or("-")))
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "none".to_string());
                format!(
                    "{}, Flavor: {}, Image: {}, Networks: {}",
                    head,
                    self.attr_str("flavor").unwrap_or("-"),
                    self.attr_str("image").unwrap_or("-"),
                    networks
                )
            }
            ResourceKind::Flavor => format!(
                "{}, VCPUs: {}, RAM: {} MB, Disk: {} GB",
                head,
                self.attr_num("vcpus"),
                self.attr_num("ram_mb"),
                self.attr_num("disk_gb")
            ),
            ResourceKind::Volume => format!(
                "{}, Size: {} GB, Attached to: {}",
                head,
                self.attr_num("size_gb"),
                self.attr_str("attached_to").unwrap_or("none")
            ),
            ResourceKind::Network => {
                let cidrs = self
                    .attributes
                    .get("subnets")
                    .and_then(Value::as_array)
                    .map(|subs| {
                        subs.iter()
                            .filter_map(|s| s.get("cidr").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "none".to_string());
                format!("{}, Subnets: {}", head, cidrs)
            }
            ResourceKind::Usage => format!(
                "Usage for {}: Servers: {}, VCPUs: {}, RAM: {} MB, Disk: {} GB, Volumes: {} GB",
                name,
                self.attr_num("servers"),
                self.attr_num("vcpus"),
                self.attr_num("ram_mb"),
                self.attr_num("disk_gb"),
                self.attr_num("volume_gb")
            ),
            ResourceKind::Image | ResourceKind::Subnet => head,
        }
    }
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutput {
    Resource(Resource),
    Resources {
        kind: ResourceKind,
        items: Vec<Resource>,
    },
    /// Side effect with no resource to show (delete, detach...).
    Acknowledged(String),
}

impl ExecutionOutput {
    pub fn output_lines(&self) -> Vec<String> {
        match self {
            ExecutionOutput::Resource(r) => vec![r.display_line()],
            ExecutionOutput::Resources { kind, items } if items.is_empty() => {
                vec![format!("No {} found.", kind.plural())]
            }
            ExecutionOutput::Resources { items, .. } => {
                items.iter().map(Resource::display_line).collect()
            }
            ExecutionOutput::Acknowledged(text) => vec![text.clone()],
        }
    }

    pub fn raw_output(&self) -> Option<String> {
        match self {
            ExecutionOutput::Acknowledged(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn into_resources(self) -> Vec<Resource> {
        match self {
            ExecutionOutput::Resource(r) => vec![r],
            ExecutionOutput::Resources { items, .. } => items,
            ExecutionOutput::Acknowledged(_) => Vec::new(),
        }
    }
}

/// One infrastructure call, addressed by catalog operation name.
#[async_trait::async_trait]
pub trait OperationHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<ExecutionOutput, Box<dyn std::error::Error + Send + Sync>>;
}

/// Dispatch table from operation name to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; a later registration with the same name replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn OperationHandler>) {
        self.handlers.retain(|h| h.name() != handler.name());
        self.handlers.push(handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.iter().find(|h| h.name() == name).cloned()
    }
}

/// The only component that mutates infrastructure.
pub struct ResourceGateway {
    registry: Arc<HandlerRegistry>,
}

impl ResourceGateway {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Catalog operations with no registered handler.
    pub fn unhandled(&self, catalog: &OperationCatalog) -> Vec<String> {
        catalog
            .names()
            .into_iter()
            .filter(|n| self.registry.get(n).is_none())
            .collect()
    }

    pub async fn execute(&self, call: &OperationCall) -> Result<ExecutionOutput, CommandError> {
        let operation = call.name().to_string();
        let handler = self.registry.get(&operation).ok_or_else(|| CommandError::Execution {
            operation: operation.clone(),
            kind: FailureKind::Internal,
            message: "no handler is registered for this operation".into(),
        })?;
        tracing::info!(target: "nimbus::gateway", operation = %operation, "dispatching");
        tracing::debug!(target: "nimbus::gateway", operation = %operation, arguments = ?call.arguments(), "dispatch arguments");

        handler.execute(call.arguments()).await.map_err(|err| {
            let kind = classify(err.as_ref());
            tracing::warn!(target: "nimbus::gateway", operation = %operation, kind = %kind, error = %err, "operation failed");
            CommandError::Execution {
                operation,
                kind,
                message: err.to_string(),
            }
        })
    }
}

fn classify(err: &(dyn std::error::Error + Send + Sync + 'static)) -> FailureKind {
    if let Some(cloud) = err.downcast_ref::<CloudError>() {
        cloud.kind
    } else if err.downcast_ref::<std::io::Error>().is_some() {
        FailureKind::Unavailable
    } else {
        FailureKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Failing(Box<dyn Fn() -> Box<dyn std::error::Error + Send + Sync> + Send + Sync>);

    #[async_trait::async_trait]
    impl OperationHandler for Failing {
        fn name(&self) -> &str {
            "delete_server"
        }

        async fn execute(
            &self,
            _arguments: &Map<String, Value>,
        ) -> Result<ExecutionOutput, Box<dyn std::error::Error + Send + Sync>> {
            Err((self.0)())
        }
    }

    fn delete_call() -> OperationCall {
        let op = OperationCatalog::standard().lookup("delete_server").unwrap();
        let args = json!({"server_id_or_name": "vm-9"});
        OperationCall::new(op, args.as_object().unwrap())
    }

    async fn kind_of(make: fn() -> Box<dyn std::error::Error + Send + Sync>) -> FailureKind {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Failing(Box::new(make))));
        let gateway = ResourceGateway::new(Arc::new(registry));
        match gateway.execute(&delete_call()).await.unwrap_err() {
            CommandError::Execution { kind, .. } => kind,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failures_are_normalized_to_kinds() {
        assert_eq!(
            kind_of(|| Box::new(CloudError::not_found("server 'vm-9' not found"))).await,
            FailureKind::NotFound
        );
        assert_eq!(
            kind_of(|| Box::new(std::io::Error::new(std::io::ErrorKind::Other, "disk"))).await,
            FailureKind::Unavailable
        );
        assert_eq!(kind_of(|| "boom".into()).await, FailureKind::Internal);
    }

    #[tokio::test]
    async fn missing_handler_is_internal_and_reported_as_unhandled() {
        let gateway = ResourceGateway::new(Arc::new(HandlerRegistry::new()));
        let err = gateway.execute(&delete_call()).await.unwrap_err();
        assert_eq!(err.code(), "execution_error");
        assert_eq!(
            gateway.unhandled(&OperationCatalog::standard()).len(),
            OperationCatalog::standard().len()
        );
    }

    #[test]
    fn output_lines_for_servers_and_empty_lists() {
        let server = Resource {
            id: "abc".into(),
            kind: ResourceKind::Server,
            status: "ACTIVE".into(),
            attributes: json!({"name": "web-1", "flavor": "m1.small", "image": "Ubuntu-22.04",
                "addresses": {"private-net": "192.168.1.100"}})
            .as_object()
            .cloned()
            .unwrap(),
        };
        assert_eq!(
            server.display_line(),
            "Name: web-1, ID: abc, Status: ACTIVE, Flavor: m1.small, Image: Ubuntu-22.04, Networks: private-net: 192.168.1.100"
        );
        let empty = ExecutionOutput::Resources {
            kind: ResourceKind::Volume,
            items: vec![],
        };
        assert_eq!(empty.output_lines(), vec!["No volumes found."]);
    }
}
