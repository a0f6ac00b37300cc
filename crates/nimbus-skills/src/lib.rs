//! Concrete collaborators for nimbus-core: the fixture cloud, one handler per catalog
//! operation, and the LLM understanding engine.

pub use nimbus_core::{HandlerRegistry, OperationHandler};

mod cloud;
mod fixture_cloud;
mod handlers;
mod model_router;

pub use cloud::{CloudApi, ServerRequest};
pub use fixture_cloud::FixtureCloud;
pub use handlers::{
    register_all, AttachVolume, CreateNetwork, CreateServer, CreateVolume, DeleteNetwork,
    DeleteServer, DeleteVolume, DetachVolume, GetServerDetails, GetUsage, ListResources,
    ResizeServer,
};
pub use model_router::{LlmMode, ModelRouter};
