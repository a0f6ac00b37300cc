//! The standard compute/network/volume operation set.

use super::{OperationCatalog, OperationSpec, ParamType, ParameterSpec};

const MAX_VOLUME_GB: i64 = 16_384;

fn server_ref() -> ParameterSpec {
    ParameterSpec::required(
        "server_id_or_name",
        ParamType::String,
        "Which server? Give its name or ID.",
    )
}

fn volume_ref() -> ParameterSpec {
    ParameterSpec::required(
        "volume_id_or_name",
        ParamType::String,
        "Which volume? Give its name or ID.",
    )
}

fn standard_operations() -> Vec<OperationSpec> {
    vec![
        OperationSpec::new("list_servers", "List all servers (virtual machines) in the project"),
        OperationSpec::new("list_images", "List available boot images"),
        OperationSpec::new("list_flavors", "List available flavors (instance sizes)"),
        OperationSpec::new("list_networks", "List networks and their subnets"),
        OperationSpec::new("list_volumes", "List block storage volumes"),
        OperationSpec::new(
            "get_server_details",
            "Show details of one server by name or ID",
        )
        .param(server_ref()),
        OperationSpec::new(
            "create_server",
            "Create a new server, optionally with a boot volume of the given size",
        )
        .param(ParameterSpec::required(
            "name",
            ParamType::String,
            "What should the new server be called?",
        ))
        .param(ParameterSpec::required(
            "image_name",
            ParamType::String,
            "Which image should it boot from (e.g. Ubuntu-22.04)?",
        ))
        .param(
            ParameterSpec::required(
                "flavor_name",
                ParamType::String,
                "Which flavor (size) should it use (e.g. m1.small)?",
            )
            .with_default("m1.small"),
        )
        .param(
            ParameterSpec::required(
                "network_name",
                ParamType::String,
                "Which network should it attach to?",
            )
            .with_default("private-net"),
        )
        .param(ParameterSpec::optional(
            "volume_size",
            ParamType::integer_between(1, MAX_VOLUME_GB),
            "Boot volume size in GB",
        )),
        OperationSpec::new("delete_server", "Delete a server and its attached volumes")
            .param(server_ref())
            .destructive(),
        OperationSpec::new("resize_server", "Change the flavor of an existing server")
            .param(server_ref())
            .param(
                ParameterSpec::required(
                    "flavor_name",
                    ParamType::String,
                    "Which flavor should the server be resized to?",
                )
                .with_default("m1.medium"),
            )
            .destructive(),
        OperationSpec::new("create_volume", "Create a block storage volume")
            .param(ParameterSpec::required(
                "name",
                ParamType::String,
                "What should the new volume be called?",
            ))
            .param(
                ParameterSpec::required(
                    "size_gb",
                    ParamType::integer_between(1, MAX_VOLUME_GB),
                    "How large should the volume be, in GB?",
                )
                .with_default(10),
            ),
        OperationSpec::new("delete_volume", "Delete a block storage volume")
            .param(volume_ref())
            .destructive(),
        OperationSpec::new("attach_volume", "Attach a volume to a server")
            .param(server_ref())
            .param(volume_ref())
            .param(ParameterSpec::optional(
                "device",
                ParamType::String,
                "Device path inside the server (e.g. /dev/vdb)",
            )),
        OperationSpec::new("detach_volume", "Detach a volume from a server")
            .param(server_ref())
            .param(volume_ref())
            .destructive(),
        OperationSpec::new("create_network", "Create a network with one subnet")
            .param(ParameterSpec::required(
                "network_name",
                ParamType::String,
                "What should the new network be called?",
            ))
            .param(
                ParameterSpec::required(
                    "subnet_cidr",
                    ParamType::Cidr,
                    "Which CIDR should the subnet use (e.g. 10.0.0.0/24)?",
                )
                .with_default("192.168.100.0/24"),
            )
            .param(ParameterSpec::optional(
                "subnet_name",
                ParamType::String,
                "Name of the subnet",
            )),
        OperationSpec::new("delete_network", "Delete a network and its subnets")
            .param(ParameterSpec::required(
                "network_id_or_name",
                ParamType::String,
                "Which network? Give its name or ID.",
            ))
            .destructive(),
        OperationSpec::new(
            "get_usage",
            "Show resource usage for the project, or for one server",
        )
        .param(ParameterSpec::optional(
            "identifier",
            ParamType::String,
            "Server name or ID to limit the report to",
        )),
    ]
}

impl OperationCatalog {
    /// Catalog of every operation the bundled handlers serve.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for spec in standard_operations() {
            // Names above are unique; a duplicate here is a programming error caught by tests.
            if let Err(err) = catalog.register(spec) {
                tracing::error!(target: "nimbus::catalog", error = %err, "standard catalog");
            }
        }
        catalog
    }
}
