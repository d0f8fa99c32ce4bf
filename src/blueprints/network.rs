// Copyright (c) 2025 - Cowboy AI, Inc.
//! Virtual network with an application and a database subnet

use serde_json::json;
use std::collections::BTreeMap;

use super::child_id;
use crate::errors::CompositionResult;
use crate::graph::{CompositeGroup, DependencyGraph};
use crate::resource::ResourceDeclaration;
use crate::value::{Input, OutputRef, ResourceId};

pub const VIRTUAL_NETWORK: &str = "virtual-network";
pub const SUBNET: &str = "subnet";

#[derive(Debug, Clone)]
pub struct VnetArgs {
    pub resource_group_name: Input,
    pub location: Input,
    pub address_space: Vec<String>,
    pub app_subnet_prefix: String,
    pub db_subnet_prefix: String,
}

/// Handle to a declared [`vnet_component`]
#[derive(Debug, Clone)]
pub struct Vnet {
    pub group: CompositeGroup,
    pub vnet: ResourceId,
    pub vnet_name: OutputRef,
    pub app_subnet_id: OutputRef,
    pub db_subnet_id: OutputRef,
}

/// Declare `{name}-vnet` with `{name}-app-subnet` and `{name}-db-subnet`
///
/// The group `{name}` exposes `vnetName`, `appSubnetId` and `dbSubnetId`.
pub fn vnet_component(
    graph: &mut DependencyGraph,
    name: &str,
    args: &VnetArgs,
) -> CompositionResult<Vnet> {
    let vnet_name = format!("{}-vnet", name);
    let vnet = graph.declare(
        ResourceDeclaration::new(child_id(name, "vnet")?, VIRTUAL_NETWORK)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.clone())
            .input("virtualNetworkName", vnet_name.as_str())
            .input(
                "addressSpace",
                json!({ "addressPrefixes": args.address_space }),
            ),
    )?;

    let subnet = |graph: &mut DependencyGraph,
                  kind: &str,
                  prefix: &str|
     -> CompositionResult<ResourceId> {
        let subnet_name = format!("{}-{}-subnet", name, kind);
        graph.declare(
            ResourceDeclaration::new(ResourceId::new(subnet_name.as_str())?, SUBNET)
                .input("resourceGroupName", args.resource_group_name.clone())
                .input("virtualNetworkName", vnet_name.as_str())
                .input("subnetName", subnet_name.as_str())
                .input("addressPrefix", prefix)
                .depends_on(vnet.clone()),
        )
    };
    let app_subnet = subnet(graph, "app", &args.app_subnet_prefix)?;
    let db_subnet = subnet(graph, "db", &args.db_subnet_prefix)?;

    let exposed = BTreeMap::from([
        ("vnetName".to_string(), vnet.output("name")),
        ("appSubnetId".to_string(), app_subnet.output("id")),
        ("dbSubnetId".to_string(), db_subnet.output("id")),
    ]);
    let group = graph.group(
        ResourceId::new(name)?,
        vec![vnet.clone(), app_subnet.clone(), db_subnet.clone()],
        exposed,
    )?;

    Ok(Vnet {
        group,
        vnet_name: vnet.output("name"),
        app_subnet_id: app_subnet.output("id"),
        db_subnet_id: db_subnet.output("id"),
        vnet,
    })
}
