// Copyright (c) 2025 - Cowboy AI, Inc.
//! Linux App Service with regional VNet integration

use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::child_id;
use crate::errors::{CompositionError, CompositionResult};
use crate::graph::{CompositeGroup, DependencyGraph};
use crate::resource::ResourceDeclaration;
use crate::value::{Input, OutputRef, ResourceId, Template};

pub const APP_SERVICE_PLAN: &str = "app-service-plan";
pub const WEB_APP: &str = "web-app";
pub const VNET_CONNECTION: &str = "web-app-vnet-connection";

pub const LINUX_FX_VERSION: &str = "NODE|18-LTS";

#[derive(Debug, Clone)]
pub struct AppServiceArgs {
    pub resource_group_name: Input,
    pub location: Input,
    /// Subnet the app is integrated into
    pub subnet_id: Input,
    pub app_settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AppService {
    pub group: CompositeGroup,
    pub app: ResourceId,
    pub app_service_name: OutputRef,
    pub default_host_name: OutputRef,
    /// `https://{defaultHostName}`
    pub endpoint: Template,
}

/// Virtual network part of a subnet resource id
///
/// `/subscriptions/s/.../virtualNetworks/v/subnets/app` becomes
/// `/subscriptions/s/.../virtualNetworks/v`. Ids without a `/subnets`
/// segment are returned unchanged.
pub fn vnet_resource_id(subnet_id: &str) -> &str {
    match subnet_id.find("/subnets") {
        Some(index) => &subnet_id[..index],
        None => subnet_id,
    }
}

fn vnet_of_subnet(subnet_id: &Input) -> CompositionResult<Input> {
    match subnet_id {
        Input::Literal(Value::String(id)) => Ok(Input::from(vnet_resource_id(id))),
        Input::Reference(reference) => Ok(Input::derived(reference.clone(), |value| {
            value
                .as_str()
                .map(|id| Value::String(vnet_resource_id(id).to_string()))
                .ok_or_else(|| {
                    CompositionError::Derivation(format!("subnet id is not a string: {}", value))
                })
        })),
        other => Err(CompositionError::Configuration(format!(
            "subnet id must be a string or an output reference, got {:?}",
            other
        ))),
    }
}

/// Declare `{name}-appplan`, `{name}-appservice` and `{name}-vnet-conn`
///
/// The group `{name}` exposes `appServiceName` and `defaultHostName`.
pub fn app_service_component(
    graph: &mut DependencyGraph,
    name: &str,
    args: &AppServiceArgs,
) -> CompositionResult<AppService> {
    let vnet_id = vnet_of_subnet(&args.subnet_id)?;

    let plan = graph.declare(
        ResourceDeclaration::new(child_id(name, "appplan")?, APP_SERVICE_PLAN)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.clone())
            .input("kind", "Linux")
            .input("reserved", json!(true))
            .input("sku", json!({ "name": "B1", "tier": "Basic" })),
    )?;

    let settings: Vec<Value> = args
        .app_settings
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    let app = graph.declare(
        ResourceDeclaration::new(child_id(name, "appservice")?, WEB_APP)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.clone())
            .input("serverFarmId", plan.output("id"))
            .input(
                "siteConfig",
                json!({ "appSettings": settings, "linuxFxVersion": LINUX_FX_VERSION }),
            )
            .input("httpsOnly", json!(true)),
    )?;

    let connection = graph.declare(
        ResourceDeclaration::new(child_id(name, "vnet-conn")?, VNET_CONNECTION)
            .input("name", app.output("name"))
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("vnetName", format!("{}-vnet-connection", name))
            .input("vnetResourceId", vnet_id)
            .input("subnetResourceId", args.subnet_id.clone()),
    )?;

    let group = graph.group(
        ResourceId::new(name)?,
        vec![plan, app.clone(), connection],
        BTreeMap::from([
            ("appServiceName".to_string(), app.output("name")),
            ("defaultHostName".to_string(), app.output("defaultHostName")),
        ]),
    )?;

    Ok(AppService {
        group,
        app_service_name: app.output("name"),
        default_host_name: app.output("defaultHostName"),
        endpoint: Template::new()
            .text("https://")
            .reference(app.output("defaultHostName")),
        app,
    })
}
