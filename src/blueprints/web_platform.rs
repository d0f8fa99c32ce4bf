// Copyright (c) 2025 - Cowboy AI, Inc.
//! Single-Region Web Platform
//!
//! One resource group holding:
//!
//! - an App Service plan with Application Insights, the web app and a
//!   `staging` deployment slot (bundled as the `{prefix}-web` group)
//! - a SQL server and database behind a single-address firewall rule
//! - a Cosmos DB account with a SQL API catalog database and container
//! - a classic Redis cache
//! - a VNet whose subnets carry a public load balancer and an application
//!   gateway, each with its own static public IP
//! - a Key Vault with an access policy for one administrator
//!
//! [`export_web_platform`] publishes the stack outputs, including the
//! `https://{defaultHostName}` endpoint.
//!
//! Reads `sqlAdmin` and `sqlAdminPassword` (secret) from the stack config.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::cache::{MINIMUM_TLS_VERSION, REDIS_CACHE};
use super::database::{SQL_DATABASE, SQL_SERVER};
use super::network::{SUBNET, VIRTUAL_NETWORK};
use super::web::{APP_SERVICE_PLAN, WEB_APP};
use super::child_id;
use crate::config::StackConfig;
use crate::errors::{CompositionError, CompositionResult};
use crate::graph::{CompositeGroup, DependencyGraph};
use crate::resource::ResourceDeclaration;
use crate::value::{Input, ResourceId, Template};

pub const RESOURCE_GROUP: &str = "resource-group";
pub const APP_INSIGHTS: &str = "application-insights";
pub const WEB_APP_SLOT: &str = "web-app-slot";
pub const SQL_FIREWALL_RULE: &str = "sql-firewall-rule";
pub const COSMOS_ACCOUNT: &str = "cosmosdb-account";
pub const COSMOS_SQL_DATABASE: &str = "cosmosdb-sql-database";
pub const COSMOS_SQL_CONTAINER: &str = "cosmosdb-sql-container";
pub const PUBLIC_IP: &str = "public-ip-address";
pub const LOAD_BALANCER: &str = "load-balancer";
pub const APPLICATION_GATEWAY: &str = "application-gateway";
pub const KEY_VAULT: &str = "key-vault";

const NODE_VERSION: &str = "16-lts";
const HTTP_PORT: u16 = 80;
const COSMOS_THROUGHPUT: u32 = 400;
const CATALOG_DATABASE: &str = "ProductCatalog";
const PRODUCTS_CONTAINER: &str = "Products";

const KEY_PERMISSIONS: &[&str] = &[
    "get", "list", "create", "delete", "recover", "backup", "restore", "import", "update", "sign",
    "verify", "encrypt", "decrypt", "wrapKey", "unwrapKey",
];
const SECRET_PERMISSIONS: &[&str] = &["get", "list", "set", "delete", "recover", "backup", "restore"];
const CERTIFICATE_PERMISSIONS: &[&str] = &[
    "get", "list", "delete", "create", "import", "update", "managecontacts", "manageissuers",
    "getissuers", "listissuers", "recover", "backup", "restore",
];

#[derive(Debug, Clone)]
pub struct WebPlatformArgs {
    /// Prefix of every resource id, e.g. `shop` gives `shop-webapp`
    pub prefix: String,
    pub location: String,
    /// Secondary Cosmos DB region
    pub failover_location: Option<String>,
    pub tenant_id: String,
    /// Object granted the Key Vault access policy
    pub vault_admin_object_id: String,
    /// Single client address let through the SQL firewall
    pub allowed_ip: String,
    pub address_space: String,
    pub subnet_prefix: String,
    /// Application gateways need a dedicated subnet of at least /27
    pub gateway_subnet_prefix: String,
    pub tags: BTreeMap<String, String>,
}

impl WebPlatformArgs {
    pub fn new(
        prefix: impl Into<String>,
        location: impl Into<String>,
        tenant_id: impl Into<String>,
        vault_admin_object_id: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            location: location.into(),
            failover_location: None,
            tenant_id: tenant_id.into(),
            vault_admin_object_id: vault_admin_object_id.into(),
            allowed_ip: "203.0.113.10".to_string(),
            address_space: "10.0.0.0/16".to_string(),
            subnet_prefix: "10.0.1.0/24".to_string(),
            gateway_subnet_prefix: "10.0.2.0/24".to_string(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_failover(mut self, location: impl Into<String>) -> Self {
        self.failover_location = Some(location.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Handle to a declared [`web_platform`]
#[derive(Debug, Clone)]
pub struct WebPlatform {
    pub resource_group: ResourceId,
    /// Plan, Application Insights, web app and staging slot
    pub web: CompositeGroup,
    pub app: ResourceId,
    pub staging_slot: ResourceId,
    pub sql_server: ResourceId,
    pub sql_database: ResourceId,
    pub firewall_rule: ResourceId,
    pub cosmos_account: ResourceId,
    pub cosmos_container: ResourceId,
    pub redis: ResourceId,
    pub load_balancer: ResourceId,
    pub gateway: ResourceId,
    pub key_vault: ResourceId,
    /// `https://{defaultHostName}`
    pub endpoint: Template,
}

/// `[{ name, publicIPAddress: { id } }]` once the address exists
fn frontend_ip(
    name: &'static str,
) -> impl Fn(&Value) -> CompositionResult<Value> + Send + Sync + 'static {
    move |id| Ok(json!([{ "name": name, "publicIPAddress": { "id": id } }]))
}

fn settings(pairs: &[(&str, &str)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

/// Declare the whole platform
pub fn web_platform(
    graph: &mut DependencyGraph,
    args: &WebPlatformArgs,
    config: &StackConfig,
) -> CompositionResult<WebPlatform> {
    if args.prefix.is_empty() {
        return Err(CompositionError::Configuration(
            "web platform prefix must not be empty".to_string(),
        ));
    }
    let prefix = args.prefix.as_str();
    let tags = json!(args.tags);

    let rg = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "rg")?, RESOURCE_GROUP)
            .input("resourceGroupName", format!("{}-rg", prefix))
            .input("location", args.location.as_str()),
    )?;
    let rg_name = || Input::from(rg.output("name"));
    let rg_location = || Input::from(rg.output("location"));

    // Web tier
    let plan = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "plan")?, APP_SERVICE_PLAN)
            .input("resourceGroupName", rg_name())
            .input("location", args.location.as_str())
            .input("name", format!("{}-plan", prefix))
            .input("kind", "Windows")
            .input("sku", json!({ "name": "B1", "tier": "Basic" })),
    )?;

    let insights = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "appinsights")?, APP_INSIGHTS)
            .input("resourceGroupName", rg_name())
            .input("resourceName", format!("{}-appinsights", prefix))
            .input("location", rg_location())
            .input("kind", "web")
            .input("applicationType", "web")
            .input("tags", tags.clone())
            .secret_output("instrumentationKey"),
    )?;

    let app = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "webapp")?, WEB_APP)
            .input("resourceGroupName", rg_name())
            .input("location", args.location.as_str())
            .input("name", format!("{}-webapp", prefix))
            .input("serverFarmId", plan.output("id"))
            .input(
                "siteConfig",
                json!({
                    "nodeVersion": NODE_VERSION,
                    "appSettings": settings(&[("WEBSITE_NODE_DEFAULT_VERSION", "~16")]),
                }),
            )
            .input("httpsOnly", json!(true)),
    )?;

    let staging_slot = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "staging")?, WEB_APP_SLOT)
            .input("resourceGroupName", rg_name())
            .input("location", rg_location())
            .input("name", app.output("name"))
            .input("slot", "staging")
            .input("serverFarmId", plan.output("id"))
            .input(
                "siteConfig",
                json!({
                    "linuxFxVersion": format!("NODE|{}", NODE_VERSION),
                    "appSettings": settings(&[("APP_ENV", "Staging")]),
                }),
            )
            .input("httpsOnly", json!(true)),
    )?;

    let web = graph.group(
        child_id(prefix, "web")?,
        vec![plan, insights, app.clone(), staging_slot.clone()],
        BTreeMap::from([
            ("appServiceName".to_string(), app.output("name")),
            ("defaultHostName".to_string(), app.output("defaultHostName")),
            ("stagingSlotName".to_string(), staging_slot.output("name")),
        ]),
    )?;

    // Data tier
    let sql_server = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "sqlserver")?, SQL_SERVER)
            .input("resourceGroupName", rg_name())
            .input("serverName", format!("{}-sqlserver", prefix))
            .input("location", rg_location())
            .input("version", "12.0")
            .input("administratorLogin", config.require_string("sqlAdmin")?)
            .input("administratorLoginPassword", config.require_secret("sqlAdminPassword")?)
            .input("tags", tags.clone()),
    )?;

    let sql_database = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "sqldb")?, SQL_DATABASE)
            .input("resourceGroupName", rg_name())
            .input("serverName", sql_server.output("name"))
            .input("location", rg_location())
            .input("sku", json!({ "name": "S0", "tier": "Standard", "capacity": 10 }))
            .input("collation", "SQL_Latin1_General_CP1_CI_AS")
            .input("maxSizeBytes", json!(268_435_456_000u64)),
    )?;

    let firewall_rule = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "sqlfw")?, SQL_FIREWALL_RULE)
            .input("resourceGroupName", rg_name())
            .input("serverName", sql_server.output("name"))
            .input("firewallRuleName", "AllowClientIp")
            .input("startIpAddress", args.allowed_ip.as_str())
            .input("endIpAddress", args.allowed_ip.as_str()),
    )?;

    let mut locations = vec![json!({ "locationName": args.location, "failoverPriority": 0 })];
    if let Some(failover) = &args.failover_location {
        locations.push(json!({ "locationName": failover, "failoverPriority": 1 }));
    }
    let cosmos_account = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "cosmos")?, COSMOS_ACCOUNT)
            .input("resourceGroupName", rg_name())
            .input("accountName", format!("{}-cosmosdb-acc", prefix))
            .input("location", rg_location())
            .input("databaseAccountOfferType", "Standard")
            .input("consistencyPolicy", json!({ "defaultConsistencyLevel": "Session" }))
            .input("locations", Value::Array(locations))
            .input("tags", tags.clone()),
    )?;

    let catalog = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "catalog")?, COSMOS_SQL_DATABASE)
            .input("resourceGroupName", rg_name())
            .input("accountName", cosmos_account.output("name"))
            .input("databaseName", CATALOG_DATABASE)
            .input("resource", json!({ "id": CATALOG_DATABASE }))
            .input("options", json!({ "throughput": COSMOS_THROUGHPUT })),
    )?;

    let cosmos_container = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "products")?, COSMOS_SQL_CONTAINER)
            .input("resourceGroupName", rg_name())
            .input("accountName", cosmos_account.output("name"))
            .input("databaseName", catalog.output("name"))
            .input("containerName", PRODUCTS_CONTAINER)
            .input(
                "resource",
                json!({
                    "id": PRODUCTS_CONTAINER,
                    "partitionKey": { "paths": ["/category"], "kind": "Hash" },
                    "indexingPolicy": {
                        "indexingMode": "Consistent",
                        "includedPaths": [{ "path": "/*" }],
                        "excludedPaths": [{ "path": "/_etag/?" }],
                    },
                }),
            )
            .input("options", json!({ "throughput": COSMOS_THROUGHPUT })),
    )?;

    let redis = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "redis")?, REDIS_CACHE)
            .input("resourceGroupName", rg_name())
            .input("name", format!("{}-redis-cache", prefix))
            .input("location", rg_location())
            .input("sku", json!({ "name": "Standard", "family": "C", "capacity": 1 }))
            .input("minimumTlsVersion", MINIMUM_TLS_VERSION)
            .input("enableNonSslPort", json!(false))
            .input("tags", tags)
            .secret_output("accessKeys"),
    )?;

    // Network edge
    let vnet = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "vnet")?, VIRTUAL_NETWORK)
            .input("resourceGroupName", rg_name())
            .input("location", rg_location())
            .input("addressSpace", json!({ "addressPrefixes": [args.address_space] })),
    )?;
    let subnet = |graph: &mut DependencyGraph,
                  suffix: &str,
                  prefix_range: &str|
     -> CompositionResult<ResourceId> {
        graph.declare(
            ResourceDeclaration::new(child_id(prefix, suffix)?, SUBNET)
                .input("resourceGroupName", rg_name())
                .input("virtualNetworkName", vnet.output("name"))
                .input("addressPrefix", prefix_range),
        )
    };
    subnet(graph, "subnet", &args.subnet_prefix)?;
    let gateway_subnet = subnet(graph, "appgw-subnet", &args.gateway_subnet_prefix)?;

    let public_ip = |graph: &mut DependencyGraph, suffix: &str| -> CompositionResult<ResourceId> {
        graph.declare(
            ResourceDeclaration::new(child_id(prefix, suffix)?, PUBLIC_IP)
                .input("resourceGroupName", rg_name())
                .input("location", rg_location())
                .input("publicIPAllocationMethod", "Static")
                .input("sku", json!({ "name": "Standard" })),
        )
    };
    let lb_ip = public_ip(graph, "lb-ip")?;
    let gateway_ip = public_ip(graph, "appgw-ip")?;

    let load_balancer = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "lb")?, LOAD_BALANCER)
            .input("resourceGroupName", rg_name())
            .input("location", rg_location())
            .input("sku", json!({ "name": "Standard" }))
            .input(
                "frontendIPConfigurations",
                Input::derived(lb_ip.output("id"), frontend_ip("lb-frontend")),
            )
            .input("backendAddressPools", json!([{ "name": "lb-backend-pool" }]))
            .input(
                "probes",
                json!([{
                    "name": "lb-health-check",
                    "protocol": "Tcp",
                    "port": HTTP_PORT,
                    "intervalInSeconds": 5,
                    "numberOfProbes": 2,
                }]),
            )
            .input(
                "loadBalancingRules",
                json!([{
                    "name": "lb-http-rule",
                    "frontendIPConfiguration": { "name": "lb-frontend" },
                    "backendAddressPool": { "name": "lb-backend-pool" },
                    "probe": { "name": "lb-health-check" },
                    "protocol": "Tcp",
                    "frontendPort": HTTP_PORT,
                    "backendPort": HTTP_PORT,
                    "enableFloatingIP": false,
                    "idleTimeoutInMinutes": 4,
                    "loadDistribution": "Default",
                }]),
            ),
    )?;

    let gateway = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "appgw")?, APPLICATION_GATEWAY)
            .input("resourceGroupName", rg_name())
            .input("location", rg_location())
            .input(
                "sku",
                json!({ "name": "Standard_v2", "tier": "Standard_v2", "capacity": 2 }),
            )
            .input(
                "gatewayIPConfigurations",
                Input::derived(gateway_subnet.output("id"), |id| {
                    Ok(json!([{ "name": "appgw-ip-config", "subnet": { "id": id } }]))
                }),
            )
            .input(
                "frontendIPConfigurations",
                Input::derived(gateway_ip.output("id"), frontend_ip("appgw-frontend-ip")),
            )
            .input(
                "frontendPorts",
                json!([{ "name": "appgw-frontend-port-80", "port": HTTP_PORT }]),
            )
            .input("backendAddressPools", json!([{ "name": "appgw-backend-pool-web" }]))
            .input(
                "backendHttpSettingsCollection",
                json!([{
                    "name": "appgw-backend-http-settings",
                    "port": HTTP_PORT,
                    "protocol": "Http",
                    "cookieBasedAffinity": "Disabled",
                    "requestTimeout": 20,
                    "probe": { "name": "appgw-http-check" },
                }]),
            )
            .input(
                "httpListeners",
                json!([{
                    "name": "appgw-http-listener",
                    "frontendIPConfiguration": { "name": "appgw-frontend-ip" },
                    "frontendPort": { "name": "appgw-frontend-port-80" },
                    "protocol": "Http",
                    "requireServerNameIndication": false,
                }]),
            )
            .input(
                "requestRoutingRules",
                json!([{
                    "name": "appgw-routing-rule-basic",
                    "ruleType": "Basic",
                    "httpListener": { "name": "appgw-http-listener" },
                    "backendAddressPool": { "name": "appgw-backend-pool-web" },
                    "backendHttpSettings": { "name": "appgw-backend-http-settings" },
                }]),
            )
            .input(
                "probes",
                json!([{
                    "name": "appgw-http-check",
                    "protocol": "Http",
                    "host": "localhost",
                    "path": "/health",
                    "port": HTTP_PORT,
                    "interval": 30,
                    "timeout": 30,
                    "unhealthyThreshold": 3,
                }]),
            ),
    )?;

    let key_vault = graph.declare(
        ResourceDeclaration::new(child_id(prefix, "kv")?, KEY_VAULT)
            .input("resourceGroupName", rg_name())
            .input("location", rg_location())
            .input("vaultName", format!("{}-kv", prefix))
            .input(
                "properties",
                json!({
                    "sku": { "family": "A", "name": "standard" },
                    "tenantId": args.tenant_id,
                    "enabledForDeployment": true,
                    "enabledForDiskEncryption": true,
                    "enabledForTemplateDeployment": true,
                    "accessPolicies": [{
                        "tenantId": args.tenant_id,
                        "objectId": args.vault_admin_object_id,
                        "permissions": {
                            "keys": KEY_PERMISSIONS,
                            "secrets": SECRET_PERMISSIONS,
                            "certificates": CERTIFICATE_PERMISSIONS,
                        },
                    }],
                }),
            ),
    )?;

    Ok(WebPlatform {
        endpoint: Template::new()
            .text("https://")
            .reference(app.output("defaultHostName")),
        resource_group: rg,
        web,
        app,
        staging_slot,
        sql_server,
        sql_database,
        firewall_rule,
        cosmos_account,
        cosmos_container,
        redis,
        load_balancer,
        gateway,
        key_vault,
    })
}

/// Publish the platform's stack outputs
///
/// The Redis access keys are exported as a secret.
pub fn export_web_platform(
    graph: &mut DependencyGraph,
    platform: &WebPlatform,
) -> CompositionResult<()> {
    graph.export("keyVaultUri", platform.key_vault.output("vaultUri"), false)?;
    graph.export("redisCacheHostname", platform.redis.output("hostName"), false)?;
    graph.export(
        "redisCachePrimaryConnectionString",
        platform.redis.output("accessKeys"),
        true,
    )?;
    graph.export("cosmosdbAccountName", platform.cosmos_account.output("name"), false)?;
    graph.export(
        "cosmosdbSqlContainerName",
        platform.cosmos_container.output("name"),
        false,
    )?;
    graph.export(
        "cosmosdbEndpoint",
        platform.cosmos_account.output("documentEndpoint"),
        false,
    )?;
    graph.export("sqlDatabaseName", platform.sql_database.output("name"), false)?;
    graph.export("sqlDatabaseID", platform.sql_database.output("id"), false)?;
    graph.export_template("endpoint", platform.endpoint.clone(), false)?;
    graph.export("sqlServerName", platform.sql_server.output("name"), false)?;
    graph.export(
        "sqlServerFullyQualifiedDomainName",
        platform.sql_server.output("fullyQualifiedDomainName"),
        false,
    )?;
    Ok(())
}
