// Copyright (c) 2025 - Cowboy AI, Inc.
//! Kubernetes Blueprints
//!
//! - [`cluster`]: private AKS cluster with its AD identity, node subnet and
//!   admin group, plus the Kubernetes provider built from its kubeconfig
//! - [`atscale_secrets`]: the four opaque secrets AtScale reads its external
//!   Postgres and Redis connections from
//! - [`helm_chart`]: the AtScale chart, installed after everything it needs

use serde_json::{json, Value};

use super::{child_id, secret};
use crate::errors::CompositionResult;
use crate::graph::DependencyGraph;
use crate::resource::ResourceDeclaration;
use crate::value::{Input, OutputRef, ResourceId};

pub const AD_APPLICATION: &str = "azuread-application";
pub const SERVICE_PRINCIPAL: &str = "azuread-service-principal";
pub const SERVICE_PRINCIPAL_PASSWORD: &str = "azuread-service-principal-password";
pub const AD_GROUP: &str = "azuread-group";
pub const ROUTE_TABLE: &str = "route-table";
pub const SUBNET: &str = "subnet";
pub const MANAGED_CLUSTER: &str = "managed-cluster";
pub const CLUSTER_ADMIN_CREDENTIALS: &str = "managed-cluster-admin-credentials";
pub const KUBERNETES_PROVIDER: &str = "kubernetes-provider";
pub const ROLE_ASSIGNMENT: &str = "role-assignment";
pub const KUBERNETES_SECRET: &str = "kubernetes-secret";
pub const HELM_CHART: &str = "helm-chart";

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_REDIS_PORT: u16 = 6380;
pub const DEFAULT_DB_USER: &str = "sqladmin";

pub const ATSCALE_CHART: &str = "oci://docker.io/atscaleinc/atscale";
pub const DEFAULT_CHART_VERSION: &str = "2025.12.0";
pub const DEFAULT_RELEASE_NAME: &str = "atscale";

const MS_GRAPH_APP_ID: &str = "00000003-0000-0000-c000-000000000000";
const USER_READ_SCOPE: &str = "e1fe6dd8-ba31-4d61-89e7-88639da4683d";
const CLUSTER_ADMIN_ROLE: &str = "Azure Kubernetes Service RBAC Cluster Admin";

#[derive(Debug, Clone)]
pub struct ClusterArgs {
    pub env: String,
    pub location: String,
    pub cluster_name: String,
    pub tenant_id: String,
    pub resource_group_name: Input,
    pub node_subnet_prefix: String,
    pub system_pool_vm_sku: String,
    pub availability_zones: Vec<String>,
    pub private_dns_zone_id: String,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster: ResourceId,
    pub node_subnet_id: OutputRef,
    pub admin_group: ResourceId,
    /// Kubernetes provider; Kubernetes resources depend on it
    pub provider: ResourceId,
    pub kubeconfig: OutputRef,
}

/// Declare a private managed cluster and everything around it
pub fn cluster(graph: &mut DependencyGraph, args: &ClusterArgs) -> CompositionResult<Cluster> {
    let app = graph.declare(
        ResourceDeclaration::new(ResourceId::new("AdClientApp")?, AD_APPLICATION)
            .input("displayName", args.cluster_name.as_str())
            .input(
                "requiredResourceAccesses",
                json!([{
                    "resourceAppId": MS_GRAPH_APP_ID,
                    "resourceAccesses": [{ "id": USER_READ_SCOPE, "type": "Scope" }],
                }]),
            ),
    )?;

    let sp = graph.declare(
        ResourceDeclaration::new(ResourceId::new("AdClientSp")?, SERVICE_PRINCIPAL)
            .input("clientId", app.output("clientId")),
    )?;

    let sp_password = graph.declare(
        ResourceDeclaration::new(
            ResourceId::new("AdClientSpPassword")?,
            SERVICE_PRINCIPAL_PASSWORD,
        )
        .input("servicePrincipalId", sp.output("id"))
        .input("rotateWhenChanged", json!({ "endDate": "2099-01-01T12:00:00Z" }))
        .secret_output("value"),
    )?;

    let route_table = graph.declare(
        ResourceDeclaration::new(ResourceId::new("atscale-nodes-routes")?, ROUTE_TABLE)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("routeTableName", format!("atscale-nodes-{}", args.env))
            .input("inspectOutbound", json!(true)),
    )?;

    // The service principal needs network rights on the subnet before the
    // cluster can use it
    let node_subnet = graph.declare(
        ResourceDeclaration::new(ResourceId::new("atscale-nodes")?, SUBNET)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("addressPrefix", args.node_subnet_prefix.as_str())
            .input("privateLinkServiceNetworkPolicies", "Disabled")
            .input("routeTableId", route_table.output("id"))
            .depends_on(sp.clone()),
    )?;

    let mut pool = json!({
        "name": "system",
        "mode": "System",
        "vmSize": args.system_pool_vm_sku,
        "count": 3,
        "nodeLabels": { "node-type": "system", "workload": "system" },
        "nodeTaints": ["CriticalAddonsOnly=true:NoSchedule"],
    });
    if !args.availability_zones.is_empty() {
        pool["availabilityZones"] = json!(args.availability_zones);
    }

    let cluster = graph.declare(
        ResourceDeclaration::new(ResourceId::new("cluster")?, MANAGED_CLUSTER)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.as_str())
            .input("resourceName", args.cluster_name.as_str())
            .input("enableRBAC", json!(true))
            .input(
                "aadProfile",
                json!({ "enableAzureRBAC": true, "managed": true, "tenantID": args.tenant_id }),
            )
            .input(
                "addonProfiles",
                json!({
                    "azureKeyvaultSecretsProvider": { "enabled": true },
                    "azurepolicy": { "enabled": true },
                    "httpApplicationRouting": { "enabled": false },
                    "kubeDashboard": { "enabled": false },
                }),
            )
            .input("agentPoolProfiles", json!([pool]))
            .input("vnetSubnetId", node_subnet.output("id"))
            .input("privateDNSZone", args.private_dns_zone_id.as_str())
            .input("servicePrincipalClientId", sp.output("clientId"))
            .input("servicePrincipalSecret", sp_password.output("value")),
    )?;

    let credentials = graph.declare(
        ResourceDeclaration::new(
            ResourceId::new("cluster-admin-credentials")?,
            CLUSTER_ADMIN_CREDENTIALS,
        )
        .input("resourceGroupName", args.resource_group_name.clone())
        .input("resourceName", cluster.output("name"))
        .secret_output("kubeconfig"),
    )?;

    let provider = graph.declare(
        ResourceDeclaration::new(ResourceId::new("k8s-provider")?, KUBERNETES_PROVIDER)
            .input("kubeconfig", credentials.output("kubeconfig")),
    )?;

    let admin_group = graph.declare(
        ResourceDeclaration::new(ResourceId::new("admingroup")?, AD_GROUP)
            .input("displayName", format!("AZU-{}-Admin", args.cluster_name))
            .input(
                "description",
                format!("Admin group for Kubernetes cluster {}", args.cluster_name),
            )
            .input("preventDuplicateNames", json!(true)),
    )?;

    graph.declare(
        ResourceDeclaration::new(ResourceId::new("admingroup-role")?, ROLE_ASSIGNMENT)
            .input("principalId", admin_group.output("objectId"))
            .input("principalType", "Group")
            .input("scope", cluster.output("id"))
            .input("roleDefinitionName", CLUSTER_ADMIN_ROLE),
    )?;

    Ok(Cluster {
        node_subnet_id: node_subnet.output("id"),
        kubeconfig: credentials.output("kubeconfig"),
        cluster,
        admin_group,
        provider,
    })
}

/// Connection settings for one database
#[derive(Debug, Clone)]
pub struct DatabaseLogin {
    pub database: Input,
    pub user: Input,
    pub password: Input,
}

impl DatabaseLogin {
    /// Login as the default `sqladmin` user
    pub fn new(database: impl Into<Input>, password: Input) -> Self {
        Self {
            database: database.into(),
            user: Input::from(DEFAULT_DB_USER),
            password,
        }
    }

    pub fn with_user(mut self, user: impl Into<Input>) -> Self {
        self.user = user.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct AtScaleSecretsArgs {
    pub namespace: Input,
    /// Kubernetes provider the secrets are created through
    pub provider: Option<ResourceId>,
    pub postgres_host: Input,
    pub postgres_port: Option<u16>,
    pub atscale: DatabaseLogin,
    pub keycloak: DatabaseLogin,
    pub pgwire: DatabaseLogin,
    pub redis_host: Input,
    /// Literal or the Redis handle's port output
    pub redis_port: Option<Input>,
    pub redis_user: Option<Input>,
    pub redis_password: Input,
}

#[derive(Debug, Clone)]
pub struct AtScaleSecrets {
    pub atscale_postgres: ResourceId,
    pub keycloak_postgres: ResourceId,
    pub pgwire_postgres: ResourceId,
    pub engine_redis: ResourceId,
}

impl AtScaleSecrets {
    pub fn all(&self) -> Vec<ResourceId> {
        vec![
            self.atscale_postgres.clone(),
            self.keycloak_postgres.clone(),
            self.pgwire_postgres.clone(),
            self.engine_redis.clone(),
        ]
    }
}

/// Secret data is string-only, so numeric ports are rendered as text
fn port_string(port: &Input) -> Input {
    fn text(value: &Value) -> Value {
        match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        }
    }

    match port {
        Input::Literal(value) => Input::Literal(text(value)),
        Input::Reference(reference) => {
            Input::derived(reference.clone(), |value| Ok(text(value)))
        }
        other => other.clone(),
    }
}

fn opaque_secret(
    name: &str,
    namespace: &Input,
    provider: Option<&ResourceId>,
) -> CompositionResult<ResourceDeclaration> {
    let declaration = ResourceDeclaration::new(ResourceId::new(name)?, KUBERNETES_SECRET)
        .input("name", name)
        .input("namespace", namespace.clone())
        .input("type", "Opaque")
        .secret_output("password");
    Ok(match provider {
        Some(provider) => declaration.depends_on(provider.clone()),
        None => declaration,
    })
}

/// Declare `atscale-postgres-external`, `keycloak-postgres-external`,
/// `pgwire-postgres-external` and `engine-redis-external`
///
/// Ports default to 5432 (Postgres) and 6380 (Redis), the Redis user to
/// the empty string. Passwords are always secret.
pub fn atscale_secrets(
    graph: &mut DependencyGraph,
    args: &AtScaleSecretsArgs,
) -> CompositionResult<AtScaleSecrets> {
    let pg_port = args.postgres_port.unwrap_or(DEFAULT_POSTGRES_PORT).to_string();
    let redis_port = match &args.redis_port {
        Some(port) => port_string(port),
        None => Input::from(DEFAULT_REDIS_PORT.to_string()),
    };
    let provider = args.provider.as_ref();

    let mut postgres = |name: &str,
                        login: &DatabaseLogin,
                        tls: bool|
     -> CompositionResult<ResourceId> {
        let mut declaration = opaque_secret(name, &args.namespace, provider)?
            .input("host", args.postgres_host.clone())
            .input("port", pg_port.as_str())
            .input("database", login.database.clone())
            .input("user", login.user.clone())
            .input("password", secret(login.password.clone()));
        if tls {
            declaration = declaration
                .input("sslEnabled", "true")
                .input("sslMode", "require");
        }
        graph.declare(declaration)
    };

    let atscale_postgres = postgres("atscale-postgres-external", &args.atscale, true)?;
    let keycloak_postgres = postgres("keycloak-postgres-external", &args.keycloak, false)?;
    let pgwire_postgres = postgres("pgwire-postgres-external", &args.pgwire, false)?;

    let engine_redis = graph.declare(
        opaque_secret("engine-redis-external", &args.namespace, provider)?
            .input("host", args.redis_host.clone())
            .input("port", redis_port)
            .input("user", args.redis_user.clone().unwrap_or_else(|| Input::from("")))
            .input("password", secret(args.redis_password.clone()))
            .input("sslEnabled", "true"),
    )?;

    Ok(AtScaleSecrets {
        atscale_postgres,
        keycloak_postgres,
        pgwire_postgres,
        engine_redis,
    })
}

#[derive(Debug, Clone)]
pub struct HelmChartArgs {
    pub namespace: Input,
    pub provider: Option<ResourceId>,
    /// Resources the release must wait for, e.g. the AtScale secrets
    pub depends_on: Vec<ResourceId>,
    pub values: Value,
    pub chart_version: Option<String>,
    /// Helm release name, `atscale` unless set
    pub release_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HelmChart {
    pub release: ResourceId,
    pub status: OutputRef,
}

/// Declare the AtScale chart release as `{release}-chart`
///
/// The resource id carries a `-chart` suffix so a network or other group
/// named after the release can live in the same graph.
pub fn helm_chart(graph: &mut DependencyGraph, args: &HelmChartArgs) -> CompositionResult<HelmChart> {
    let release_name = args.release_name.as_deref().unwrap_or(DEFAULT_RELEASE_NAME);
    let mut declaration = ResourceDeclaration::new(child_id(release_name, "chart")?, HELM_CHART)
        .input("releaseName", release_name)
        .input("chart", ATSCALE_CHART)
        .input(
            "version",
            args.chart_version.as_deref().unwrap_or(DEFAULT_CHART_VERSION),
        )
        .input("namespace", args.namespace.clone())
        .input("values", args.values.clone());
    for dependency in args.provider.iter().chain(args.depends_on.iter()) {
        declaration = declaration.depends_on(dependency.clone());
    }

    let release = graph.declare(declaration)?;
    Ok(HelmChart {
        status: release.output("status"),
        release,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn secrets_args(provider: Option<ResourceId>) -> AtScaleSecretsArgs {
        AtScaleSecretsArgs {
            namespace: Input::from("atscale"),
            provider,
            postgres_host: Input::from("pg.postgres.database.azure.com"),
            postgres_port: None,
            atscale: DatabaseLogin::new("atscaledb", Input::secret("a")),
            keycloak: DatabaseLogin::new("keycloakdb", Input::from("k")),
            pgwire: DatabaseLogin::new("pgwiredb", Input::from("p")).with_user("pgwire"),
            redis_host: Input::from("redis.example.net"),
            redis_port: None,
            redis_user: None,
            redis_password: Input::from("r"),
        }
    }

    fn literal(graph: &DependencyGraph, id: &ResourceId, input: &str) -> Value {
        match &graph.node(id).unwrap().inputs()[input] {
            Input::Literal(value) | Input::Secret(value) => value.clone(),
            other => panic!("{} is not a literal: {:?}", input, other),
        }
    }

    #[test]
    fn test_secret_defaults() {
        let mut graph = DependencyGraph::new();
        let secrets = atscale_secrets(&mut graph, &secrets_args(None)).unwrap();

        assert_eq!(literal(&graph, &secrets.atscale_postgres, "port"), json!("5432"));
        assert_eq!(literal(&graph, &secrets.atscale_postgres, "user"), json!("sqladmin"));
        assert_eq!(literal(&graph, &secrets.atscale_postgres, "sslMode"), json!("require"));
        assert_eq!(literal(&graph, &secrets.pgwire_postgres, "user"), json!("pgwire"));
        assert_eq!(literal(&graph, &secrets.engine_redis, "port"), json!("6380"));
        assert_eq!(literal(&graph, &secrets.engine_redis, "user"), json!(""));
        assert!(!graph
            .node(&secrets.keycloak_postgres)
            .unwrap()
            .inputs()
            .contains_key("sslMode"));
    }

    #[test]
    fn test_numeric_port_becomes_text() {
        match port_string(&Input::literal(10000)) {
            Input::Literal(value) => assert_eq!(value, json!("10000")),
            other => panic!("unexpected port {:?}", other),
        }

        let mut graph = DependencyGraph::new();
        let cache = graph
            .declare(ResourceDeclaration::new(
                ResourceId::new("cache").unwrap(),
                "redis-cache",
            ))
            .unwrap();
        let mut args = secrets_args(None);
        args.redis_port = Some(cache.output("sslPort").into());
        let secrets = atscale_secrets(&mut graph, &args).unwrap();

        graph
            .publish_outputs(
                &cache,
                [("sslPort".to_string(), json!(6380))].into_iter().collect(),
            )
            .unwrap();
        let inputs = graph.input_snapshot(&secrets.engine_redis).unwrap();
        assert_eq!(inputs.get("port"), Some(&json!("6380")));
    }

    #[test]
    fn test_passwords_are_secret() {
        let mut graph = DependencyGraph::new();
        let secrets = atscale_secrets(&mut graph, &secrets_args(None)).unwrap();

        for id in secrets.all() {
            assert!(
                matches!(graph.node(&id).unwrap().inputs()["password"], Input::Secret(_)),
                "{} password not secret",
                id
            );
        }
    }

    #[test]
    fn test_helm_chart_waits_for_provider_and_secrets() {
        let mut graph = DependencyGraph::new();
        let provider = graph
            .declare(ResourceDeclaration::new(
                ResourceId::new("k8s-provider").unwrap(),
                KUBERNETES_PROVIDER,
            ))
            .unwrap();
        let secrets = atscale_secrets(&mut graph, &secrets_args(Some(provider.clone()))).unwrap();

        let chart = helm_chart(
            &mut graph,
            &HelmChartArgs {
                namespace: Input::from("atscale"),
                provider: Some(provider.clone()),
                depends_on: secrets.all(),
                values: json!({ "global": { "atscale": { "tls": true } } }),
                chart_version: None,
                release_name: None,
            },
        )
        .unwrap();

        let dependencies: BTreeSet<ResourceId> = graph
            .dependencies(&chart.release)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(dependencies.len(), 5);
        assert!(dependencies.contains(&provider));
        assert_eq!(literal(&graph, &chart.release, "version"), json!(DEFAULT_CHART_VERSION));
        assert_eq!(literal(&graph, &chart.release, "chart"), json!(ATSCALE_CHART));
        assert_eq!(chart.release.as_str(), "atscale-chart");
        assert_eq!(literal(&graph, &chart.release, "releaseName"), json!("atscale"));
    }

    #[test]
    fn test_helm_chart_coexists_with_group_named_after_release() {
        let mut graph = DependencyGraph::new();
        let vnet = crate::blueprints::vnet_component(
            &mut graph,
            DEFAULT_RELEASE_NAME,
            &crate::blueprints::VnetArgs {
                resource_group_name: Input::from("atscale-rg"),
                location: Input::from("eastus2"),
                address_space: vec!["10.0.0.0/16".to_string()],
                app_subnet_prefix: "10.0.1.0/24".to_string(),
                db_subnet_prefix: "10.0.2.0/24".to_string(),
            },
        )
        .unwrap();

        let chart = helm_chart(
            &mut graph,
            &HelmChartArgs {
                namespace: Input::from("atscale"),
                provider: None,
                depends_on: vec![vnet.vnet.clone()],
                values: json!({}),
                chart_version: Some("2026.1.0".to_string()),
                release_name: None,
            },
        )
        .unwrap();

        assert_eq!(vnet.group.id().as_str(), "atscale");
        assert_eq!(chart.release.as_str(), "atscale-chart");
        assert_eq!(literal(&graph, &chart.release, "version"), json!("2026.1.0"));
    }

    #[test]
    fn test_helm_chart_custom_release_name() {
        let mut graph = DependencyGraph::new();
        let chart = helm_chart(
            &mut graph,
            &HelmChartArgs {
                namespace: Input::from("analytics"),
                provider: None,
                depends_on: vec![],
                values: json!({}),
                chart_version: None,
                release_name: Some("analytics".to_string()),
            },
        )
        .unwrap();

        assert_eq!(chart.release.as_str(), "analytics-chart");
        assert_eq!(literal(&graph, &chart.release, "releaseName"), json!("analytics"));
    }

    #[test]
    fn test_cluster_wiring() {
        let mut graph = DependencyGraph::new();
        let cluster = cluster(
            &mut graph,
            &ClusterArgs {
                env: "dev".into(),
                location: "eastus2".into(),
                cluster_name: "atscale-dev-aks".into(),
                tenant_id: "tenant".into(),
                resource_group_name: Input::from("atscale-dev-rg"),
                node_subnet_prefix: "10.10.0.0/22".into(),
                system_pool_vm_sku: "Standard_D4s_v5".into(),
                availability_zones: vec![],
                private_dns_zone_id: "/zones/privatelink.eastus2.azmk8s.io".into(),
            },
        )
        .unwrap();

        let order = graph.topological_order().unwrap();
        let position = |id: &str| order.iter().position(|o| o.as_str() == id).unwrap();
        assert!(position("AdClientSp") < position("atscale-nodes"));
        assert!(position("AdClientSpPassword") < position("cluster"));
        assert!(position("cluster") < position("k8s-provider"));
        assert_eq!(cluster.provider.as_str(), "k8s-provider");

        let pool = literal(&graph, &cluster.cluster, "agentPoolProfiles");
        assert!(pool[0].get("availabilityZones").is_none());
    }
}
