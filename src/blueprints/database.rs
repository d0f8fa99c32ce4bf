// Copyright (c) 2025 - Cowboy AI, Inc.
//! Database Blueprints
//!
//! - [`sql_database_component`]: SQL server, one database and a private
//!   endpoint into a subnet, bundled as a group
//! - [`postgres_flexible`]: private Postgres flexible server with the three
//!   databases AtScale needs (`atscaledb`, `keycloakdb`, `pgwiredb`)

use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{child_id, secret};
use crate::config::StackConfig;
use crate::errors::CompositionResult;
use crate::graph::{CompositeGroup, DependencyGraph};
use crate::resource::ResourceDeclaration;
use crate::value::{Input, OutputRef, ResourceId};

pub const SQL_SERVER: &str = "sql-server";
pub const SQL_DATABASE: &str = "sql-database";
pub const PRIVATE_ENDPOINT: &str = "private-endpoint";
pub const POSTGRES_FLEXIBLE_SERVER: &str = "postgres-flexible-server";
pub const POSTGRES_DATABASE: &str = "postgres-database";

pub const POSTGRES_VERSION: &str = "15";
pub const BACKUP_RETENTION_DAYS: u32 = 7;

#[derive(Debug, Clone)]
pub struct SqlDatabaseArgs {
    pub resource_group_name: Input,
    pub location: Input,
    /// Subnet the private endpoint is placed in
    pub subnet_id: Input,
    pub admin_login: Input,
    pub admin_password: Input,
}

#[derive(Debug, Clone)]
pub struct SqlDatabase {
    pub group: CompositeGroup,
    pub server: ResourceId,
    pub server_name: OutputRef,
    pub database_name: OutputRef,
    pub private_endpoint_name: OutputRef,
}

/// Declare `{name}-sqlserver`, `{name}-sqldb` and `{name}-pe`
pub fn sql_database_component(
    graph: &mut DependencyGraph,
    name: &str,
    args: &SqlDatabaseArgs,
) -> CompositionResult<SqlDatabase> {
    let server = graph.declare(
        ResourceDeclaration::new(child_id(name, "sqlserver")?, SQL_SERVER)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.clone())
            .input("serverName", format!("{}-sqlserver", name))
            .input("administratorLogin", args.admin_login.clone())
            .input("administratorLoginPassword", secret(args.admin_password.clone()))
            .input("version", "12.0")
            .secret_output("administratorLoginPassword"),
    )?;

    let database = graph.declare(
        ResourceDeclaration::new(child_id(name, "sqldb")?, SQL_DATABASE)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.clone())
            .input("serverName", server.output("name"))
            .input("databaseName", format!("{}-db", name))
            .input("sku", json!({ "name": "Standard", "tier": "Standard" })),
    )?;

    let endpoint = graph.declare(
        ResourceDeclaration::new(child_id(name, "pe")?, PRIVATE_ENDPOINT)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.clone())
            .input("subnetId", args.subnet_id.clone())
            .input("privateLinkServiceId", server.output("id"))
            .input("privateLinkServiceConnectionName", format!("{}-sql-plsc", name))
            .input("groupIds", json!(["sqlServer"])),
    )?;

    let group = graph.group(
        ResourceId::new(name)?,
        vec![server.clone(), database.clone(), endpoint.clone()],
        BTreeMap::from([
            ("serverName".to_string(), server.output("name")),
            ("databaseName".to_string(), database.output("name")),
            ("privateEndpointName".to_string(), endpoint.output("name")),
        ]),
    )?;

    Ok(SqlDatabase {
        group,
        server_name: server.output("name"),
        database_name: database.output("name"),
        private_endpoint_name: endpoint.output("name"),
        server,
    })
}

#[derive(Debug, Clone)]
pub struct PostgresArgs {
    pub app: String,
    pub env: String,
    pub location: String,
    pub instance: String,
    pub resource_group_name: Input,
    pub delegated_subnet_id: Input,
    pub private_dns_zone_id: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PostgresFlexible {
    pub server: ResourceId,
    pub server_name: OutputRef,
    pub host: OutputRef,
    pub admin_login: String,
    pub atscale_db: OutputRef,
    pub keycloak_db: OutputRef,
    pub pgwire_db: OutputRef,
}

/// `vzn-{location}-{app}-{env}-dbflexserver-{instance}`
pub fn postgres_server_name(args: &PostgresArgs) -> String {
    format!(
        "vzn-{}-{}-{}-dbflexserver-{}",
        args.location, args.app, args.env, args.instance
    )
}

/// Declare the flexible server and its databases
///
/// Reads `postgreSqlAdmin`, `postgreSqlAdminPassword` (secret),
/// `flexDBSkuName` and `postgreServerStorage` from `config`.
pub fn postgres_flexible(
    graph: &mut DependencyGraph,
    args: &PostgresArgs,
    config: &StackConfig,
) -> CompositionResult<PostgresFlexible> {
    let admin_login = config.require_string("postgreSqlAdmin")?;
    let server = graph.declare(
        ResourceDeclaration::new(
            ResourceId::new(format!("{}-{}-postgresqlserver", args.app, args.env))?,
            POSTGRES_FLEXIBLE_SERVER,
        )
        .input("serverName", postgres_server_name(args))
        .input("resourceGroupName", args.resource_group_name.clone())
        .input("location", args.location.as_str())
        .input("administratorLogin", admin_login.as_str())
        .input(
            "administratorLoginPassword",
            config.require_secret("postgreSqlAdminPassword")?,
        )
        .input("publicNetworkAccess", "Disabled")
        .input("delegatedSubnetResourceId", args.delegated_subnet_id.clone())
        .input("privateDnsZoneArmResourceId", args.private_dns_zone_id.as_str())
        .input("createMode", "Default")
        .input(
            "sku",
            json!({ "name": config.require_string("flexDBSkuName")?, "tier": "GeneralPurpose" }),
        )
        .input("version", POSTGRES_VERSION)
        .input(
            "storage",
            json!({ "storageSizeGB": Value::Number(config.require_number("postgreServerStorage")?) }),
        )
        .input(
            "backup",
            json!({ "backupRetentionDays": BACKUP_RETENTION_DAYS, "geoRedundantBackup": "Disabled" }),
        )
        .input("tags", json!(args.tags))
        .secret_output("administratorLoginPassword"),
    )?;

    let mut database = |database_name: &str, prefix: &str| -> CompositionResult<OutputRef> {
        let id = graph.declare(
            ResourceDeclaration::new(
                ResourceId::new(format!("{}-{}-db", prefix, args.env))?,
                POSTGRES_DATABASE,
            )
            .input("databaseName", database_name)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("serverName", server.output("name")),
        )?;
        Ok(id.output("name"))
    };
    let atscale_db = database("atscaledb", "atscale")?;
    let keycloak_db = database("keycloakdb", "keycloak")?;
    let pgwire_db = database("pgwiredb", "pgwire")?;

    Ok(PostgresFlexible {
        server_name: server.output("name"),
        host: server.output("fullyQualifiedDomainName"),
        admin_login,
        atscale_db,
        keycloak_db,
        pgwire_db,
        server,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CompositionError;

    fn pg_args() -> PostgresArgs {
        PostgresArgs {
            app: "atscale".to_string(),
            env: "dev".to_string(),
            location: "eastus2".to_string(),
            instance: "01".to_string(),
            resource_group_name: Input::from("atscale-dev-rg"),
            delegated_subnet_id: Input::from("/subscriptions/s/subnets/pg"),
            private_dns_zone_id: "/zones/privatelink.postgres.database.azure.com".to_string(),
            tags: BTreeMap::new(),
        }
    }

    fn stack_config() -> StackConfig {
        StackConfig::new()
            .with("postgreSqlAdmin", "sqladmin")
            .with("postgreSqlAdminPassword", "hunter2")
            .with("flexDBSkuName", "Standard_D2ds_v5")
            .with("postgreServerStorage", "128")
    }

    #[test]
    fn test_postgres_server_name() {
        assert_eq!(
            postgres_server_name(&pg_args()),
            "vzn-eastus2-atscale-dev-dbflexserver-01"
        );
    }

    #[test]
    fn test_postgres_declares_three_databases() {
        let mut graph = DependencyGraph::new();
        let pg = postgres_flexible(&mut graph, &pg_args(), &stack_config()).unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(pg.atscale_db.resource.as_str(), "atscale-dev-db");
        assert_eq!(pg.admin_login, "sqladmin");
        assert_eq!(
            graph.dependents(&pg.server).unwrap().len(),
            3,
        );

        let server = graph.node(&pg.server).unwrap();
        assert!(matches!(
            server.inputs()["administratorLoginPassword"],
            Input::Secret(_)
        ));
        match &server.inputs()["storage"] {
            Input::Literal(value) => assert_eq!(value["storageSizeGB"], json!(128)),
            other => panic!("unexpected storage input {:?}", other),
        }
    }

    #[test]
    fn test_postgres_requires_admin_password() {
        let mut graph = DependencyGraph::new();
        let config = StackConfig::new()
            .with("postgreSqlAdmin", "sqladmin")
            .with("flexDBSkuName", "Standard_D2ds_v5")
            .with("postgreServerStorage", 128);

        let result = postgres_flexible(&mut graph, &pg_args(), &config);
        assert!(matches!(result, Err(CompositionError::Configuration(_))));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_sql_component_password_is_secret() {
        let mut graph = DependencyGraph::new();
        let sql = sql_database_component(
            &mut graph,
            "orders",
            &SqlDatabaseArgs {
                resource_group_name: Input::from("rg"),
                location: Input::from("eastus"),
                subnet_id: Input::from("/subnets/db"),
                admin_login: Input::from("pulumiadmin"),
                admin_password: Input::from("StrongPassword!123"),
            },
        )
        .unwrap();

        let server = graph.node(&sql.server).unwrap();
        assert!(matches!(
            server.inputs()["administratorLoginPassword"],
            Input::Secret(_)
        ));
        assert_eq!(sql.group.id().as_str(), "orders");
        assert_eq!(sql.database_name.resource.as_str(), "orders-sqldb");
    }
}
