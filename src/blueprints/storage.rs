// Copyright (c) 2025 - Cowboy AI, Inc.
//! Standard general purpose v2 storage account

use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::child_id;
use crate::errors::CompositionResult;
use crate::graph::{CompositeGroup, DependencyGraph};
use crate::resource::ResourceDeclaration;
use crate::value::{Input, OutputRef, ResourceId};

pub const STORAGE_ACCOUNT: &str = "storage-account";

/// Azure limit on storage account names
pub const MAX_ACCOUNT_NAME_LEN: usize = 24;

const SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct StorageAccountArgs {
    pub resource_group_name: Input,
    pub location: Input,
    pub name_prefix: String,
    /// Random characters appended to the prefix; generated when absent
    pub suffix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageAccount {
    pub group: CompositeGroup,
    pub account: ResourceId,
    pub account_name: String,
    pub storage_account_name: OutputRef,
    /// `primaryEndpoints.blob`, or an empty string when the account has none
    pub primary_blob_endpoint: Input,
}

/// Lowercase alphanumeric `prefix + suffix`, cut to 24 characters
pub fn account_name(prefix: &str, suffix: &str) -> String {
    prefix
        .chars()
        .chain(suffix.chars())
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_ACCOUNT_NAME_LEN)
        .collect()
}

fn random_suffix() -> String {
    let simple = Uuid::now_v7().simple().to_string();
    // v7 puts the timestamp first; the tail is random
    simple[simple.len() - SUFFIX_LEN..].to_string()
}

/// Declare `{name}-sa`; the group `{name}` exposes `storageAccountName`
pub fn standard_storage_account(
    graph: &mut DependencyGraph,
    name: &str,
    args: &StorageAccountArgs,
) -> CompositionResult<StorageAccount> {
    let suffix = args.suffix.clone().unwrap_or_else(random_suffix);
    let account_name = account_name(&args.name_prefix, &suffix);

    let account = graph.declare(
        ResourceDeclaration::new(child_id(name, "sa")?, STORAGE_ACCOUNT)
            .input("resourceGroupName", args.resource_group_name.clone())
            .input("location", args.location.clone())
            .input("accountName", account_name.as_str())
            .input("sku", json!({ "name": "Standard_LRS" }))
            .input("kind", "StorageV2"),
    )?;

    let group = graph.group(
        ResourceId::new(name)?,
        vec![account.clone()],
        BTreeMap::from([("storageAccountName".to_string(), account.output("name"))]),
    )?;

    let primary_blob_endpoint = Input::derived(account.output("primaryEndpoints"), |endpoints| {
        Ok(endpoints
            .get("blob")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())))
    });

    Ok(StorageAccount {
        group,
        storage_account_name: account.output("name"),
        account_name,
        primary_blob_endpoint,
        account,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("atscale", "a1b2c3d4", "atscalea1b2c3d4" ; "plain")]
    #[test_case("AtScale-Dev_", "XY", "atscaledevxy" ; "lowercased and stripped")]
    #[test_case("averyveryverylongprefixname", "1234", "averyveryverylongprefixn" ; "truncated")]
    fn test_account_name(prefix: &str, suffix: &str, expected: &str) {
        assert_eq!(account_name(prefix, suffix), expected);
    }

    #[test]
    fn test_generated_suffix() {
        let mut graph = DependencyGraph::new();
        let sa = standard_storage_account(
            &mut graph,
            "logs",
            &StorageAccountArgs {
                resource_group_name: Input::from("rg"),
                location: Input::from("eastus"),
                name_prefix: "logs".to_string(),
                suffix: None,
            },
        )
        .unwrap();

        assert_eq!(sa.account_name.len(), 4 + SUFFIX_LEN);
        assert!(sa.account_name.starts_with("logs"));
        assert_eq!(sa.account.as_str(), "logs-sa");
    }

    #[test]
    fn test_blob_endpoint_defaults_to_empty() {
        let mut graph = DependencyGraph::new();
        let sa = standard_storage_account(
            &mut graph,
            "logs",
            &StorageAccountArgs {
                resource_group_name: Input::from("rg"),
                location: Input::from("eastus"),
                name_prefix: "logs".to_string(),
                suffix: Some("0001".to_string()),
            },
        )
        .unwrap();
        graph
            .declare(
                ResourceDeclaration::new(ResourceId::new("consumer").unwrap(), "web-app")
                    .input("blob", sa.primary_blob_endpoint.clone()),
            )
            .unwrap();
        graph
            .publish_outputs(
                &sa.account,
                BTreeMap::from([("primaryEndpoints".to_string(), json!({ "dfs": "x" }))]),
            )
            .unwrap();

        let inputs = graph
            .input_snapshot(&ResourceId::new("consumer").unwrap())
            .unwrap();
        assert_eq!(inputs.get("blob"), Some(&json!("")));
    }
}
