// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration
//!
//! Two configuration values, both passed explicitly:
//!
//! - [`EngineConfig`] controls how a run is scheduled.
//! - [`StackConfig`] holds the per-stack settings blueprints read (admin
//!   logins, SKUs, storage sizes). Nothing in this crate reads configuration
//!   from ambient state; a blueprint that needs a setting takes a
//!   `&StackConfig` argument.
//!
//! # Environment
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `CIM_COMPOSE_MAX_CONCURRENCY` | provisioner calls in flight | unbounded |
//! | `CIM_COMPOSE_FAIL_FAST` | stop starting nodes after the first failure | `false` |

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

use crate::errors::{CompositionError, CompositionResult};
use crate::value::Input;

pub const MAX_CONCURRENCY_VAR: &str = "CIM_COMPOSE_MAX_CONCURRENCY";
pub const FAIL_FAST_VAR: &str = "CIM_COMPOSE_FAIL_FAST";

/// Scheduling options for a composition run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrent provisioner calls; `None` is unbounded
    pub max_concurrency: Option<usize>,
    /// Cancel not-yet-started nodes after the first provisioning failure
    pub fail_fast: bool,
}

impl EngineConfig {
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Load from `CIM_COMPOSE_*` environment variables
    pub fn from_env() -> CompositionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> CompositionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_concurrency = match lookup(MAX_CONCURRENCY_VAR) {
            None => None,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(CompositionError::Configuration(format!(
                        "{} must be a positive integer, got '{}'",
                        MAX_CONCURRENCY_VAR, raw
                    )))
                }
                Ok(limit) => Some(limit),
            },
        };

        let fail_fast = match lookup(FAIL_FAST_VAR) {
            None => false,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(CompositionError::Configuration(format!(
                        "{} must be a boolean, got '{}'",
                        FAIL_FAST_VAR, raw
                    )))
                }
            },
        };

        Ok(Self {
            max_concurrency,
            fail_fast,
        })
    }
}

/// Key/value settings for one stack
///
/// ```rust,ignore
/// let config = StackConfig::from_json(r#"{
///     "postgreSqlAdmin": "sqladmin",
///     "postgreSqlAdminPassword": "…",
///     "flexDBSkuName": "Standard_D2ds_v5",
///     "postgreServerStorage": 128
/// }"#)?;
/// let login = config.require_string("postgreSqlAdmin")?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackConfig {
    values: BTreeMap<String, Value>,
}

impl StackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one setting
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Parse a JSON object of settings
    pub fn from_json(source: &str) -> CompositionResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Collect every environment variable starting with `prefix`
    ///
    /// The prefix is stripped from the key; values stay strings.
    /// `require_number` parses them on demand.
    pub fn from_env_prefix(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_string(), Value::String(value)))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String setting or `default`
    pub fn get_or(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => default.to_string(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Setting that must be present
    pub fn require(&self, key: &str) -> CompositionResult<Value> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| missing(key))
    }

    /// Setting that must be present and a string
    pub fn require_string(&self, key: &str) -> CompositionResult<String> {
        match self.require(key)? {
            Value::String(s) => Ok(s),
            other => Err(CompositionError::Configuration(format!(
                "configuration value {} must be a string, got {}",
                key, other
            ))),
        }
    }

    /// Setting that must be present, wrapped as a secret input
    pub fn require_secret(&self, key: &str) -> CompositionResult<Input> {
        Ok(Input::Secret(self.require(key)?))
    }

    /// Numeric setting; numeric strings are accepted
    pub fn require_number(&self, key: &str) -> CompositionResult<Number> {
        let not_a_number = |raw: &dyn std::fmt::Display| {
            CompositionError::Configuration(format!(
                "configuration value {} must be a number, got {}",
                key, raw
            ))
        };
        match self.require(key)? {
            Value::Number(n) => Ok(n),
            Value::String(s) => s.trim().parse::<Number>().map_err(|_| not_a_number(&s)),
            other => Err(not_a_number(&other)),
        }
    }
}

fn missing(key: &str) -> CompositionError {
    CompositionError::Configuration(format!("missing required configuration value: {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_concurrency, None);
        assert!(!config.fail_fast);
    }

    #[test]
    fn test_engine_from_vars() {
        let config = EngineConfig::from_lookup(lookup(&[
            (MAX_CONCURRENCY_VAR, "4"),
            (FAIL_FAST_VAR, "true"),
        ]))
        .unwrap();
        assert_eq!(config.max_concurrency, Some(4));
        assert!(config.fail_fast);
    }

    #[test]
    fn test_engine_rejects_bad_values() {
        assert!(EngineConfig::from_lookup(lookup(&[(MAX_CONCURRENCY_VAR, "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(MAX_CONCURRENCY_VAR, "many")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(FAIL_FAST_VAR, "maybe")])).is_err());
    }

    #[test]
    fn test_stack_config_from_json() {
        let config = StackConfig::from_json(
            r#"{"postgreSqlAdmin": "sqladmin", "postgreServerStorage": 128}"#,
        )
        .unwrap();

        assert_eq!(config.require_string("postgreSqlAdmin").unwrap(), "sqladmin");
        assert_eq!(
            config.require_number("postgreServerStorage").unwrap(),
            Number::from(128)
        );
        assert_eq!(config.get_or("flexDBSkuName", "Standard_B1ms"), "Standard_B1ms");
    }

    #[test]
    fn test_stack_config_rejects_non_object() {
        assert!(matches!(
            StackConfig::from_json("[1, 2]"),
            Err(CompositionError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_value_is_configuration_error() {
        let err = StackConfig::new().require("postgreSqlAdminPassword").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: missing required configuration value: postgreSqlAdminPassword"
        );
    }

    #[test]
    fn test_require_secret_wraps_value() {
        let config = StackConfig::new().with("postgreSqlAdminPassword", "hunter2");
        match config.require_secret("postgreSqlAdminPassword").unwrap() {
            Input::Secret(value) => assert_eq!(value, json!("hunter2")),
            other => panic!("expected secret input, got {:?}", other),
        }
    }

    #[test]
    fn test_env_prefix_strips_and_parses_numbers() {
        let config = StackConfig::from_vars(
            "ATSCALE_",
            vec![
                ("ATSCALE_postgreServerStorage".to_string(), "256".to_string()),
                ("ATSCALE_".to_string(), "ignored".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ],
        );

        assert_eq!(
            config.require_number("postgreServerStorage").unwrap(),
            Number::from(256)
        );
        assert!(!config.contains("PATH"));
        assert!(!config.contains(""));
    }
}
