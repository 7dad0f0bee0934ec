// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! Configuration is read from an optional YAML file named by the
//! `CLOUD_CONFIG` environment variable and then overridden field by field from
//! the environment:
//!
//! | Variable                    | Field                              | Default          |
//! |-----------------------------|------------------------------------|------------------|
//! | `CLOUDSTACK_API_URL`        | `cloudstack.apiUrl`                | required         |
//! | `CLOUDSTACK_API_KEY`        | `cloudstack.apiKey`                | required         |
//! | `CLOUDSTACK_SECRET_KEY`     | `cloudstack.secretKey`             | required         |
//! | `CLOUDSTACK_PROJECT_ID`     | `cloudstack.projectId`             | none             |
//! | `CLOUDSTACK_SSL_NO_VERIFY`  | `cloudstack.sslNoVerify`           | `false`          |
//! | `ASYNC_JOB_TIMEOUT_SECS`    | `cloudstack.asyncJobTimeoutSecs`   | `300`            |
//! | `CLUSTER_NAME`              | `clusterName`                      | `kubernetes`     |
//! | `METRICS_BIND_ADDRESS`      | `metricsBindAddress`               | `0.0.0.0:8080`   |
//! | `NODE_SYNC_INTERVAL_SECS`   | `nodeSyncIntervalSecs`             | `100`            |
//!
//! # Example
//!
//! ```yaml
//! cloudstack:
//!   apiUrl: https://cloud.example.com/client/api
//!   apiKey: my-key
//!   secretKey: my-secret
//!   projectId: 4b8c6f3e-0000-0000-0000-000000000000
//! clusterName: production
//! ```

use crate::constants::{
    DEFAULT_ASYNC_JOB_TIMEOUT_SECS, DEFAULT_CLUSTER_NAME, DEFAULT_METRICS_BIND_ADDRESS,
    DEFAULT_NODE_SYNC_INTERVAL_SECS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the YAML configuration file
pub const CLOUD_CONFIG_ENV: &str = "CLOUD_CONFIG";

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`ControllerConfig`]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An environment variable holds a value of the wrong type
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    /// A mandatory setting is absent
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// The API URL does not parse
    #[error("Invalid CloudStack API URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// CloudStack API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudStackConfig {
    pub api_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub project_id: Option<String>,
    /// Skip TLS certificate verification
    pub ssl_no_verify: bool,
    /// Maximum time to wait for an async job
    pub async_job_timeout_secs: u64,
}

impl Default for CloudStackConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            secret_key: String::new(),
            project_id: None,
            ssl_no_verify: false,
            async_job_timeout_secs: DEFAULT_ASYNC_JOB_TIMEOUT_SECS,
        }
    }
}

/// Top-level controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    pub cloudstack: CloudStackConfig,
    /// Cluster name embedded in load balancer names
    pub cluster_name: String,
    pub metrics_bind_address: String,
    /// Interval between node synchronisation passes
    pub node_sync_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cloudstack: CloudStackConfig::default(),
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            metrics_bind_address: DEFAULT_METRICS_BIND_ADDRESS.to_string(),
            node_sync_interval_secs: DEFAULT_NODE_SYNC_INTERVAL_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from `CLOUD_CONFIG` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the result
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let yaml = match std::env::var(CLOUD_CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Some(
                std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?,
            ),
            _ => None,
        };

        Self::from_sources(yaml.as_deref(), |name| std::env::var(name).ok())
    }

    /// Build configuration from YAML text and an environment lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid, an environment value has the
    /// wrong type, or validation fails.
    pub fn from_sources<F>(yaml: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match yaml {
            Some(text) if !text.trim().is_empty() => serde_yaml::from_str(text)?,
            _ => Self::default(),
        };

        let env = |name: &str| env(name).filter(|v| !v.is_empty());

        if let Some(v) = env("CLOUDSTACK_API_URL") {
            config.cloudstack.api_url = v;
        }
        if let Some(v) = env("CLOUDSTACK_API_KEY") {
            config.cloudstack.api_key = v;
        }
        if let Some(v) = env("CLOUDSTACK_SECRET_KEY") {
            config.cloudstack.secret_key = v;
        }
        if let Some(v) = env("CLOUDSTACK_PROJECT_ID") {
            config.cloudstack.project_id = Some(v);
        }
        if let Some(v) = env("CLOUDSTACK_SSL_NO_VERIFY") {
            config.cloudstack.ssl_no_verify = parse_env("CLOUDSTACK_SSL_NO_VERIFY", &v)?;
        }
        if let Some(v) = env("ASYNC_JOB_TIMEOUT_SECS") {
            config.cloudstack.async_job_timeout_secs = parse_env("ASYNC_JOB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("CLUSTER_NAME") {
            config.cluster_name = v;
        }
        if let Some(v) = env("METRICS_BIND_ADDRESS") {
            config.metrics_bind_address = v;
        }
        if let Some(v) = env("NODE_SYNC_INTERVAL_SECS") {
            config.node_sync_interval_secs = parse_env("NODE_SYNC_INTERVAL_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check mandatory settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL, key or secret is missing, or the URL
    /// does not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cloudstack.api_url.is_empty() {
            return Err(ConfigError::Missing("CloudStack API URL"));
        }
        if self.cloudstack.api_key.is_empty() {
            return Err(ConfigError::Missing("CloudStack API key"));
        }
        if self.cloudstack.secret_key.is_empty() {
            return Err(ConfigError::Missing("CloudStack secret key"));
        }

        url::Url::parse(&self.cloudstack.api_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.cloudstack.api_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Project id, treating an empty string as unset.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.cloudstack
            .project_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}
