//! Serializable sync configuration.
//!
//! Loaded from TOML. Every section has defaults, so an empty file is a valid
//! configuration that syncs every dataset from the public upstream.

use bondlab_core::data::{BreakerConfig, EndpointCatalog, EndpointSpec, ExecutorConfig};
use bondlab_core::domain::SourceEndpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("render config TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub upstream: UpstreamConfig,
    pub executor: ExecutorConfig,
    pub breaker: BreakerConfig,
    pub sync: RunSettings,
    pub session: SessionConfig,
    /// Replaces the built-in endpoint catalog when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<EndpointSpec>,
}

/// Where the upstream lives and how its session cookies are named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Name used in logs and breaker-open errors.
    pub name: String,
    pub base_url: String,
    pub user_agent: String,
    pub session_cookie: String,
    pub auth_cookie: String,
    /// Environment variables holding seed cookie values.
    pub session_cookie_env: String,
    pub auth_cookie_env: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: "nsdl".into(),
            base_url: "https://www.indiabondinfo.nsdl.com".into(),
            user_agent: concat!("bondlab/", env!("CARGO_PKG_VERSION")).into(),
            session_cookie: "JSESSIONID".into(),
            auth_cookie: "AUTH_TOKEN".into(),
            session_cookie_env: "BONDLAB_SESSION_COOKIE".into(),
            auth_cookie_env: "BONDLAB_AUTH_COOKIE".into(),
        }
    }
}

/// Which datasets to sync and how many endpoints may run at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub datasets: Vec<SourceEndpoint>,
    /// Upper bound on endpoints fetched concurrently.
    pub concurrency: usize,
    /// Skipped-record reasons kept in the summary.
    pub max_skipped_samples: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            datasets: SourceEndpoint::ALL.to_vec(),
            concurrency: 3,
            max_skipped_samples: 20,
        }
    }
}

/// Out-of-band login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program and arguments that print fresh cookies as `NAME=VALUE` lines.
    /// Empty disables automated login.
    pub login_command: Vec<String>,
    /// Seconds the login command may run.
    pub login_timeout_secs: Option<u64>,
}

impl SyncConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.upstream.base_url.trim().is_empty() {
            return invalid("upstream.base_url is empty");
        }
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            return invalid("upstream.base_url must be an http(s) URL");
        }
        if self.breaker.failure_threshold == 0 {
            return invalid("breaker.failure_threshold must be at least 1");
        }
        if self.sync.concurrency == 0 {
            return invalid("sync.concurrency must be at least 1");
        }
        if self.sync.datasets.is_empty() {
            return invalid("sync.datasets is empty");
        }
        if self.executor.max_pages == 0 {
            return invalid("executor.max_pages must be at least 1");
        }
        if self.executor.timeout_secs == 0 {
            return invalid("executor.timeout_secs must be at least 1");
        }
        for spec in &self.endpoints {
            if spec.pagination.as_ref().is_some_and(|p| p.page_size == 0) {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {} has page_size 0",
                    spec.label()
                )));
            }
            if !spec.path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "endpoint path '{}' must start with '/'",
                    spec.path
                )));
            }
        }
        if self.session.login_command.first().is_some_and(|p| p.trim().is_empty()) {
            return invalid("session.login_command has an empty program");
        }
        Ok(())
    }

    /// The configured catalog, or the built-in one.
    pub fn catalog(&self) -> EndpointCatalog {
        if self.endpoints.is_empty() {
            EndpointCatalog::default()
        } else {
            EndpointCatalog::new(self.endpoints.clone())
        }
    }

    /// Physical calls for the configured datasets, in dataset order.
    /// The primary dataset is always fetched.
    pub fn planned_endpoints(&self) -> Vec<EndpointSpec> {
        let catalog = self.catalog();
        let mut datasets = self.sync.datasets.clone();
        if !datasets.iter().any(SourceEndpoint::is_primary) {
            datasets.insert(0, SourceEndpoint::ActiveSecurities);
        }
        datasets.sort();
        datasets.dedup();
        datasets
            .into_iter()
            .flat_map(|d| catalog.resolve(d).into_iter().cloned().collect::<Vec<_>>())
            .collect()
    }
}
