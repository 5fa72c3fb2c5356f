//! Inbound connector configuration.
//!
//! The host supplies these values; the CLI harness builds them from its
//! layered configuration files and environment variables.

use serde::Deserialize;

use crate::retry::DEFAULT_RETRY_COUNT;

/// Sentinel repository entry meaning "every accessible repository".
pub const WILDCARD: &str = "*";

/// Which hosted source the connector talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    #[default]
    BitbucketCloud,
}

/// Configuration for one connector instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    /// Data source selector.
    #[serde(default)]
    pub data_source: DataSourceKind,
    /// Bitbucket Cloud username.
    pub username: String,
    /// Bitbucket Cloud app password.
    pub app_password: String,
    /// Repository full names (`workspace/repo`), or the wildcard `*`.
    pub repositories: Vec<String>,
    /// Retries per request.
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
}

fn default_retry_count() -> usize {
    DEFAULT_RETRY_COUNT
}

impl ConnectorConfig {
    /// True when the configuration selects every accessible repository.
    ///
    /// The wildcard must be the sole entry; a list that merely contains `*`
    /// alongside explicit names is treated as an explicit selection.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.repositories == [WILDCARD]
    }
}
