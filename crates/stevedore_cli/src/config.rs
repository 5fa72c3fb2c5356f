//! Configuration file support for stevedore.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. Environment variables (prefixed with `STEVEDORE_`, sections separated
//!    with `__`, e.g. `STEVEDORE_CONNECTOR__APP_PASSWORD`)
//! 2. Local config file (./stevedore.toml)
//! 3. XDG config file (~/.config/stevedore/config.toml)
//!
//! Example config file:
//! ```toml
//! [connector]
//! username = "my-user"
//! app_password = "..."          # or STEVEDORE_CONNECTOR__APP_PASSWORD
//! repositories = ["acme/widgets", "acme/gadgets"]   # or ["*"]
//! retry_count = 3               # optional
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use stevedore::{ConnectorConfig, DataSourceKind, Error};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connector configuration.
    pub connector: ConnectorSection,
}

/// The `[connector]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConnectorSection {
    /// Bitbucket Cloud username.
    pub username: Option<String>,
    /// Bitbucket Cloud app password.
    pub app_password: Option<String>,
    /// Repository full names (`workspace/repo`), or `*` for everything.
    pub repositories: Vec<String>,
    /// Retries per request.
    pub retry_count: Option<usize>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        // Add XDG config file if it exists
        if let Some(proj_dirs) = ProjectDirs::from("", "", "stevedore") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        // Add local config file (higher priority than XDG)
        let local_config = PathBuf::from("stevedore.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./stevedore.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // Add STEVEDORE_ prefixed environment variables
        // e.g., STEVEDORE_CONNECTOR__USERNAME -> connector.username
        builder = builder.add_source(
            Environment::with_prefix("STEVEDORE")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Build the connector configuration, checking required fields.
    pub fn connector(&self) -> Result<ConnectorConfig, Error> {
        let username = self
            .connector
            .username
            .clone()
            .ok_or_else(|| Error::Config("missing connector.username".to_string()))?;
        let app_password = self
            .connector
            .app_password
            .clone()
            .ok_or_else(|| Error::Config("missing connector.app_password".to_string()))?;
        if self.connector.repositories.is_empty() {
            return Err(Error::Config(
                "missing connector.repositories (use [\"*\"] for all)".to_string(),
            ));
        }

        Ok(ConnectorConfig {
            data_source: DataSourceKind::BitbucketCloud,
            username,
            app_password,
            repositories: self.connector.repositories.clone(),
            retry_count: self
                .connector
                .retry_count
                .unwrap_or(stevedore::retry::DEFAULT_RETRY_COUNT),
        })
    }
}
