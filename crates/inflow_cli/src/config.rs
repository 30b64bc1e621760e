//! Configuration file support for inflow.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `INFLOW_`, e.g., `INFLOW_DATABASE_URL`)
//! 3. Config file (~/.config/inflow/config.toml or ./inflow.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/inflow/inflow.db"  # optional, this is the default
//!
//! [api]
//! endpoint = "https://api.github.com/graphql"
//! requests_per_second = 5
//!
//! [[scopes]]
//! id = "3fa85f64-5717-4562-b3fc-2c963f66afa6"
//! name = "acme"
//! token = "ghp_..."
//!
//! [sync]
//! page_size = 50
//! max_pages = 1000
//! prune = true
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use uuid::Uuid;

use inflow::api::StaticCredentials;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Upstream API configuration.
    pub api: ApiConfig,
    /// Registered scopes and their credentials.
    pub scopes: Vec<ScopeConfig>,
    /// Default sync options.
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    /// Defaults to `sqlite://~/.local/state/inflow/inflow.db` if not specified.
    pub url: Option<String>,
}

/// Upstream API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// GraphQL endpoint URL.
    /// Can also be set via INFLOW_API_ENDPOINT environment variable.
    pub endpoint: String,
    /// Flat per-scope request ceiling, independent of budget tracking.
    pub requests_per_second: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.github.com/graphql".to_string(),
            requests_per_second: inflow::limits::DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

/// One configured scope.
#[derive(Debug, Deserialize)]
pub struct ScopeConfig {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    /// Bearer token for this scope.
    pub token: String,
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Items requested per page.
    pub page_size: u32,
    /// Cap on pages per run.
    pub max_pages: u32,
    /// Remove local rows missing upstream after a complete pass.
    pub prune: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: inflow::sync::DEFAULT_PAGE_SIZE,
            max_pages: inflow::sync::DEFAULT_MAX_PAGES,
            prune: true,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/inflow/config.toml)
    /// 3. Local config file (./inflow.toml)
    /// 4. Environment variables with INFLOW_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "inflow") {
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

        let local_config = PathBuf::from("inflow.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./inflow.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., INFLOW_DATABASE_URL -> database.url
        builder = builder.add_source(
            Environment::with_prefix("INFLOW")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config, using defaults: {e}");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {e}");
                Config::default()
            }
        }
    }

    /// Resolve the database URL, defaulting to a SQLite file in the XDG
    /// state directory.
    pub fn database_url(&self) -> Result<String, Box<dyn std::error::Error>> {
        if let Some(url) = &self.database.url {
            return Ok(url.clone());
        }

        let proj_dirs = ProjectDirs::from("", "", "inflow")
            .ok_or("could not determine a home directory for the default database path")?;
        let state_dir = proj_dirs
            .state_dir()
            .map(PathBuf::from)
            .unwrap_or_else(|| proj_dirs.data_dir().to_path_buf());
        std::fs::create_dir_all(&state_dir)?;
        Ok(format!(
            "sqlite://{}?mode=rwc",
            state_dir.join("inflow.db").display()
        ))
    }

    /// Find a configured scope by id.
    pub fn scope(&self, id: Uuid) -> Option<&ScopeConfig> {
        self.scopes.iter().find(|s| s.id == id)
    }

    /// Build the credential table for the API client.
    pub fn credentials(&self) -> StaticCredentials {
        let tokens: HashMap<Uuid, String> = self
            .scopes
            .iter()
            .map(|s| (s.id, s.token.clone()))
            .collect();
        StaticCredentials::new(tokens)
    }
}
