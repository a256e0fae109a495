//! Configuration loading.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Default values in code
//! 2. `config/{environment}.toml` (optional)
//! 3. Environment variables with the `BAGFORGE_` prefix and `__` as the
//!    nesting separator, e.g. `BAGFORGE_DATABASE__URL`

use bagforge_observability::TracingSettings;
use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Ledger service configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Current environment (development, production)
    pub environment: String,

    pub database: DatabaseConfig,

    pub posting: PostingConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PostingConfig {
    /// Attempts after a serialization failure or deadlock before giving up
    pub max_write_retries: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl LoggingConfig {
    pub fn tracing_settings(&self) -> TracingSettings {
        TracingSettings {
            filter: self.filter.clone(),
            json: self.json,
        }
    }
}

const ENV_PREFIX: &str = "BAGFORGE";

impl LedgerConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("BAGFORGE_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        Self::builder(&environment)?
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only.
    fn builder(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("environment", environment)?
            .set_default("database.url", "postgres://localhost/bagforge")?
            .set_default("database.max_connections", 5)?
            .set_default("posting.max_write_retries", 3)?
            .set_default("logging.filter", "info")?
            .set_default("logging.json", true)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/bagforge".to_string(),
                max_connections: 5,
            },
            posting: PostingConfig {
                max_write_retries: 3,
            },
            logging: LoggingConfig {
                filter: "info".to_string(),
                json: true,
            },
        }
    }
}
