//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. Built-in defaults for the environment named by `PRICEGRAPH_ENV`
//!    (`development` unless set to `production`)
//! 2. User config: `~/.config/pricegraph/config.toml` (XDG) or platform config dir
//! 3. Project config: `.pricegraph.toml`
//! 4. Environment variables: `PRICEGRAPH_*`
//!
//! # Example
//!
//! ```toml
//! api_version = "v1"
//! scrape_channel = "scrape"
//! call_timeout_ms = 10000
//!
//! [store]
//! backend = "postgres"
//! host = "db.internal"
//! graph = "pricegraph"
//!
//! [worker]
//! handlers = 8
//! queue_capacity = 256
//! ```
//!
//! Environment variables use the flat names `PRICEGRAPH_STORE_HOST`,
//! `PRICEGRAPH_WORKER_QUEUE_CAPACITY`, `PRICEGRAPH_CALL_TIMEOUT_MS` and so on.
//! A value that does not parse into its field is a fatal [`ConfigError`].

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "PRICEGRAPH_";
const ENVIRONMENT_VAR: &str = "PRICEGRAPH_ENV";

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

impl From<ConfigError> for figment::Error {
    fn from(err: ConfigError) -> Self {
        *err.0
    }
}

/// Deployment profile selecting the built-in defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(figment::Error::from(format!(
                "{} must be 'production' or 'development', got '{}'",
                ENVIRONMENT_VAR, other
            ))
            .into()),
        }
    }
}

/// Which graph store backend the process talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, state is lost on exit.
    Memory,
    /// PostgreSQL with the Apache AGE extension.
    Postgres,
}

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub environment: Environment,
    pub api_version: String,
    /// Topic carrying scrape requests out and observations back.
    pub scrape_channel: String,
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    /// Deadline applied to every store and broker call.
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
}

/// Graph store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Name of the AGE graph holding every entity.
    pub graph: String,
}

impl StoreConfig {
    /// Key/value connection string understood by tokio-postgres.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.database
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent observation handlers.
    pub handlers: usize,
    /// Capacity of the queue between the subscription and the handlers.
    pub queue_capacity: usize,
}

impl Config {
    /// Built-in defaults for an environment.
    pub fn defaults(environment: Environment) -> Self {
        let production = environment == Environment::Production;
        let pick = |prod: &str, dev: &str| {
            if production {
                prod.to_string()
            } else {
                dev.to_string()
            }
        };

        Self {
            environment,
            api_version: "v1".to_string(),
            scrape_channel: pick("scrape", "scrape-dev"),
            broker: BrokerConfig {
                host: pick("broker", "localhost"),
                port: 4222,
            },
            store: StoreConfig {
                backend: if production {
                    StoreBackend::Postgres
                } else {
                    StoreBackend::Memory
                },
                host: pick("store", "localhost"),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                database: "pricegraph".to_string(),
                graph: "pricegraph".to_string(),
            },
            worker: WorkerConfig {
                handlers: if production { 8 } else { 4 },
                queue_capacity: if production { 256 } else { 64 },
            },
            call_timeout_ms: if production { 10_000 } else { 5_000 },
        }
    }

    /// Load config with layered resolution (defaults → user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment()?.extract().map_err(ConfigError::from)
    }

    /// The layered provider chain, exposed for inspection in tests.
    pub fn figment() -> Result<Figment, ConfigError> {
        let environment = match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse()?,
            Err(_) => Environment::default(),
        };

        Ok(Figment::from(Serialized::defaults(Self::defaults(environment)))
            .merge(Toml::file(Self::user_config_path()))
            .merge(Toml::file(".pricegraph.toml"))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["env"])
                    .map(|key| env_key(key.as_str()).into()),
            ))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// User config path: ~/.config/pricegraph/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("pricegraph").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        dirs::config_dir()
            .map(|p| p.join("pricegraph").join("config.toml"))
            .unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults(Environment::default())
    }
}

/// Maps a flat environment key (`store_host`) onto its config path (`store.host`).
fn env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ["broker_", "store_", "worker_"] {
        if let Some(rest) = key.strip_prefix(section) {
            return format!("{}.{}", section.trim_end_matches('_'), rest);
        }
    }
    key
}
