//! Server configuration with layered resolution.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via [`ServerConfig::apply_cli_overrides`])
//! 2. Environment variables (`LIVEGRAPH_HOST`, `LIVEGRAPH_PORT`, `LIVEGRAPH_LOG`)
//! 3. TOML file (`--config <path>`, else `livegraph.toml` in the working directory)
//! 4. Compiled defaults
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//! port = 8001
//!
//! [reconnect]
//! initial_delay_ms = 250
//! max_delay_ms = 10000
//! multiplier = 2.0
//! max_attempts = 20
//!
//! [project]
//! id = "demo"
//! modules = ["main.json"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "livegraph.toml";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Config parse error in {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Config validation failed for {field}: {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Invalid config value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

impl ConnectionConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inbound lines longer than this are rejected without being parsed.
    pub max_frame_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
    pub path: String,
    /// Module files loaded at startup.
    pub modules: Vec<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            name: "default".to_string(),
            path: ".".to_string(),
            modules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub connection: ConnectionConfig,
    pub reconnect: ReconnectConfig,
    pub session: SessionConfig,
    pub project: ProjectConfig,
    pub log: LogConfig,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub modules: Vec<PathBuf>,
}

impl ServerConfig {
    /// Resolve the configuration from every layer and validate it.
    pub fn load(cli: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.apply_cli_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `LIVEGRAPH_*` variables read through `var`.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = var("LIVEGRAPH_HOST") {
            self.connection.host = host;
        }
        if let Some(port) = var("LIVEGRAPH_PORT") {
            self.connection.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "LIVEGRAPH_PORT".to_string(),
                message: format!("not a port number: {port}"),
            })?;
        }
        if let Some(filter) = var(crate::logging::LOG_ENV) {
            self.log.filter = Some(filter);
        }
        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(host) = &cli.host {
            self.connection.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.connection.port = port;
        }
        self.project.modules.extend(cli.modules.iter().cloned());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.port == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "connection.port".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed {
                field: "reconnect.multiplier".to_string(),
                message: "must be at least 1.0".to_string(),
            });
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::ValidationFailed {
                field: "reconnect.initial_delay_ms".to_string(),
                message: "must not exceed reconnect.max_delay_ms".to_string(),
            });
        }
        if self.session.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "session.max_frame_bytes".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
