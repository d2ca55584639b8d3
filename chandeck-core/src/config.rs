use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::board::LayoutMode;
use crate::engine::EngineSettings;
use crate::poller::PollSettings;

pub const CONFIG_ENV: &str = "CHANDECK_CONFIG";
const CONFIG_NAMES: [&str; 4] = [
    "chandeck.yaml",
    "chandeck.yml",
    ".chandeck.yaml",
    ".chandeck.yml",
];

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Backend ports. The config and stats APIs share a port on stock servers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ports {
    #[serde(default = "default_config_port")]
    pub config: u16,
    #[serde(default = "default_control_port")]
    pub control: u16,
    #[serde(default = "default_stats_port")]
    pub stats: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            config: default_config_port(),
            control: default_control_port(),
            stats: default_stats_port(),
        }
    }
}

fn default_config_port() -> u16 {
    5000
}
fn default_control_port() -> u16 {
    8001
}
fn default_stats_port() -> u16 {
    5000
}

/// Root configuration file structure
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DashConfig {
    /// Candidate server list, relative to the config file
    #[serde(default = "default_servers_file")]
    pub servers_file: PathBuf,

    #[serde(default)]
    pub ports: Ports,

    /// Directory refresh period
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Output telemetry poll period
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Samples older than this are stale
    #[serde(default = "default_stale_after")]
    pub stale_after_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Initial layout when nothing is persisted
    #[serde(default)]
    pub layout: LayoutMode,

    /// Log file, defaults to the state directory
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_servers_file() -> PathBuf {
    PathBuf::from("servers.json")
}
fn default_refresh_interval() -> u64 {
    5000
}
fn default_poll_interval() -> u64 {
    5000
}
fn default_stale_after() -> u64 {
    10_000
}
fn default_request_timeout() -> u64 {
    3000
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            servers_file: default_servers_file(),
            ports: Ports::default(),
            refresh_interval_ms: default_refresh_interval(),
            poll_interval_ms: default_poll_interval(),
            stale_after_ms: default_stale_after(),
            request_timeout_ms: default_request_timeout(),
            layout: LayoutMode::default(),
            log_file: None,
        }
    }
}

impl DashConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_str(&read(path)?)?;
        if config.servers_file.is_relative() {
            if let Some(dir) = path.parent() {
                config.servers_file = dir.join(&config.servers_file);
            }
        }
        Ok(config)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: DashConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::discover_from(start_dir, env_path)
    }

    fn discover_from(
        start_dir: &Path,
        env_path: Option<PathBuf>,
    ) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        if let Some(path) = env_path {
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Like `discover`, but a missing file means defaults.
    pub fn discover_or_default(start_dir: &Path) -> Result<(Option<PathBuf>, Self), ConfigError> {
        match Self::discover(start_dir) {
            Ok((path, config)) => Ok((Some(path), config)),
            Err(ConfigError::NotFound { .. }) => {
                debug!("no config file, using defaults");
                Ok((None, Self::default()))
            }
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("stale_after_ms", self.stale_after_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }
        let ports = [
            ("ports.config", self.ports.config),
            ("ports.control", self.ports.control),
            ("ports.stats", self.ports.stats),
        ];
        for (name, value) in ports {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must not be 0", name)));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn engine_settings(&self, layout: LayoutMode) -> EngineSettings {
        EngineSettings {
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
            poll: PollSettings {
                interval: Duration::from_millis(self.poll_interval_ms),
                stale_after_ms: self.stale_after_ms,
            },
            layout,
        }
    }
}

/// `servers.json`: the candidate server addresses.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ServerList {
    #[serde(default)]
    pub servers: Vec<String>,
}

impl ServerList {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(&read(path)?)?)
    }

    /// Unreadable or malformed lists degrade to no candidates.
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("server list unavailable: {}", e);
            Self::default()
        })
    }
}

/// Client-side choices that survive restarts.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PersistedState {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub layout: Option<LayoutMode>,
}

impl PersistedState {
    /// `<config dir>/chandeck/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("chandeck").join("state.json"))
    }

    /// Missing file means nothing persisted yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&read(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body).map_err(io_err)
    }
}

/// Server precedence: explicit flag, then the persisted choice, then the
/// first candidate.
pub fn choose_server(
    flag: Option<&str>,
    persisted: &PersistedState,
    candidates: &ServerList,
) -> Option<String> {
    flag.map(str::to_string)
        .or_else(|| persisted.server.clone())
        .or_else(|| candidates.servers.first().cloned())
}
