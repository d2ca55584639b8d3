//! Everything a subcommand needs before it talks to a server: the loaded
//! config, the candidate server list, the persisted client state and the
//! backend factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use chandeck_core::api::BackendFactory;
use chandeck_core::board::LayoutMode;
use chandeck_core::config::{ConfigError, DashConfig, PersistedState, ServerList, choose_server};
use chandeck_core::fake::{FakeControlPlane, FakeFactory};

use crate::backends::HttpFactory;

pub const DEMO_SERVER: &str = "demo";

pub struct AppContext {
    pub config: DashConfig,
    pub config_path: Option<PathBuf>,
    pub servers: ServerList,
    pub state: PersistedState,
    pub state_path: Option<PathBuf>,
    server_flag: Option<String>,
    demo: Option<FakeControlPlane>,
}

impl AppContext {
    pub fn load(
        config_path: Option<&Path>,
        server_flag: Option<String>,
        demo: bool,
    ) -> Result<Self, ConfigError> {
        let (config_path, config) = match config_path {
            Some(path) => (Some(path.to_path_buf()), DashConfig::load(path)?),
            None => {
                let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                    path: PathBuf::from("."),
                    source,
                })?;
                DashConfig::discover_or_default(&cwd)?
            }
        };

        let servers = if demo {
            ServerList {
                servers: vec![DEMO_SERVER.to_string()],
            }
        } else {
            ServerList::load_or_empty(&config.servers_file)
        };

        // Demo sessions never touch the operator's real persisted choice.
        let state_path = if demo {
            None
        } else {
            PersistedState::default_path()
        };
        let state = match &state_path {
            Some(path) => PersistedState::load(path).unwrap_or_else(|e| {
                warn!("ignoring persisted state: {}", e);
                PersistedState::default()
            }),
            None => PersistedState::default(),
        };

        Ok(Self {
            config,
            config_path,
            servers,
            state,
            state_path,
            server_flag,
            demo: demo.then(FakeControlPlane::demo),
        })
    }

    pub fn is_demo(&self) -> bool {
        self.demo.is_some()
    }

    pub fn factory(&self) -> Arc<dyn BackendFactory> {
        match &self.demo {
            Some(fake) => Arc::new(FakeFactory::new(fake.clone())),
            None => Arc::new(HttpFactory {
                ports: self.config.ports,
                timeout: self.config.request_timeout(),
            }),
        }
    }

    /// `--server`, then the persisted choice, then the first candidate.
    pub fn initial_server(&self) -> Option<String> {
        if self.is_demo() {
            return Some(DEMO_SERVER.to_string());
        }
        choose_server(self.server_flag.as_deref(), &self.state, &self.servers)
    }

    pub fn initial_layout(&self) -> LayoutMode {
        self.state.layout.unwrap_or(self.config.layout)
    }

    /// Record the operator's choices. Failures are logged, not fatal.
    pub fn persist(&mut self, server: Option<&str>, layout: LayoutMode) {
        if let Some(server) = server {
            self.state.server = Some(server.to_string());
        }
        self.state.layout = Some(layout);
        let Some(path) = &self.state_path else {
            return;
        };
        if let Err(e) = self.state.save(path) {
            warn!("could not persist state: {}", e);
        }
    }

    /// The server after `current` in the candidate list, wrapping around.
    pub fn next_server(&self, current: Option<&str>) -> Option<String> {
        next_candidate(&self.servers.servers, current)
    }
}

fn next_candidate(candidates: &[String], current: Option<&str>) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    let next = current
        .and_then(|c| candidates.iter().position(|s| s == c))
        .map(|i| (i + 1) % candidates.len())
        .unwrap_or(0);
    candidates.get(next).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_next_candidate_wraps() {
        let servers = list(&["a", "b", "c"]);
        assert_eq!(next_candidate(&servers, Some("a")).as_deref(), Some("b"));
        assert_eq!(next_candidate(&servers, Some("c")).as_deref(), Some("a"));
        // unknown current server starts from the top
        assert_eq!(next_candidate(&servers, Some("zzz")).as_deref(), Some("a"));
        assert_eq!(next_candidate(&servers, None).as_deref(), Some("a"));
        assert_eq!(next_candidate(&[], Some("a")), None);
    }

    #[test]
    fn test_demo_context_is_self_contained() {
        let ctx = AppContext::load(None, Some("10.0.0.9".into()), true).unwrap();
        assert!(ctx.is_demo());
        assert_eq!(ctx.initial_server().as_deref(), Some(DEMO_SERVER));
        assert!(ctx.state_path.is_none());
        assert_eq!(ctx.servers.servers, vec![DEMO_SERVER.to_string()]);
    }
}
