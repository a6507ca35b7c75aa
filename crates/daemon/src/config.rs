// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration loaded from `kiln.toml`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kiln_core::Capability;
use kiln_engine::{EchoProvider, EngineConfig, Provider, DEFAULT_ORDER};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "KILN_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not determine state directory")]
    NoStateDir,

    #[error("provider name '{0}' is used twice")]
    DuplicateProvider(String),

    #[error("provider '{0}' serves no capability")]
    NoCapabilities(String),
}

/// Built-in provider implementations selectable from config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Echo,
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default = "default_order")]
    pub order: i32,
    pub capabilities: Vec<Capability>,
}

fn default_order() -> i32 {
    DEFAULT_ORDER
}

impl ProviderSpec {
    fn echo(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ProviderKind::Echo,
            order: DEFAULT_ORDER,
            capabilities: Capability::ALL.to_vec(),
        }
    }

    pub fn instantiate(&self) -> Arc<dyn Provider> {
        match self.kind {
            ProviderKind::Echo => {
                Arc::new(EchoProvider::new(&self.name, &self.capabilities).with_order(self.order))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EngineSection {
    #[serde(with = "humantime_serde")]
    step_timeout: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    state_dir: Option<PathBuf>,
    socket_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    engine: EngineSection,
    providers: Vec<ProviderSpec>,
}

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub engine: EngineConfig,
    pub providers: Vec<ProviderSpec>,
}

impl Config {
    /// Load from `path`, else `$KILN_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml(&text)
            }
            None => Self::from_toml(""),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        Self::resolve(file)
    }

    fn resolve(file: ConfigFile) -> Result<Self, ConfigError> {
        let state_dir = match file.state_dir {
            Some(dir) => dir,
            None => default_state_dir()?,
        };
        let socket_path = file
            .socket_path
            .unwrap_or_else(|| socket_dir().join("kilnd.sock"));
        let log_path = file
            .log_path
            .unwrap_or_else(|| state_dir.join("daemon.log"));

        let providers = if file.providers.is_empty() {
            vec![ProviderSpec::echo("echo")]
        } else {
            file.providers
        };
        let mut names = HashSet::new();
        for spec in &providers {
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(spec.name.clone()));
            }
            if spec.capabilities.is_empty() {
                return Err(ConfigError::NoCapabilities(spec.name.clone()));
            }
        }

        Ok(Self {
            lock_path: state_dir.join("daemon.pid"),
            version_path: state_dir.join("daemon.version"),
            state_dir,
            socket_path,
            log_path,
            engine: EngineConfig {
                step_timeout: file.engine.step_timeout,
            },
            providers,
        })
    }

    /// Instantiate every configured provider, in declaration order
    pub fn build_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.iter().map(ProviderSpec::instantiate).collect()
    }
}

/// `$XDG_STATE_HOME/kiln`, else `~/.local/state/kiln`
fn default_state_dir() -> Result<PathBuf, ConfigError> {
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("kiln"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoStateDir)?;
    Ok(home.join(".local/state/kiln"))
}

/// Uses /tmp/kiln by default to keep socket paths short.
/// Can be overridden with KILN_SOCKET_DIR for testing.
fn socket_dir() -> PathBuf {
    match std::env::var_os("KILN_SOCKET_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from("/tmp/kiln"),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
