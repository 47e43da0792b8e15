//! Configuration file for the terminal client.
//!
//! Lives at `~/.config/tether/tether.toml` unless `--config` points
//! elsewhere. Every key is optional; command-line flags win over the file,
//! and the file wins over the engine defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tether_sdk::EngineConfig;

/// Values read from tether.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Use TLS.
    pub secure: Option<bool>,
    /// Connect to Twitch chat instead of `host`.
    pub twitch: Option<bool>,
    pub nick: Option<String>,
    /// Username for USER; defaults to the nickname.
    pub user: Option<String>,
    pub server_password: Option<String>,
    /// Channels to join after connecting.
    pub channels: Option<Vec<String>>,
    /// Echo raw protocol traffic into the (Debug) channel.
    pub debug: Option<bool>,
    pub quit_message: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
        .join("tether.toml")
}

impl Config {
    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (default_path(), false),
        };
        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("can't read {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("bad config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

/// Merge: CLI overrides > config file > defaults.
pub fn resolve(cli: &super::Cli, file: &Config) -> EngineConfig {
    let defaults = EngineConfig::default();

    let channels = match (&cli.channels, &file.channels) {
        (Some(list), _) => list
            .split([',', ' '])
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        (None, Some(list)) => list.join(" "),
        (None, None) => defaults.channels,
    };

    EngineConfig {
        host: cli.host.clone().or_else(|| file.host.clone()).unwrap_or(defaults.host),
        port: cli.port.or(file.port).unwrap_or(defaults.port),
        secure: cli.tls || file.secure.unwrap_or(defaults.secure),
        twitch: cli.twitch || file.twitch.unwrap_or(defaults.twitch),
        user: cli.user.clone().or_else(|| file.user.clone()),
        server_password: cli.password.clone().or_else(|| file.server_password.clone()),
        nick: cli.nick.clone().or_else(|| file.nick.clone()).unwrap_or(defaults.nick),
        channels,
        debug: cli.debug || file.debug.unwrap_or(defaults.debug),
        quit_message: file.quit_message.clone().unwrap_or(defaults.quit_message),
        connect_timeout_secs: file
            .connect_timeout_secs
            .unwrap_or(defaults.connect_timeout_secs),
    }
}
