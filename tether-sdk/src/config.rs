//! Connection configuration, supplied as an immutable snapshot at connect time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::message::is_channel;

/// Twitch chat gateway used when `twitch` is set.
pub const TWITCH_HOST: &str = "irc.chat.twitch.tv";
/// Standard secure port of the Twitch chat gateway.
pub const TWITCH_PORT: u16 = 443;
/// Capability requested from Twitch once the MOTD has finished.
pub const TWITCH_MEMBERSHIP_CAP: &str = "twitch.tv/membership";

pub const DEFAULT_HOST: &str = "irc.esper.net";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_QUIT_MESSAGE: &str = "Build. Fly. Dream.";

/// Everything the engine needs to reach and register with a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    /// Wrap the connection in TLS.
    pub secure: bool,
    /// Connect to the Twitch chat gateway instead of `host:port` (implies TLS).
    pub twitch: bool,
    /// Username for the USER command; the nickname is used when unset.
    pub user: Option<String>,
    /// Sent as PASS before registration when non-empty.
    pub server_password: Option<String>,
    pub nick: String,
    /// Space-separated auto-join list. Entries without a leading `#` are ignored.
    pub channels: String,
    /// Echo all protocol traffic into the `(Debug)` channel.
    pub debug: bool,
    pub quit_message: String,
    /// Bound on the TCP connect and the TLS handshake.
    pub connect_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secure: false,
            twitch: false,
            user: None,
            server_password: None,
            nick: String::new(),
            channels: String::new(),
            debug: false,
            quit_message: DEFAULT_QUIT_MESSAGE.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// Where the socket goes and whether it is wrapped in TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.twitch {
            if self.host.trim().is_empty() {
                return Err(ConfigError::MissingHost);
            }
            if self.port == 0 {
                return Err(ConfigError::InvalidPort(self.port));
            }
        }
        if self.nick.is_empty() {
            return Err(ConfigError::MissingNick);
        }
        if self.nick.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidNick(self.nick.clone()));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        if self.twitch {
            Endpoint {
                host: TWITCH_HOST.to_string(),
                port: TWITCH_PORT,
                tls: true,
            }
        } else {
            Endpoint {
                host: self.host.clone(),
                port: self.port,
                tls: self.secure,
            }
        }
    }

    /// Username for USER, falling back to the nickname.
    pub fn username(&self) -> &str {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => user,
            _ => &self.nick,
        }
    }

    pub fn password(&self) -> Option<&str> {
        self.server_password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn auto_join_channels(&self) -> impl Iterator<Item = &str> {
        self.channels.split(' ').filter(|c| is_channel(c))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}
