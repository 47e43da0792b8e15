//! Error taxonomy for the client engine.
//!
//! Nothing here is fatal to the host: a [`ParseError`] drops one line, a
//! [`ConnectError`] becomes a `ConnectionFailed` event followed by a
//! reconnect, and a [`ConfigError`] keeps the engine from connecting at all.

use std::io;

/// A protocol line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line has a prefix but no command: {0:?}")]
    MissingCommand(String),
    #[error("unrecognized command word {0:?}")]
    InvalidCommand(String),
}

/// Failure while establishing the socket or the TLS session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),
    #[error("could not build certificate verifier: {0}")]
    Verifier(String),
}

/// A configuration snapshot that cannot be used to connect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no server host configured")]
    MissingHost,
    #[error("port {0} is not usable")]
    InvalidPort(u16),
    #[error("no nickname configured")]
    MissingNick,
    #[error("nickname {0:?} contains whitespace")]
    InvalidNick(String),
}
