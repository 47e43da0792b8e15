//! Events emitted by the client for the display layer to consume.

use serde::Serialize;

use crate::message::Command;
use crate::registry::ChannelLine;

/// Events that the engine emits to the consumer (terminal, GUI, bot, ...).
///
/// They are queued in order and drained once per tick, so a consumer never
/// observes them re-entrantly while a line is being dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// A socket attempt is about to start.
    Connecting {
        endpoint: String,
    },

    /// Socket (and TLS) are up and registration has been sent.
    Connected,

    /// A connection that had reached `Connected` was torn down.
    Disconnected,

    /// Socket, TLS, read or write failure. A reconnect follows when allowed.
    ConnectionFailed {
        reason: String,
    },

    /// The retry ceiling was hit; nothing more happens until `connect()`.
    ConnectionAttemptsExceeded,

    /// TLS handshake finished.
    SslConnected,

    /// The server certificate did not validate. The connection proceeds anyway.
    SslCertificateError {
        reason: String,
    },

    /// A line from the server, decoded.
    CommandReceived(Command),

    /// A line about to be written to the server.
    CommandSent(Command),

    /// A human-readable line was posted to a channel's backlog.
    Line {
        handle: String,
        line: ChannelLine,
    },
}
