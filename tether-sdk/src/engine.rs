//! Connection life-cycle: connect, register, read, keepalive, auto-join and
//! bounded reconnection.
//!
//! The engine is driven entirely by [`Engine::tick`]. Nothing here spawns a
//! thread or waits for network data: a tick drains what the socket already
//! holds, dispatches every complete line, then runs the timers. Connect and
//! the TLS handshake are the only calls that may block, bounded by the
//! configured connect timeout.
//!
//! Observers do not get callbacks. Everything that happens is appended to an
//! ordered [`Event`] queue which the owner drains between ticks.

use std::collections::VecDeque;
use std::io;

use crate::codec::LineBuffer;
use crate::config::EngineConfig;
use crate::event::Event;
use crate::message::{Command, decode, encode};
use crate::transport::{Connector, TlsStatus, Transport};

/// Attempts allowed between two explicit `connect()` calls.
pub const MAX_CONNECT_ATTEMPTS: u32 = 5;
/// Keepalive PING period.
pub const PING_INTERVAL_MS: i64 = 30_000;
/// Time after connecting before auto-join fires.
pub const AUTO_JOIN_DELAY_MS: i64 = 5_000;
/// Minimum spacing between two auto-join rounds.
pub const AUTO_JOIN_INTERVAL_MS: i64 = 30_000;

const READ_CHUNK: usize = 10240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

/// Source of wall-clock milliseconds.
pub trait Clock: Send {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Receives every decoded server line, one at a time, with full access to
/// the engine so it can answer.
pub trait CommandHandler {
    fn handle(&mut self, engine: &mut Engine, cmd: Command);
}

pub struct Engine {
    connector: Box<dyn Connector>,
    clock: Box<dyn Clock>,
    config: EngineConfig,
    state: State,
    transport: Option<Box<dyn Transport>>,
    buffer: LineBuffer,
    attempts: u32,
    auto_reconnect: bool,
    reconnecting: bool,
    /// Bumped on every successful connect; lets the read loop notice that a
    /// handler replaced the connection underneath it.
    session: u64,
    connect_time: i64,
    last_ping: i64,
    last_auto_join: Option<i64>,
    auto_join_pending: bool,
    events: VecDeque<Event>,
}

impl Engine {
    pub fn new(connector: Box<dyn Connector>, clock: Box<dyn Clock>) -> Self {
        Self {
            connector,
            clock,
            config: EngineConfig::default(),
            state: State::Disconnected,
            transport: None,
            buffer: LineBuffer::new(),
            attempts: 0,
            auto_reconnect: true,
            reconnecting: false,
            session: 0,
            connect_time: 0,
            last_ping: 0,
            last_auto_join: None,
            auto_join_pending: false,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Attempts made since the last explicit `connect()`.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Start over with a new configuration and a fresh attempt budget.
    pub fn connect(&mut self, config: EngineConfig) {
        self.config = config;
        self.attempts = 0;
        self.auto_reconnect = true;
        self.attempt();
    }

    /// Drop the current connection and try again, keeping the attempt count.
    ///
    /// Does nothing after an explicit `disconnect()`, or when called from
    /// inside a reconnect that is already running.
    pub fn reconnect(&mut self) {
        if self.reconnecting || !self.auto_reconnect {
            return;
        }
        self.reconnecting = true;
        self.attempt();
        self.reconnecting = false;
    }

    /// Close the connection and stay down until the next `connect()`.
    pub fn disconnect(&mut self) {
        self.auto_reconnect = false;
        self.shutdown();
    }

    fn attempt(&mut self) {
        self.shutdown();

        let endpoint = self.config.endpoint();
        self.emit(Event::Connecting {
            endpoint: endpoint.to_string(),
        });
        self.auto_join_pending = true;

        self.attempts += 1;
        if self.attempts > MAX_CONNECT_ATTEMPTS {
            tracing::warn!(
                %endpoint,
                attempts = self.attempts - 1,
                "Too many failed attempts to connect"
            );
            self.emit(Event::ConnectionAttemptsExceeded);
            return;
        }

        tracing::info!(%endpoint, attempt = self.attempts, "Connecting");
        self.state = State::Connecting;
        let connection = match self
            .connector
            .open(&endpoint, self.config.connect_timeout())
        {
            Ok(connection) => connection,
            Err(e) => {
                self.state = State::Disconnected;
                self.fail(e.to_string());
                return;
            }
        };

        self.transport = Some(connection.transport);
        match connection.tls {
            Some(TlsStatus::Verified) => self.emit(Event::SslConnected),
            Some(TlsStatus::CertificateRejected(reason)) => {
                self.emit(Event::SslCertificateError { reason });
                self.emit(Event::SslConnected);
            }
            None => {}
        }

        self.state = State::Authenticating;
        if let Err(e) = self.register() {
            if let Some(mut transport) = self.transport.take() {
                transport.close();
            }
            self.state = State::Disconnected;
            self.fail(e.to_string());
            return;
        }

        let now = self.clock.now_millis();
        self.connect_time = now;
        self.last_ping = now;
        self.session += 1;
        self.state = State::Connected;
        tracing::info!(%endpoint, "Connected");
        self.emit(Event::Connected);
    }

    fn register(&mut self) -> io::Result<()> {
        let nick = self.config.nick.clone();
        if let Some(password) = self.config.password().map(str::to_string) {
            self.write(Command::new("PASS", vec![password.as_str()]))?;
        }
        self.write(Command::new("NICK", vec![nick.as_str()]))?;
        let username = self.config.username().to_string();
        self.write(Command::new("USER", vec![username.as_str(), "8", "*", nick.as_str()]))
    }

    /// Tear the connection down without touching the reconnect policy.
    fn shutdown(&mut self) {
        let was_connected = self.state == State::Connected;

        if self.transport.is_some() {
            let quit = Command::new("QUIT", vec![self.config.quit_message.as_str()]);
            if let Err(e) = self.write(quit) {
                tracing::debug!(error = %e, "QUIT not delivered");
            }
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }

        self.buffer.clear();
        self.state = State::Disconnected;
        if was_connected {
            tracing::info!("Disconnected");
            self.emit(Event::Disconnected);
        }
    }

    fn fail(&mut self, reason: String) {
        tracing::warn!(%reason, "Connection failed");
        self.emit(Event::ConnectionFailed { reason });
        if self.reconnecting || !self.auto_reconnect {
            self.shutdown();
            return;
        }
        self.reconnect();
    }

    /// Emit `CommandSent`, then write the encoded line. Errors are returned,
    /// not handled.
    fn write(&mut self, cmd: Command) -> io::Result<()> {
        let line = encode(&cmd);
        if !is_single_line(&line) {
            tracing::warn!(command = %cmd.command, "Dropping command with an embedded line break");
            return Ok(());
        }
        self.emit(Event::CommandSent(cmd));
        self.write_line(&line)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no open connection"))?;
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        transport.send(&data)
    }

    /// Send a command. A write failure is handled like any other connection
    /// failure.
    pub fn send(&mut self, cmd: Command) {
        if self.transport.is_none() {
            tracing::warn!(command = %cmd.command, "Not connected, dropping command");
            return;
        }
        if let Err(e) = self.write(cmd) {
            self.fail(e.to_string());
        }
    }

    /// Send a pre-formatted line, e.g. a user's pass-through command.
    pub fn send_raw(&mut self, line: &str) {
        if self.transport.is_none() {
            tracing::warn!(line = %line, "Not connected, dropping line");
            return;
        }
        if !is_single_line(line) {
            tracing::warn!(line = ?line, "Dropping line with an embedded line break");
            return;
        }
        match decode(line) {
            Ok(cmd) => self.emit(Event::CommandSent(cmd)),
            Err(e) => tracing::debug!(line = %line, error = %e, "Sending line that does not decode"),
        }
        if let Err(e) = self.write_line(line) {
            self.fail(e.to_string());
        }
    }

    /// Drive the connection: read and dispatch, then keepalive and auto-join.
    pub fn tick<H: CommandHandler + ?Sized>(&mut self, handler: &mut H) {
        if self.state != State::Connected {
            return;
        }
        let session = self.session;

        self.read_available(handler);
        if self.state != State::Connected || self.session != session {
            return;
        }

        let now = self.clock.now_millis();
        if now - self.last_ping > PING_INTERVAL_MS {
            self.last_ping = now;
            self.send_raw(&format!("PING :{now}"));
            if self.state != State::Connected {
                return;
            }
        }

        if self.auto_join_pending
            && now - self.connect_time >= AUTO_JOIN_DELAY_MS
            && self
                .last_auto_join
                .is_none_or(|last| now - last >= AUTO_JOIN_INTERVAL_MS)
        {
            self.auto_join(now);
        }
    }

    fn read_available<H: CommandHandler + ?Sized>(&mut self, handler: &mut H) {
        let session = self.session;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let Some(transport) = self.transport.as_mut() else {
                return;
            };
            match transport.read_available(&mut chunk) {
                Ok(None) => break,
                Ok(Some(0)) => {
                    self.fail("connection closed by server".to_string());
                    return;
                }
                Ok(Some(n)) => self.buffer.extend(&chunk[..n]),
                Err(e) => {
                    self.fail(e.to_string());
                    return;
                }
            }
        }

        while let Some(line) = self.buffer.next_line() {
            match decode(&line) {
                Ok(cmd) => {
                    self.emit(Event::CommandReceived(cmd.clone()));
                    handler.handle(self, cmd);
                }
                Err(e) => tracing::warn!(line = %line, error = %e, "Dropping malformed line"),
            }
            if self.state != State::Connected || self.session != session {
                return;
            }
        }
    }

    fn auto_join(&mut self, now: i64) {
        let channels: Vec<String> = self
            .config
            .auto_join_channels()
            .map(str::to_string)
            .collect();
        tracing::debug!(count = channels.len(), "Auto-joining channels");
        self.last_auto_join = Some(now);
        self.auto_join_pending = false;
        for channel in channels {
            self.send_raw(&format!("JOIN {channel}"));
            if self.state != State::Connected {
                return;
            }
        }
    }
}

/// A CR or LF inside a line would end it early on the wire.
fn is_single_line(line: &str) -> bool {
    !line.contains(['\r', '\n'])
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}
