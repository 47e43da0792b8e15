//! The client a display layer talks to.
//!
//! [`Client`] ties the engine, dispatcher and registry together. The host
//! calls [`Client::tick`] periodically, feeds typed input through
//! [`Client::submit_input`], and drains [`Event`]s with
//! [`Client::poll_event`]. Life-cycle events are also turned into readable
//! lines in the `(Notice)` channel so a plain text UI needs nothing else.

use std::collections::VecDeque;

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::engine::{Clock, Engine, State, SystemClock};
use crate::error::ConfigError;
use crate::event::Event;
use crate::message::{Command, is_channel};
use crate::registry::{ChannelLine, DEBUG_CHANNEL, LineKind, NOTICE_CHANNEL, Registry, STATUS_CHANNEL};
use crate::transport::{Connector, TcpConnector};
use crate::user_command::UserCommand;

pub struct Client {
    engine: Engine,
    dispatcher: Dispatcher,
    events: VecDeque<Event>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client on real sockets and the system clock.
    pub fn new() -> Self {
        Self::with_parts(Box::new(TcpConnector::new()), Box::new(SystemClock))
    }

    pub fn with_parts(connector: Box<dyn Connector>, clock: Box<dyn Clock>) -> Self {
        Self {
            engine: Engine::new(connector, clock),
            dispatcher: Dispatcher::new(),
            events: VecDeque::new(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn state(&self) -> State {
        self.engine.state()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    /// Connect with a new configuration. An unusable configuration is
    /// reported in the `(Status)` channel and nothing is attempted.
    pub fn connect(&mut self, config: EngineConfig) -> Result<(), ConfigError> {
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "Client not configured, not connecting");
            self.post(
                STATUS_CHANNEL,
                format!("IRC client not configured, not connecting to IRC server: {e}."),
            );
            self.post(STATUS_CHANNEL, "Edit config and confirm updates to connect.".to_string());
            return Err(e);
        }

        self.dispatcher.registry_mut().set_nick(&config.nick);
        self.engine.connect(config);
        self.pump();
        Ok(())
    }

    /// Retry without resetting the attempt budget.
    pub fn reconnect(&mut self) {
        self.engine.reconnect();
        self.pump();
    }

    pub fn disconnect(&mut self) {
        self.engine.disconnect();
        self.pump();
    }

    pub fn tick(&mut self) {
        self.engine.tick(&mut self.dispatcher);
        self.pump();
    }

    /// Handle one line typed by the user.
    pub fn submit_input(&mut self, input: &str) {
        let current = self.registry().current().map(str::to_string);
        match UserCommand::from_input(input, current.as_deref()) {
            Some(cmd) => self.handle_user_command(cmd),
            None => tracing::debug!(input = %input, "Ignoring input"),
        }
    }

    pub fn handle_user_command(&mut self, cmd: UserCommand) {
        self.dispatcher.handle_user(&mut self.engine, cmd);
        self.pump();
    }

    /// Close a channel; real channels are parted on the server too.
    pub fn close_channel(&mut self, handle: &str) -> bool {
        if self.dispatcher.registry_mut().close(handle).is_none() {
            return false;
        }
        if is_channel(handle) {
            self.engine.send(Command::new("PART", vec![handle]));
            self.pump();
        }
        true
    }

    pub fn focus(&mut self, handle: &str) -> bool {
        self.dispatcher.registry_mut().focus(handle)
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    fn post(&mut self, handle: &str, text: String) {
        let line = ChannelLine::new("*", text, LineKind::Notice);
        self.dispatcher.registry_mut().post(handle, line.clone());
        self.events.push_back(Event::Line {
            handle: handle.to_string(),
            line,
        });
    }

    fn echo_sent(&mut self, cmd: &Command) {
        let line = ChannelLine::new("CLIENT", cmd.to_string(), LineKind::Notice);
        self.dispatcher.registry_mut().post(DEBUG_CHANNEL, line.clone());
        self.events.push_back(Event::Line {
            handle: DEBUG_CHANNEL.to_string(),
            line,
        });
    }

    /// Move engine events to the client queue, adding the readable notice
    /// for each life-cycle event right after it.
    fn pump(&mut self) {
        while let Some(event) = self.engine.poll_event() {
            let echo = match event {
                Event::CommandSent(ref cmd) if self.engine.config().debug => Some(cmd.clone()),
                _ => None,
            };
            let notice = notice_text(&event);

            self.events.push_back(event);
            if let Some(cmd) = echo {
                self.echo_sent(&cmd);
            }
            if let Some(text) = notice {
                self.post(NOTICE_CHANNEL, text);
            }
        }
    }
}

fn notice_text(event: &Event) -> Option<String> {
    let text = match event {
        Event::Connecting { endpoint } => return Some(format!("Connecting to server {endpoint}...")),
        Event::Connected => "Server connection established.",
        Event::SslConnected => "SSL Server connection established.",
        Event::Disconnected => "Disconnected from server.",
        Event::ConnectionFailed { .. } => "Connection failed to server.",
        Event::ConnectionAttemptsExceeded => "Connection attempts exceeded. Change config before retrying.",
        Event::SslCertificateError { .. } => "SSL Certificate error - use this server at your own risk.",
        Event::CommandReceived(_) | Event::CommandSent(_) | Event::Line { .. } => return None,
    };
    Some(text.to_string())
}
