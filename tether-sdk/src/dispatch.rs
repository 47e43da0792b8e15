//! Routing for both directions: server lines into registry updates and
//! channel notifications, typed user commands into protocol commands.

use crate::config::TWITCH_MEMBERSHIP_CAP;
use crate::engine::{CommandHandler, Engine};
use crate::event::Event;
use crate::message::{Command, is_channel};
use crate::registry::{
    ChannelLine, DEBUG_CHANNEL, LineKind, ModeChange, NOTICE_CHANNEL, Registry, is_pseudo,
};
use crate::user_command::UserCommand;

/// Reply to CTCP VERSION queries.
pub const CLIENT_VERSION: &str = concat!("tether ", env!("CARGO_PKG_VERSION"));

/// Server verbs with a handler. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerVerb {
    Join,
    Kick,
    Mode,
    Nick,
    Notice,
    Part,
    Ping,
    Pong,
    Privmsg,
    Quit,
    Topic,
    /// 332 RPL_TOPIC
    TopicReply,
    /// 353 RPL_NAMREPLY
    NamesReply,
    /// 366 RPL_ENDOFNAMES
    EndOfNames,
    /// 376 RPL_ENDOFMOTD
    EndOfMotd,
}

impl ServerVerb {
    pub fn parse(command: &str) -> Option<Self> {
        Some(match command {
            "JOIN" => Self::Join,
            "KICK" => Self::Kick,
            "MODE" => Self::Mode,
            "NICK" => Self::Nick,
            "NOTICE" => Self::Notice,
            "PART" => Self::Part,
            "PING" => Self::Ping,
            "PONG" => Self::Pong,
            "PRIVMSG" => Self::Privmsg,
            "QUIT" => Self::Quit,
            "TOPIC" => Self::Topic,
            "332" => Self::TopicReply,
            "353" => Self::NamesReply,
            "366" => Self::EndOfNames,
            "376" => Self::EndOfMotd,
            _ => return None,
        })
    }
}

/// Slash commands with local handling. Anything else is sent verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserVerb {
    Deop,
    Devoice,
    /// Short for JOIN.
    J,
    Kick,
    Me,
    Msg,
    Op,
    Topic,
    Voice,
}

impl UserVerb {
    pub fn parse(command: &str) -> Option<Self> {
        Some(match command {
            "DEOP" => Self::Deop,
            "DEVOICE" => Self::Devoice,
            "J" => Self::J,
            "KICK" => Self::Kick,
            "ME" => Self::Me,
            "MSG" => Self::Msg,
            "OP" => Self::Op,
            "TOPIC" => Self::Topic,
            "VOICE" => Self::Voice,
            _ => return None,
        })
    }
}

/// Owns the channel registry and mutates it in response to traffic.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Registry,
    version: String,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            version: CLIENT_VERSION.to_string(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Append a line to a channel and tell the display about it.
    pub fn post(&mut self, engine: &mut Engine, handle: &str, sender: &str, text: String, kind: LineKind) {
        let line = ChannelLine::new(sender, text, kind);
        self.registry.post(handle, line.clone());
        engine.emit(Event::Line {
            handle: handle.to_string(),
            line,
        });
    }

    fn own_nick(&self) -> String {
        self.registry.nick().to_string()
    }

    // ── server → client ──

    fn on_server(&mut self, engine: &mut Engine, verb: ServerVerb, cmd: &Command) -> Option<()> {
        match verb {
            ServerVerb::Join => self.on_join(engine, cmd),
            ServerVerb::Kick => self.on_kick(engine, cmd),
            ServerVerb::Mode => self.on_mode(engine, cmd),
            ServerVerb::Nick => self.on_nick(engine, cmd),
            ServerVerb::Notice => self.on_notice(engine, cmd),
            ServerVerb::Part => self.on_part(engine, cmd),
            ServerVerb::Ping => {
                engine.send(Command::new("PONG", vec![cmd.param(0)?]));
                Some(())
            }
            ServerVerb::Pong => Some(()),
            ServerVerb::Privmsg => self.on_privmsg(engine, cmd),
            ServerVerb::Quit => self.on_quit(engine, cmd),
            ServerVerb::Topic => self.on_topic(engine, cmd),
            ServerVerb::TopicReply => {
                let handle = cmd.param_from_end(2)?;
                let topic = cmd.last_param()?;
                self.registry.set_topic(handle, Some(topic.to_string()));
                self.post(engine, handle, "*", format!("Channel topic is: {topic}"), LineKind::Notice);
                Some(())
            }
            ServerVerb::NamesReply => {
                let handle = cmd.param_from_end(2)?;
                self.registry.add_names(handle, cmd.last_param()?);
                Some(())
            }
            ServerVerb::EndOfNames => {
                self.registry.end_of_names(cmd.param_from_end(2)?);
                Some(())
            }
            ServerVerb::EndOfMotd => {
                if engine.config().twitch {
                    engine.send(Command::new("CAP", vec!["REQ", TWITCH_MEMBERSHIP_CAP]));
                }
                Some(())
            }
        }
    }

    fn on_join(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let channel = cmd.param(0)?;
        let nick = cmd.short_prefix()?;
        self.post(engine, channel, "*", format!("{nick} has joined {channel}"), LineKind::Membership);
        self.registry.add_single_name(channel, nick);
        Some(())
    }

    fn on_kick(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let channel = cmd.param(0)?;
        let target = cmd.param(1)?;
        let by = cmd.short_prefix().unwrap_or_default();
        let mut text = format!("{by} kicked {target} from {channel}");
        if let Some(reason) = cmd.param(2) {
            text.push_str(&format!(" ({reason})"));
        }
        self.post(engine, channel, "*", text, LineKind::Notice);
        self.registry.remove_name(channel, target);
        Some(())
    }

    fn on_part(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let channel = cmd.param(0)?;
        let nick = cmd.short_prefix()?;
        if nick == self.registry.nick() {
            return Some(());
        }
        let mut text = format!("{nick} has left {channel}");
        if let Some(reason) = cmd.param(1) {
            text.push_str(&format!(" ({reason})"));
        }
        self.post(engine, channel, "*", text, LineKind::Membership);
        self.registry.remove_name(channel, nick);
        Some(())
    }

    fn on_quit(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let nick = cmd.short_prefix()?;
        let mut text = format!("{nick} has quit");
        if let Some(reason) = cmd.param(0) {
            text.push_str(&format!(" ({reason})"));
        }
        for handle in self.registry.channels_containing(nick) {
            self.post(engine, &handle, "*", text.clone(), LineKind::Membership);
            self.registry.remove_name(&handle, nick);
        }
        Some(())
    }

    fn on_nick(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let old = cmd.short_prefix()?;
        let new = cmd.last_param()?;
        if old == self.registry.nick() {
            self.registry.set_nick(new);
        }
        for handle in self.registry.channels_containing(old) {
            self.registry.rename(&handle, old, new);
            self.post(engine, &handle, "*", format!("{old} is now known as {new}"), LineKind::Notice);
        }
        Some(())
    }

    fn on_mode(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let channel = cmd.param(0)?;
        if !is_channel(channel) {
            return Some(());
        }
        let Some(mode) = cmd.param(1).and_then(ModeChange::parse) else {
            return Some(());
        };
        let name = cmd.param(2)?;
        self.registry.change_mode(channel, name, mode);
        let by = cmd.short_prefix().unwrap_or_default();
        let text = format!("{by} sets mode {} on {name}", mode.as_str());
        self.post(engine, channel, "*", text, LineKind::Notice);
        Some(())
    }

    fn on_topic(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let channel = cmd.param(0)?;
        let topic = if cmd.params.len() > 1 { cmd.last_param() } else { None };
        self.registry.set_topic(channel, topic.map(str::to_string));
        let by = cmd.short_prefix().unwrap_or_default();
        let text = format!("{by} sets channel topic to: {}", topic.unwrap_or_default());
        self.post(engine, channel, "*", text, LineKind::Notice);
        Some(())
    }

    fn on_notice(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let sender = cmd.short_prefix().unwrap_or("SERVER").to_string();
        let text = match cmd.ctcp {
            Some(ref ctcp) => ctcp.to_string().trim_matches('\x01').to_string(),
            None => cmd.last_param()?.to_string(),
        };
        self.post(engine, NOTICE_CHANNEL, &sender, text, LineKind::Notice);
        Some(())
    }

    fn on_privmsg(&mut self, engine: &mut Engine, cmd: &Command) -> Option<()> {
        let target = cmd.param(0)?;
        let sender = cmd.short_prefix().unwrap_or_default();
        let handle = if is_channel(target) { target } else { cmd.short_prefix()? };

        let Some(ref ctcp) = cmd.ctcp else {
            let text = cmd.last_param()?.to_string();
            self.post(engine, handle, sender, text, LineKind::Message);
            return Some(());
        };

        if ctcp.is("ACTION") {
            let text = format!("{sender} {}", ctcp.params.as_deref().unwrap_or_default());
            self.post(engine, handle, "*", text, LineKind::Action);
        } else if ctcp.is("VERSION") && !is_channel(handle) {
            match ctcp.params {
                None => {
                    self.post(engine, handle, "*", "VERSION".to_string(), LineKind::Notice);
                    let version = self.version.clone();
                    engine.send(Command::ctcp("NOTICE", handle, "VERSION", Some(&version)));
                }
                Some(ref client) => {
                    let text = format!("{handle} uses client: {client}");
                    self.post(engine, handle, "*", text, LineKind::Notice);
                }
            }
        } else {
            tracing::debug!(ctcp = %ctcp.command, from = sender, "Ignoring CTCP");
        }
        Some(())
    }

    // ── client → server ──

    /// Route a typed command. Unknown verbs go to the server as-is.
    pub fn handle_user(&mut self, engine: &mut Engine, cmd: UserCommand) {
        let Some(verb) = UserVerb::parse(&cmd.command) else {
            engine.send_raw(&cmd.to_raw_line());
            return;
        };

        let params = cmd.params.trim();
        match verb {
            UserVerb::J => self.handle_user(engine, UserCommand::new("JOIN", params)),
            UserVerb::Me => self.user_me(engine, params),
            UserVerb::Msg => self.user_msg(engine, params),
            UserVerb::Topic => {
                if let Some(channel) = self.current_channel(params) {
                    engine.send(Command::new("TOPIC", vec![channel.as_str(), params]));
                }
            }
            UserVerb::Op => self.user_mode(engine, params, ModeChange::Op),
            UserVerb::Deop => self.user_mode(engine, params, ModeChange::Deop),
            UserVerb::Voice => self.user_mode(engine, params, ModeChange::Voice),
            UserVerb::Devoice => self.user_mode(engine, params, ModeChange::Devoice),
            UserVerb::Kick => self.user_kick(engine, params),
        }
    }

    /// The focused channel, when it is a real channel and `params` is not
    /// empty.
    fn current_channel(&self, params: &str) -> Option<String> {
        let current = self.registry.current()?;
        if params.is_empty() || !is_channel(current) {
            tracing::debug!(current, "Command needs a focused channel and an argument");
            return None;
        }
        Some(current.to_string())
    }

    fn user_me(&mut self, engine: &mut Engine, params: &str) {
        let Some(handle) = self.registry.current().map(str::to_string) else {
            return;
        };
        if params.is_empty() {
            return;
        }
        if is_pseudo(&handle) {
            tracing::warn!(%handle, "Not sending an action to a local channel");
            return;
        }
        engine.send(Command::ctcp("PRIVMSG", &handle, "ACTION", Some(params)));
        let text = format!("{} {params}", self.own_nick());
        self.post(engine, &handle, "*", text, LineKind::Action);
    }

    fn user_msg(&mut self, engine: &mut Engine, params: &str) {
        let Some((target, text)) = params.split_once(' ') else {
            return;
        };
        let text = text.trim_start();
        if text.is_empty() {
            return;
        }
        if is_pseudo(target) {
            tracing::warn!(%target, "Not sending a message to a local channel");
            return;
        }
        engine.send(Command::new("PRIVMSG", vec![target, text]));
        let nick = self.own_nick();
        self.post(engine, target, &nick, text.to_string(), LineKind::Message);
    }

    fn user_mode(&mut self, engine: &mut Engine, params: &str, mode: ModeChange) {
        if let Some(channel) = self.current_channel(params) {
            engine.send(Command::new("MODE", vec![channel.as_str(), mode.as_str(), params]));
        }
    }

    fn user_kick(&mut self, engine: &mut Engine, params: &str) {
        let Some(channel) = self.current_channel(params) else {
            return;
        };
        match params.split_once(' ') {
            Some((nick, reason)) if !reason.trim().is_empty() => {
                engine.send(Command::new("KICK", vec![channel.as_str(), nick, reason.trim()]));
            }
            _ => {
                let nick = params.split(' ').next().unwrap_or(params);
                engine.send(Command::new("KICK", vec![channel.as_str(), nick]));
            }
        }
    }
}

impl CommandHandler for Dispatcher {
    fn handle(&mut self, engine: &mut Engine, cmd: Command) {
        let verb = ServerVerb::parse(&cmd.command);

        if engine.config().debug {
            let marker = if verb.is_none() { "(unknown) " } else { "" };
            self.post(engine, DEBUG_CHANNEL, "SERVER", format!("{marker}{cmd}"), LineKind::Notice);
        }

        let Some(verb) = verb else {
            tracing::debug!(command = %cmd.command, "Unhandled server command");
            return;
        };
        if self.on_server(engine, verb, &cmd).is_none() {
            tracing::warn!(line = %cmd, "Server command is missing parameters");
        }
    }
}
