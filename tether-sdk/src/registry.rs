//! Per-channel state: topic, ranked membership, backlog and highlight flags.
//!
//! Channels are created lazily the first time anything refers to them and
//! live until the user closes them. A user present in two channels is two
//! independent [`User`] records.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::message::is_channel;

/// Maximum number of lines kept per channel.
pub const MAX_BACKLOG: usize = 250;

/// Pseudo-channel for server notices and connection life-cycle messages.
pub const NOTICE_CHANNEL: &str = "(Notice)";
/// Pseudo-channel for raw protocol traffic when debugging is enabled.
pub const DEBUG_CHANNEL: &str = "(Debug)";
/// Pseudo-channel for messages about the client itself.
pub const STATUS_CHANNEL: &str = "(Status)";

/// One member of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub name: String,
    pub op: bool,
    pub voice: bool,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            op: false,
            voice: false,
        }
    }

    /// Parse a NAMES entry; a leading `@` marks an operator, then `+` voice.
    pub fn from_name_with_modes(raw: &str) -> Self {
        let (op, rest) = match raw.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (voice, name) = match rest.strip_prefix('+') {
            Some(name) => (true, name),
            None => (false, rest),
        };
        Self {
            name: name.to_string(),
            op,
            voice,
        }
    }

    /// Operators first, then voiced users, then everyone else; each tier by
    /// case-insensitive name.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .op
            .cmp(&self.op)
            .then(other.voice.cmp(&self.voice))
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op {
            f.write_str("@")?;
        }
        if self.voice {
            f.write_str("+")?;
        }
        f.write_str(&self.name)
    }
}

/// The four user-mode changes a channel tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    Op,
    Deop,
    Voice,
    Devoice,
}

impl ModeChange {
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "+o" => Some(Self::Op),
            "-o" => Some(Self::Deop),
            "+v" => Some(Self::Voice),
            "-v" => Some(Self::Devoice),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Op => "+o",
            Self::Deop => "-o",
            Self::Voice => "+v",
            Self::Devoice => "-v",
        }
    }

    fn apply(self, user: &mut User) {
        match self {
            Self::Op => user.op = true,
            Self::Deop => user.op = false,
            Self::Voice => user.voice = true,
            Self::Devoice => user.voice = false,
        }
    }
}

/// What kind of notification a backlog line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Message,
    Action,
    /// Join, part or quit.
    Membership,
    Notice,
}

/// `(Notice)`-style handles that are local views, not server conversations.
pub fn is_pseudo(handle: &str) -> bool {
    handle.starts_with('(') && handle.ends_with(')')
}

/// A single line in a channel backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelLine {
    pub at: DateTime<Utc>,
    pub sender: String,
    pub text: String,
    pub kind: LineKind,
}

impl ChannelLine {
    pub fn new(sender: &str, text: impl Into<String>, kind: LineKind) -> Self {
        Self {
            at: Utc::now(),
            sender: sender.to_string(),
            text: text.into(),
            kind,
        }
    }
}

/// A conversation: a real channel, a private-message peer or a pseudo-channel.
#[derive(Debug, Clone)]
pub struct Channel {
    handle: String,
    pub topic: Option<String>,
    users: Vec<User>,
    /// True between NAMES bursts; the next 353 starts a fresh member list.
    got_all_names: bool,
    backlog: VecDeque<ChannelLine>,
    highlight_private: bool,
    highlight_message: bool,
    highlight_join: bool,
}

impl Channel {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            topic: None,
            users: Vec::new(),
            got_all_names: true,
            backlog: VecDeque::new(),
            highlight_private: false,
            highlight_message: false,
            highlight_join: false,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }

    pub fn op_count(&self) -> usize {
        self.users.iter().filter(|u| u.op).count()
    }

    pub fn backlog(&self) -> impl Iterator<Item = &ChannelLine> {
        self.backlog.iter()
    }

    pub fn is_channel(&self) -> bool {
        is_channel(&self.handle)
    }

    pub fn is_pseudo(&self) -> bool {
        is_pseudo(&self.handle)
    }

    pub fn is_private(&self) -> bool {
        !self.is_channel() && !self.is_pseudo()
    }

    pub fn receiving_names(&self) -> bool {
        !self.got_all_names
    }

    pub fn add_names<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        if self.got_all_names {
            self.users.clear();
            self.got_all_names = false;
        }
        self.users
            .extend(names.into_iter().map(User::from_name_with_modes));
        self.sort();
    }

    pub fn end_of_names(&mut self) {
        self.got_all_names = true;
    }

    pub fn add_single_name(&mut self, name: &str) {
        let user = User::from_name_with_modes(name);
        if self.contains(&user.name) {
            return;
        }
        self.users.push(user);
        self.sort();
    }

    pub fn remove_name(&mut self, name: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.name != name);
        self.users.len() != before
    }

    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let mut found = false;
        for user in self.users.iter_mut().filter(|u| u.name == old) {
            user.name = new.to_string();
            found = true;
        }
        if found {
            self.sort();
        }
        found
    }

    /// Apply a mode change to the named user only.
    pub fn change_mode(&mut self, name: &str, mode: ModeChange) -> bool {
        let mut found = false;
        for user in self.users.iter_mut().filter(|u| u.name == name) {
            mode.apply(user);
            found = true;
        }
        if found {
            self.sort();
        }
        found
    }

    pub fn contains(&self, name: &str) -> bool {
        self.users.iter().any(|u| u.name == name)
    }

    fn push_line(&mut self, line: ChannelLine, own_nick: &str) {
        let mentioned = self.is_channel()
            && !own_nick.is_empty()
            && line.text.to_lowercase().contains(&own_nick.to_lowercase());
        if self.is_private() || mentioned {
            self.highlight_private = true;
        }
        if line.kind == LineKind::Membership {
            self.highlight_join = true;
        } else {
            self.highlight_message = true;
        }

        self.backlog.push_back(line);
        while self.backlog.len() > MAX_BACKLOG {
            self.backlog.pop_front();
        }
    }

    pub fn highlighted_private(&self) -> bool {
        self.highlight_private
    }

    pub fn highlighted_message(&self) -> bool {
        self.highlight_message
    }

    pub fn highlighted_join(&self) -> bool {
        self.highlight_join
    }

    pub fn mark_seen(&mut self) {
        self.highlight_private = false;
        self.highlight_message = false;
        self.highlight_join = false;
    }

    fn sort(&mut self) {
        self.users.sort_by(User::rank);
    }
}

/// All open channels plus the focused one.
#[derive(Debug, Default)]
pub struct Registry {
    channels: HashMap<String, Channel>,
    current: Option<String>,
    nick: String,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Own nickname, used to detect mentions.
    pub fn set_nick(&mut self, nick: &str) {
        self.nick = nick.to_string();
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn channel(&self, handle: &str) -> Option<&Channel> {
        self.channels.get(handle)
    }

    /// Look up a channel, creating it on first reference.
    pub fn channel_mut(&mut self, handle: &str) -> &mut Channel {
        self.channels
            .entry(handle.to_string())
            .or_insert_with(|| Channel::new(handle))
    }

    /// Open handles in case-insensitive order.
    pub fn handles(&self) -> Vec<&str> {
        let mut handles: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        handles.sort_by_key(|h| h.to_lowercase());
        handles
    }

    pub fn add_names(&mut self, handle: &str, raw_names: &str) {
        self.channel_mut(handle).add_names(raw_names.split_whitespace());
    }

    pub fn end_of_names(&mut self, handle: &str) {
        self.channel_mut(handle).end_of_names();
    }

    pub fn add_single_name(&mut self, handle: &str, name: &str) {
        self.channel_mut(handle).add_single_name(name);
    }

    pub fn remove_name(&mut self, handle: &str, name: &str) -> bool {
        self.channel_mut(handle).remove_name(name)
    }

    pub fn rename(&mut self, handle: &str, old: &str, new: &str) -> bool {
        self.channel_mut(handle).rename(old, new)
    }

    pub fn change_mode(&mut self, handle: &str, name: &str, mode: ModeChange) -> bool {
        self.channel_mut(handle).change_mode(name, mode)
    }

    pub fn set_topic(&mut self, handle: &str, topic: Option<String>) {
        self.channel_mut(handle).topic = topic;
    }

    /// Every handle where `name` is currently a member.
    pub fn channels_containing(&self, name: &str) -> Vec<String> {
        self.handles()
            .into_iter()
            .filter(|h| self.channels.get(*h).is_some_and(|c| c.contains(name)))
            .map(str::to_string)
            .collect()
    }

    /// Append a line to a channel's backlog. The first channel that receives
    /// a line becomes current.
    pub fn post(&mut self, handle: &str, line: ChannelLine) {
        let nick = std::mem::take(&mut self.nick);
        self.channel_mut(handle).push_line(line, &nick);
        self.nick = nick;
        if self.current.is_none() {
            self.current = Some(handle.to_string());
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn focus(&mut self, handle: &str) -> bool {
        match self.channels.get_mut(handle) {
            Some(channel) => {
                channel.mark_seen();
                self.current = Some(handle.to_string());
                true
            }
            None => false,
        }
    }

    /// Destroy a channel. Focus moves to the first remaining handle.
    pub fn close(&mut self, handle: &str) -> Option<Channel> {
        let closed = self.channels.remove(handle)?;
        if self.current.as_deref() == Some(handle) {
            self.current = self.handles().first().map(|h| h.to_string());
        }
        Some(closed)
    }

    pub fn any_highlight_private(&self) -> bool {
        self.channels.values().any(Channel::highlighted_private)
    }

    pub fn any_highlight_message(&self) -> bool {
        self.channels.values().any(Channel::highlighted_message)
    }

    pub fn any_highlight_join(&self) -> bool {
        self.channels.values().any(Channel::highlighted_join)
    }
}
