//! IRC protocol lines: decoding into [`Command`] values and encoding back.
//!
//! Grammar: `[":" prefix SPACE] command [SPACE param]* [SPACE ":" trailing]`.
//! PRIVMSG and NOTICE whose trailing parameter is wrapped in `\x01` carry a
//! CTCP payload, which is split off into [`Ctcp`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ParseError;

/// The CTCP delimiter byte.
pub const CTCP_DELIM: char = '\x01';

/// A CTCP sub-command embedded in a PRIVMSG or NOTICE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ctcp {
    /// Sub-command verb, e.g. `ACTION` or `VERSION`.
    pub command: String,
    /// Text after the verb; absent when the payload had no space.
    pub params: Option<String>,
}

impl Ctcp {
    fn parse(text: &str) -> Option<Self> {
        let inner = text.strip_prefix(CTCP_DELIM)?.strip_suffix(CTCP_DELIM)?;
        if inner.is_empty() {
            return None;
        }
        Some(match inner.split_once(' ') {
            Some((command, params)) => Ctcp {
                command: command.to_string(),
                params: Some(params.to_string()),
            },
            None => Ctcp {
                command: inner.to_string(),
                params: None,
            },
        })
    }

    pub fn is(&self, verb: &str) -> bool {
        self.command.eq_ignore_ascii_case(verb)
    }
}

impl fmt::Display for Ctcp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CTCP_DELIM}{}", self.command)?;
        if let Some(ref params) = self.params {
            write!(f, " {params}")?;
        }
        write!(f, "{CTCP_DELIM}")
    }
}

/// A decoded protocol message.
///
/// When `ctcp` is set, `params` holds only the leading parameters (the
/// message target); the CTCP payload is the implicit trailing parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub ctcp: Option<Ctcp>,
}

impl Command {
    pub fn new(command: &str, params: Vec<&str>) -> Self {
        Self {
            prefix: None,
            command: command.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
            ctcp: None,
        }
    }

    /// Build a CTCP request or reply addressed to `target`.
    pub fn ctcp(command: &str, target: &str, verb: &str, params: Option<&str>) -> Self {
        Self {
            prefix: None,
            command: command.to_string(),
            params: vec![target.to_string()],
            ctcp: Some(Ctcp {
                command: verb.to_string(),
                params: params.map(str::to_string),
            }),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Nick portion of the prefix (everything before `!`).
    pub fn short_prefix(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split('!').next())
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn last_param(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Parameter counted from the end: `param_from_end(1)` is the last one.
    pub fn param_from_end(&self, n: usize) -> Option<&str> {
        let len = self.params.len();
        if n == 0 || n > len {
            return None;
        }
        self.param(len - n)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        match self.ctcp {
            Some(ref ctcp) => {
                for param in &self.params {
                    write!(f, " {param}")?;
                }
                write!(f, " :{ctcp}")
            }
            None => {
                let last = self.params.len().saturating_sub(1);
                for (i, param) in self.params.iter().enumerate() {
                    if i == last {
                        write!(f, " :{param}")?;
                    } else {
                        write!(f, " {param}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        decode(line)
    }
}

/// Decode one line (terminator optional) into a [`Command`].
pub fn decode(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut rest = line;
    let prefix = match rest.strip_prefix(':') {
        Some(after) => {
            let (prefix, tail) = after
                .split_once(' ')
                .ok_or_else(|| ParseError::MissingCommand(line.to_string()))?;
            rest = tail;
            Some(prefix.to_string())
        }
        None => None,
    };

    rest = rest.trim_start_matches(' ');
    let (word, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
    if word.is_empty() {
        return Err(ParseError::MissingCommand(line.to_string()));
    }
    let command = normalize_command(word)?;

    let mut params = Vec::new();
    while !rest.is_empty() {
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_string());
            break;
        }
        match rest.split_once(' ') {
            Some((param, tail)) => {
                // Runs of spaces produce empty middle params, which are skipped.
                if !param.is_empty() {
                    params.push(param.to_string());
                }
                rest = tail;
            }
            None => {
                params.push(rest.to_string());
                break;
            }
        }
    }

    let mut ctcp = None;
    if (command == "PRIVMSG" || command == "NOTICE") && params.len() >= 2 {
        if let Some(parsed) = params.last().and_then(|text| Ctcp::parse(text)) {
            params.pop();
            ctcp = Some(parsed);
        }
    }

    Ok(Command {
        prefix,
        command,
        params,
        ctcp,
    })
}

/// Encode a [`Command`] without the CRLF terminator.
///
/// The final parameter is always emitted in trailing form (`:param`).
pub fn encode(command: &Command) -> String {
    command.to_string()
}

fn normalize_command(word: &str) -> Result<String, ParseError> {
    if word.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(word.to_ascii_uppercase())
    } else if word.len() == 3 && word.bytes().all(|b| b.is_ascii_digit()) {
        Ok(word.to_string())
    } else {
        Err(ParseError::InvalidCommand(word.to_string()))
    }
}

/// True for handles naming a real IRC channel.
pub fn is_channel(handle: &str) -> bool {
    handle.starts_with('#')
}
