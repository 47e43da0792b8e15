//! Input typed into the client's text box.

/// A locally typed command: `/VERB args`, or plain text addressed to the
/// current channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCommand {
    /// Uppercased verb, without the leading slash.
    pub command: String,
    /// Everything after the verb; empty when there was nothing.
    pub params: String,
}

impl UserCommand {
    pub fn new(command: &str, params: &str) -> Self {
        Self {
            command: command.to_ascii_uppercase(),
            params: params.to_string(),
        }
    }

    /// Parse one line of input.
    ///
    /// Plain text becomes `MSG <current> <text>`. Returns `None` for blank
    /// input, and for plain text when no channel is focused. Anything after
    /// the first CR or LF is discarded.
    pub fn from_input(input: &str, current: Option<&str>) -> Option<Self> {
        let input = input.split(['\r', '\n']).next().unwrap_or_default();
        if input.trim().is_empty() {
            return None;
        }

        match input.strip_prefix('/') {
            Some(rest) => {
                let rest = rest.trim_start();
                let (verb, params) = rest.split_once(' ').unwrap_or((rest, ""));
                if verb.is_empty() {
                    return None;
                }
                Some(Self::new(verb, params.trim()))
            }
            None => {
                let target = current?;
                Some(Self::new("MSG", &format!("{target} {input}")))
            }
        }
    }

    /// The command in raw protocol form, `VERB params`.
    pub fn to_raw_line(&self) -> String {
        if self.params.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.params)
        }
    }
}
