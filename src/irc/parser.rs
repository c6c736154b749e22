use thiserror::Error;

/// An IRC protocol message per RFC 2812, with optional IRCv3 message tags.
///
/// Wire format: `[@tags] [:prefix] COMMAND [params...] [:trailing]\r\n`
///
/// Examples:
///   `@time=2024-01-01T00:00:00.000Z :alice PRIVMSG #family :Hello\r\n`
///   `CAP REQ :server-time whapp-irc/replay\r\n`
///   `PASS secrettoken123\r\n`
#[derive(Debug, Clone, PartialEq)]
pub struct IrcMessage {
    pub tags: Vec<(String, Option<String>)>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Build a message originating from `prefix` (a nick or the server name).
    pub fn from_prefix(prefix: &str, command: &str, params: Vec<String>) -> Self {
        IrcMessage {
            tags: Vec::new(),
            prefix: Some(prefix.to_string()),
            command: command.to_string(),
            params,
        }
    }

    /// Parse one line as read from the socket; a trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();
        if rest.trim_end().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut tags = Vec::new();
        if let Some(tagged) = rest.strip_prefix('@') {
            let (raw, after) = next_word(tagged);
            tags = raw
                .split(';')
                .filter(|t| !t.is_empty())
                .map(|t| match t.split_once('=') {
                    Some((key, value)) => (key.to_string(), Some(value.to_string())),
                    None => (t.to_string(), None),
                })
                .collect();
            rest = after;
        }

        let mut prefix = None;
        if let Some(source) = rest.strip_prefix(':') {
            let (source, after) = next_word(source);
            prefix = Some(source.to_string());
            rest = after;
        }

        let (command, mut rest) = next_word(rest);
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        if !command.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseError::InvalidCommand(command.to_string()));
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (param, after) = next_word(rest);
            params.push(param.to_string());
            rest = after;
        }

        Ok(IrcMessage {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// The last parameter, which is where clients put free text.
    pub fn trailing(&self) -> &str {
        self.params.last().map(|s| s.as_str()).unwrap_or("")
    }

    /// Serialize without the line terminator.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(512);

        if !self.tags.is_empty() {
            let tags: Vec<String> = self
                .tags
                .iter()
                .map(|(key, value)| match value {
                    Some(value) => format!("{}={}", key, value),
                    None => key.clone(),
                })
                .collect();
            out.push('@');
            out.push_str(&tags.join(";"));
            out.push(' ');
        }

        if let Some(prefix) = &self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                out.push(' ');
                out.push_str(param);
            }
            out.push(' ');
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                out.push(':');
            }
            out.push_str(last);
        }

        out
    }
}

/// Split off the first space-separated word, skipping the spaces after it.
fn next_word(s: &str) -> (&str, &str) {
    match s.split_once(' ') {
        Some((word, rest)) => (word, rest.trim_start_matches(' ')),
        None => (s, ""),
    }
}

#[derive(Debug, PartialEq, Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("missing command")]
    MissingCommand,
    #[error("invalid command {0:?}")]
    InvalidCommand(String),
}
