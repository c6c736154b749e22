use std::collections::BTreeSet;

/// Adds an `@time=` tag to every server-originated line.
pub const SERVER_TIME: &str = "server-time";
/// History replay on connect; interpreted by the gateway, not the session.
pub const REPLAY: &str = "whapp-irc/replay";

/// Everything advertised in reply to `CAP LS`.
pub const SUPPORTED: &[&str] = &[SERVER_TIME, REPLAY];

/// Capabilities negotiated by one IRC connection.
#[derive(Debug, Default, Clone)]
pub struct Capabilities {
    tokens: BTreeSet<String>,
    negotiating: bool,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_negotiation(&mut self) {
        self.negotiating = true;
    }

    pub fn finish_negotiation(&mut self) {
        self.negotiating = false;
    }

    pub fn is_negotiating(&self) -> bool {
        self.negotiating
    }

    /// Record a requested capability. Ignored outside a negotiation phase.
    /// Returns whether the set changed.
    pub fn add(&mut self, token: &str) -> bool {
        let token = token.trim();
        if !self.negotiating || token.is_empty() {
            return false;
        }
        self.tokens.insert(token.to_ascii_lowercase())
    }

    pub fn has(&self, token: &str) -> bool {
        self.tokens.contains(&token.to_ascii_lowercase())
    }

    /// Sorted list of negotiated tokens, as sent in ACK and LIST replies.
    pub fn list(&self) -> Vec<String> {
        self.tokens.iter().cloned().collect()
    }
}
