//! Value types and the client interface of the upstream messaging service.
//!
//! The gateway never talks to the service directly; a [`MessagingClient`]
//! implementation does, and hands the gateway these plain values.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A user, group or chat ID in `user@server` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId {
    pub user: String,
    pub server: String,
}

impl ContactId {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_string(),
        }
    }

    /// Parse `user@server`. A bare string becomes the user part.
    pub fn parse(serialized: &str) -> Self {
        match serialized.split_once('@') {
            Some((user, server)) => Self::new(user, server),
            None => Self::new(serialized, ""),
        }
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server.is_empty() {
            write!(f, "{}", self.user)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    /// Name saved in the local user's address book.
    #[serde(default)]
    pub name: String,
    /// Name the contact chose for themselves.
    #[serde(default)]
    pub push_name: String,
    /// Service-formatted name, usually the phone number.
    #[serde(default)]
    pub formatted_name: String,
}

impl Contact {
    /// The best available human-readable name.
    pub fn display_name(&self) -> &str {
        [&self.name, &self.push_name, &self.formatted_name]
            .into_iter()
            .find(|n| !n.trim().is_empty())
            .map(|n| n.as_str())
            .unwrap_or(&self.id.user)
    }

    /// The display name, made usable as an IRC nickname.
    pub fn safe_name(&self) -> String {
        safe_name(self.display_name(), &self.id.user)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ContactId,
    pub contact: Contact,
    #[serde(default)]
    pub is_admin: bool,
}

impl Participant {
    pub fn from_contact(contact: Contact) -> Self {
        Self {
            id: contact.id.clone(),
            contact,
            is_admin: false,
        }
    }

    pub fn safe_name(&self) -> String {
        self.contact.safe_name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ContactId,
    /// Group subject, or the peer's name for direct chats.
    pub name: String,
    pub is_group: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Content hash assigned by the service; stable across re-deliveries.
    pub file_hash: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub caption: String,
}

/// One entry of a chat's message stream: a chat line or a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Serialized message ID, unique within its chat.
    pub id: String,
    pub chat: Chat,
    pub sender: Option<Contact>,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub is_sent_by_me: bool,
    /// Sent by the local user from the service's own web client.
    #[serde(default)]
    pub is_sent_by_me_from_web: bool,
    #[serde(default)]
    pub is_notification: bool,
    /// Service message type, e.g. `chat`, `gp2`, `call_log`.
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub recipient_ids: Vec<ContactId>,
    /// Acting user of a notification when no sender is attached.
    #[serde(default)]
    pub from: Option<ContactId>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub mentioned_ids: Vec<ContactId>,
    #[serde(default)]
    pub quoted_message: Option<Box<Message>>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub media: Option<Media>,
}

impl Message {
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Whether the message carries downloadable media.
    pub fn is_mms(&self) -> bool {
        self.media.is_some()
    }
}

/// The local user as seen by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Me {
    pub self_id: ContactId,
    pub push_name: String,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("not found upstream: {0}")]
    NotFound(String),

    #[error("upstream session closed")]
    Disconnected,
}

/// Operations the gateway needs from the messaging-service client.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Current participants of `chat`.
    async fn chat_participants(&self, chat: &Chat) -> Result<Vec<Participant>, UpstreamError>;

    /// Raw bytes of the media attached to `message`.
    async fn download_media(&self, message: &Message) -> Result<Vec<u8>, UpstreamError>;

    /// Send a text message to a chat.
    async fn send_message(&self, chat_id: &ContactId, body: &str) -> Result<(), UpstreamError>;
}

/// Make `name` usable as an IRC nickname or channel name suffix.
///
/// Whitespace runs become `_`; characters with a meaning in the IRC grammar
/// and control characters are dropped. Falls back to `fallback` when nothing
/// is left.
pub fn safe_name(name: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;

    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if matches!(c, ':' | ',' | '!' | '@' | '#' | '*' | '?' | '.') || c.is_control() {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push('_');
        }
        pending_space = false;
        out.push(c);
    }

    if out.is_empty() {
        fallback.to_string()
    } else {
        out
    }
}
