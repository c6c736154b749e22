use std::collections::{HashMap, HashSet};

use crate::upstream::{Chat, ContactId, Participant, safe_name};

/// What the IRC side knows about one upstream chat.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub id: ContactId,
    /// Group subject or peer name, as shown by the service.
    pub name: String,
    /// Channel name (`#...`) for group chats, nickname for direct chats.
    pub identifier: String,
    pub is_group_chat: bool,
    /// Whether the IRC client was told it is in the channel.
    pub joined: bool,
    pub participants: Vec<Participant>,
    message_ids: HashSet<String>,
}

impl ChatEntry {
    pub fn new(chat: &Chat, participants: Vec<Participant>) -> Self {
        let identifier = if chat.is_group {
            format!("#{}", safe_name(&chat.name, &chat.id.user))
        } else {
            safe_name(&chat.name, &chat.id.user)
        };

        Self {
            id: chat.id.clone(),
            name: chat.name.clone(),
            identifier,
            is_group_chat: chat.is_group,
            joined: false,
            participants,
            message_ids: HashSet::new(),
        }
    }

    pub fn has_message_id(&self, id: &str) -> bool {
        self.message_ids.contains(id)
    }

    /// Remember `id` as handled. Returns false if it already was.
    pub fn add_message_id(&mut self, id: &str) -> bool {
        self.message_ids.insert(id.to_string())
    }

    pub fn participant(&self, id: &ContactId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }
}

/// Known chats of one bridge connection, keyed by upstream chat ID.
#[derive(Debug, Default)]
pub struct ChatRegistry {
    chats: HashMap<ContactId, ChatEntry>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn by_id(&self, id: &ContactId) -> Option<&ChatEntry> {
        self.chats.get(id)
    }

    pub fn by_id_mut(&mut self, id: &ContactId) -> Option<&mut ChatEntry> {
        self.chats.get_mut(id)
    }

    /// Find a chat by its IRC-facing name. IRC names are case-insensitive.
    pub fn by_identifier(&self, identifier: &str) -> Option<&ChatEntry> {
        self.chats
            .values()
            .find(|c| c.identifier.eq_ignore_ascii_case(identifier))
    }

    /// Register `entry`, keeping an existing entry with the same ID untouched.
    /// The identifier gets a numeric suffix if another chat already uses it.
    pub fn insert(&mut self, mut entry: ChatEntry) -> &mut ChatEntry {
        if !self.chats.contains_key(&entry.id) {
            let base = entry.identifier.clone();
            let mut n = 2;
            while self.by_identifier(&entry.identifier).is_some() {
                entry.identifier = format!("{}_{}", base, n);
                n += 1;
            }
        }

        self.chats.entry(entry.id.clone()).or_insert(entry)
    }
}
