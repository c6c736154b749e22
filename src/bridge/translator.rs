use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::body::{self, media_extension};
use super::notification::{NotificationKind, NotificationType};
use super::registry::{ChatEntry, ChatRegistry};
use super::timestamps::TimestampMap;
use crate::error::BridgeError;
use crate::irc::formatter;
use crate::irc::session::IrcSession;
use crate::maps::MapProvider;
use crate::storage::blob_store::BlobStore;
use crate::upstream::{Chat, ContactId, Me, Message, MessagingClient};

/// Service-internal message type that never reaches the IRC side.
const E2E_NOTIFICATION: &str = "e2e_notification";

const MISSED_CALL: &str = "-- missed call --";

/// Prefix of relayed quoted-message lines.
const QUOTE_PREFIX: &str = "> ";

/// Translates upstream events of one bridge connection into IRC output.
///
/// Owns the connection's chat registry and timestamp map. Events must be fed
/// one at a time; the output of each event is written in a fixed order
/// (join, quoted relay, relay).
pub struct Bridge {
    irc: IrcSession,
    client: Arc<dyn MessagingClient>,
    blobs: Arc<dyn BlobStore>,
    me: Me,
    map_provider: MapProvider,
    chats: ChatRegistry,
    timestamps: TimestampMap,
}

/// One line of notification output.
enum Outgoing {
    Raw(String),
    Private { from: String, to: String, body: String },
}

impl Bridge {
    pub fn new(
        irc: IrcSession,
        client: Arc<dyn MessagingClient>,
        blobs: Arc<dyn BlobStore>,
        me: Me,
        map_provider: MapProvider,
        timestamps: TimestampMap,
    ) -> Self {
        Self {
            irc,
            client,
            blobs,
            me,
            map_provider,
            chats: ChatRegistry::new(),
            timestamps,
        }
    }

    pub fn chats(&self) -> &ChatRegistry {
        &self.chats
    }

    pub fn timestamps(&self) -> &TimestampMap {
        &self.timestamps
    }

    /// Relay one upstream message or notification to the IRC client.
    pub async fn handle_message(&mut self, msg: &Message) -> Result<(), BridgeError> {
        if msg.kind == E2E_NOTIFICATION {
            return Ok(());
        }

        let chat = self.resolve_chat(&msg.chat).await?;
        let chat_id = chat.id.clone();
        if chat.is_group_chat && !chat.joined {
            if let Err(e) = self.join_chat(&chat_id).await {
                // Dropped rather than retried, so a broken join cannot loop.
                self.mark_seen(&chat_id, &msg.id);
                return Err(e);
            }
        }

        if !self.mark_seen(&chat_id, &msg.id) {
            debug!(chat = %chat_id, message = %msg.id, "duplicate message skipped");
            return Ok(());
        }

        if self.timestamps.observe(&chat_id.to_string(), msg.timestamp) {
            debug!(chat = %chat_id, timestamp = msg.timestamp, "chat timestamp advanced");
        }

        if msg.is_sent_by_me_from_web {
            return Ok(());
        }

        if msg.is_notification {
            return self.handle_notification(&chat_id, msg).await;
        }

        self.relay_message(&chat_id, msg).await
    }

    /// Look up the chat, registering it with its current participants when
    /// it is new.
    async fn resolve_chat(&mut self, chat: &Chat) -> Result<&mut ChatEntry, BridgeError> {
        let participants = if self.chats.by_id(&chat.id).is_none() {
            Some(self.client.chat_participants(chat).await?)
        } else {
            None
        };

        let is_new = participants.is_some();
        let entry = self
            .chats
            .insert(ChatEntry::new(chat, participants.unwrap_or_default()));
        if is_new {
            info!(
                chat = %entry.id,
                identifier = %entry.identifier,
                participants = entry.participants.len(),
                "registered chat"
            );
        }
        Ok(entry)
    }

    fn mark_seen(&mut self, chat_id: &ContactId, message_id: &str) -> bool {
        self.chats
            .by_id_mut(chat_id)
            .is_some_and(|chat| chat.add_message_id(message_id))
    }

    /// Write the join burst for a group chat and mark it joined.
    async fn join_chat(&mut self, chat_id: &ContactId) -> Result<(), BridgeError> {
        let nick = self.irc.nick();
        let Some(chat) = self.chats.by_id(chat_id) else {
            return Ok(());
        };
        let identifier = chat.identifier.clone();
        let lines = join_burst(&nick, chat, &self.me);

        self.irc
            .write_list(&lines)
            .await
            .map_err(|source| BridgeError::Join {
                chat: identifier.clone(),
                source,
            })?;

        if let Some(chat) = self.chats.by_id_mut(chat_id) {
            chat.joined = true;
        }
        info!(channel = %identifier, "joined channel");
        Ok(())
    }

    async fn relay_message(&self, chat_id: &ContactId, msg: &Message) -> Result<(), BridgeError> {
        let Some(chat) = self.chats.by_id(chat_id) else {
            return Ok(());
        };
        let nick = self.irc.nick();

        let from = if msg.is_sent_by_me {
            nick.clone()
        } else if let Some(sender) = &msg.sender {
            sender.safe_name()
        } else if let Some(id) = &msg.from {
            find_name(&self.chats, chat, id)
        } else {
            chat.identifier.clone()
        };
        let to = if chat.is_group_chat || msg.is_sent_by_me {
            chat.identifier.clone()
        } else {
            nick
        };

        if msg.is_mms() {
            self.store_media(msg).await?;
        }

        if let Some(quoted) = &msg.quoted_message {
            let body = body::message_body(
                quoted,
                &chat.participants,
                &self.me,
                self.blobs.as_ref(),
                self.map_provider,
            )
            .await;
            self.relay(msg.time(), &from, &to, &body, true).await?;
        }

        let body = body::message_body(
            msg,
            &chat.participants,
            &self.me,
            self.blobs.as_ref(),
            self.map_provider,
        )
        .await;
        self.relay(msg.time(), &from, &to, &body, false).await
    }

    /// Download and store attached media unless a blob with its hash exists.
    async fn store_media(&self, msg: &Message) -> Result<(), BridgeError> {
        let Some(media) = &msg.media else {
            return Ok(());
        };
        if self.blobs.get_file_by_hash(&media.file_hash).await.is_some() {
            return Ok(());
        }

        let bytes = self.client.download_media(msg).await?;
        let extension = media_extension(&media.mime_type, &bytes, &media.filename);
        let file = self
            .blobs
            .add_blob(&media.file_hash, &extension, &bytes)
            .await?;
        debug!(hash = %media.file_hash, path = %file.path.display(), "stored media");
        Ok(())
    }

    /// Send `body` line by line. IRC has no multi-line messages. A body
    /// without any text is still relayed as one empty line.
    async fn relay(
        &self,
        time: DateTime<Utc>,
        from: &str,
        to: &str,
        body: &str,
        quoted: bool,
    ) -> Result<(), BridgeError> {
        let mut lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            lines.push("");
        }
        for line in lines {
            if quoted {
                let line = format!("{}{}", QUOTE_PREFIX, line);
                self.irc.private_message(time, from, to, &line).await?;
            } else {
                self.irc.private_message(time, from, to, line).await?;
            }
        }
        Ok(())
    }

    async fn handle_notification(
        &mut self,
        chat_id: &ContactId,
        msg: &Message,
    ) -> Result<(), BridgeError> {
        if NotificationType::parse(&msg.kind).is_none() {
            return Err(BridgeError::UnknownNotificationType(msg.kind.clone()));
        }
        if msg.recipient_ids.is_empty() {
            return Ok(());
        }

        let kind = NotificationKind::parse(&msg.subtype);
        match &kind {
            NotificationKind::Create => return Ok(()),
            NotificationKind::Unknown(subtype) => {
                warn!(
                    chat = %chat_id,
                    kind = %msg.kind,
                    %subtype,
                    "unhandled notification subtype"
                );
                return Ok(());
            }
            _ => {}
        }

        let Some(chat) = self.chats.by_id(chat_id) else {
            return Ok(());
        };
        let nick = self.irc.nick();
        let channel = chat.identifier.clone();

        let actor = msg
            .sender
            .as_ref()
            .map(|sender| sender.id.clone())
            .or_else(|| msg.from.clone());
        let author = match &actor {
            Some(id) if *id == self.me.self_id => nick.clone(),
            Some(id) => find_name(&self.chats, chat, id),
            None => formatter::server_name().to_string(),
        };

        // Lines are built up front; the bool marks the local user leaving.
        let mut outgoing = Vec::with_capacity(msg.recipient_ids.len());
        for recipient_id in &msg.recipient_ids {
            let is_self = *recipient_id == self.me.self_id;
            let recipient = if is_self {
                nick.clone()
            } else {
                find_name(&self.chats, chat, recipient_id)
            };

            let line = match kind {
                NotificationKind::AddInvite if is_self => None,
                NotificationKind::AddInvite => {
                    Some(Outgoing::Raw(formatter::join(&recipient, &channel)))
                }
                NotificationKind::Leave => {
                    Some(Outgoing::Raw(formatter::part(&recipient, &channel)))
                }
                NotificationKind::Remove => {
                    Some(Outgoing::Raw(formatter::kick(&author, &channel, &recipient)))
                }
                NotificationKind::Miss => Some(Outgoing::Private {
                    from: author.clone(),
                    to: channel.clone(),
                    body: MISSED_CALL.to_string(),
                }),
                NotificationKind::Create | NotificationKind::Unknown(_) => None,
            };
            outgoing.push((line, is_self && kind.removes_recipient()));
        }

        let time = msg.time();
        for (line, leaves) in outgoing {
            match line {
                Some(Outgoing::Raw(line)) => self.irc.write(time, &line).await?,
                Some(Outgoing::Private { from, to, body }) => {
                    self.irc.private_message(time, &from, &to, &body).await?
                }
                None => {}
            }
            if leaves && let Some(chat) = self.chats.by_id_mut(chat_id) {
                chat.joined = false;
                info!(channel = %chat.identifier, "left channel");
            }
        }
        Ok(())
    }
}

/// IRC name of `id` as seen from `chat`: the participant's name, else the
/// identifier of a direct chat with them, else their raw user ID.
fn find_name(chats: &ChatRegistry, chat: &ChatEntry, id: &ContactId) -> String {
    if let Some(participant) = chat.participant(id) {
        return participant.safe_name();
    }
    if let Some(direct) = chats.by_id(id)
        && !direct.is_group_chat
    {
        return direct.identifier.clone();
    }
    id.user.clone()
}

/// JOIN, topic and member list of a group chat, as sent on first join.
fn join_burst(nick: &str, chat: &ChatEntry, me: &Me) -> Vec<String> {
    let mut members = Vec::with_capacity(chat.participants.len() + 1);
    if chat.participant(&me.self_id).is_none() {
        members.push(nick.to_string());
    }
    for participant in &chat.participants {
        let name = if participant.id == me.self_id {
            nick.to_string()
        } else {
            participant.safe_name()
        };
        if participant.is_admin {
            members.push(format!("@{}", name));
        } else {
            members.push(name);
        }
    }

    vec![
        formatter::join(nick, &chat.identifier),
        formatter::rpl_topic(nick, &chat.identifier, &chat.name),
        formatter::rpl_namreply(nick, &chat.identifier, &members),
        formatter::rpl_endofnames(nick, &chat.identifier),
    ]
}
