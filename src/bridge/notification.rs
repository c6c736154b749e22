/// Notification categories the bridge knows how to translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    /// Group membership changes (`gp2`).
    GroupMembership,
    /// Call events (`call_log`).
    CallLog,
}

impl NotificationType {
    /// `None` for types the bridge has no translation for.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "gp2" => Some(NotificationType::GroupMembership),
            "call_log" => Some(NotificationType::CallLog),
            _ => None,
        }
    }
}

/// What happened to a notification's recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Create,
    AddInvite,
    Leave,
    Remove,
    Miss,
    /// Logged and otherwise ignored, so new upstream subtypes never break a session.
    Unknown(String),
}

impl NotificationKind {
    pub fn parse(subtype: &str) -> Self {
        match subtype {
            "create" => NotificationKind::Create,
            "add" | "invite" => NotificationKind::AddInvite,
            "leave" => NotificationKind::Leave,
            "remove" => NotificationKind::Remove,
            "miss" => NotificationKind::Miss,
            other => NotificationKind::Unknown(other.to_string()),
        }
    }

    /// Whether this subtype, aimed at the local user, takes them out of the chat.
    pub fn removes_recipient(&self) -> bool {
        matches!(self, NotificationKind::Leave | NotificationKind::Remove)
    }
}
