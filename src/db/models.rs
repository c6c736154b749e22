use serde::{Deserialize, Serialize};

/// Latest seen message timestamp of one chat.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatTimestampRow {
    pub chat_id: String,
    pub timestamp: i64,
}
