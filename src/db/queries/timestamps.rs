use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::db::models::ChatTimestampRow;

/// All stored chat timestamps of one upstream account.
pub async fn list_timestamps(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<ChatTimestampRow>, sqlx::Error> {
    sqlx::query_as::<_, ChatTimestampRow>(
        "SELECT chat_id, timestamp FROM chat_timestamps WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Insert or advance the stored timestamps for several chats at once.
/// A stored timestamp is never lowered.
pub async fn upsert_timestamps(
    pool: &SqlitePool,
    user_id: &str,
    rows: &HashMap<String, i64>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (chat_id, timestamp) in rows {
        sqlx::query(
            "INSERT INTO chat_timestamps (user_id, chat_id, timestamp) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, chat_id) DO UPDATE SET \
             timestamp = MAX(chat_timestamps.timestamp, excluded.timestamp), \
             updated_at = datetime('now')",
        )
        .bind(user_id)
        .bind(chat_id.as_str())
        .bind(*timestamp)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}
