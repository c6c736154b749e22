pub mod models;
pub mod pool;
pub mod queries;

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::bridge::timestamps::{PersistError, TimestampStore};

/// [`TimestampStore`] backed by the `chat_timestamps` table.
#[derive(Clone)]
pub struct SqliteTimestampStore {
    pool: SqlitePool,
}

impl SqliteTimestampStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimestampStore for SqliteTimestampStore {
    async fn load(&self, user_id: &str) -> Result<HashMap<String, i64>, PersistError> {
        let rows = queries::timestamps::list_timestamps(&self.pool, user_id).await?;
        Ok(rows.into_iter().map(|r| (r.chat_id, r.timestamp)).collect())
    }

    async fn save(
        &self,
        user_id: &str,
        timestamps: &HashMap<String, i64>,
    ) -> Result<(), PersistError> {
        queries::timestamps::upsert_timestamps(&self.pool, user_id, timestamps).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};

    async fn store() -> (tempfile::TempDir, SqliteTimestampStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (dir, SqliteTimestampStore::new(pool))
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (_dir, store) = store().await;

        let mut ts = HashMap::new();
        ts.insert("family@g.us".to_string(), 100);
        ts.insert("bob@c.us".to_string(), 50);
        store.save("me@c.us", &ts).await.unwrap();

        let loaded = store.load("me@c.us").await.unwrap();
        assert_eq!(loaded, ts);
        assert!(store.load("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_never_moves_backwards() {
        let (_dir, store) = store().await;

        let mut ts = HashMap::new();
        ts.insert("family@g.us".to_string(), 100);
        store.save("me", &ts).await.unwrap();

        ts.insert("family@g.us".to_string(), 90);
        store.save("me", &ts).await.unwrap();
        assert_eq!(store.load("me").await.unwrap()["family@g.us"], 100);

        ts.insert("family@g.us".to_string(), 120);
        store.save("me", &ts).await.unwrap();
        assert_eq!(store.load("me").await.unwrap()["family@g.us"], 120);
    }
}
