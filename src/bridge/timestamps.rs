use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Pause before a failed save is retried.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Save attempts left for the pending snapshot once the map is dropped.
const FINAL_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable storage for the latest message timestamp of every chat.
#[async_trait]
pub trait TimestampStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<HashMap<String, i64>, PersistError>;

    /// Store `timestamps`, never moving a chat's stored timestamp backwards.
    async fn save(&self, user_id: &str, timestamps: &HashMap<String, i64>)
    -> Result<(), PersistError>;
}

/// Latest observed message timestamp per chat ID.
///
/// Values only move forward. Every forward move publishes a snapshot to the
/// persistence worker, which coalesces bursts and stores the newest one.
pub struct TimestampMap {
    latest: HashMap<String, i64>,
    trigger: watch::Sender<HashMap<String, i64>>,
}

impl Default for TimestampMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampMap {
    /// A map without persistence.
    pub fn new() -> Self {
        Self {
            latest: HashMap::new(),
            trigger: watch::Sender::new(HashMap::new()),
        }
    }

    /// A map seeded with `initial` whose updates are saved to `store` by a
    /// background task. Failed saves are retried until they succeed. The task
    /// ends when the map is dropped, after saving the last pending snapshot.
    pub fn with_persistence(
        user_id: String,
        initial: HashMap<String, i64>,
        store: Arc<dyn TimestampStore>,
    ) -> Self {
        Self::with_retry_delay(user_id, initial, store, RETRY_DELAY)
    }

    fn with_retry_delay(
        user_id: String,
        initial: HashMap<String, i64>,
        store: Arc<dyn TimestampStore>,
        retry_delay: Duration,
    ) -> Self {
        let (trigger, rx) = watch::channel(initial.clone());
        let worker = PersistWorker {
            user_id,
            saved: initial.clone(),
            rx,
            store,
            retry_delay,
        };
        tokio::spawn(worker.run());
        Self {
            latest: initial,
            trigger,
        }
    }

    pub fn get(&self, chat_id: &str) -> Option<i64> {
        self.latest.get(chat_id).copied()
    }

    /// Record `timestamp` for `chat_id` if it is strictly newer than what was
    /// seen before. Returns whether it was, in which case persistence was
    /// triggered.
    pub fn observe(&mut self, chat_id: &str, timestamp: i64) -> bool {
        if let Some(&last) = self.latest.get(chat_id)
            && timestamp <= last
        {
            return false;
        }

        self.latest.insert(chat_id.to_string(), timestamp);
        self.trigger.send_replace(self.latest.clone());
        true
    }
}

struct PersistWorker {
    user_id: String,
    saved: HashMap<String, i64>,
    rx: watch::Receiver<HashMap<String, i64>>,
    store: Arc<dyn TimestampStore>,
    retry_delay: Duration,
}

impl PersistWorker {
    async fn run(mut self) {
        let mut pending = false;
        loop {
            let open = if pending {
                tokio::select! {
                    changed = self.rx.changed() => changed.is_ok(),
                    _ = tokio::time::sleep(self.retry_delay) => true,
                }
            } else {
                self.rx.changed().await.is_ok()
            };
            if !open {
                break;
            }
            pending = !self.save_pending().await;
        }

        for attempt in 1..=FINAL_ATTEMPTS {
            if self.save_pending().await {
                return;
            }
            if attempt < FINAL_ATTEMPTS {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        warn!(user_id = %self.user_id, "giving up on persisting chat timestamps");
    }

    /// Save every entry of the newest snapshot that differs from what was
    /// stored. Returns whether nothing is left to save.
    async fn save_pending(&mut self) -> bool {
        let changed: HashMap<String, i64> = self
            .rx
            .borrow_and_update()
            .iter()
            .filter(|(chat, ts)| self.saved.get(*chat) != Some(*ts))
            .map(|(chat, ts)| (chat.clone(), *ts))
            .collect();

        if changed.is_empty() {
            return true;
        }

        match self.store.save(&self.user_id, &changed).await {
            Ok(()) => {
                debug!(user_id = %self.user_id, chats = changed.len(), "persisted chat timestamps");
                self.saved.extend(changed);
                true
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "failed to persist chat timestamps, will retry");
                false
            }
        }
    }
}
