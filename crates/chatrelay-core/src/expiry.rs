//! Idle expiry of ephemeral conversations.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{debug, info};

use crate::store::{ConversationKey, ConversationStore};

/// Default idle window for mention conversations.
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(300);

/// Schedules removal of conversations that stay idle for a whole window.
#[derive(Debug, Clone)]
pub struct IdleExpiry {
    store: Arc<ConversationStore>,
    window: Duration,
}

impl IdleExpiry {
    pub fn new(store: Arc<ConversationStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start a timer for `key`. When it fires the conversation is removed
    /// only if nothing touched it in the meantime and it is not locked, so a
    /// stale timer never deletes an active conversation.
    ///
    /// The handle resolves to whether the conversation was removed.
    pub fn schedule(&self, key: ConversationKey) -> JoinHandle<bool> {
        let store = self.store.clone();
        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            let removed = store.remove_if_idle(&key, window);
            if removed {
                info!(%key, "Forgetting idle conversation");
            } else {
                debug!(%key, "Conversation still active; expiry skipped");
            }
            removed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;

    fn setup() -> (Arc<ConversationStore>, IdleExpiry, ConversationKey) {
        let store = Arc::new(ConversationStore::new());
        let expiry = IdleExpiry::new(store.clone(), DEFAULT_IDLE_WINDOW);
        let key = ConversationKey::Mention("u1".into());
        store.get_or_init(&key, &Template::empty("default"));
        (store, expiry, key)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_conversation_is_removed() {
        let (store, expiry, key) = setup();
        assert!(expiry.schedule(key.clone()).await.unwrap());
        assert!(store.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_remove_a_touched_conversation() {
        let (store, expiry, key) = setup();
        let first = expiry.schedule(key.clone());

        sleep(Duration::from_secs(200)).await;
        store.get(&key).unwrap().touch();
        let second = expiry.schedule(key.clone());

        assert!(!first.await.unwrap());
        assert!(store.get(&key).is_some());
        assert!(second.await.unwrap());
        assert!(store.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn locked_conversation_survives_its_timer() {
        let (store, expiry, key) = setup();
        let entry = store.get(&key).unwrap();
        let guard = entry.lock().await;

        assert!(!expiry.schedule(key.clone()).await.unwrap());
        drop(guard);
        assert!(store.get(&key).is_some());
    }
}
