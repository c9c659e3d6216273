//! Conversation store - per-key message logs with key-scoped locking.
//!
//! Every conversation key owns one [`ConversationEntry`]: an ordered
//! [`ConversationLog`] behind its own async mutex plus a last-activity clock.
//! The key → entry map is a [`DashMap`], so creating a brand-new key is atomic
//! (one winning creator) while turns on unrelated keys never contend.
//!
//! Mutating operations live on [`ConversationLog`] itself, which can only be
//! reached through a lock guard; holding the guard is the proof that no other
//! turn is touching the same log.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::message::Message;
use crate::template::Template;

/// Identifier partitioning independent message histories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    /// A conversation channel shared by everyone in it.
    Channel(String),
    /// An ephemeral side conversation with one user who mentioned the bot
    /// outside a conversation channel.
    Mention(String),
}

impl ConversationKey {
    /// Resolve the key for an inbound message.
    pub fn resolve(channel_id: &str, sender_id: &str, out_of_channel_mention: bool) -> Self {
        if out_of_channel_mention {
            Self::Mention(sender_id.to_string())
        } else {
            Self::Channel(channel_id.to_string())
        }
    }

    /// Whether the conversation expires after a period of inactivity.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Mention(_))
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel:{id}"),
            Self::Mention(id) => write!(f, "mention:{id}"),
        }
    }
}

/// Ordered message log whose leading `behavior_length` messages are protected
/// from eviction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    messages: Vec<Message>,
    behavior_length: usize,
}

impl ConversationLog {
    /// Create a log; `behavior_length` is clamped to the number of messages.
    pub fn new(messages: Vec<Message>, behavior_length: usize) -> Self {
        let behavior_length = behavior_length.min(messages.len());
        Self {
            messages,
            behavior_length,
        }
    }

    /// Log seeded from a template; the whole template becomes the prefix.
    pub fn from_template(template: &Template) -> Self {
        Self::new(template.messages.clone(), template.behavior_length())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn behavior_length(&self) -> usize {
        self.behavior_length
    }

    /// The protected prefix.
    pub fn behavior(&self) -> &[Message] {
        &self.messages[..self.behavior_length]
    }

    /// Everything after the protected prefix, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.messages[self.behavior_length..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message at the end of the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Remove the oldest message after the protected prefix.
    ///
    /// Returns `None` when only the prefix is left.
    pub fn evict_oldest(&mut self) -> Option<Message> {
        if self.messages.len() > self.behavior_length {
            Some(self.messages.remove(self.behavior_length))
        } else {
            None
        }
    }

    /// Swap the whole log; used by load/new behavior and reset.
    pub fn replace(&mut self, messages: Vec<Message>, behavior_length: usize) {
        *self = Self::new(messages, behavior_length);
    }

    /// Replace the log with a template's messages.
    pub fn reseed(&mut self, template: &Template) {
        self.replace(template.messages.clone(), template.behavior_length());
    }
}

/// One conversation: its log lock and activity clock.
#[derive(Debug)]
pub struct ConversationEntry {
    key: ConversationKey,
    log: Arc<Mutex<ConversationLog>>,
    last_activity: SyncMutex<Instant>,
    created_at: DateTime<Utc>,
}

impl ConversationEntry {
    fn new(key: ConversationKey, log: ConversationLog) -> Self {
        Self {
            key,
            log: Arc::new(Mutex::new(log)),
            last_activity: SyncMutex::new(Instant::now()),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Acquire exclusive access to the log. Released when the guard drops.
    pub async fn lock(&self) -> OwnedMutexGuard<ConversationLog> {
        self.log.clone().lock_owned().await
    }

    /// Run `f` with exclusive access to the log.
    pub async fn with_lock<T>(&self, f: impl FnOnce(&mut ConversationLog) -> T) -> T {
        let mut guard = self.log.lock().await;
        f(&mut guard)
    }

    /// Whether a turn or administrative operation currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.log.try_lock().is_err()
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Owner of every conversation's state.
#[derive(Debug, Default)]
pub struct ConversationStore {
    entries: DashMap<ConversationKey, Arc<ConversationEntry>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking lookup.
    pub fn get(&self, key: &ConversationKey) -> Option<Arc<ConversationEntry>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Lookup that also records activity.
    ///
    /// The touch happens while the map shard is held, so a concurrent
    /// [`ConversationStore::remove_if_idle`] either runs first or sees the
    /// fresh activity.
    pub fn touch(&self, key: &ConversationKey) -> Option<Arc<ConversationEntry>> {
        let entry = self.entries.get(key)?;
        entry.touch();
        Some(entry.value().clone())
    }

    /// Return the entry for `key`, creating it from `seed` if absent, and
    /// record activity on it.
    ///
    /// Creation is atomic: concurrent callers for the same new key all get
    /// the single entry built by whichever caller won.
    pub fn get_or_init(&self, key: &ConversationKey, seed: &Template) -> Arc<ConversationEntry> {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            debug!(%key, template = %seed.name, "Creating conversation");
            Arc::new(ConversationEntry::new(
                key.clone(),
                ConversationLog::from_template(seed),
            ))
        });
        entry.touch();
        entry.value().clone()
    }

    /// Run `f` under the entry's lock. Returns `None` if `key` is unknown.
    pub async fn with_lock<T>(
        &self,
        key: &ConversationKey,
        f: impl FnOnce(&mut ConversationLog) -> T,
    ) -> Option<T> {
        // Clone the entry out of the map; a map guard must never be held across an await.
        let entry = self.get(key)?;
        Some(entry.with_lock(f).await)
    }

    /// Delete a conversation. Safe with or without its lock held.
    pub fn remove(&self, key: &ConversationKey) -> Option<Arc<ConversationEntry>> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    /// Delete a conversation only if it has been idle for at least `window`
    /// and nobody holds its lock.
    pub fn remove_if_idle(&self, key: &ConversationKey, window: Duration) -> bool {
        self.entries
            .remove_if(key, |_, entry| {
                entry.idle_for() >= window && !entry.is_locked()
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<ConversationKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}
