//! Conversation controller - drives one inbound message through a turn.
//!
//! A turn resolves the conversation key, takes the conversation's lock,
//! appends the user message, fits the log and requests a completion, then
//! releases the lock before chunking and delivering the reply. Administrative
//! transitions (wipe, reset, load/new/save behavior) take the same lock.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::chunk::{DEFAULT_MAX_LEN, chunk_message};
use crate::config::RelayConfig;
use crate::completion::CompletionClient;
use crate::error::{RelayError, Result};
use crate::expiry::{DEFAULT_IDLE_WINDOW, IdleExpiry};
use crate::memory::MemoryManager;
use crate::message::Message;
use crate::store::{ConversationEntry, ConversationKey, ConversationLog, ConversationStore};
use crate::template::{Template, TemplateStore, validate_name};
use crate::transport::{InboundMessage, Transport, deliver};

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Largest chunk handed to the transport, in characters
    pub max_chunk_len: usize,
    /// Idle time after which a mention conversation is forgotten
    pub mention_idle_window: Duration,
    /// Upper bound on one completion call
    pub completion_timeout: Duration,
    /// Template used by reset and as the initial active template
    pub default_template: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: DEFAULT_MAX_LEN,
            mention_idle_window: DEFAULT_IDLE_WINDOW,
            completion_timeout: Duration::from_secs(120),
            default_template: "default".to_string(),
        }
    }
}

/// Stage of a turn, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Resolving,
    Locking,
    Fitting,
    Chunking,
    Delivering,
    Failed,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Locking => "locking",
            Self::Fitting => "fitting",
            Self::Chunking => "chunking",
            Self::Delivering => "delivering",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of [`ConversationController::respond`].
#[derive(Debug)]
pub enum TurnOutcome {
    /// Every chunk of the reply reached the transport.
    Delivered { key: ConversationKey, chunks: usize },
    /// The turn failed before a reply existed; an apology was sent.
    Failed {
        key: ConversationKey,
        error: RelayError,
    },
    /// The reply was produced but not fully delivered.
    Undelivered {
        key: ConversationKey,
        error: RelayError,
    },
}

impl TurnOutcome {
    pub fn key(&self) -> &ConversationKey {
        match self {
            Self::Delivered { key, .. } | Self::Failed { key, .. } | Self::Undelivered { key, .. } => {
                key
            }
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Orchestrates turns and administrative transitions over a shared store.
pub struct ConversationController {
    store: Arc<ConversationStore>,
    manager: MemoryManager,
    templates: Arc<dyn TemplateStore>,
    expiry: IdleExpiry,
    active_template: RwLock<String>,
    config: ControllerConfig,
}

impl ConversationController {
    pub fn new(
        store: Arc<ConversationStore>,
        manager: MemoryManager,
        templates: Arc<dyn TemplateStore>,
        config: ControllerConfig,
    ) -> Self {
        let expiry = IdleExpiry::new(store.clone(), config.mention_idle_window);
        Self {
            store,
            manager,
            templates,
            expiry,
            active_template: RwLock::new(config.default_template.clone()),
            config,
        }
    }

    /// Build a controller from validated configuration.
    pub fn from_config(
        config: &RelayConfig,
        client: Arc<dyn CompletionClient>,
        templates: Arc<dyn TemplateStore>,
    ) -> Result<Self> {
        config.validate()?;
        let manager = MemoryManager::new(config.token_counter()?, client, config.budget_policy())
            .with_sampling(config.sampling());
        Ok(Self::new(
            Arc::new(ConversationStore::new()),
            manager,
            templates,
            config.controller_config(),
        ))
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn manager(&self) -> &MemoryManager {
        &self.manager
    }

    /// Name of the template new conversations are seeded from.
    pub fn active_template(&self) -> String {
        self.active_template.read().clone()
    }

    /// Names of every persisted template.
    pub async fn available_templates(&self) -> Result<Vec<String>> {
        self.with_templates(|templates| templates.list()).await
    }

    /// Copy of a conversation's log, if it exists.
    pub async fn snapshot(&self, key: &ConversationKey) -> Option<ConversationLog> {
        self.store.with_lock(key, |log| log.clone()).await
    }

    /// Run one turn and return the reply chunks.
    ///
    /// On failure the user message stays in the log and no assistant message
    /// is appended.
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<Vec<String>> {
        let key = message.conversation_key();
        debug!(%key, phase = %TurnPhase::Resolving, "Resolving conversation");
        let entry = self.entry_for(&key).await;

        let fitted = {
            debug!(%key, phase = %TurnPhase::Locking, "Waiting for conversation lock");
            let mut log = entry.lock().await;
            entry.touch();

            debug!(%key, phase = %TurnPhase::Fitting, "Fitting conversation");
            log.push(Message::user(message.content.clone()));
            let fitted = match timeout(self.config.completion_timeout, self.manager.fit(&mut log)).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::CompletionFailed(format!(
                    "no reply within {}s",
                    self.config.completion_timeout.as_secs_f64()
                ))),
            };
            entry.touch();
            fitted
        };

        self.schedule_expiry(&key);

        let reply = fitted?;
        debug!(%key, phase = %TurnPhase::Chunking, "Chunking reply");
        Ok(chunk_message(&reply.message.content, self.config.max_chunk_len))
    }

    /// Run one turn and deliver the reply through `transport`.
    ///
    /// Turn failures are reported to the conversation with an apology;
    /// delivery failures are only logged.
    pub async fn respond(&self, message: &InboundMessage, transport: &dyn Transport) -> TurnOutcome {
        let key = message.conversation_key();

        match self.handle_message(message).await {
            Ok(chunks) => {
                debug!(%key, phase = %TurnPhase::Delivering, chunks = chunks.len(), "Delivering reply");
                match deliver(transport, &message.channel_id, &chunks).await {
                    Ok(sent) => {
                        info!(%key, chunks = sent, phase = %TurnPhase::Idle, "Turn complete");
                        TurnOutcome::Delivered { key, chunks: sent }
                    }
                    Err(error) => {
                        warn!(%key, %error, "Reply delivery failed");
                        TurnOutcome::Undelivered { key, error }
                    }
                }
            }
            Err(error) => {
                warn!(%key, %error, phase = %TurnPhase::Failed, "Turn failed");
                if let Err(send_error) = transport.send(&message.channel_id, &error.user_message()).await {
                    warn!(%key, error = %send_error, "Failed to report turn failure");
                }
                TurnOutcome::Failed { key, error }
            }
        }
    }

    /// Reseed the conversation from the active template.
    pub async fn wipe(&self, key: &ConversationKey) -> Result<Template> {
        let template = self.seed_template(self.active_template()).await;
        self.reseed(key, &template).await;
        info!(%key, template = %template.name, "Memory wiped");
        Ok(template)
    }

    /// Reseed the conversation from the default template and make it active.
    pub async fn reset(&self, key: &ConversationKey) -> Result<Template> {
        let name = self.config.default_template.clone();
        let template = self.seed_template(name.clone()).await;
        self.reseed(key, &template).await;
        *self.active_template.write() = name;
        info!(%key, template = %template.name, "Behavior reset");
        Ok(template)
    }

    /// Replace the conversation with a persisted template, matched
    /// case-insensitively, and make it active.
    ///
    /// An unknown name fails with [`RelayError::TemplateNotFound`] and
    /// changes nothing.
    pub async fn load_behavior(&self, key: &ConversationKey, name: &str) -> Result<Template> {
        let wanted = validate_name(name)?;
        let template = self
            .with_templates(move |templates| {
                let found = templates
                    .find(&wanted)?
                    .ok_or(RelayError::TemplateNotFound(wanted))?;
                templates.load(&found)
            })
            .await?;

        self.reseed(key, &template).await;
        *self.active_template.write() = template.name.clone();
        info!(%key, template = %template.name, "Behavior loaded");
        Ok(template)
    }

    /// Replace the conversation with messages parsed from `text`.
    ///
    /// The active template is left unchanged.
    pub async fn new_behavior(&self, key: &ConversationKey, text: &str) -> Result<Template> {
        let template = Template::parse("custom", text);
        self.reseed(key, &template).await;
        info!(%key, messages = template.messages.len(), "Behavior replaced");
        Ok(template)
    }

    /// Persist the conversation under `name` and return its text form.
    ///
    /// The log is copied under the lock; writing happens after it is released.
    pub async fn save_behavior(&self, key: &ConversationKey, name: &str) -> Result<String> {
        let name = validate_name(name)?;
        let messages = self
            .entry_for(key)
            .await
            .with_lock(|log| log.messages().to_vec())
            .await;
        self.schedule_expiry(key);

        let saved = self
            .with_templates(move |templates| templates.save(&name, &messages))
            .await?;
        info!(%key, template = %saved.name, messages = saved.messages.len(), "Behavior saved");
        Ok(saved.to_text())
    }

    /// Drop the conversation entirely.
    pub fn forget(&self, key: &ConversationKey) -> bool {
        let removed = self.store.remove(key).is_some();
        if removed {
            info!(%key, "Conversation forgotten");
        }
        removed
    }

    /// Existing or freshly seeded entry for `key`, with activity recorded.
    async fn entry_for(&self, key: &ConversationKey) -> Arc<ConversationEntry> {
        if let Some(entry) = self.store.touch(key) {
            return entry;
        }
        let template = self.seed_template(self.active_template()).await;
        self.store.get_or_init(key, &template)
    }

    async fn reseed(&self, key: &ConversationKey, template: &Template) {
        self.entry_for(key)
            .await
            .with_lock(|log| log.reseed(template))
            .await;
        self.schedule_expiry(key);
    }

    /// Mention conversations are forgotten after the idle window.
    fn schedule_expiry(&self, key: &ConversationKey) {
        if key.is_ephemeral() {
            self.expiry.schedule(key.clone());
        }
    }

    /// Load a seed template; a missing or unreadable one seeds an empty log.
    async fn seed_template(&self, name: String) -> Template {
        let lookup = name.clone();
        match self.with_templates(move |templates| templates.load(&lookup)).await {
            Ok(template) => template,
            Err(error) => {
                warn!(template = %name, %error, "Seeding conversation without a template");
                Template::empty(name)
            }
        }
    }

    /// Run template store I/O on the blocking pool.
    async fn with_templates<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TemplateStore) -> Result<T> + Send + 'static,
    {
        let templates = self.templates.clone();
        tokio::task::spawn_blocking(move || f(templates.as_ref()))
            .await
            .map_err(|e| RelayError::Io(std::io::Error::other(e)))?
    }
}
