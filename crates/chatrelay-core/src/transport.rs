//! Transport collaborator: where inbound messages come from and replies go.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::store::ConversationKey;

/// Message received from a chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-specific message id
    pub id: String,
    /// Channel the message arrived in; replies go back here
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Text with any bot mention already stripped by the transport
    pub content: String,
    /// Whether the message mentioned the bot outside a conversation channel
    pub out_of_channel_mention: bool,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            sender_name: None,
            content: content.into(),
            out_of_channel_mention: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Mark as a mention outside a conversation channel.
    pub fn as_mention(mut self) -> Self {
        self.out_of_channel_mention = true;
        self
    }

    /// Conversation this message belongs to.
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::resolve(&self.channel_id, &self.sender_id, self.out_of_channel_mention)
    }
}

/// Outbound side of a chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name, for logs.
    fn name(&self) -> &str;

    /// Send one chunk to a channel.
    async fn send(&self, channel_id: &str, text: &str) -> Result<()>;
}

/// Send `chunks` in order, stopping at the first failure.
///
/// Chunks sent before the failure stay sent. Returns the number of chunks
/// delivered.
pub async fn deliver(transport: &dyn Transport, channel_id: &str, chunks: &[String]) -> Result<usize> {
    let total = chunks.len();
    for (index, chunk) in chunks.iter().enumerate() {
        transport.send(channel_id, chunk).await.map_err(|e| {
            RelayError::DeliveryFailed(format!(
                "chunk {}/{total} to {channel_id} via {}: {e}",
                index + 1,
                transport.name()
            ))
        })?;
        debug!(channel_id, chunk = index + 1, total, "Delivered chunk");
    }
    Ok(total)
}

/// Recording transport for unit tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every sent chunk; optionally fails from a given send onward.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        sent: Arc<tokio::sync::Mutex<Vec<(String, String)>>>,
        attempts: Arc<AtomicUsize>,
        fail_from: Option<usize>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the `n`th send (0-based) and every send after it.
        pub fn failing_from(n: usize) -> Self {
            Self {
                fail_from: Some(n),
                ..Self::default()
            }
        }

        /// Get all sent `(channel_id, text)` pairs
        pub async fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().await.clone()
        }

        pub async fn texts(&self) -> Vec<String> {
            self.sent().await.into_iter().map(|(_, text)| text).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_from.is_some_and(|n| attempt >= n) {
                return Err(RelayError::Io(std::io::Error::other("connection closed")));
            }
            self.sent
                .lock()
                .await
                .push((channel_id.to_string(), text.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::RecordingTransport;

    #[test]
    fn mention_messages_key_by_sender() {
        let message = InboundMessage::new("general", "u42", "hi").as_mention();
        assert_eq!(
            message.conversation_key(),
            ConversationKey::Mention("u42".into())
        );
        let plain = InboundMessage::new("gpt", "u42", "hi");
        assert_eq!(plain.conversation_key(), ConversationKey::Channel("gpt".into()));
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let transport = RecordingTransport::new();
        let chunks = vec!["one".to_string(), "two".to_string(), "three".to_string()];

        let sent = deliver(&transport, "c1", &chunks).await.unwrap();
        assert_eq!(sent, 3);
        assert_eq!(transport.texts().await, chunks);
    }

    #[tokio::test]
    async fn first_failure_stops_delivery() {
        let transport = RecordingTransport::failing_from(1);
        let chunks = vec!["one".to_string(), "two".to_string(), "three".to_string()];

        let err = deliver(&transport, "c1", &chunks).await.unwrap_err();
        assert!(matches!(&err, RelayError::DeliveryFailed(msg) if msg.contains("chunk 2/3")));
        assert_eq!(transport.texts().await, vec!["one"]);
    }
}
