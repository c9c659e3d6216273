//! ChatRelay core - conversation memory for a chat-to-completion relay.
//!
//! Inbound chat messages are appended to a per-conversation log, the log is
//! trimmed to the model's token budget, the completion endpoint is called
//! and the reply is split into transport-sized chunks.
//!
//! - [`tokens`] counts the prompt cost of a message sequence
//! - [`store`] owns every conversation's log behind a per-key lock
//! - [`memory`] trims a log to its budget and wraps the completion call
//! - [`chunk`] splits replies at paragraph, line, sentence or word boundaries
//! - [`controller`] drives turns and behavior changes

pub mod chunk;
pub mod completion;
pub mod config;
pub mod controller;
pub mod error;
pub mod expiry;
pub mod memory;
pub mod message;
pub mod store;
pub mod template;
pub mod tokens;
pub mod transport;

pub use chunk::{DEFAULT_MAX_LEN, Segment, chunk_message, chunk_segments};
pub use completion::{
    CompletionClient, CompletionRequest, CompletionResponse, MockCompletionClient, MockStep,
    SamplingParams, TokenUsage,
};
pub use config::{CompletionProvider, RelayConfig};
pub use controller::{ControllerConfig, ConversationController, TurnOutcome, TurnPhase};
pub use error::{APOLOGY, RelayError, Result};
pub use expiry::IdleExpiry;
pub use memory::{BudgetPolicy, FittedReply, MemoryManager, TrimReport};
pub use message::{Message, Role};
pub use store::{ConversationEntry, ConversationKey, ConversationLog, ConversationStore};
pub use template::{FileTemplateStore, InMemoryTemplateStore, Template, TemplateStore};
pub use tokens::{ChatFraming, TokenCounter, TokenEncoder};
pub use transport::{InboundMessage, Transport, deliver};
