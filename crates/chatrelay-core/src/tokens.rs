//! Token counting for chat-formatted prompts.
//!
//! A [`TokenCounter`] combines a [`TokenEncoder`] (how many tokens a piece of
//! text costs) with a [`ChatFraming`] (the fixed cost of wrapping messages in
//! the model's chat markup). Counting is deterministic and side-effect free.
//!
//! Only strategies that are actually implemented can be constructed:
//! [`TokenCounter::for_model`] fails with
//! [`RelayError::UnsupportedCountingModel`] instead of guessing, because a
//! wrong count corrupts every trim decision made from it.

use std::fmt;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::{RelayError, Result};
use crate::message::Message;

/// Counting model name selecting the character-estimate strategy.
pub const ESTIMATE_MODEL: &str = "estimate";

const CHARS_PER_TOKEN: usize = 4;

/// Fixed per-call and per-message costs of a chat markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatFraming {
    /// Cost of the delimiters around every message.
    pub tokens_per_message: usize,
    /// Adjustment applied when a message carries a `name` field.
    pub tokens_per_name: isize,
    /// Cost of priming the assistant reply, paid once per call.
    pub reply_priming: usize,
}

impl ChatFraming {
    /// `<im_start>{role/name}\n{content}<im_end>\n`; a name replaces the role token.
    pub const CHATML_0301: Self = Self {
        tokens_per_message: 4,
        tokens_per_name: -1,
        reply_priming: 2,
    };

    /// Framing used by the gpt-4 family.
    pub const CHATML: Self = Self {
        tokens_per_message: 3,
        tokens_per_name: 1,
        reply_priming: 3,
    };

    /// No framing at all; only the encoded text is counted.
    pub const NONE: Self = Self {
        tokens_per_message: 0,
        tokens_per_name: 0,
        reply_priming: 0,
    };
}

/// Maps text to a token count.
pub trait TokenEncoder: Send + Sync {
    /// Vocabulary or strategy name, for logs.
    fn name(&self) -> &str;

    /// Number of tokens `text` encodes to.
    fn encode_len(&self, text: &str) -> usize;
}

/// `cl100k_base` byte-pair encoding.
pub struct Cl100kEncoder {
    bpe: CoreBPE,
}

impl Cl100kEncoder {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RelayError::Config(format!("failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe })
    }
}

impl fmt::Debug for Cl100kEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cl100kEncoder").finish_non_exhaustive()
    }
}

impl TokenEncoder for Cl100kEncoder {
    fn name(&self) -> &str {
        "cl100k_base"
    }

    fn encode_len(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Rough estimate: one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimateEncoder;

impl TokenEncoder for CharEstimateEncoder {
    fn name(&self) -> &str {
        ESTIMATE_MODEL
    }

    fn encode_len(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// Counts the prompt cost of a message sequence.
#[derive(Clone)]
pub struct TokenCounter {
    model: String,
    framing: ChatFraming,
    encoder: Arc<dyn TokenEncoder>,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("model", &self.model)
            .field("framing", &self.framing)
            .field("encoder", &self.encoder.name())
            .finish()
    }
}

impl TokenCounter {
    /// Build a counter from an explicit framing and encoder.
    pub fn new(framing: ChatFraming, encoder: Arc<dyn TokenEncoder>) -> Self {
        Self {
            model: encoder.name().to_string(),
            framing,
            encoder,
        }
    }

    /// Build the counter implemented for `model`.
    pub fn for_model(model: &str) -> Result<Self> {
        let normalized = model.trim().to_ascii_lowercase();
        let (framing, encoder): (ChatFraming, Arc<dyn TokenEncoder>) = match normalized.as_str()
        {
            "gpt-3.5-turbo" | "gpt-3.5-turbo-0301" => {
                (ChatFraming::CHATML_0301, Arc::new(Cl100kEncoder::new()?))
            }
            m if m == "gpt-4" || m.starts_with("gpt-4-") => {
                (ChatFraming::CHATML, Arc::new(Cl100kEncoder::new()?))
            }
            ESTIMATE_MODEL => (ChatFraming::CHATML_0301, Arc::new(CharEstimateEncoder)),
            _ => return Err(RelayError::UnsupportedCountingModel(model.to_string())),
        };

        Ok(Self {
            model: normalized,
            framing,
            encoder,
        })
    }

    /// Counting model this counter was built for.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn framing(&self) -> ChatFraming {
        self.framing
    }

    /// Cost of a full prompt, including reply priming.
    pub fn count(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|message| self.count_message(message))
            .sum::<usize>()
            + self.framing.reply_priming
    }

    /// Cost of one message inside a prompt, without reply priming.
    pub fn count_message(&self, message: &Message) -> usize {
        let mut tokens = (self.framing.tokens_per_message
            + self.encoder.encode_len(message.role.as_str())
            + self.encoder.encode_len(&message.content)) as isize;

        if let Some(name) = &message.name {
            tokens += self.encoder.encode_len(name) as isize + self.framing.tokens_per_name;
        }

        tokens.max(0) as usize
    }
}
