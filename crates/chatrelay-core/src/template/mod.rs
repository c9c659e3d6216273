//! Behavior templates
//!
//! A template is a named, persisted conversation log used to seed new
//! conversations or to replace an existing one. It lives on disk in a plain
//! `role: content` text form (see [`format`]) and is reached through the
//! [`TemplateStore`] contract.

pub mod format;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::message::Message;

pub use format::{parse_messages, render_messages};
pub use store::{FileTemplateStore, InMemoryTemplateStore, TemplateStore, validate_name};

/// Named message sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub messages: Vec<Message>,
}

impl Template {
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
        }
    }

    /// Template with no messages; seeds an empty conversation.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Parse the text form.
    pub fn parse(name: impl Into<String>, text: &str) -> Self {
        Self::new(name, parse_messages(text))
    }

    /// Render the text form.
    pub fn to_text(&self) -> String {
        render_messages(&self.messages)
    }

    /// Number of protected messages a conversation seeded from this template
    /// starts with. Every template message belongs to the prefix.
    pub fn behavior_length(&self) -> usize {
        self.messages.len()
    }
}
