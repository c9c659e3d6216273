//! Completion collaborator: the language-model endpoint behind every turn.

mod client;
mod mock_client;

pub use client::{
    CompletionClient, CompletionRequest, CompletionResponse, SamplingParams, TokenUsage,
};
pub use mock_client::{MockCompletionClient, MockStep, MockStepKind};
