//! Deterministic completion client for tests and offline runs.
//!
//! Scripted replies are consumed in order; once the script runs dry the client
//! echoes the last user message back, which is also what the CLI's offline
//! `echo` provider relies on.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::error::{RelayError, Result};

use super::{CompletionClient, CompletionRequest, CompletionResponse, TokenUsage};

/// What a scripted step resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStepKind {
    /// Assistant reply text.
    Text(String),
    /// Provider failure with a reason.
    Error(String),
}

/// One scripted completion, optionally delayed.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay: Duration,
    pub kind: MockStepKind,
}

impl MockStep {
    fn immediate(kind: MockStepKind) -> Self {
        Self {
            delay: Duration::ZERO,
            kind,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::immediate(MockStepKind::Text(content.into()))
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::immediate(MockStepKind::Error(reason.into()))
    }

    /// Fail like a provider that gave up after `delay_ms`.
    pub fn timeout(delay_ms: u64) -> Self {
        Self::error("mock timeout").with_delay(delay_ms)
    }

    pub fn with_delay(self, delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            ..self
        }
    }
}

/// Completion client that replays a script and records every request.
#[derive(Debug, Clone, Default)]
pub struct MockCompletionClient {
    model: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockCompletionClient {
    /// Client with an empty script; every call echoes.
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_steps(model, Vec::new())
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(steps.into())),
            requests: Arc::default(),
        }
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    fn echo(request: &CompletionRequest) -> String {
        match request.last_user_content() {
            Some(content) => format!("mock-echo: {content}"),
            None => "mock-ok".to_string(),
        }
    }

    /// Word counts stand in for token counts on both sides.
    fn respond(request: &CompletionRequest, content: String) -> CompletionResponse {
        let words = |text: &str| text.split_whitespace().count() as u32;
        let prompt_tokens = request.messages.iter().map(|m| words(&m.content)).sum::<u32>();
        let completion_tokens = words(&content);
        CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        }
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().await.push(request.clone());
        let step = self.script.lock().await.pop_front();

        let Some(MockStep { delay, kind }) = step else {
            let text = Self::echo(&request);
            return Ok(Self::respond(&request, text));
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }
        match kind {
            MockStepKind::Text(content) => Ok(Self::respond(&request, content)),
            MockStepKind::Error(reason) => Err(RelayError::CompletionFailed(reason)),
        }
    }
}
