//! Memory manager - keeps a conversation inside its token budget.
//!
//! Before every completion call the log is trimmed by evicting the oldest
//! message after the behavior prefix, one at a time, until the share of the
//! budget left for the reply reaches [`BudgetPolicy::min_remaining_ratio`].
//! The prefix is never evicted; if it alone leaves too little room the turn
//! fails with [`RelayError::BudgetExhausted`] and the model is not called.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::completion::{CompletionClient, CompletionRequest, SamplingParams, TokenUsage};
use crate::error::{RelayError, Result};
use crate::message::Message;
use crate::store::ConversationLog;
use crate::tokens::TokenCounter;

/// Default per-call token budget (prompt + reply).
pub const DEFAULT_BUDGET: usize = 4096;

/// Default minimum share of the budget left for the reply.
pub const DEFAULT_MIN_REMAINING_RATIO: f64 = 0.2;

/// Token budget for one model call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetPolicy {
    /// Maximum tokens a call may consume, prompt and reply together.
    pub budget: usize,
    /// Trimming continues while `(budget - used) / budget` is below this.
    pub min_remaining_ratio: f64,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            min_remaining_ratio: DEFAULT_MIN_REMAINING_RATIO,
        }
    }
}

impl BudgetPolicy {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    pub fn with_min_remaining_ratio(mut self, ratio: f64) -> Self {
        self.min_remaining_ratio = ratio;
        self
    }

    /// Share of the budget left after `used` prompt tokens; negative when
    /// the prompt alone exceeds the budget.
    pub fn remaining_fraction(&self, used: usize) -> f64 {
        let budget = self.budget.max(1) as f64;
        (budget - used as f64) / budget
    }

    /// Whether a prompt of `used` tokens leaves enough room for the reply.
    pub fn fits(&self, used: usize) -> bool {
        self.remaining_fraction(used) >= self.min_remaining_ratio
    }

    /// Tokens left for the reply.
    pub fn remaining(&self, used: usize) -> usize {
        self.budget.saturating_sub(used)
    }
}

/// Outcome of trimming a log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Messages evicted from the front of the history.
    pub evicted: usize,
    /// Prompt tokens after trimming.
    pub used_tokens: usize,
    /// Tokens left for the reply.
    pub remaining_tokens: usize,
}

/// Assistant reply appended by [`MemoryManager::fit`].
#[derive(Debug, Clone)]
pub struct FittedReply {
    pub message: Message,
    pub usage: TokenUsage,
    pub trim: TrimReport,
    /// Budget left once the reply is counted. Telemetry only; the next turn
    /// recounts from the log.
    pub remaining_after_reply: i64,
}

/// Trims logs to a budget and wraps the completion call.
pub struct MemoryManager {
    counter: TokenCounter,
    client: Arc<dyn CompletionClient>,
    policy: BudgetPolicy,
    sampling: SamplingParams,
}

impl MemoryManager {
    pub fn new(counter: TokenCounter, client: Arc<dyn CompletionClient>, policy: BudgetPolicy) -> Self {
        Self {
            counter,
            client,
            policy,
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn policy(&self) -> BudgetPolicy {
        self.policy
    }

    /// Trim `log` under the configured policy.
    pub fn trim(&self, log: &mut ConversationLog) -> Result<TrimReport> {
        self.trim_within(log, self.policy)
    }

    /// Evict oldest non-prefix messages until `policy` is satisfied.
    ///
    /// Evictions made before a [`RelayError::BudgetExhausted`] stay applied.
    pub fn trim_within(&self, log: &mut ConversationLog, policy: BudgetPolicy) -> Result<TrimReport> {
        let mut used = self.counter.count(log.messages());
        let mut evicted = 0;

        while !policy.fits(used) {
            let Some(oldest) = log.evict_oldest() else {
                break;
            };
            used = used.saturating_sub(self.counter.count_message(&oldest));
            evicted += 1;
            debug!(role = %oldest.role, used, budget = policy.budget, "Evicted oldest message");
        }

        if !policy.fits(used) {
            warn!(
                used,
                budget = policy.budget,
                behavior_length = log.behavior_length(),
                "Behavior prefix leaves no room for a reply"
            );
            return Err(RelayError::BudgetExhausted {
                used,
                budget: policy.budget,
            });
        }

        Ok(TrimReport {
            evicted,
            used_tokens: used,
            remaining_tokens: policy.remaining(used),
        })
    }

    /// Trim, request a completion and append the assistant reply.
    pub async fn fit(&self, log: &mut ConversationLog) -> Result<FittedReply> {
        self.fit_within(log, self.policy).await
    }

    /// [`MemoryManager::fit`] with an explicit policy.
    ///
    /// A failed completion leaves the log exactly as trimming left it.
    pub async fn fit_within(
        &self,
        log: &mut ConversationLog,
        policy: BudgetPolicy,
    ) -> Result<FittedReply> {
        let trim = self.trim_within(log, policy)?;
        let max_tokens = u32::try_from(trim.remaining_tokens).unwrap_or(u32::MAX);
        let request =
            CompletionRequest::new(log.messages().to_vec(), max_tokens).with_sampling(self.sampling);

        let response = self
            .client
            .complete(request)
            .await
            .map_err(RelayError::into_completion_failure)?;

        let usage = response.usage;
        let remaining_after_reply = trim.remaining_tokens as i64 - i64::from(usage.completion_tokens);
        info!(
            provider = self.client.provider(),
            model = self.client.model(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            remaining_tokens = remaining_after_reply,
            evicted = trim.evicted,
            "Completion finished"
        );

        let message = Message::assistant(response.content);
        log.push(message.clone());

        Ok(FittedReply {
            message,
            usage,
            trim,
            remaining_after_reply,
        })
    }
}
