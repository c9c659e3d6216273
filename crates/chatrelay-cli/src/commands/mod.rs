pub mod chat;
pub mod config;
pub mod split;
pub mod templates;

use std::sync::Arc;

use anyhow::{Context, Result};
use chatrelay_core::{CompletionClient, CompletionProvider, MockCompletionClient, RelayConfig};

use crate::openai::OpenAiClient;

/// Build the completion client selected by the configuration.
pub fn build_client(config: &RelayConfig) -> Result<Arc<dyn CompletionClient>> {
    let completion = &config.completion;
    match completion.provider {
        CompletionProvider::Echo => Ok(Arc::new(MockCompletionClient::new(&completion.model))),
        CompletionProvider::OpenAi => {
            let api_key = completion
                .api_key
                .clone()
                .filter(|key| !key.is_empty())
                .context("OpenAI API key not found (set OPENAI_API_KEY or completion.api_key)")?;
            Ok(Arc::new(
                OpenAiClient::new(api_key)
                    .with_model(&completion.model)
                    .with_base_url(&completion.base_url),
            ))
        }
    }
}
