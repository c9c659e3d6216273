//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use chatrelay_core::{
    CompletionClient, CompletionRequest, CompletionResponse, Message, RelayError, TokenUsage,
};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

/// Longest provider error body carried into an error message.
const MAX_ERROR_BODY: usize = 512;

/// OpenAI client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

async fn response_to_error(response: Response) -> RelayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}... [truncated]", &body[..cut]),
        None => body,
    };
    RelayError::CompletionFailed(format!("OpenAI returned {status}: {message}"))
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> chatrelay_core::Result<CompletionResponse> {
        let body = OpenAiRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            frequency_penalty: request.sampling.frequency_penalty,
            presence_penalty: request.sampling.presence_penalty,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::CompletionFailed(format!("OpenAI request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(response_to_error(response).await);
        }

        let data: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| RelayError::CompletionFailed(format!("Invalid OpenAI response: {e}")))?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::CompletionFailed("No response from OpenAI".to_string()))?;

        let usage = data
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::SamplingParams;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            vec![Message::system("Be brief."), Message::user("Hi")],
            50,
        )
        .with_sampling(SamplingParams {
            temperature: 0.5,
            ..SamplingParams::default()
        })
    }

    #[tokio::test]
    async fn posts_chat_completion_and_reads_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 50,
                "temperature": 0.5,
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 2, "total_tokens": 14}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test").with_base_url(format!("{}/", server.uri()));
        let response = client.complete(request()).await.unwrap();

        assert_eq!(response.content, "Hello!");
        assert_eq!(
            response.usage,
            TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 2,
                total_tokens: 14
            }
        );
    }

    #[tokio::test]
    async fn error_status_becomes_truncated_completion_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("x".repeat(2000)))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test").with_base_url(server.uri());
        let err = client.complete(request()).await.unwrap_err();

        let RelayError::CompletionFailed(message) = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(message.contains("429"));
        assert!(message.ends_with("... [truncated]"));
        assert!(message.len() < 700);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn empty_choices_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test").with_base_url(server.uri());
        assert!(matches!(
            client.complete(request()).await,
            Err(RelayError::CompletionFailed(msg)) if msg.contains("No response")
        ));
    }
}
