//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_http_error, ChatCompletion, CompletionOptions, LlmError, LlmResult};
use crate::models::ConversationTurn;

/// Default OpenAI API endpoint
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model used for all onboarding calls
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI (or compatible) provider
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(
        &'a self,
        turns: &'a [ConversationTurn],
        options: &CompletionOptions,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: turns,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.kind.expects_json().then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

/// Pull the first choice's text out of a completion body
fn first_choice_text(body: ChatCompletionResponse) -> LlmResult<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(LlmError::EmptyResponse)
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        turns: &[ConversationTurn],
        options: &CompletionOptions,
    ) -> LlmResult<String> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let request = self.build_request(turns, options);
        log::debug!(
            "LLM {} call: {} turns, model {}",
            options.kind.as_str(),
            turns.len(),
            self.model
        );

        let send = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .timeout(options.timeout)
            .json(&request)
            .send();

        // reqwest's own timeout covers the body; this one also covers connect stalls
        let response = tokio::time::timeout(options.timeout, send)
            .await
            .map_err(|_| LlmError::Timeout(options.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(options.timeout)
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body));
        }

        let body = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        first_choice_text(body)
    }
}
