// SMS side-channel: assistant turns delivered through an SMS echo service

use crate::llm::{parse_http_error, LlmError, LlmResult};
use crate::models::ConversationTurn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces the next assistant turn for sessions on the SMS channel
#[async_trait]
pub trait SmsEcho: Send + Sync {
    async fn echo(&self, session_id: &str, turns: &[ConversationTurn]) -> LlmResult<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EchoRequest<'a> {
    session_id: &'a str,
    messages: &'a [ConversationTurn],
}

#[derive(Deserialize)]
struct EchoResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// Webhook-backed SMS echo: POSTs the transcript and reads `{ "reply": ... }`
pub struct HttpSmsEcho {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpSmsEcho {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SmsEcho for HttpSmsEcho {
    async fn echo(&self, session_id: &str, turns: &[ConversationTurn]) -> LlmResult<String> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&EchoRequest {
                session_id,
                messages: turns,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body));
        }

        let body: EchoResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        body.reply.ok_or(LlmError::EmptyResponse)
    }
}
