//! Anthropic Messages API implementation of [`ReviewModel`].

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{ReviewError, ReviewModel};
use crate::config::{Config, Secret};

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Anthropic's "overloaded" status.
const OVERLOADED: u16 = 529;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Secret,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &Config) -> Result<Self, ReviewError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(ReviewError::Client)?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/v1/messages",
                config.anthropic_base_url.trim_end_matches('/')
            ),
            api_key: config.anthropic_api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[async_trait]
impl ReviewModel for AnthropicClient {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.chars().count()))]
    async fn complete(&self, prompt: &str) -> Result<String, ReviewError> {
        let payload = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(ReviewError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, response).await);
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ReviewError::Model(format!("undecodable response: {}", e)))?;
        debug!(stop_reason = ?body.stop_reason, blocks = body.content.len(), "received completion");

        match body.stop_reason.as_deref() {
            Some("refusal") => {
                return Err(ReviewError::Model(
                    "the model declined to review this pull request".to_string(),
                ))
            }
            Some("max_tokens") => warn!("review was cut off at the token limit"),
            _ => {}
        }

        let text: String = body
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(ReviewError::Model(
                "the response did not contain any review text".to_string(),
            ));
        }
        Ok(text)
    }
}

async fn error_for_status(status: StatusCode, response: reqwest::Response) -> ReviewError {
    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match status.as_u16() {
        401 | 403 => ReviewError::Auth { status },
        429 | OVERLOADED => ReviewError::RateLimited { retry_after_secs },
        _ => {
            let detail = match response.text().await {
                Ok(body) => match serde_json::from_str::<ErrorEnvelope>(&body) {
                    Ok(envelope) => format!("{}: {}", envelope.error.kind, envelope.error.message),
                    Err(_) => truncate_for_message(&body, 200),
                },
                Err(_) => "(failed to read error response body)".to_string(),
            };
            ReviewError::Model(format!("provider returned {}: {}", status.as_u16(), detail))
        }
    }
}

fn truncate_for_message(message: &str, max_chars: usize) -> String {
    let mut chars = message.chars();
    let mut output: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        output.push_str("...");
    }
    output
}
