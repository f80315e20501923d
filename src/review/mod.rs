pub mod anthropic;
pub mod prompt;
pub mod types;

pub use anthropic::AnthropicClient;
pub use types::{Recommendation, ReviewResult};

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::pr::PullRequest;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("the AI provider rejected the configured API key ({status})")]
    Auth { status: StatusCode },

    #[error("the AI provider is rate limiting or overloaded")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("could not reach the AI provider: {0}")]
    Network(#[source] reqwest::Error),

    #[error("the model failed to produce a review: {0}")]
    Model(String),

    #[error("failed to build AI HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// A text-completion backend able to review a prompt.
#[async_trait]
pub trait ReviewModel: Send + Sync {
    /// Model identifier shown next to the review
    fn name(&self) -> &str;

    /// Send one prompt and return the model's answer unmodified.
    async fn complete(&self, prompt: &str) -> Result<String, ReviewError>;
}

/// Build the prompt for `pr`, send it to `model` once, and parse the answer.
#[instrument(skip_all, fields(pr = pr.number, model = model.name()))]
pub async fn request_review(
    model: &dyn ReviewModel,
    pr: &PullRequest,
    max_prompt_chars: usize,
) -> Result<ReviewResult, ReviewError> {
    let prompt = prompt::build_prompt(pr, max_prompt_chars);
    if prompt.diff_truncated {
        warn!(
            diff_chars = pr.diff.chars().count(),
            max_prompt_chars, "diff truncated to fit the prompt budget"
        );
    }
    debug!(prompt_chars = prompt.text.chars().count(), "sending review request");

    let text = model.complete(&prompt.text).await?;
    debug!(review_chars = text.chars().count(), "received review");

    Ok(ReviewResult::from_text(text, model.name(), prompt.diff_truncated))
}
