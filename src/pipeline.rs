use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{field, info, info_span, warn, Instrument, Span};

use crate::config::Config;
use crate::pr::url::EXPECTED_FORMAT;
use crate::pr::{self, GitHubClient, PrError, PrRef, PullRequest, PullRequestSource, ValidationError};
use crate::review::{self, AnthropicClient, ReviewError, ReviewModel, ReviewResult};

/// Where a review request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Fetching,
    Reviewing,
    Displaying,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Reviewing => "reviewing",
            Stage::Displaying => "displaying",
            Stage::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] PrError),

    #[error(transparent)]
    Review(#[from] ReviewError),
}

/// The user-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Bad input; fixed by re-entering the URL
    Validation,
    /// A credential was rejected; needs an operator
    Auth,
    NotFound,
    /// Provider throttling; retry later
    RateLimit,
    /// Transient connectivity failure; retry
    Network,
    /// The AI provider declined or failed to generate
    Model,
    /// GitHub answered with something unexpected
    Upstream,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Fetch(err) => match err {
                PrError::NotFound(_) => ErrorKind::NotFound,
                PrError::Auth { .. } => ErrorKind::Auth,
                PrError::RateLimited { .. } => ErrorKind::RateLimit,
                PrError::Network(_) => ErrorKind::Network,
                PrError::Api { .. } | PrError::Decode(_) | PrError::DiffParse(_) | PrError::Client(_) => {
                    ErrorKind::Upstream
                }
            },
            PipelineError::Review(err) => match err {
                ReviewError::Auth { .. } => ErrorKind::Auth,
                ReviewError::RateLimited { .. } => ErrorKind::RateLimit,
                ReviewError::Network(_) => ErrorKind::Network,
                ReviewError::Model(_) | ReviewError::Client(_) => ErrorKind::Model,
            },
        }
    }

    /// Short label for the error view heading.
    pub fn title(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "Invalid pull request URL",
            ErrorKind::Auth => "Credential rejected",
            ErrorKind::NotFound => "Pull request not found",
            ErrorKind::RateLimit => "Rate limited",
            ErrorKind::Network => "Network error",
            ErrorKind::Model => "Review failed",
            ErrorKind::Upstream => "Unexpected GitHub response",
        }
    }

    /// Human-readable explanation, including what the user can do about it.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Validation(ValidationError::Empty) => {
                "Please enter a GitHub PR URL".to_string()
            }
            PipelineError::Validation(err) => {
                format!(
                    "Invalid GitHub PR URL format: {}. Please use: {}",
                    err, EXPECTED_FORMAT
                )
            }
            PipelineError::Fetch(err) => match err {
                PrError::NotFound(pr) => format!(
                    "Pull request {} does not exist, or the configured GitHub token cannot access it.",
                    pr
                ),
                PrError::Auth { .. } => {
                    "GitHub rejected the configured token. An operator needs to update GITHUB_TOKEN."
                        .to_string()
                }
                PrError::RateLimited { retry_after_secs } => {
                    rate_limit_message("GitHub", *retry_after_secs)
                }
                PrError::Network(_) => {
                    "Could not reach GitHub. Please check the connection and try again.".to_string()
                }
                other => format!("Error fetching PR: {}", other),
            },
            PipelineError::Review(err) => match err {
                ReviewError::Auth { .. } => {
                    "The AI provider rejected the configured API key. An operator needs to update ANTHROPIC_API_KEY."
                        .to_string()
                }
                ReviewError::RateLimited { retry_after_secs } => {
                    rate_limit_message("The AI provider", *retry_after_secs)
                }
                ReviewError::Network(_) => {
                    "Could not reach the AI provider. Please try again.".to_string()
                }
                other => format!("Error generating review: {}", other),
            },
        }
    }
}

fn rate_limit_message(provider: &str, retry_after_secs: Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(
            "{} is rate limiting requests. Please try again in {} seconds.",
            provider, secs
        ),
        None => format!(
            "{} is rate limiting requests. Please try again later.",
            provider
        ),
    }
}

/// A completed review request.
#[derive(Debug, Clone)]
pub struct Reviewed {
    pub pr_ref: PrRef,
    pub pr: PullRequest,
    pub review: ReviewResult,
}

/// A failed review request. `pr` is kept when only the review step failed.
#[derive(Debug)]
pub struct Failure {
    pub error: PipelineError,
    pub pr_ref: Option<PrRef>,
    pub pr: Option<PullRequest>,
}

/// Parse, fetch, review: one sequential run per user action.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn PullRequestSource>,
    model: Arc<dyn ReviewModel>,
    max_prompt_chars: usize,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn PullRequestSource>,
        model: Arc<dyn ReviewModel>,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            source,
            model,
            max_prompt_chars,
        }
    }

    /// Wire the GitHub and Anthropic clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let source = GitHubClient::new(config)?;
        let model = AnthropicClient::new(config)?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(model),
            config.max_prompt_chars,
        ))
    }

    pub async fn run(&self, input: &str) -> Result<Reviewed, Failure> {
        // Raw input is never recorded; it may carry credentials.
        let span = info_span!("review_pr", pr = field::Empty);
        self.run_stages(input).instrument(span).await
    }

    async fn run_stages(&self, input: &str) -> Result<Reviewed, Failure> {
        let pr_ref = pr::parse_pr_url(input).map_err(|e| fail(e.into(), None, None))?;
        Span::current().record("pr", field::display(&pr_ref));

        info!(stage = %Stage::Fetching, "fetching pull request");
        let pr = self
            .source
            .fetch(&pr_ref)
            .await
            .map_err(|e| fail(e.into(), Some(pr_ref.clone()), None))?;

        info!(
            stage = %Stage::Reviewing,
            files = pr.files.len(),
            diff_bytes = pr.diff.len(),
            "requesting review"
        );
        let review = match review::request_review(self.model.as_ref(), &pr, self.max_prompt_chars).await {
            Ok(review) => review,
            Err(e) => return Err(fail(e.into(), Some(pr_ref), Some(pr))),
        };

        info!(stage = %Stage::Displaying, recommendation = ?review.recommendation, "review complete");
        Ok(Reviewed { pr_ref, pr, review })
    }
}

fn fail(error: PipelineError, pr_ref: Option<PrRef>, pr: Option<PullRequest>) -> Failure {
    warn!(stage = %Stage::Error, kind = ?error.kind(), error = %error, "review request failed");
    Failure { error, pr_ref, pr }
}
