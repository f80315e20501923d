use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::review::prompt::MIN_PROMPT_CHARS;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
/// Roughly 25k tokens of English text or code, well under the model's context window.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 100_000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set; add it to the environment or a .env file")]
    Missing(&'static str),

    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// An opaque credential. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Process-wide settings, read once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub bearer token (`GITHUB_TOKEN`)
    pub github_token: Secret,
    /// Anthropic API key (`ANTHROPIC_API_KEY`)
    pub anthropic_api_key: Secret,
    /// GitHub REST base URL, overridable for GitHub Enterprise or tests
    pub github_api_url: String,
    /// Anthropic API base URL
    pub anthropic_base_url: String,
    /// Model identifier sent with every review request
    pub model: String,
    /// Completion token cap
    pub max_tokens: u32,
    /// Upper bound on the assembled prompt, in characters
    pub max_prompt_chars: usize,
    /// Transport timeout applied to both upstream APIs
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn load() -> Result<Config, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup (useful for testing).
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let github_token = Secret::new(required("GITHUB_TOKEN")?);
        let anthropic_api_key = Secret::new(required("ANTHROPIC_API_KEY")?);

        let max_prompt_chars = parse_number("REVIEW_MAX_PROMPT_CHARS", get("REVIEW_MAX_PROMPT_CHARS"))?
            .unwrap_or(DEFAULT_MAX_PROMPT_CHARS);
        if max_prompt_chars < MIN_PROMPT_CHARS {
            return Err(ConfigError::Invalid {
                var: "REVIEW_MAX_PROMPT_CHARS",
                value: max_prompt_chars.to_string(),
                reason: format!("must be at least {}", MIN_PROMPT_CHARS),
            });
        }

        Ok(Config {
            github_token,
            anthropic_api_key,
            github_api_url: get("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            anthropic_base_url: get("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse_number("REVIEW_MAX_TOKENS", get("REVIEW_MAX_TOKENS"))?
                .unwrap_or(DEFAULT_MAX_TOKENS),
            max_prompt_chars,
            http_timeout: Duration::from_secs(
                parse_number("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"))?
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        })
    }
}

fn parse_number<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let Some(value) = value else {
        return Ok(None);
    };
    let parsed = value.parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        value: value.clone(),
        reason: e.to_string(),
    })?;
    if parsed <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Some(parsed))
}
