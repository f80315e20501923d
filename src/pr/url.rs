use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const EXPECTED_FORMAT: &str = "https://github.com/owner/repo/pull/123";

/// Why a PR URL was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a GitHub PR URL")]
    Empty,

    #[error("{0:?} is not a valid URL")]
    Malformed(String),

    #[error("unsupported scheme {0:?}: only https URLs are accepted")]
    UnsupportedScheme(String),

    #[error("host {0:?} is not github.com")]
    WrongHost(String),

    #[error("the URL must not contain a user name or password")]
    UserInfo,

    #[error("the URL path must contain owner, repository, \"pull\" and a PR number")]
    MissingSegments,

    #[error("{0:?} is not a pull request path; expected /owner/repo/pull/<number>")]
    NotAPullRequest(String),

    #[error("{0:?} is not a positive PR number")]
    InvalidNumber(String),

    #[error("unexpected trailing content {0:?} after the PR number")]
    TrailingContent(String),
}

/// Owner, repository and number identifying one pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Parse a GitHub PR URL into its component parts.
///
/// Accepts `https://github.com/{owner}/{repo}/pull/{number}` with an optional
/// trailing slash. Anything after the number, including a query string or
/// fragment, is rejected, as are ports, credentials and empty path segments.
pub fn parse_pr_url(input: &str) -> Result<PrRef, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ValidationError::Empty);
    }

    let parsed =
        reqwest::Url::parse(input).map_err(|_| ValidationError::Malformed(input.to_string()))?;

    if parsed.scheme() != "https" {
        return Err(ValidationError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(ValidationError::UserInfo);
    }

    match (parsed.host_str(), parsed.port()) {
        (Some("github.com"), None) => {}
        (host, Some(port)) => {
            return Err(ValidationError::WrongHost(format!(
                "{}:{}",
                host.unwrap_or_default(),
                port
            )))
        }
        (host, None) => return Err(ValidationError::WrongHost(host.unwrap_or_default().to_string())),
    }

    if let Some(query) = parsed.query() {
        return Err(ValidationError::TrailingContent(format!("?{}", query)));
    }
    if let Some(fragment) = parsed.fragment() {
        return Err(ValidationError::TrailingContent(format!("#{}", fragment)));
    }

    let mut segments: Vec<&str> = parsed
        .path_segments()
        .ok_or(ValidationError::MissingSegments)?
        .collect();
    // One trailing slash is allowed; any other empty segment is not.
    if segments.last() == Some(&"") {
        segments.pop();
    }
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(ValidationError::Malformed(parsed.path().to_string()));
    }

    let [owner, repo, kind, number, rest @ ..] = segments.as_slice() else {
        return Err(ValidationError::MissingSegments);
    };

    if *kind != "pull" {
        return Err(ValidationError::NotAPullRequest(parsed.path().to_string()));
    }

    let number = match number.parse::<u64>() {
        Ok(n) if n > 0 && number.bytes().all(|b| b.is_ascii_digit()) => n,
        _ => return Err(ValidationError::InvalidNumber(number.to_string())),
    };

    if !rest.is_empty() {
        return Err(ValidationError::TrailingContent(format!("/{}", rest.join("/"))));
    }

    Ok(PrRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}
