pub mod diff;
pub mod types;
pub mod url;

pub use types::PullRequest;
pub use url::{parse_pr_url, PrRef, ValidationError};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::{Config, Secret};

const GITHUB_JSON: &str = "application/vnd.github+json";
const GITHUB_DIFF: &str = "application/vnd.github.diff";
const GITHUB_API_VERSION: &str = "2022-11-28";
const CLIENT_NAME: &str = concat!("pr-reviewer/", env!("CARGO_PKG_VERSION"));
const FILES_PER_PAGE: usize = 100;
/// GitHub lists at most 3000 files per pull request.
const MAX_FILE_PAGES: usize = 30;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("pull request {0} was not found or is not accessible with the configured token")]
    NotFound(PrRef),

    #[error("GitHub rejected the configured token ({status})")]
    Auth { status: StatusCode },

    #[error("GitHub rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("could not reach GitHub: {0}")]
    Network(#[source] reqwest::Error),

    #[error("GitHub returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("unexpected GitHub response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("Failed to parse diff: {0}")]
    DiffParse(String),

    #[error("failed to build GitHub HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Something that can produce the data of a pull request.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    async fn fetch(&self, pr: &PrRef) -> Result<PullRequest, PrError>;
}

/// GitHub REST API implementation of [`PullRequestSource`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Secret,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self, PrError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(PrError::Client)?;
        Ok(Self {
            http,
            base_url: config.github_api_url.trim_end_matches('/').to_string(),
            token: config.github_token.clone(),
        })
    }

    fn pull_url(&self, pr: &PrRef) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}",
            self.base_url, pr.owner, pr.repo, pr.number
        )
    }

    async fn get(&self, pr: &PrRef, url: &str, accept: &str) -> Result<Response, PrError> {
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, CLIENT_NAME)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(PrError::Network)?;
        check_status(pr, response).await
    }

    /// Page through `/pulls/{n}/files`, which GitHub serves even when the
    /// whole diff is too large to render.
    async fn list_files(&self, pr: &PrRef, pull_url: &str) -> Result<Vec<FileEntry>, PrError> {
        let mut entries = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let url = format!("{}/files?per_page={}&page={}", pull_url, FILES_PER_PAGE, page);
            let batch = self
                .get(pr, &url, GITHUB_JSON)
                .await?
                .json::<Vec<FileEntry>>()
                .await
                .map_err(PrError::Decode)?;
            let last = batch.len() < FILES_PER_PAGE;
            entries.extend(batch);
            if last {
                break;
            }
        }
        debug!(files = entries.len(), "received PR files list");
        Ok(entries)
    }
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct Branch {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    body: Option<String>,
    user: User,
    state: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    merged: bool,
    base: Branch,
    head: Branch,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    changed_files: usize,
    #[serde(default)]
    additions: usize,
    #[serde(default)]
    deletions: usize,
}

#[async_trait]
impl PullRequestSource for GitHubClient {
    /// Fetch PR metadata (JSON) and then the unified diff of the same PR,
    /// and merge them into one [`PullRequest`].
    #[instrument(skip(self), fields(owner = %pr.owner, repo = %pr.repo, pr = pr.number))]
    async fn fetch(&self, pr: &PrRef) -> Result<PullRequest, PrError> {
        let pull_url = self.pull_url(pr);

        debug!("fetching PR metadata from GitHub API");
        let metadata = self
            .get(pr, &pull_url, GITHUB_JSON)
            .await?
            .json::<PullResponse>()
            .await
            .map_err(PrError::Decode)?;
        debug!(title = %metadata.title, changed_files = metadata.changed_files, "received PR metadata");

        debug!("fetching PR diff from GitHub API");
        let (diff, files) = match self.get(pr, &pull_url, GITHUB_DIFF).await {
            Ok(response) => {
                let diff = response.text().await.map_err(PrError::Decode)?;
                debug!(diff_bytes = diff.len(), "received PR diff");
                let files = diff::parse_diff(&diff)?;
                (diff, files)
            }
            Err(PrError::Api { status, message }) if status == StatusCode::NOT_ACCEPTABLE => {
                warn!(%message, "GitHub refused to render the diff; falling back to the files list");
                let entries = self.list_files(pr, &pull_url).await?;
                diff::from_file_entries(&entries)?
            }
            Err(err) => return Err(err),
        };
        debug!(parsed_files = files.len(), "parsed diff");

        let state = if metadata.merged {
            "merged".to_string()
        } else {
            metadata.state
        };

        Ok(PullRequest {
            number: metadata.number,
            title: metadata.title,
            description: metadata.body.unwrap_or_default(),
            author: metadata.user.login,
            state,
            draft: metadata.draft,
            base_branch: metadata.base.name,
            head_branch: metadata.head.name,
            html_url: metadata.html_url,
            created_at: metadata.created_at,
            updated_at: metadata.updated_at,
            files_changed: if metadata.changed_files > 0 {
                metadata.changed_files
            } else {
                files.len()
            },
            additions: metadata.additions,
            deletions: metadata.deletions,
            files,
            diff,
        })
    }
}

/// Map a non-success GitHub response to the matching [`PrError`].
async fn check_status(pr: &PrRef, response: Response) -> Result<Response, PrError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let headers = response.headers();
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    let retry_after_secs = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match status {
        StatusCode::NOT_FOUND => Err(PrError::NotFound(pr.clone())),
        StatusCode::TOO_MANY_REQUESTS => Err(PrError::RateLimited { retry_after_secs }),
        StatusCode::FORBIDDEN if exhausted => Err(PrError::RateLimited { retry_after_secs }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PrError::Auth { status }),
        _ => {
            let message = response
                .json::<ApiMessage>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| "no error message".to_string());
            Err(PrError::Api { status, message })
        }
    }
}

/// One entry of GitHub's pull request files list.
#[derive(Debug, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub previous_filename: Option<String>,
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
    /// Missing for binary files and for files whose patch is too large
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub const WIDGETS_DIFF: &str = r#"diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 pub fn spin() {
-    panic!("bug");
+    println!("fixed");
 }
diff --git a/src/widget.rs b/src/widget.rs
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/src/widget.rs
@@ -0,0 +1,2 @@
+pub struct Widget;
+impl Widget {}
diff --git a/README.md b/README.md
index 4444444..5555555 100644
--- a/README.md
+++ b/README.md
@@ -1,1 +1,1 @@
-Widgets
+Widgets, without the bug
"#;

    pub fn widgets_pr_json() -> serde_json::Value {
        serde_json::json!({
            "number": 42,
            "title": "Fix bug",
            "body": "Stops the widget from panicking.",
            "user": { "login": "octocat" },
            "state": "open",
            "draft": false,
            "merged": false,
            "base": { "ref": "main" },
            "head": { "ref": "fix-bug" },
            "html_url": "https://github.com/acme/widgets/pull/42",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-02T11:30:00Z",
            "changed_files": 3,
            "additions": 4,
            "deletions": 2
        })
    }

    pub fn widgets_ref() -> PrRef {
        PrRef {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            number: 42,
        }
    }

    pub fn test_config(github_url: &str, anthropic_url: &str) -> Config {
        Config {
            github_token: Secret::new("ghp_test"),
            anthropic_api_key: Secret::new("sk-ant-test"),
            github_api_url: github_url.to_string(),
            anthropic_base_url: anthropic_url.to_string(),
            model: "claude-test".to_string(),
            max_tokens: 1000,
            max_prompt_chars: 20_000,
            http_timeout: Duration::from_secs(5),
        }
    }

    /// Mount the metadata and diff responses for acme/widgets#42.
    pub async fn mount_widgets_pr(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .and(header("accept", GITHUB_JSON))
            .and(header("authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widgets_pr_json()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .and(header("accept", GITHUB_DIFF))
            .respond_with(ResponseTemplate::new(200).set_body_string(WIDGETS_DIFF))
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&test_config(&server.uri(), "http://unused.invalid")).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_payload_fields() {
        let server = MockServer::start().await;
        mount_widgets_pr(&server).await;

        let pr = client_for(&server).fetch(&widgets_ref()).await.unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.title, "Fix bug");
        assert_eq!(pr.description, "Stops the widget from panicking.");
        assert_eq!(pr.author, "octocat");
        assert_eq!(pr.state, "open");
        assert_eq!(pr.base_branch, "main");
        assert_eq!(pr.head_branch, "fix-bug");
        assert_eq!(pr.html_url, "https://github.com/acme/widgets/pull/42");
        assert_eq!(pr.files_changed, 3);
        assert_eq!(pr.additions, 4);
        assert_eq!(pr.deletions, 2);
        assert_eq!(pr.diff, WIDGETS_DIFF);
        let paths: Vec<&str> = pr.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["src/lib.rs", "src/widget.rs", "README.md"]);
    }

    #[tokio::test]
    async fn test_missing_body_and_merged_state() {
        let server = MockServer::start().await;
        let mut payload = widgets_pr_json();
        payload["body"] = serde_json::Value::Null;
        payload["state"] = serde_json::json!("closed");
        payload["merged"] = serde_json::json!(true);
        Mock::given(method("GET"))
            .and(header("accept", GITHUB_JSON))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("accept", GITHUB_DIFF))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let pr = client_for(&server).fetch(&widgets_ref()).await.unwrap();
        assert_eq!(pr.description, "");
        assert_eq!(pr.state, "merged");
        assert!(pr.files.is_empty());
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).fetch(&widgets_ref()).await.unwrap_err();
        assert!(matches!(err, PrError::NotFound(ref r) if *r == widgets_ref()));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch(&widgets_ref()).await.unwrap_err();
        assert!(matches!(err, PrError::Auth { status } if status == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("retry-after", "60"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).fetch(&widgets_ref()).await.unwrap_err();
        assert!(matches!(
            err,
            PrError::RateLimited {
                retry_after_secs: Some(60)
            }
        ));
    }

    #[tokio::test]
    async fn test_diff_too_large_falls_back_to_files_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .and(header("accept", GITHUB_JSON))
            .respond_with(ResponseTemplate::new(200).set_body_json(widgets_pr_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .and(header("accept", GITHUB_DIFF))
            .respond_with(ResponseTemplate::new(406).set_body_json(
                serde_json::json!({"message": "Sorry, the diff exceeded the maximum number of files"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42/files"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "filename": "src/lib.rs",
                    "status": "modified",
                    "additions": 1,
                    "deletions": 1,
                    "patch": "@@ -1,3 +1,3 @@\n pub fn spin() {\n-    panic!(\"bug\");\n+    println!(\"fixed\");\n }"
                },
                {
                    "filename": "src/widget.rs",
                    "status": "added",
                    "additions": 2,
                    "deletions": 0,
                    "patch": "@@ -0,0 +1,2 @@\n+pub struct Widget;\n+impl Widget {}"
                },
                {
                    "filename": "data/fixtures.json",
                    "status": "modified",
                    "additions": 90000,
                    "deletions": 1
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let pr = client_for(&server).fetch(&widgets_ref()).await.unwrap();
        assert_eq!(pr.title, "Fix bug");
        let paths: Vec<&str> = pr.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["src/lib.rs", "src/widget.rs", "data/fixtures.json"]);
        assert!(pr.files[1].is_new);
        assert_eq!(pr.files[2].additions, 90000);
        assert!(pr.diff.contains("+    println!(\"fixed\");"));
        assert!(pr.diff.contains("diff --git a/data/fixtures.json b/data/fixtures.json"));
    }

    #[tokio::test]
    async fn test_files_list_is_paginated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .and(header("accept", GITHUB_JSON))
            .respond_with(ResponseTemplate::new(200).set_body_json(widgets_pr_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .and(header("accept", GITHUB_DIFF))
            .respond_with(ResponseTemplate::new(406))
            .mount(&server)
            .await;
        let first_page: Vec<serde_json::Value> = (0..FILES_PER_PAGE)
            .map(|i| serde_json::json!({"filename": format!("gen/file_{i}.rs"), "status": "added", "additions": 1, "patch": "@@ -0,0 +1 @@\n+x"}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42/files"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42/files"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"filename": "README.md", "status": "modified", "additions": 1, "deletions": 1, "patch": "@@ -1 +1 @@\n-a\n+b"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let pr = client_for(&server).fetch(&widgets_ref()).await.unwrap();
        assert_eq!(pr.files.len(), FILES_PER_PAGE + 1);
        assert_eq!(pr.files[FILES_PER_PAGE].path, "README.md");
    }

    #[tokio::test]
    async fn test_plain_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch(&widgets_ref()).await.unwrap_err();
        assert!(matches!(
            err,
            PrError::RateLimited {
                retry_after_secs: None
            }
        ));
    }

    #[tokio::test]
    async fn test_other_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"message": "Server Error"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).fetch(&widgets_ref()).await.unwrap_err();
        match err {
            PrError::Api { status, message } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "Server Error");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_network_failure() {
        let config = test_config("http://127.0.0.1:1", "http://unused.invalid");
        let err = GitHubClient::new(&config)
            .unwrap()
            .fetch(&widgets_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, PrError::Network(_)));
    }
}
