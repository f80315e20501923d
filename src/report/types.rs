use serde::Serialize;

use crate::pr::types::FileStatus;
use crate::review::ReviewResult;

/// A changed file, flattened for display.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    /// Previous path for renames
    pub old_path: Option<String>,
    pub status: FileStatus,
    pub additions: usize,
    pub deletions: usize,
    pub is_binary: bool,
    /// Unified diff of this file
    pub patch: String,
}

/// Everything shown for one pull request: its details and, when the review
/// step succeeded, the AI review.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// "owner/repo#number"
    pub pr_ref: String,
    /// PR number
    pub pr_number: u64,
    /// PR title
    pub pr_title: String,
    /// PR author
    pub author: String,
    pub state: String,
    pub draft: bool,
    pub base_branch: String,
    pub head_branch: String,
    pub url: String,
    /// ISO-8601 timestamps from GitHub
    pub created_at: String,
    pub updated_at: String,
    /// PR body, empty when none was given
    pub description: String,
    /// Files changed count
    pub files_changed: usize,
    /// Lines added
    pub additions: usize,
    /// Lines deleted
    pub deletions: usize,
    /// e.g. "3 files changed, +4 -2"
    pub diff_summary: String,
    pub files: Vec<FileSummary>,
    pub review: Option<ReviewResult>,
}
