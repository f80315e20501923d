use serde::Serialize;
use std::fmt;

/// Everything fetched from GitHub for one pull request.
/// Built from the REST metadata response plus the parsed unified diff;
/// lives only for a single review request.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// PR title
    pub title: String,
    /// PR body; empty when the author left none
    pub description: String,
    /// Author's GitHub login
    pub author: String,
    /// "open", "closed" or "merged"
    pub state: String,
    pub draft: bool,
    /// Branch the PR merges into
    pub base_branch: String,
    /// Branch the PR merges from
    pub head_branch: String,
    /// Browser URL of the PR
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
    /// Total files changed, as reported by GitHub
    pub files_changed: usize,
    /// Total lines added
    pub additions: usize,
    /// Total lines deleted
    pub deletions: usize,
    /// Parsed diff files
    pub files: Vec<DiffFile>,
    /// Raw unified diff text
    pub diff: String,
}

/// How a file was touched by the PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    Renamed,
    Modified,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileStatus::Added => "added",
            FileStatus::Removed => "removed",
            FileStatus::Renamed => "renamed",
            FileStatus::Modified => "modified",
        };
        f.write_str(label)
    }
}

/// A single file within the PR diff.
#[derive(Debug, Clone, Serialize)]
pub struct DiffFile {
    /// File path (e.g., "src/auth/config.rs")
    pub path: String,
    /// Previous path when the file was renamed
    pub old_path: Option<String>,
    /// Whether this is a new file
    pub is_new: bool,
    /// Whether this file was deleted
    pub is_deleted: bool,
    /// Whether the diff marks the file as binary (no hunks)
    pub is_binary: bool,
    /// Lines added in this file
    pub additions: usize,
    /// Lines deleted in this file
    pub deletions: usize,
    /// Hunks (contiguous changed regions)
    pub hunks: Vec<Hunk>,
}

impl DiffFile {
    pub fn status(&self) -> FileStatus {
        if self.is_new {
            FileStatus::Added
        } else if self.is_deleted {
            FileStatus::Removed
        } else if self.old_path.is_some() {
            FileStatus::Renamed
        } else {
            FileStatus::Modified
        }
    }

    /// The file's hunks rendered back to unified diff text.
    pub fn patch(&self) -> String {
        let mut patch = String::new();
        for hunk in &self.hunks {
            patch.push_str(&hunk.header());
            patch.push('\n');
            for line in &hunk.lines {
                patch.push_str(line);
                patch.push('\n');
            }
        }
        patch
    }
}

/// A contiguous region of changes within a file.
#[derive(Debug, Clone, Serialize)]
pub struct Hunk {
    /// Starting line number in the old file
    pub old_start: usize,
    /// Number of lines in the old file
    pub old_count: usize,
    /// Starting line number in the new file
    pub new_start: usize,
    /// Number of lines in the new file
    pub new_count: usize,
    /// Raw lines of the hunk (prefixed with +, -, or space)
    pub lines: Vec<String>,
}

impl Hunk {
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }
}
