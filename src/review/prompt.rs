use std::fmt::Write;

use crate::pr::PullRequest;

/// Appended where the diff was cut short.
pub const TRUNCATION_MARKER: &str = "[... diff truncated: the remaining changes were omitted to fit the review budget ...]";

const TRUNCATION_NOTE: &str = "Note: this diff was too large to include in full and has been truncated. \
Review only the changes shown, and say so in your summary.\n\n";

const MAX_LISTED_FILES: usize = 200;

const INSTRUCTIONS: &str = "Please review this GitHub Pull Request. \
Answer in markdown using exactly these `##` headings, in this order:

## Summary
A brief overview of what this PR does.
## Code Quality
Assessment of code quality, patterns, and best practices.
## Potential Issues
Any bugs, security concerns, or problems you identify.
## Suggestions
Recommendations for improvements.
## Overall Assessment
Your overall recommendation: Approve, Request Changes, or Comment.

Here's the PR data:

";

const DIFF_CLOSE: &str = "```\n";

/// The text sent to the model.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub diff_truncated: bool,
}

/// Smallest accepted prompt budget. Below this the instructions and PR
/// metadata alone leave no room for any diff.
pub const MIN_PROMPT_CHARS: usize = 2_000;

/// Assemble the review prompt, keeping it within `max_chars` characters.
///
/// Title and description are always kept intact. When the whole PR does not
/// fit, the diff is cut at a line boundary where possible and a note plus
/// [`TRUNCATION_MARKER`] tell the model the context is partial. If the fixed
/// part is still too large, the changed-files list is shortened as well. Only
/// a title and description that by themselves exceed the budget push the
/// prompt over it.
pub fn build_prompt(pr: &PullRequest, max_chars: usize) -> Prompt {
    let diff = if pr.diff.trim().is_empty() {
        "(no textual changes; the PR only touches binary files or is empty)\n"
    } else {
        pr.diff.as_str()
    };

    let mut listed = pr.files.len().min(MAX_LISTED_FILES);
    let mut metadata = describe(pr, listed);
    let full = assemble(&metadata, "", diff, "");
    if full.chars().count() <= max_chars {
        return Prompt {
            text: full,
            diff_truncated: false,
        };
    }

    while fixed_chars(&metadata) > max_chars && listed > 0 {
        listed -= 1;
        metadata = describe(pr, listed);
    }
    let kept = cut_at_line(diff, max_chars.saturating_sub(fixed_chars(&metadata)));
    let marker = format!("{}\n", TRUNCATION_MARKER);

    Prompt {
        text: assemble(&metadata, TRUNCATION_NOTE, kept, &marker),
        diff_truncated: true,
    }
}

/// Everything in a truncated prompt except the kept part of the diff.
fn fixed_chars(metadata: &str) -> usize {
    INSTRUCTIONS.chars().count()
        + TRUNCATION_NOTE.chars().count()
        + metadata.chars().count()
        + diff_open().chars().count()
        + TRUNCATION_MARKER.chars().count()
        // marker newline, plus the separator added when the cut lands mid-line
        + 2
        + DIFF_CLOSE.chars().count()
}

fn diff_open() -> &'static str {
    "# Diff\n\n```diff\n"
}

fn assemble(metadata: &str, note: &str, diff: &str, marker: &str) -> String {
    let mut text = String::with_capacity(
        INSTRUCTIONS.len() + note.len() + metadata.len() + diff.len() + marker.len() + 32,
    );
    text.push_str(INSTRUCTIONS);
    text.push_str(note);
    text.push_str(metadata);
    text.push_str(diff_open());
    text.push_str(diff);
    if !diff.is_empty() && !diff.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(marker);
    text.push_str(DIFF_CLOSE);
    text
}

fn describe(pr: &PullRequest, listed: usize) -> String {
    let description = if pr.description.trim().is_empty() {
        "No description provided"
    } else {
        pr.description.as_str()
    };

    let mut md = String::new();
    // Writing to a String cannot fail.
    let _ = write!(
        md,
        "# Pull Request Information\n\
         **Title:** {}\n\
         **Author:** {}\n\
         **State:** {}{}\n\
         **Branches:** {} -> {}\n\
         **Created:** {}\n\
         **Updated:** {}\n\n\
         **Description:**\n{}\n\n",
        pr.title,
        pr.author,
        pr.state,
        if pr.draft { " (draft)" } else { "" },
        pr.head_branch,
        pr.base_branch,
        pr.created_at,
        pr.updated_at,
        description.trim_end(),
    );

    let _ = writeln!(
        md,
        "# Files Changed ({} files, +{} -{}):",
        pr.files_changed, pr.additions, pr.deletions
    );
    for file in pr.files.iter().take(listed) {
        let _ = writeln!(
            md,
            "- {} ({}, +{} -{})",
            file.path,
            file.status(),
            file.additions,
            file.deletions
        );
    }
    if pr.files.len() > listed {
        let _ = writeln!(md, "- ... and {} more files", pr.files.len() - listed);
    }
    md.push('\n');
    md
}

/// The longest prefix of `text` with at most `max_chars` characters, ending
/// on a newline when one is available.
fn cut_at_line(text: &str, max_chars: usize) -> &str {
    let end = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(index, _)| index);
    let head = &text[..end];
    match head.rfind('\n') {
        Some(index) if index > 0 => &head[..=index],
        _ => head,
    }
}
