pub mod types;

pub use types::{FileSummary, Report};

use colored::Colorize;
use tracing::{debug, instrument};

use crate::pr::types::FileStatus;
use crate::pr::{PrRef, PullRequest};
use crate::review::{Recommendation, ReviewResult};

/// How the CLI prints a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Colored terminal output
    #[default]
    Terminal,
    /// Markdown document
    Markdown,
}

/// Build a Report from the fetched PR and, if available, its review.
pub fn build(pr_ref: &PrRef, pr: &PullRequest, review: Option<ReviewResult>) -> Report {
    let files: Vec<FileSummary> = pr
        .files
        .iter()
        .map(|file| FileSummary {
            path: file.path.clone(),
            old_path: file.old_path.clone(),
            status: file.status(),
            additions: file.additions,
            deletions: file.deletions,
            is_binary: file.is_binary,
            patch: file.patch(),
        })
        .collect();

    // Fall back to the parsed diff when GitHub's totals are missing.
    let additions = if pr.additions > 0 {
        pr.additions
    } else {
        files.iter().map(|f| f.additions).sum()
    };
    let deletions = if pr.deletions > 0 {
        pr.deletions
    } else {
        files.iter().map(|f| f.deletions).sum()
    };

    Report {
        pr_ref: pr_ref.to_string(),
        pr_number: pr.number,
        pr_title: pr.title.clone(),
        author: pr.author.clone(),
        state: pr.state.clone(),
        draft: pr.draft,
        base_branch: pr.base_branch.clone(),
        head_branch: pr.head_branch.clone(),
        url: pr.html_url.clone(),
        created_at: pr.created_at.clone(),
        updated_at: pr.updated_at.clone(),
        description: pr.description.clone(),
        files_changed: pr.files_changed,
        additions,
        deletions,
        diff_summary: diff_summary(pr.files_changed, additions, deletions),
        files,
        review,
    }
}

fn diff_summary(files_changed: usize, additions: usize, deletions: usize) -> String {
    let noun = if files_changed == 1 { "file" } else { "files" };
    format!(
        "{} {} changed, +{} -{}",
        files_changed, noun, additions, deletions
    )
}

/// Print the report to stdout in the requested format.
#[instrument(skip(report), fields(pr = %report.pr_ref))]
pub fn output(report: &Report, format: OutputFormat) {
    match format {
        OutputFormat::Terminal => {
            debug!("writing report to terminal");
            print_terminal_report(report);
        }
        OutputFormat::Markdown => {
            debug!("writing report as markdown");
            print!("{}", render_markdown(report));
        }
    }
}

/// Format and print the report to the terminal with colors.
///
/// PR #42: "Fix bug"
/// Author: octocat | open | fix-bug -> main
/// 3 files changed, +4 -2
///
/// ═══ Summary ═══
/// ...
fn print_terminal_report(report: &Report) {
    println!();
    println!(
        "{} \"{}\"",
        format!("PR #{}:", report.pr_number).bold(),
        report.pr_title
    );
    println!(
        "Author: {} | {}{} | {} -> {}",
        report.author,
        report.state,
        if report.draft { " (draft)" } else { "" },
        report.head_branch,
        report.base_branch
    );
    println!("{}", report.diff_summary);
    if !report.url.is_empty() {
        println!("{}", report.url.dimmed());
    }
    println!();

    for file in &report.files {
        println!(
            "  {} {} ({}, {})",
            status_marker(file),
            file.path,
            format!("+{}", file.additions).green(),
            format!("-{}", file.deletions).red()
        );
    }
    println!();

    let Some(review) = &report.review else {
        return;
    };

    if review.diff_truncated {
        println!(
            "{}",
            "Note: the diff was truncated before review; the model saw only part of it."
                .yellow()
        );
        println!();
    }

    for section in &review.sections {
        println!("═══ {} ═══", section.heading.bold());
        println!("{}", section.body);
        println!();
    }

    if let Some(recommendation) = review.recommendation {
        println!("═══ Recommendation: {} ═══", colorize_recommendation(recommendation));
        println!();
    }
}

/// Render the report as a markdown document.
///
/// # PR #42: "Fix bug"
/// **Author:** octocat | **State:** open | **3 files changed, +4 -2**
///
/// ## AI Review
/// ...
pub fn render_markdown(report: &Report) -> String {
    let mut md = String::new();
    md.push_str(&format!("# PR #{}: \"{}\"\n\n", report.pr_number, report.pr_title));
    md.push_str(&format!(
        "**Author:** {} | **State:** {} | **Branches:** `{}` -> `{}` | **{}**\n\n",
        report.author, report.state, report.head_branch, report.base_branch, report.diff_summary
    ));

    if !report.description.trim().is_empty() {
        md.push_str("## Description\n\n");
        md.push_str(report.description.trim());
        md.push_str("\n\n");
    }

    md.push_str("## Changed Files\n\n");
    for file in &report.files {
        md.push_str(&format!(
            "- `{}` ({}, +{} -{})\n",
            file.path, file.status, file.additions, file.deletions
        ));
    }
    md.push('\n');

    if let Some(review) = &report.review {
        md.push_str("## AI Review\n\n");
        if review.diff_truncated {
            md.push_str("> The diff was truncated before review; the model saw only part of it.\n\n");
        }
        md.push_str(review.text.trim());
        md.push('\n');
    }

    md
}

fn status_marker(file: &FileSummary) -> colored::ColoredString {
    match file.status {
        FileStatus::Added => "A".green().bold(),
        FileStatus::Removed => "D".red().bold(),
        FileStatus::Renamed => "R".cyan().bold(),
        FileStatus::Modified => "M".yellow().bold(),
    }
}

/// Helper to colorize a recommendation for terminal output.
fn colorize_recommendation(recommendation: Recommendation) -> colored::ColoredString {
    let label = recommendation.to_string();
    match recommendation {
        Recommendation::RequestChanges => label.red().bold(),
        Recommendation::Comment => label.yellow().bold(),
        Recommendation::Approve => label.green().bold(),
    }
}
