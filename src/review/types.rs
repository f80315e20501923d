use serde::Serialize;
use std::fmt;

/// The reviewer's verdict, when the model states one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    Approve,
    #[serde(rename = "Request Changes")]
    RequestChanges,
    Comment,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Approve => write!(f, "Approve"),
            Recommendation::RequestChanges => write!(f, "Request Changes"),
            Recommendation::Comment => write!(f, "Comment"),
        }
    }
}

/// One `## Heading` section of the model's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSection {
    pub heading: String,
    /// Markdown body, without the heading line
    pub body: String,
}

/// What the model said about a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResult {
    /// The model's answer, verbatim
    pub text: String,
    /// `text` split on its `##` headings; a single "Review" section if it has none
    pub sections: Vec<ReviewSection>,
    pub recommendation: Option<Recommendation>,
    /// Whether the diff had to be cut to fit the prompt budget
    pub diff_truncated: bool,
    /// Model that produced the review
    pub model: String,
}

impl ReviewResult {
    pub fn from_text(text: String, model: impl Into<String>, diff_truncated: bool) -> Self {
        let sections = split_sections(&text);
        let recommendation = find_recommendation(&sections);
        ReviewResult {
            text,
            sections,
            recommendation,
            diff_truncated,
            model: model.into(),
        }
    }
}

fn split_sections(text: &str) -> Vec<ReviewSection> {
    let mut sections = Vec::new();
    let mut preamble = String::new();
    let mut current: Option<ReviewSection> = None;
    let mut in_code_block = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
        }
        let heading = if in_code_block {
            None
        } else {
            line.strip_prefix("## ")
        };
        match heading {
            Some(heading) => {
                if let Some(section) = current.take() {
                    sections.push(section);
                }
                current = Some(ReviewSection {
                    heading: clean_heading(heading),
                    body: String::new(),
                });
            }
            None => {
                let body = match current.as_mut() {
                    Some(section) => &mut section.body,
                    None => &mut preamble,
                };
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }

    for section in &mut sections {
        section.body = section.body.trim().to_string();
    }

    if sections.is_empty() {
        return vec![ReviewSection {
            heading: "Review".to_string(),
            body: text.trim().to_string(),
        }];
    }

    let preamble = preamble.trim();
    if !preamble.is_empty() {
        sections.insert(
            0,
            ReviewSection {
                heading: "Overview".to_string(),
                body: preamble.to_string(),
            },
        );
    }
    sections
}

/// Strip numbering and emphasis, so "2. **Code Quality**" becomes "Code Quality".
fn clean_heading(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches(|c: char| c.is_ascii_digit());
    let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
    trimmed
        .trim()
        .trim_end_matches(':')
        .trim_matches('*')
        .trim_end_matches(':')
        .trim()
        .to_string()
}

fn find_recommendation(sections: &[ReviewSection]) -> Option<Recommendation> {
    let verdict = sections.iter().rev().find(|s| {
        let heading = s.heading.to_lowercase();
        heading.contains("overall") || heading.contains("recommendation")
    })?;
    parse_verdict(&verdict_phrase(&verdict.body))
}

/// The first bolded phrase of the section, or else its first non-empty line.
fn verdict_phrase(body: &str) -> String {
    if let Some((_, rest)) = body.split_once("**") {
        if let Some((bold, _)) = rest.split_once("**") {
            if !bold.trim().is_empty() {
                return bold.to_string();
            }
        }
    }
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Match the verdict by its leading words, so "I would not approve" is no verdict.
fn parse_verdict(phrase: &str) -> Option<Recommendation> {
    let not_word = |c: char| !c.is_alphanumeric();
    let mut phrase = phrase.to_lowercase().replace('_', " ");
    for label in ["overall recommendation", "recommendation", "verdict", "decision", "overall"] {
        let trimmed = phrase.trim_start_matches(not_word);
        if let Some(rest) = trimmed.strip_prefix(label) {
            if rest.trim_start().starts_with([':', '-']) {
                phrase = rest.to_string();
                break;
            }
        }
    }
    let phrase = phrase.trim_start_matches(not_word);
    if phrase.starts_with("request changes") || phrase.starts_with("changes requested") {
        Some(Recommendation::RequestChanges)
    } else if phrase.starts_with("approv") {
        Some(Recommendation::Approve)
    } else if phrase.starts_with("comment") {
        Some(Recommendation::Comment)
    } else {
        None
    }
}
