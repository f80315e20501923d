use super::types::{DiffFile, Hunk};
use super::{FileEntry, PrError};

/// Parse a unified diff string into a vector of DiffFile structs.
///
/// The input is the raw text from GitHub's diff media type. Each file
/// section starts with `diff --git a/{path} b/{path}`; new files carry
/// `--- /dev/null`, deleted files `+++ /dev/null`, and renames a
/// `rename from` / `rename to` pair. Hunks start with
/// `@@ -{old_start},{old_count} +{new_start},{new_count} @@`.
pub fn parse_diff(raw_diff: &str) -> Result<Vec<DiffFile>, PrError> {
    if raw_diff.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut current_file: Option<DiffFile> = None;
    let mut current_hunk: Option<Hunk> = None;

    let finish_hunk = |file: &mut Option<DiffFile>, hunk: &mut Option<Hunk>| {
        if let (Some(file), Some(hunk)) = (file.as_mut(), hunk.take()) {
            file.hunks.push(hunk);
        }
    };

    let finish_file =
        |files: &mut Vec<DiffFile>, file: &mut Option<DiffFile>, hunk: &mut Option<Hunk>| {
            finish_hunk(file, hunk);
            if let Some(file) = file.take() {
                files.push(file);
            }
        };

    for line in raw_diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish_file(&mut files, &mut current_file, &mut current_hunk);
            current_file = Some(DiffFile {
                path: header_path(rest)?,
                old_path: None,
                is_new: false,
                is_deleted: false,
                is_binary: false,
                additions: 0,
                deletions: 0,
                hunks: Vec::new(),
            });
            continue;
        }

        if line.starts_with("@@") {
            if current_file.is_none() {
                return Err(PrError::DiffParse(
                    "hunk header before any file header".to_string(),
                ));
            }
            finish_hunk(&mut current_file, &mut current_hunk);
            let (old_start, old_count, new_start, new_count) = parse_hunk_header(line)?;
            current_hunk = Some(Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                lines: Vec::new(),
            });
            continue;
        }

        // Inside a hunk every prefixed line is content, even "--- x" or "+++ y".
        if let (Some(file), Some(hunk)) = (current_file.as_mut(), current_hunk.as_mut()) {
            if let Some(first) = line.chars().next() {
                match first {
                    '+' => file.additions += 1,
                    '-' => file.deletions += 1,
                    ' ' => {}
                    // "\ No newline at end of file" and friends
                    _ => continue,
                }
                hunk.lines.push(line.to_string());
            }
            continue;
        }

        let Some(file) = current_file.as_mut() else {
            continue;
        };

        if let Some(path) = line.strip_prefix("--- ") {
            if path.trim() == "/dev/null" {
                file.is_new = true;
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            let path = path.trim();
            if path == "/dev/null" {
                file.is_deleted = true;
            } else if let Some(path) = path.strip_prefix("b/") {
                file.path = path.to_string();
            }
        } else if line.starts_with("new file mode") {
            file.is_new = true;
        } else if line.starts_with("deleted file mode") {
            file.is_deleted = true;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            file.old_path = Some(from.to_string());
        } else if let Some(to) = line.strip_prefix("rename to ") {
            file.path = to.to_string();
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            file.is_binary = true;
        }
    }

    finish_file(&mut files, &mut current_file, &mut current_hunk);
    Ok(files)
}

/// Rebuild a unified diff from GitHub's files list and parse it.
///
/// Paths and line counts come from the list itself, so files whose patch
/// GitHub omitted still report their totals.
pub fn from_file_entries(entries: &[FileEntry]) -> Result<(String, Vec<DiffFile>), PrError> {
    let mut diff = String::new();
    for entry in entries {
        let new_path = entry.filename.as_str();
        let old_path = entry.previous_filename.as_deref().unwrap_or(new_path);
        diff.push_str(&format!("diff --git a/{} b/{}\n", old_path, new_path));
        match entry.status.as_str() {
            "added" => {
                diff.push_str("new file mode 100644\n");
                diff.push_str(&format!("--- /dev/null\n+++ b/{}\n", new_path));
            }
            "removed" => {
                diff.push_str("deleted file mode 100644\n");
                diff.push_str(&format!("--- a/{}\n+++ /dev/null\n", old_path));
            }
            status => {
                if status == "renamed" && old_path != new_path {
                    diff.push_str(&format!("rename from {}\nrename to {}\n", old_path, new_path));
                }
                diff.push_str(&format!("--- a/{}\n+++ b/{}\n", old_path, new_path));
            }
        }
        if let Some(patch) = entry.patch.as_deref() {
            diff.push_str(patch);
            if !patch.ends_with('\n') {
                diff.push('\n');
            }
        }
    }

    let mut files = parse_diff(&diff)?;
    if files.len() != entries.len() {
        return Err(PrError::DiffParse(format!(
            "files list has {} entries but the rebuilt diff has {} files",
            entries.len(),
            files.len()
        )));
    }
    for (file, entry) in files.iter_mut().zip(entries) {
        file.path = entry.filename.clone();
        if entry.status == "renamed" {
            file.old_path = entry.previous_filename.clone();
        }
        file.additions = entry.additions;
        file.deletions = entry.deletions;
    }
    Ok((diff, files))
}

/// Best-effort path from the `diff --git` header. Paths containing spaces are
/// corrected later by the `+++ b/...` or `rename to` lines.
fn header_path(rest: &str) -> Result<String, PrError> {
    let mut parts = rest.split_whitespace();
    let a_path = parts
        .next()
        .ok_or_else(|| PrError::DiffParse("Missing a/ path in diff header".to_string()))?;
    let b_path = parts.last().unwrap_or(a_path);
    Ok(b_path
        .strip_prefix("b/")
        .or_else(|| a_path.strip_prefix("a/"))
        .unwrap_or(b_path)
        .to_string())
}

fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize, usize), PrError> {
    let header = line
        .trim()
        .strip_prefix("@@")
        .ok_or_else(|| PrError::DiffParse("Invalid hunk header".to_string()))?;
    // Anything after the closing "@@" is the enclosing function context.
    let header = header.split("@@").next().unwrap_or_default().trim();
    let mut parts = header.split_whitespace();
    let old_part = parts
        .next()
        .ok_or_else(|| PrError::DiffParse("Missing old range".to_string()))?;
    let new_part = parts
        .next()
        .ok_or_else(|| PrError::DiffParse("Missing new range".to_string()))?;

    let (old_start, old_count) = parse_range(old_part, '-')?;
    let (new_start, new_count) = parse_range(new_part, '+')?;

    Ok((old_start, old_count, new_start, new_count))
}

fn parse_range(part: &str, prefix: char) -> Result<(usize, usize), PrError> {
    let range = part
        .strip_prefix(prefix)
        .ok_or_else(|| PrError::DiffParse(format!("Invalid range prefix in {}", part)))?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    let start = start_str
        .parse::<usize>()
        .map_err(|_| PrError::DiffParse(format!("Invalid range start in {}", part)))?;
    let count = count_str
        .parse::<usize>()
        .map_err(|_| PrError::DiffParse(format!("Invalid range count in {}", part)))?;
    Ok((start, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::types::FileStatus;

    const SAMPLE_DIFF: &str = r#"diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,5 +1,7 @@ fn main() {
 fn main() {
-    println!("old");
+    println!("new");
+    // Added a comment
 }
"#;

    #[test]
    fn test_parse_single_file_diff() {
        let files = parse_diff(SAMPLE_DIFF).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "src/main.rs");
        assert_eq!(files[0].additions, 2);
        assert_eq!(files[0].deletions, 1);
        assert_eq!(files[0].status(), FileStatus::Modified);
        assert_eq!(files[0].hunks.len(), 1);
        assert_eq!(files[0].hunks[0].new_count, 7);
        assert_eq!(files[0].hunks[0].lines.len(), 5);
    }

    #[test]
    fn test_parse_new_file_diff() {
        let diff = r#"diff --git a/new_file.txt b/new_file.txt
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/new_file.txt
@@ -0,0 +1,2 @@
+hello
+world
"#;
        let files = parse_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_new);
        assert!(!files[0].is_deleted);
        assert_eq!(files[0].status(), FileStatus::Added);
    }

    #[test]
    fn test_parse_deleted_file_diff() {
        let diff = r#"diff --git a/old_file.txt b/old_file.txt
deleted file mode 100644
index e69de29..0000000
--- a/old_file.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-hello
-world
"#;
        let files = parse_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].is_new);
        assert!(files[0].is_deleted);
        assert_eq!(files[0].deletions, 2);
    }

    #[test]
    fn test_parse_rename_and_binary() {
        let diff = r#"diff --git a/docs/old.md b/docs/new.md
similarity index 100%
rename from docs/old.md
rename to docs/new.md
diff --git a/logo.png b/logo.png
index 1111111..2222222 100644
Binary files a/logo.png and b/logo.png differ
"#;
        let files = parse_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "docs/new.md");
        assert_eq!(files[0].old_path.as_deref(), Some("docs/old.md"));
        assert_eq!(files[0].status(), FileStatus::Renamed);
        assert!(files[1].is_binary);
        assert!(files[1].hunks.is_empty());
    }

    #[test]
    fn test_content_lines_that_look_like_headers() {
        let diff = "diff --git a/a.sql b/a.sql\n--- a/a.sql\n+++ b/a.sql\n@@ -1,2 +1,2 @@\n--- comment\n+++ counter\n\\ No newline at end of file\n";
        let files = parse_diff(diff).unwrap();
        assert_eq!(files[0].deletions, 1);
        assert_eq!(files[0].additions, 1);
        assert_eq!(files[0].hunks[0].lines.len(), 2);
    }

    #[test]
    fn test_parse_empty_diff() {
        let files = parse_diff("").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_bad_hunk_header() {
        let diff = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -a,b +1 @@\n+x\n";
        assert!(matches!(parse_diff(diff), Err(PrError::DiffParse(_))));
    }

    fn entry(filename: &str, status: &str, additions: usize, deletions: usize, patch: Option<&str>) -> FileEntry {
        FileEntry {
            filename: filename.to_string(),
            status: status.to_string(),
            previous_filename: None,
            additions,
            deletions,
            patch: patch.map(str::to_string),
        }
    }

    #[test]
    fn test_from_file_entries() {
        let mut renamed = entry("docs/new name.md", "renamed", 1, 1, Some("@@ -1 +1 @@\n-old\n+new"));
        renamed.previous_filename = Some("docs/old name.md".to_string());
        let entries = vec![
            entry("src/lib.rs", "modified", 1, 1, Some("@@ -1,3 +1,3 @@\n fn a() {\n-    old();\n+    new();\n }")),
            entry("src/widget.rs", "added", 2, 0, Some("@@ -0,0 +1,2 @@\n+pub struct Widget;\n+impl Widget {}")),
            entry("legacy.rs", "removed", 0, 1, Some("@@ -1 +0,0 @@\n-gone")),
            renamed,
            entry("assets/huge.json", "modified", 40_000, 12, None),
        ];

        let (diff, files) = from_file_entries(&entries).unwrap();
        assert_eq!(files.len(), 5);
        assert!(diff.contains("+++ b/src/widget.rs\n@@ -0,0 +1,2 @@\n+pub struct Widget;"));

        assert_eq!(files[0].path, "src/lib.rs");
        assert_eq!(files[0].status(), FileStatus::Modified);
        assert_eq!(files[0].hunks.len(), 1);
        assert_eq!(files[1].status(), FileStatus::Added);
        assert_eq!(files[1].additions, 2);
        assert_eq!(files[2].path, "legacy.rs");
        assert_eq!(files[2].status(), FileStatus::Removed);
        assert_eq!(files[3].path, "docs/new name.md");
        assert_eq!(files[3].old_path.as_deref(), Some("docs/old name.md"));
        assert_eq!(files[3].status(), FileStatus::Renamed);
        // No patch: counts come from the list, there are no hunks.
        assert_eq!(files[4].additions, 40_000);
        assert_eq!(files[4].deletions, 12);
        assert!(files[4].hunks.is_empty());
    }
}
