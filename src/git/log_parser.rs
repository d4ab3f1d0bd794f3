use crate::error::{PipelineError, Result};
use crate::types::CommitRecord;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

/// Marks the header line of each commit: record separator, then unit-separated fields.
const HEADER_PREFIX: &str = "\u{1e}COMMIT\u{1f}";

/// Runs a single `git log` and returns one [`CommitRecord`] per commit with the
/// full multi-line message (subject and body).
///
/// The header line carries hash, `Name <email>` and the strict ISO-8601 author
/// date; every following line up to the next header belongs to the message.
pub fn parse_log(
    cwd: &Path,
    revision: Option<&str>,
    since: &str,
    all_refs: bool,
) -> Result<Vec<CommitRecord>> {
    let mut args: Vec<String> = vec![
        "log".into(),
        "--format=%x1eCOMMIT%x1f%H%x1f%an <%ae>%x1f%aI%n%B".into(),
    ];

    if all_refs {
        args.push("--all".into());
    } else if let Some(rev) = revision {
        args.push(rev.into());
    }

    if !since.is_empty() {
        args.push(format!("--since={since}"));
    }

    let mut child = Command::new("git")
        .args(&args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PipelineError::Git(format!("Failed to run git: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PipelineError::Git("Failed to capture git stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| PipelineError::Git("Failed to capture git stderr".to_string()))?;

    let stderr_reader = thread::spawn(move || {
        let mut stderr_text = String::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_string(&mut stderr_text);
        stderr_text
    });

    let mut commits: Vec<CommitRecord> = Vec::new();
    let mut current: Option<CommitRecord> = None;

    for line in BufReader::new(stdout).lines() {
        let line = line.map_err(|e| PipelineError::Git(format!("Failed reading git output: {e}")))?;
        parse_commit_line(&line, &mut commits, &mut current);
    }

    if let Some(c) = current.take() {
        commits.push(finish(c));
    }

    let status = child
        .wait()
        .map_err(|e| PipelineError::Git(format!("Failed to wait for git process: {e}")))?;

    if !status.success() {
        let stderr_text = stderr_reader.join().unwrap_or_else(|_| String::new());
        return Err(PipelineError::Git(format!("git log failed: {}", stderr_text.trim())));
    }

    let _ = stderr_reader.join();

    Ok(commits)
}

fn parse_commit_line(
    line: &str,
    commits: &mut Vec<CommitRecord>,
    current: &mut Option<CommitRecord>,
) {
    if let Some(rest) = line.strip_prefix(HEADER_PREFIX) {
        if let Some(c) = current.take() {
            commits.push(finish(c));
        }
        let mut parts = rest.splitn(3, '\u{1f}');
        if let (Some(hash), Some(author), Some(date)) = (parts.next(), parts.next(), parts.next()) {
            *current = Some(CommitRecord {
                hash: hash.trim().to_string(),
                author: author.trim().to_string(),
                date: date.trim().to_string(),
                message: String::new(),
            });
        }
    } else if let Some(ref mut c) = current {
        if !c.message.is_empty() || !line.trim().is_empty() {
            c.message.push_str(line);
            c.message.push('\n');
        }
    }
}

fn finish(mut commit: CommitRecord) -> CommitRecord {
    commit.message = commit.message.trim_end().to_string();
    commit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_text(text: &str) -> Vec<CommitRecord> {
        let mut commits = Vec::new();
        let mut current = None;
        for line in text.lines() {
            parse_commit_line(line, &mut commits, &mut current);
        }
        if let Some(c) = current.take() {
            commits.push(finish(c));
        }
        commits
    }

    fn header(hash: &str, author: &str, date: &str) -> String {
        format!("{HEADER_PREFIX}{hash}\u{1f}{author}\u{1f}{date}")
    }

    #[test]
    fn test_parses_multiline_messages() {
        let text = [
            header("aaa111", "Ada <ada@example.com>", "2024-03-01T10:00:00+01:00"),
            "LANG-12: Fix NPE in StringUtils".to_string(),
            "".to_string(),
            "The bug showed up with empty input.".to_string(),
            "".to_string(),
            header("bbb222", "Bob <bob@example.com>", "2024-02-01T09:00:00+00:00"),
            "Add feature".to_string(),
            "".to_string(),
        ]
        .join("\n");

        let commits = parse_text(&text);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "aaa111");
        assert_eq!(commits[0].author, "Ada <ada@example.com>");
        assert_eq!(commits[0].date, "2024-03-01T10:00:00+01:00");
        assert_eq!(
            commits[0].message,
            "LANG-12: Fix NPE in StringUtils\n\nThe bug showed up with empty input."
        );
        assert_eq!(commits[1].message, "Add feature");
    }

    #[test]
    fn test_subject_containing_separators_stays_in_message() {
        let text = [header("ccc333", "C <c@example.com>", "2024-01-01T00:00:00Z"), "a|b|c".to_string()].join("\n");
        let commits = parse_text(&text);
        assert_eq!(commits[0].message, "a|b|c");
    }

    #[test]
    fn test_empty_message_is_kept_as_empty() {
        let text = [
            header("ddd444", "D <d@example.com>", "2024-01-01T00:00:00Z"),
            "".to_string(),
            header("eee555", "E <e@example.com>", "2024-01-01T00:00:00Z"),
            "Fix bug".to_string(),
        ]
        .join("\n");
        let commits = parse_text(&text);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "");
    }

    #[test]
    fn test_lines_before_first_header_are_ignored() {
        let text = ["stray".to_string(), header("fff666", "F <f@example.com>", "2024-01-01T00:00:00Z")].join("\n");
        let commits = parse_text(&text);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "");
    }

    #[test]
    fn test_parse_log_real_repo() {
        let git_ok = Command::new("git").arg("--version").output().map(|o| o.status.success()).unwrap_or(false);
        if !git_ok {
            eprintln!("Skipping: git is not available");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            Command::new("git")
                .args(["-c", "user.name=Test", "-c", "user.email=test@example.com", "-c", "commit.gpgsign=false"])
                .args(args)
                .current_dir(dir.path())
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        };
        if !run(&["init", "-q"]) {
            eprintln!("Skipping: git init failed");
            return;
        }
        assert!(run(&["commit", "-q", "--allow-empty", "-m", "Initial commit"]));
        assert!(run(&["commit", "-q", "--allow-empty", "-m", "Fix bug in parser", "-m", "Body line"]));

        let commits = parse_log(dir.path(), None, "", false).expect("parse_log should succeed");
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "Fix bug in parser\n\nBody line");
        assert_eq!(commits[0].author, "Test <test@example.com>");
        assert!(chrono::DateTime::parse_from_rfc3339(&commits[0].date).is_ok());
        assert_eq!(commits[0].hash.len(), 40);
    }
}
