use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::{FlatRow, ProjectReport};

pub const HEADER: [&str; 8] = [
    "Project",
    "Repo",
    "Bug-Fixing Commit",
    "Changed Files",
    "Can Determine",
    "Bug-Inducing Commits",
    "Num Bug-Inducing",
    "Num Buggy Statements",
];

/// Separator for list-valued columns.
const LIST_SEP: &str = ";";

/// One row per commit, projects in name order, commits in hash order.
pub fn flatten(projects: &BTreeMap<String, ProjectReport>) -> Vec<FlatRow> {
    projects
        .iter()
        .flat_map(|(project, report)| {
            report.commits.values().map(move |c| FlatRow {
                project: project.clone(),
                repo: c.repo_name.clone(),
                bug_fixing_commit: c.bug_fixing_commit.clone(),
                changed_files: c.changed_files.join(LIST_SEP),
                can_determine: c.can_determine,
                bug_inducing_commits: c.bug_inducing_commits.join(LIST_SEP),
                num_bug_inducing: c.bug_inducing_commits.len(),
                num_buggy_statements: c.buggy_statements.len(),
            })
        })
        .collect()
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

pub fn to_csv(rows: &[FlatRow]) -> String {
    let mut out = HEADER.join(",");
    out.push_str("\r\n");
    for r in rows {
        let fields = [
            escape(&r.project),
            escape(&r.repo),
            escape(&r.bug_fixing_commit),
            escape(&r.changed_files),
            Cow::Borrowed(if r.can_determine { "true" } else { "false" }),
            escape(&r.bug_inducing_commits),
            Cow::Owned(r.num_bug_inducing.to_string()),
            Cow::Owned(r.num_buggy_statements.to_string()),
        ];
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

pub fn write_csv(rows: &[FlatRow], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    std::fs::write(path, to_csv(rows)).map_err(|e| PipelineError::io(path, e))
}

/// Splits CSV text into records, honouring quoted fields that contain
/// separators, doubled quotes and line breaks.
#[cfg(test)]
fn records(text: &str) -> std::result::Result<Vec<Vec<String>>, String> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

/// Parses text produced by [`to_csv`] back into rows.
#[cfg(test)]
pub fn parse_csv(text: &str) -> std::result::Result<Vec<FlatRow>, String> {
    let mut records = records(text)?.into_iter();
    match records.next() {
        Some(h) if h == HEADER => {}
        Some(h) => return Err(format!("unexpected header: {}", h.join(","))),
        None => return Ok(Vec::new()),
    }

    records
        .enumerate()
        .map(|(i, r)| {
            let line = i + 2;
            let [project, repo, commit, changed, can, bic, nbic, nstmt]: [String; 8] = r
                .try_into()
                .map_err(|r: Vec<String>| format!("row {line}: expected 8 fields, found {}", r.len()))?;
            let count = |s: &str| s.parse::<usize>().map_err(|e| format!("row {line}: {e}"));
            Ok(FlatRow {
                project,
                repo,
                bug_fixing_commit: commit,
                changed_files: changed,
                can_determine: can.parse().map_err(|e| format!("row {line}: {e}"))?,
                bug_inducing_commits: bic,
                num_bug_inducing: count(&nbic)?,
                num_buggy_statements: count(&nstmt)?,
            })
        })
        .collect()
}
