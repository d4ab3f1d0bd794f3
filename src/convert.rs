use std::path::Path;

use crate::error::Result;
use crate::input;
use crate::reporters::json::write_json;
use crate::types::{CommitRef, IssueListEntry};

/// Reshapes bug-fixing commits into the external SZZ tool's input list.
pub fn to_issue_list(commits: &[CommitRef]) -> Vec<IssueListEntry> {
    commits
        .iter()
        .map(|c| IssueListEntry {
            repo_name: c.repo_name.clone(),
            bug_fixing_commit: c.bug_fixing_commit.clone(),
            commit_url: format!("https://github.com/{}/commit/{}", c.repo_name, c.bug_fixing_commit),
        })
        .collect()
}

/// Entries written by [`convert_file`] and input entries it had to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Converted {
    pub written: usize,
    pub skipped: usize,
}

/// Reads `bug_fixing_commits.json` from `input_file`, writes `issue_list.json`
/// to `output_file` (creating parent directories).
pub fn convert_file(input_file: &Path, output_file: &Path) -> Result<Converted> {
    let loaded = input::load_commit_refs(input_file)?;
    let missing_repo = loaded.records.iter().filter(|c| c.repo_name.is_empty()).count();
    if missing_repo > 0 {
        tracing::warn!("{missing_repo} commit(s) have no repo_name; their commit_url will be incomplete");
    }
    let entries = to_issue_list(&loaded.records);
    write_json(&entries, Some(output_file))?;
    Ok(Converted { written: entries.len(), skipped: loaded.degraded })
}
