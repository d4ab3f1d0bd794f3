use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─── Core Git Data ────────────────────────────────────────────────────────────

/// One commit as seen during a repository scan. Only `message` takes part in
/// classification; the rest is provenance carried through to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    #[serde(alias = "bug_fixing_commit")]
    pub hash: String,
    #[serde(default, alias = "commit_message")]
    pub message: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
}

// ─── Classification ───────────────────────────────────────────────────────────

/// Which strategy flagged a commit as a bug fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    IssueId,
    Strict,
    Pantiuchina,
    Simple,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::IssueId     => "issue_id",
            DetectionMethod::Strict      => "strict",
            DetectionMethod::Pantiuchina => "pantiuchina",
            DetectionMethod::Simple      => "simple",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a single commit message.
///
/// Fields are private so the only way to build one is through
/// [`ClassificationResult::matched`] or [`ClassificationResult::no_match`]:
/// `matched_pattern` is present exactly when `is_bug_fix` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    is_bug_fix: bool,
    detection_method: Option<DetectionMethod>,
    matched_pattern: Option<String>,
}

impl ClassificationResult {
    pub fn matched(method: DetectionMethod, pattern: impl Into<String>) -> Self {
        ClassificationResult {
            is_bug_fix: true,
            detection_method: Some(method),
            matched_pattern: Some(pattern.into()),
        }
    }

    pub fn no_match() -> Self {
        ClassificationResult {
            is_bug_fix: false,
            detection_method: None,
            matched_pattern: None,
        }
    }

    pub fn is_bug_fix(&self) -> bool {
        self.is_bug_fix
    }

    pub fn detection_method(&self) -> Option<DetectionMethod> {
        self.detection_method
    }

    pub fn matched_pattern(&self) -> Option<&str> {
        self.matched_pattern.as_deref()
    }
}

/// A commit that some strategy accepted. This is the unit written to
/// `bug_fixing_commits.json` and handed to the external SZZ tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugFixingCommit {
    pub repo_name: String,
    #[serde(flatten)]
    pub commit: CommitRecord,
    pub detection_method: DetectionMethod,
    pub matched_pattern: String,
}

/// Minimal view of any per-commit list entry (classifier output, or the
/// external tool's `issue_list.json`): just enough to key results by hash.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitRef {
    #[serde(default)]
    pub repo_name: String,
    #[serde(alias = "hash")]
    pub bug_fixing_commit: String,
}

/// Entry of the external tool's input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueListEntry {
    pub repo_name: String,
    pub bug_fixing_commit: String,
    pub commit_url: String,
}

// ─── External tool results ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuggyStatement {
    pub file: String,
    #[serde(default)]
    pub lineno: Option<u64>,
    #[serde(default)]
    pub statement: String,
    pub induce_cid: String,
}

/// Normalised content of one result file written by the external tool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BugInducingResult {
    pub repo_name: String,
    pub bug_fixing_commit: String,
    pub changed_files: Vec<String>,
    pub bug_inducing_commits: Vec<String>,
    pub buggy_statements: Vec<BuggyStatement>,
    pub can_determine: bool,
    pub token_cost: u64,
    pub llm_calls: u64,
    pub elapsed_time: f64,
}

// ─── Aggregation ──────────────────────────────────────────────────────────────

/// Per-commit outcome of looking up and reading its result file(s).
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Determined(BugInducingResult),
    NotDetermined,
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    Determined,
    NotDetermined,
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitEntry {
    pub repo_name: String,
    pub bug_fixing_commit: String,
    pub status: CommitStatus,
    pub changed_files: Vec<String>,
    pub bug_inducing_commits: Vec<String>,
    pub buggy_statements: Vec<BuggyStatement>,
    pub can_determine: bool,
    pub total_token_cost: u64,
    pub total_llm_calls: u64,
    pub total_elapsed_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub project: String,
    pub total_bug_fixing_commits: usize,
    pub commits_with_bug_inducing: usize,
    pub bug_inducing_rate: String,
    pub can_determine_commits: usize,
    pub determination_rate: String,
    pub not_determined_commits: usize,
    pub total_bug_inducing_commits: usize,
    pub total_buggy_statements: usize,
    pub avg_bug_inducing_per_commit: String,
    pub degraded_records: usize,
    pub orphan_files: usize,
    pub total_token_cost: u64,
    pub total_llm_calls: u64,
    pub total_elapsed_time_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectReport {
    pub summary: ProjectSummary,
    pub commits: BTreeMap<String, CommitEntry>,
}

/// Cross-project figures. `pooled_*` rates divide summed counts; `mean_*`
/// rates average the per-project rates. They answer different questions and
/// are both reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallSummary {
    pub projects: usize,
    pub total_bug_fixing_commits: usize,
    pub commits_with_bug_inducing: usize,
    pub can_determine_commits: usize,
    pub total_bug_inducing_commits: usize,
    pub total_buggy_statements: usize,
    pub degraded_records: usize,
    pub pooled_bug_inducing_rate: String,
    pub mean_bug_inducing_rate: String,
    pub pooled_determination_rate: String,
    pub mean_determination_rate: String,
}

/// One row of the flat (row-per-commit) export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRow {
    pub project: String,
    pub repo: String,
    pub bug_fixing_commit: String,
    pub changed_files: String,
    pub can_determine: bool,
    pub bug_inducing_commits: String,
    pub num_bug_inducing: usize,
    pub num_buggy_statements: usize,
}
