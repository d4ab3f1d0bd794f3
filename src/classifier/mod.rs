//! Bug-fixing commit classification.
//!
//! Five strategies over a commit message. Four are independent predicates
//! (`issue_id`, `strict`, `pantiuchina`, `simple`); `combined` is the ordered
//! first-match over those four. Every strategy is a pure function of the
//! message and the [`ProjectConfig`].

mod issue_id;
mod keywords;

use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::{BugFixingCommit, ClassificationResult, CommitRecord, DetectionMethod};

/// Priority order of the `combined` strategy.
const COMBINED_ORDER: [Strategy; 4] = [
    Strategy::IssueId,
    Strategy::Strict,
    Strategy::Pantiuchina,
    Strategy::Simple,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    Simple,
    Strict,
    Pantiuchina,
    IssueId,
    #[default]
    Combined,
}

impl Strategy {
    /// All strategies in display order.
    pub const ALL: [Strategy; 5] = [
        Strategy::Simple,
        Strategy::Strict,
        Strategy::Pantiuchina,
        Strategy::IssueId,
        Strategy::Combined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Simple      => "simple",
            Strategy::Strict      => "strict",
            Strategy::Pantiuchina => "pantiuchina",
            Strategy::IssueId     => "issue_id",
            Strategy::Combined    => "combined",
        }
    }

    /// The detection method a single strategy reports; `None` for `combined`.
    fn method(&self) -> Option<DetectionMethod> {
        match self {
            Strategy::Simple      => Some(DetectionMethod::Simple),
            Strategy::Strict      => Some(DetectionMethod::Strict),
            Strategy::Pantiuchina => Some(DetectionMethod::Pantiuchina),
            Strategy::IssueId     => Some(DetectionMethod::IssueId),
            Strategy::Combined    => None,
        }
    }

    pub fn classify(&self, message: &str, config: &ProjectConfig) -> ClassificationResult {
        if message.trim().is_empty() {
            return ClassificationResult::no_match();
        }

        let Some(method) = self.method() else {
            return COMBINED_ORDER
                .iter()
                .map(|s| s.classify(message, config))
                .find(|r| r.is_bug_fix())
                .unwrap_or_else(ClassificationResult::no_match);
        };

        let pattern = match method {
            DetectionMethod::IssueId     => issue_id::detect(message, config),
            DetectionMethod::Strict      => keywords::strict(message, &config.exclusion_patterns),
            DetectionMethod::Pantiuchina => keywords::pantiuchina(message, &config.exclusion_patterns),
            DetectionMethod::Simple      => keywords::simple(message),
        };

        match pattern {
            Some(p) => ClassificationResult::matched(method, p),
            None => ClassificationResult::no_match(),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Strategy::ALL
            .iter()
            .find(|st| st.as_str() == s.trim())
            .copied()
            .ok_or_else(|| {
                format!(
                    "\"{s}\". Expected one of: \"simple\", \"strict\", \"pantiuchina\", \"issue_id\", \"combined\""
                )
            })
    }
}

/// How close a bare `#123` reference and a fix keyword must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueProximity {
    /// Anywhere in the same message.
    #[default]
    Message,
    /// On the same line.
    Line,
}

impl FromStr for IssueProximity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "message" => Ok(IssueProximity::Message),
            "line" => Ok(IssueProximity::Line),
            other => Err(format!("\"{other}\". Expected one of: \"message\", \"line\"")),
        }
    }
}

/// Per-repository classification settings, compiled once per run.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub repository_identifier: String,
    pub issue_pattern: Option<Regex>,
    pub exclusion_patterns: Vec<Regex>,
    pub generic_issue_refs: bool,
    pub proximity: IssueProximity,
}

impl ProjectConfig {
    pub fn new(
        repository_identifier: impl Into<String>,
        issue_pattern: Option<&str>,
        exclusion_patterns: &[String],
    ) -> Result<Self> {
        let issue_pattern = issue_pattern
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| PipelineError::Config(format!("invalid issue pattern \"{p}\": {e}")))
            })
            .transpose()?;
        let exclusion_patterns = exclusion_patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| PipelineError::Config(format!("invalid exclusion pattern \"{p}\": {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ProjectConfig {
            repository_identifier: repository_identifier.into(),
            issue_pattern,
            exclusion_patterns,
            generic_issue_refs: true,
            proximity: IssueProximity::Message,
        })
    }

    /// Built-in settings: default exclusions plus the built-in issue key, if any.
    #[cfg(test)]
    pub fn for_repository(repository_identifier: &str) -> Self {
        ProjectConfig::from_settings(repository_identifier, &PipelineConfig::default())
            .expect("built-in patterns compile")
    }

    /// Settings for `repository_identifier` as resolved from the config file.
    pub fn from_settings(repository_identifier: &str, cfg: &PipelineConfig) -> Result<Self> {
        let pattern = cfg.issue_pattern_for(repository_identifier);
        Ok(ProjectConfig::new(repository_identifier, pattern.as_deref(), &cfg.exclusion_patterns())?
            .with_generic_issue_refs(cfg.generic_issue_refs())
            .with_proximity(cfg.issue_proximity()))
    }

    pub fn with_generic_issue_refs(mut self, enabled: bool) -> Self {
        self.generic_issue_refs = enabled;
        self
    }

    pub fn with_proximity(mut self, proximity: IssueProximity) -> Self {
        self.proximity = proximity;
        self
    }

    /// Fails when `strategy` cannot match anything with these settings.
    pub fn ensure_supports(&self, strategy: Strategy) -> Result<()> {
        if strategy == Strategy::IssueId && self.issue_pattern.is_none() && !self.generic_issue_refs {
            return Err(PipelineError::Config(format!(
                "strategy \"issue_id\" needs an issue pattern for '{}' \
                 (set repositories[].issue_pattern or enable issue_references.generic)",
                self.repository_identifier
            )));
        }
        Ok(())
    }
}

/// Outcome of classifying one repository's commits.
#[derive(Debug, Clone, Default)]
pub struct ClassificationRun {
    pub repo_name: String,
    pub strategy: Strategy,
    pub total_commits: usize,
    pub degraded_records: usize,
    pub by_method: BTreeMap<DetectionMethod, usize>,
    pub bug_fixing: Vec<BugFixingCommit>,
}

/// Classifies `commits` in input order. Records without a hash cannot be
/// referenced downstream; they are skipped and counted as degraded.
pub fn classify_commits(
    commits: &[CommitRecord],
    strategy: Strategy,
    config: &ProjectConfig,
) -> Result<ClassificationRun> {
    config.ensure_supports(strategy)?;

    let mut run = ClassificationRun {
        repo_name: config.repository_identifier.clone(),
        strategy,
        total_commits: commits.len(),
        ..Default::default()
    };

    for commit in commits {
        if commit.hash.trim().is_empty() {
            tracing::warn!(repo = %run.repo_name, "skipping commit record without a hash");
            run.degraded_records += 1;
            continue;
        }
        if !commit.date.is_empty() && chrono::DateTime::parse_from_rfc3339(&commit.date).is_err() {
            tracing::debug!(hash = %commit.hash, date = %commit.date, "commit date is not ISO-8601");
        }

        let result = strategy.classify(&commit.message, config);
        if let (Some(method), Some(pattern)) = (result.detection_method(), result.matched_pattern()) {
            *run.by_method.entry(method).or_default() += 1;
            run.bug_fixing.push(BugFixingCommit {
                repo_name: run.repo_name.clone(),
                commit: commit.clone(),
                detection_method: method,
                matched_pattern: pattern.to_string(),
            });
        }
    }

    Ok(run)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
