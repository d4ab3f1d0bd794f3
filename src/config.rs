use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::aggregator::TieBreak;
use crate::classifier::{IssueProximity, Strategy};
use crate::error::{PipelineError, Result};

/// Veto patterns for the conjunction strategies (strict, pantiuchina):
/// merges, cherry-picks, reverts and "noting" commits.
pub const DEFAULT_EXCLUSION_PATTERNS: &[&str] = &[
    r"(?i)\bmerge\b",
    r"(?i)\bcherry[- ]?pick",
    r"(?i)\brevert",
    r"(?i)\bnoting\b",
];

/// Issue-tracker keys for the repositories the study started from.
/// Anything not listed here relies on GitHub-style `#123` references.
pub const BUILTIN_ISSUE_PATTERNS: &[(&str, &str)] = &[
    ("apache/commons-lang", r"\bLANG-\d+\b"),
    ("apache/commons-io", r"\bIO-\d+\b"),
    ("hibernate/hibernate-orm", r"\bHHH-\d+\b"),
    ("apache/maven", r"\bMNG-\d+\b"),
    ("apache/storm", r"\bSTORM-\d+\b"),
];

/// All settings that can be placed in a .bugfix-szz.yml config file.
/// Every field is optional; omitted fields fall back to CLI defaults.
/// CLI flags always take precedence over values set here.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    // Classification defaults (overridden by the corresponding CLI flag)
    pub strategy: Option<String>,
    pub output_dir: Option<String>,

    // Replaces DEFAULT_EXCLUSION_PATTERNS when present
    pub exclusion_patterns: Option<Vec<String>>,

    pub issue_references: Option<IssueReferenceSettings>,
    pub aggregation: Option<AggregationSettings>,
    pub repositories: Option<Vec<RepositoryEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueReferenceSettings {
    /// Accept bare `#123` references accompanied by a fix keyword.
    pub generic: Option<bool>,
    /// How close the reference and the fix keyword must be: "message" or "line".
    pub proximity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationSettings {
    pub results_dir: Option<String>,
    /// Which file wins when several exist for one commit: "newest", "path" or "merge".
    pub tie_break: Option<String>,
}

/// One target repository. `path` points at an existing local clone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryEntry {
    pub name: String,
    pub path: Option<String>,
    pub branch: Option<String>,
    pub issue_pattern: Option<String>,
}

impl PipelineConfig {
    /// Validates semantic constraints that serde cannot enforce.
    ///
    /// Returns a human-readable error describing exactly what is wrong and what
    /// values are accepted. Called automatically by [`load_config`].
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(s) = &self.strategy {
            s.parse::<Strategy>()
                .map_err(|e| format!("Invalid 'strategy' value: {e}"))?;
        }

        if let Some(patterns) = &self.exclusion_patterns {
            for p in patterns {
                regex::Regex::new(p)
                    .map_err(|e| format!("Invalid regex in 'exclusion_patterns': \"{p}\": {e}"))?;
            }
        }

        if let Some(refs) = &self.issue_references {
            if let Some(p) = &refs.proximity {
                p.parse::<IssueProximity>()
                    .map_err(|e| format!("Invalid 'issue_references.proximity' value: {e}"))?;
            }
        }

        if let Some(agg) = &self.aggregation {
            if let Some(t) = &agg.tie_break {
                t.parse::<TieBreak>()
                    .map_err(|e| format!("Invalid 'aggregation.tie_break' value: {e}"))?;
            }
            if let Some(dir) = &agg.results_dir {
                if dir.trim().is_empty() {
                    return Err("Invalid 'aggregation.results_dir': must not be empty".to_string());
                }
            }
        }

        if let Some(repos) = &self.repositories {
            let mut seen = HashSet::new();
            for (i, repo) in repos.iter().enumerate() {
                let n = i + 1;
                let parts: Vec<&str> = repo.name.split('/').collect();
                if parts.len() != 2 || parts.iter().any(|p| p.trim().is_empty()) {
                    return Err(format!(
                        "Invalid 'repositories[{n}].name': \"{}\". Expected \"owner/name\"",
                        repo.name
                    ));
                }
                if !seen.insert(repo.name.as_str()) {
                    return Err(format!(
                        "Duplicate repository in 'repositories': \"{}\"",
                        repo.name
                    ));
                }
                if let Some(p) = &repo.issue_pattern {
                    regex::Regex::new(p).map_err(|e| {
                        format!("Invalid regex in 'repositories[{n}].issue_pattern': \"{p}\": {e}")
                    })?;
                }
            }
        }

        Ok(())
    }

    pub fn exclusion_patterns(&self) -> Vec<String> {
        match &self.exclusion_patterns {
            Some(p) => p.clone(),
            None => DEFAULT_EXCLUSION_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Issue pattern for `repo`: the configured one, else the built-in table.
    pub fn issue_pattern_for(&self, repo: &str) -> Option<String> {
        let configured = self
            .repositories
            .iter()
            .flatten()
            .find(|r| r.name.eq_ignore_ascii_case(repo))
            .and_then(|r| r.issue_pattern.clone());
        configured.or_else(|| builtin_issue_pattern(repo).map(str::to_string))
    }

    pub fn generic_issue_refs(&self) -> bool {
        self.issue_references
            .as_ref()
            .and_then(|r| r.generic)
            .unwrap_or(true)
    }

    pub fn issue_proximity(&self) -> IssueProximity {
        self.issue_references
            .as_ref()
            .and_then(|r| r.proximity.as_deref())
            .and_then(|p| p.parse().ok())
            .unwrap_or_default()
    }

    pub fn tie_break(&self) -> TieBreak {
        self.aggregation
            .as_ref()
            .and_then(|a| a.tie_break.as_deref())
            .and_then(|t| t.parse().ok())
            .unwrap_or_default()
    }

    pub fn results_dir(&self) -> Option<&str> {
        self.aggregation.as_ref().and_then(|a| a.results_dir.as_deref())
    }
}

pub fn builtin_issue_pattern(repo: &str) -> Option<&'static str> {
    BUILTIN_ISSUE_PATTERNS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(repo))
        .map(|(_, pattern)| *pattern)
}

/// Reads, parses, and validates a YAML config file from `path`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let cfg: PipelineConfig = serde_yaml::from_str(&content)?;
    cfg.validate()
        .map_err(|e| PipelineError::Config(format!("'{}': {e}", path.display())))?;
    Ok(cfg)
}

/// Annotated YAML template printed by `generate-config`.
pub static TEMPLATE: &str = r##"# bugfix-szz configuration file
# Generated by: bugfix-szz generate-config
#
# All settings are optional. Omit any field to use the built-in default.
# CLI flags always take precedence over values in this file.
# Save this file as .bugfix-szz.yml, then run:
#
#   bugfix-szz --config .bugfix-szz.yml batch

# ── Classification ─────────────────────────────────────────────────────────────

# Detection strategy: simple, strict, pantiuchina, issue_id, combined
# strategy: "combined"

# Base directory for bug_fixing_commits.json (one subdirectory per repository
# in batch mode).
# output_dir: "output"

# Commits matching any of these are never accepted by the strict and
# pantiuchina strategies. Replaces the built-in list when set.
# exclusion_patterns:
#   - "(?i)\\bmerge\\b"
#   - "(?i)\\bcherry[- ]?pick"
#   - "(?i)\\brevert"
#   - "(?i)\\bnoting\\b"

# issue_references:
#   # Accept bare "#123" references when a fix keyword is also present.
#   generic: true
#   # Where the fix keyword must appear: "message" (anywhere) or "line" (same line).
#   proximity: "message"

# ── Aggregation ────────────────────────────────────────────────────────────────

# aggregation:
#   # One subdirectory per project, each with dataset/issue_list.json and save_logs/.
#   results_dir: "llm4szz_datasets"
#   # Several result files for one commit: "newest" (latest mtime wins),
#   # "path" (last path in sort order wins) or "merge" (union of all files).
#   tie_break: "newest"

# ── Repositories ───────────────────────────────────────────────────────────────
# Local clones to classify in batch mode. issue_pattern overrides the built-in
# issue-tracker table.

# repositories:
#   - name: "apache/commons-lang"
#     path: "repos/commons-lang"
#     branch: "master"
#     issue_pattern: "\\bLANG-\\d+\\b"
#   - name: "INRIA/spoon"
#     path: "repos/spoon"
#     branch: "master"
"##;

/// Prints the config template to stdout, or writes it to `output_path` if given.
pub fn print_template(output_path: Option<&Path>) -> Result<()> {
    match output_path {
        Some(path) => std::fs::write(path, TEMPLATE).map_err(|e| PipelineError::io(path, e)),
        None => {
            print!("{TEMPLATE}");
            Ok(())
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_template_is_valid_yaml() {
        let result: std::result::Result<PipelineConfig, _> = serde_yaml::from_str(TEMPLATE);
        assert!(
            result.is_ok(),
            "TEMPLATE must parse as valid PipelineConfig: {:?}",
            result.err()
        );
        let cfg = result.unwrap();
        // Everything is commented out in the template
        assert!(cfg.strategy.is_none());
        assert!(cfg.repositories.is_none());
        assert!(cfg.aggregation.is_none());
        assert!(TEMPLATE.contains("bare \"#123\" references"));
        assert!(TEMPLATE.trim_end().ends_with("path: \"repos/spoon\"\n#     branch: \"master\""));
    }

    #[test]
    fn test_empty_config_is_valid() {
        let cfg: PipelineConfig = serde_yaml::from_str("{}").expect("empty map should parse");
        assert!(cfg.validate().is_ok());
        assert!(cfg.generic_issue_refs());
        assert_eq!(cfg.issue_proximity(), IssueProximity::Message);
        assert_eq!(cfg.tie_break(), TieBreak::Newest);
        assert_eq!(cfg.exclusion_patterns().len(), DEFAULT_EXCLUSION_PATTERNS.len());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<PipelineConfig, _> = serde_yaml::from_str("weights: 1\n");
        assert!(result.is_err(), "Unknown fields should be rejected by deny_unknown_fields");
    }

    #[test]
    fn test_repositories_parsed() {
        let yaml = "repositories:\n  - name: apache/commons-lang\n    path: repos/commons-lang\n    branch: master\n";
        let cfg: PipelineConfig = serde_yaml::from_str(yaml).expect("should parse");
        let repos = cfg.repositories.as_ref().expect("repositories should be Some");
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].branch.as_deref(), Some("master"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_issue_pattern_falls_back_to_builtin() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.issue_pattern_for("apache/commons-lang").as_deref(), Some(r"\bLANG-\d+\b"));
        assert_eq!(cfg.issue_pattern_for("Apache/Commons-IO").as_deref(), Some(r"\bIO-\d+\b"));
        assert!(cfg.issue_pattern_for("INRIA/spoon").is_none());
    }

    #[test]
    fn test_configured_issue_pattern_wins() {
        let yaml = "repositories:\n  - name: apache/commons-lang\n    issue_pattern: \"LANG2-\\\\d+\"\n";
        let cfg: PipelineConfig = serde_yaml::from_str(yaml).expect("should parse");
        assert_eq!(cfg.issue_pattern_for("apache/commons-lang").as_deref(), Some(r"LANG2-\d+"));
    }

    // ── validate() tests ──────────────────────────────────────────────────────

    #[test]
    fn test_validate_unknown_strategy_rejected() {
        let cfg: PipelineConfig = serde_yaml::from_str("strategy: fuzzy\n").expect("should parse");
        let msg = cfg.validate().unwrap_err();
        assert!(msg.contains("strategy"), "Error should mention 'strategy': {msg}");
        assert!(
            msg.contains("issue_id") && msg.contains("combined"),
            "Error should list valid values: {msg}"
        );
    }

    #[test]
    fn test_validate_bad_exclusion_regex_rejected() {
        let cfg: PipelineConfig =
            serde_yaml::from_str("exclusion_patterns:\n  - \"(unclosed\"\n").expect("should parse");
        let msg = cfg.validate().unwrap_err();
        assert!(msg.contains("exclusion_patterns"), "Error should name the field: {msg}");
    }

    #[test]
    fn test_validate_bad_tie_break_rejected() {
        let cfg: PipelineConfig =
            serde_yaml::from_str("aggregation:\n  tie_break: oldest\n").expect("should parse");
        let msg = cfg.validate().unwrap_err();
        assert!(msg.contains("tie_break"), "Error should name the field: {msg}");
        assert!(msg.contains("newest"), "Error should list valid values: {msg}");
    }

    #[test]
    fn test_validate_bad_proximity_rejected() {
        let cfg: PipelineConfig =
            serde_yaml::from_str("issue_references:\n  proximity: sentence\n").expect("should parse");
        assert!(cfg.validate().unwrap_err().contains("proximity"));
    }

    #[test]
    fn test_validate_repository_name_shape() {
        let cfg: PipelineConfig =
            serde_yaml::from_str("repositories:\n  - name: commons-lang\n").expect("should parse");
        let msg = cfg.validate().unwrap_err();
        assert!(msg.contains("owner/name"), "Error should explain the format: {msg}");
    }

    #[test]
    fn test_validate_duplicate_repository_rejected() {
        let yaml = "repositories:\n  - name: a/b\n  - name: a/b\n";
        let cfg: PipelineConfig = serde_yaml::from_str(yaml).expect("should parse");
        assert!(cfg.validate().unwrap_err().contains("Duplicate"));
    }

    #[test]
    fn test_load_config_reports_validation_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        std::fs::write(&path, "strategy: fuzzy\n").unwrap();
        match load_config(&path) {
            Err(PipelineError::Config(msg)) => assert!(msg.contains("bad.yml"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    // ── Example file test ─────────────────────────────────────────────────────

    #[test]
    fn test_load_example_file() {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let example_path = manifest_dir.join(".bugfix-szz.example.yml");

        let cfg = load_config(&example_path).unwrap_or_else(|e| {
            panic!("Example config file should parse and validate successfully: {e}")
        });

        assert_eq!(cfg.strategy.as_deref(), Some("combined"));
        assert_eq!(cfg.results_dir(), Some("llm4szz_datasets"));
        assert_eq!(cfg.tie_break(), TieBreak::Newest);
        let repos = cfg.repositories.as_ref().expect("repositories should be set");
        assert!(repos.iter().any(|r| r.name == "apache/commons-lang"));
        assert!(repos.iter().any(|r| r.name == "INRIA/spoon"));
        assert_eq!(cfg.issue_pattern_for("INRIA/spoon"), None);
    }
}
