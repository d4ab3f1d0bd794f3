use std::collections::BTreeMap;

use crate::types::{CommitEntry, CommitStatus, OverallSummary, ProjectReport, ProjectSummary};

/// `n / d` as a one-decimal percentage; "0.0%" when there is nothing to divide.
pub fn format_rate(numerator: usize, denominator: usize) -> String {
    format_percentage(percentage(numerator, denominator))
}

fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

fn format_percentage(p: f64) -> String {
    format!("{p:.1}%")
}

pub fn summarize(project: &str, commits: &BTreeMap<String, CommitEntry>, orphan_files: usize) -> ProjectSummary {
    let total = commits.len();
    let determined = || commits.values().filter(|c| c.status == CommitStatus::Determined);

    let with_bic = determined().filter(|c| !c.bug_inducing_commits.is_empty()).count();
    let can_determine = determined().filter(|c| c.can_determine).count();
    let total_bic: usize = determined().map(|c| c.bug_inducing_commits.len()).sum();
    let degraded = commits.values().filter(|c| c.status == CommitStatus::Malformed).count();

    let avg = if with_bic == 0 {
        "0.00".to_string()
    } else {
        format!("{:.2}", total_bic as f64 / with_bic as f64)
    };

    ProjectSummary {
        project: project.to_string(),
        total_bug_fixing_commits: total,
        commits_with_bug_inducing: with_bic,
        bug_inducing_rate: format_rate(with_bic, total),
        can_determine_commits: can_determine,
        determination_rate: format_rate(can_determine, total),
        not_determined_commits: total - determined().count(),
        total_bug_inducing_commits: total_bic,
        total_buggy_statements: determined().map(|c| c.buggy_statements.len()).sum(),
        avg_bug_inducing_per_commit: avg,
        degraded_records: degraded,
        orphan_files,
        total_token_cost: commits.values().map(|c| c.total_token_cost).sum(),
        total_llm_calls: commits.values().map(|c| c.total_llm_calls).sum(),
        total_elapsed_time_sec: commits.values().map(|c| c.total_elapsed_time).sum(),
    }
}

/// Pooled rates divide summed counts. Mean rates average the per-project
/// rates over projects that have at least one commit.
pub fn overall(projects: &BTreeMap<String, ProjectReport>) -> OverallSummary {
    let summaries: Vec<&ProjectSummary> = projects.values().map(|p| &p.summary).collect();
    let sum = |f: fn(&ProjectSummary) -> usize| summaries.iter().map(|s| f(s)).sum::<usize>();

    let total = sum(|s| s.total_bug_fixing_commits);
    let with_bic = sum(|s| s.commits_with_bug_inducing);
    let can_determine = sum(|s| s.can_determine_commits);

    let non_empty: Vec<&&ProjectSummary> =
        summaries.iter().filter(|s| s.total_bug_fixing_commits > 0).collect();
    let mean = |f: fn(&ProjectSummary) -> usize| {
        if non_empty.is_empty() {
            return 0.0;
        }
        non_empty
            .iter()
            .map(|s| percentage(f(s), s.total_bug_fixing_commits))
            .sum::<f64>()
            / non_empty.len() as f64
    };

    OverallSummary {
        projects: summaries.len(),
        total_bug_fixing_commits: total,
        commits_with_bug_inducing: with_bic,
        can_determine_commits: can_determine,
        total_bug_inducing_commits: sum(|s| s.total_bug_inducing_commits),
        total_buggy_statements: sum(|s| s.total_buggy_statements),
        degraded_records: sum(|s| s.degraded_records),
        pooled_bug_inducing_rate: format_rate(with_bic, total),
        mean_bug_inducing_rate: format_percentage(mean(|s| s.commits_with_bug_inducing)),
        pooled_determination_rate: format_rate(can_determine, total),
        mean_determination_rate: format_percentage(mean(|s| s.can_determine_commits)),
    }
}
