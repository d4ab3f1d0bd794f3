pub mod discovery;
pub mod result_file;
pub mod stats;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::input::{self, Loaded};
use crate::types::{CommitEntry, CommitOutcome, CommitRef, CommitStatus, ProjectReport};
use discovery::ResultFile;
use result_file::FileRead;

/// What to do when more than one result file maps to the same commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Latest modification time; equal times fall back to path order.
    #[default]
    Newest,
    /// Lexicographically last path.
    Path,
    /// Union of every file.
    Merge,
}

impl TieBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            TieBreak::Newest => "newest",
            TieBreak::Path => "path",
            TieBreak::Merge => "merge",
        }
    }
}

impl std::fmt::Display for TieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" => Ok(TieBreak::Newest),
            "path" => Ok(TieBreak::Path),
            "merge" => Ok(TieBreak::Merge),
            _ => Err(format!("\"{s}\". Expected one of: \"newest\", \"path\", \"merge\"")),
        }
    }
}

/// Project names under `results_dir`: every non-hidden subdirectory, sorted.
pub fn discover_projects(results_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(results_dir).map_err(|e| PipelineError::io(results_dir, e))?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

/// The commits a project is expected to have results for. An explicit list
/// must load; the project's own `dataset/issue_list.json` is used when it
/// reads cleanly. `None` means the list has to be derived from the files.
/// Entries that could not be decoded are carried in [`Loaded::degraded`].
pub fn reference_list(project_dir: &Path, explicit: Option<&Path>) -> Result<Option<Loaded<CommitRef>>> {
    if let Some(path) = explicit {
        return input::load_commit_refs(path).map(Some);
    }
    let snapshot = project_dir.join("dataset").join("issue_list.json");
    if !snapshot.is_file() {
        return Ok(None);
    }
    match input::load_commit_refs(&snapshot) {
        Ok(loaded) => Ok(Some(loaded)),
        Err(e) => {
            tracing::warn!("ignoring unreadable commit list: {e}");
            Ok(None)
        }
    }
}

/// Builds the report for one project directory. Individual files that are
/// missing or broken never abort the run; they become `not_determined` or
/// `malformed` commits. Unreadable entries of the commit list itself are
/// added to `degraded_records`.
pub fn aggregate_project(
    project: &str,
    project_dir: &Path,
    reference: Option<Loaded<CommitRef>>,
    tie_break: TieBreak,
) -> ProjectReport {
    let discovered = discovery::find_result_files(project_dir);
    let mut orphans = discovered.unattributed;

    let (expected, list_degraded) = match reference {
        Some(loaded) => (loaded.records, loaded.degraded),
        None => {
            tracing::warn!(project, "no commit list found; using the commits that have result files");
            (derive_reference(&discovered.files), 0)
        }
    };

    let mut by_hash: HashMap<String, usize> = HashMap::new();
    for (i, r) in expected.iter().enumerate() {
        by_hash.entry(r.bug_fixing_commit.trim().to_lowercase()).or_insert(i);
    }

    let mut grouped: Vec<Vec<ResultFile>> = vec![Vec::new(); expected.len()];
    for file in discovered.files {
        let slot = by_hash.get(&file.hash).copied().or_else(|| {
            expected
                .iter()
                .position(|r| result_file::same_commit(&r.bug_fixing_commit, &file.hash))
        });
        match slot {
            Some(i) => grouped[i].push(file),
            None => {
                tracing::warn!(project, file = %file.path.display(), "result for a commit that is not in the list");
                orphans += 1;
            }
        }
    }

    let mut commits = BTreeMap::new();
    for (reference, files) in expected.iter().zip(grouped) {
        let repo_hint = files.iter().find_map(|f| f.repo_hint.clone());
        let outcome = resolve(&reference.bug_fixing_commit, files, tie_break);
        let entry = to_entry(reference, outcome, repo_hint.as_deref());
        commits.insert(reference.bug_fixing_commit.clone(), entry);
    }

    let mut summary = stats::summarize(project, &commits, orphans);
    summary.degraded_records += list_degraded;
    ProjectReport { summary, commits }
}

fn derive_reference(files: &[ResultFile]) -> Vec<CommitRef> {
    let mut refs: BTreeMap<&str, &ResultFile> = BTreeMap::new();
    for f in files {
        refs.entry(f.hash.as_str()).or_insert(f);
    }
    refs.into_iter()
        .map(|(hash, f)| CommitRef {
            repo_name: f.repo_hint.clone().unwrap_or_default(),
            bug_fixing_commit: hash.to_string(),
        })
        .collect()
}

fn resolve(hash: &str, files: Vec<ResultFile>, tie_break: TieBreak) -> CommitOutcome {
    let mut parsed = Vec::new();
    let mut first_problem = None;

    for file in discovery::select(files, tie_break) {
        match result_file::read_result_file(&file.path, hash) {
            FileRead::Parsed(r) => parsed.push(r),
            FileRead::Missing => tracing::debug!(file = %file.path.display(), "result file vanished"),
            FileRead::Invalid(diagnostic) => {
                tracing::warn!(commit = hash, file = %file.path.display(), "{diagnostic}");
                first_problem.get_or_insert_with(|| format!("{}: {diagnostic}", file.path.display()));
            }
        }
    }

    match (parsed.len(), first_problem) {
        (0, Some(diagnostic)) => CommitOutcome::Malformed(diagnostic),
        (0, None) => CommitOutcome::NotDetermined,
        (1, _) => CommitOutcome::Determined(parsed.remove(0)),
        _ => CommitOutcome::Determined(result_file::merge(parsed)),
    }
}

fn to_entry(reference: &CommitRef, outcome: CommitOutcome, repo_hint: Option<&str>) -> CommitEntry {
    let fallback_repo = if reference.repo_name.is_empty() {
        repo_hint.unwrap_or_default().to_string()
    } else {
        reference.repo_name.clone()
    };
    let mut entry = CommitEntry {
        repo_name: fallback_repo,
        bug_fixing_commit: reference.bug_fixing_commit.clone(),
        status: CommitStatus::NotDetermined,
        changed_files: Vec::new(),
        bug_inducing_commits: Vec::new(),
        buggy_statements: Vec::new(),
        can_determine: false,
        total_token_cost: 0,
        total_llm_calls: 0,
        total_elapsed_time: 0.0,
        diagnostic: None,
    };
    match outcome {
        CommitOutcome::Determined(r) => {
            if !r.repo_name.is_empty() {
                entry.repo_name = r.repo_name;
            }
            entry.status = CommitStatus::Determined;
            entry.changed_files = r.changed_files;
            entry.bug_inducing_commits = r.bug_inducing_commits;
            entry.buggy_statements = r.buggy_statements;
            entry.can_determine = r.can_determine;
            entry.total_token_cost = r.token_cost;
            entry.total_llm_calls = r.llm_calls;
            entry.total_elapsed_time = r.elapsed_time;
        }
        CommitOutcome::NotDetermined => {}
        CommitOutcome::Malformed(diagnostic) => {
            entry.status = CommitStatus::Malformed;
            entry.diagnostic = Some(diagnostic);
        }
    }
    entry
}

/// Aggregates each named project under `results_dir`. An explicit commit list
/// applies to every project.
pub fn aggregate_projects(
    results_dir: &Path,
    projects: &[String],
    explicit_commits: Option<&Path>,
    tie_break: TieBreak,
    mut on_project_done: impl FnMut(&str),
) -> Result<BTreeMap<String, ProjectReport>> {
    let mut reports = BTreeMap::new();
    for project in projects {
        let dir = results_dir.join(project);
        if !dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "project directory not found: {}",
                dir.display()
            )));
        }
        let reference = reference_list(&dir, explicit_commits)?;
        let report = aggregate_project(project, &dir, reference, tie_break);
        tracing::info!(
            project = project.as_str(),
            commits = report.summary.total_bug_fixing_commits,
            degraded = report.summary.degraded_records,
            "aggregated"
        );
        reports.insert(project.clone(), report);
        on_project_done(project);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const A: &str = "aaaaaaa1";
    const B: &str = "bbbbbbb2";
    const C: &str = "ccccccc3";
    const D: &str = "ddddddd4";

    fn refs(hashes: &[&str]) -> Loaded<CommitRef> {
        let records = hashes
            .iter()
            .map(|h| CommitRef { repo_name: "apache/commons-lang".into(), bug_fixing_commit: h.to_string() })
            .collect();
        Loaded { records, degraded: 0 }
    }

    fn write_result(dir: &Path, hash: &str, body: &str) -> PathBuf {
        let path = dir.join("save_logs").join("apache").join("commons-lang").join(format!("{hash}.json"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    fn result(hash: &str, bic: &[&str], can_determine: bool) -> String {
        let stmts: Vec<String> = bic
            .iter()
            .map(|c| format!(r#"{{"file":"S.java","lineno":1,"statement":"s","induce_cid":"{c}"}}"#))
            .collect();
        format!(
            r#"{{"repo_name":"apache/commons-lang","bug_fixing_commit":"{hash}",
                "bug_inducing_commits":[{}],"buggy_statements":[{}],"can_determine":{can_determine}}}"#,
            bic.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(","),
            stmts.join(",")
        )
    }

    #[test]
    fn test_tie_break_parse() {
        assert_eq!("Merge".parse::<TieBreak>(), Ok(TieBreak::Merge));
        let err = "oldest".parse::<TieBreak>().unwrap_err();
        assert!(err.contains("newest") && err.contains("merge"));
    }

    #[test]
    fn test_three_commits_two_with_results() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), A, &result(A, &["1111111", "2222222"], true));
        write_result(dir.path(), C, &result(C, &[], true));

        let report = aggregate_project("lang", dir.path(), Some(refs(&[A, B, C])), TieBreak::Newest);
        let s = &report.summary;
        assert_eq!(s.total_bug_fixing_commits, 3);
        assert_eq!(s.commits_with_bug_inducing, 1);
        assert_eq!(s.can_determine_commits, 2);
        assert_eq!(s.not_determined_commits, 1);
        assert_eq!(s.total_bug_inducing_commits, 2);
        assert_eq!(s.bug_inducing_rate, "33.3%");
        assert_eq!(s.degraded_records, 0);

        assert_eq!(report.commits[B].status, CommitStatus::NotDetermined);
        assert!(report.commits[B].bug_inducing_commits.is_empty());
        assert!(!report.commits[B].can_determine);
        assert_eq!(report.commits[A].repo_name, "apache/commons-lang");
    }

    #[test]
    fn test_malformed_file_degrades_one_commit() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), A, &result(A, &["1111111"], true));
        write_result(dir.path(), D, r#"{"repo_name":"x","bug_fixing_commit":"ddddd"#);

        let report = aggregate_project("lang", dir.path(), Some(refs(&[A, D])), TieBreak::Newest);
        assert_eq!(report.summary.degraded_records, 1);
        assert_eq!(report.summary.not_determined_commits, 1);
        assert_eq!(report.summary.commits_with_bug_inducing, 1);
        let d = &report.commits[D];
        assert_eq!(d.status, CommitStatus::Malformed);
        assert!(d.diagnostic.as_deref().unwrap().contains("invalid JSON"));
    }

    #[test]
    fn test_dangling_statement_reference_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"repo_name":"apache/commons-lang","bug_fixing_commit":"aaaaaaa1",
                       "bug_inducing_commits":["1111111"],
                       "buggy_statements":[{"file":"S.java","lineno":4,"statement":"s","induce_cid":"9999999"}],
                       "can_determine":true}"#;
        write_result(dir.path(), A, body);
        let report = aggregate_project("lang", dir.path(), Some(refs(&[A])), TieBreak::Newest);
        assert_eq!(report.commits[A].status, CommitStatus::Malformed);
        assert_eq!(report.summary.commits_with_bug_inducing, 0);
    }

    #[test]
    fn test_orphan_results_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), A, &result(A, &[], false));
        write_result(dir.path(), B, &result(B, &[], false));
        let report = aggregate_project("lang", dir.path(), Some(refs(&[A])), TieBreak::Newest);
        assert_eq!(report.summary.total_bug_fixing_commits, 1);
        assert_eq!(report.summary.orphan_files, 1);
    }

    #[test]
    fn test_abbreviated_reference_hash_matches_full_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let full = "aaaaaaa1bbbbccccdddd";
        write_result(dir.path(), full, &result(full, &["1111111"], true));
        let report = aggregate_project("lang", dir.path(), Some(refs(&[A])), TieBreak::Newest);
        assert_eq!(report.commits[A].status, CommitStatus::Determined);
        assert_eq!(report.summary.orphan_files, 0);
    }

    #[test]
    fn test_merge_unions_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("save_logs").join("o").join("r").join(A);
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join("run1.json"), result(A, &["1111111"], false)).unwrap();
        std::fs::write(base.join("run2.json"), result(A, &["2222222"], true)).unwrap();
        std::fs::write(base.join("run3.json"), "not json").unwrap();

        let report = aggregate_project("p", dir.path(), Some(refs(&[A])), TieBreak::Merge);
        let a = &report.commits[A];
        assert_eq!(a.status, CommitStatus::Determined);
        assert_eq!(a.bug_inducing_commits, vec!["1111111", "2222222"]);
        assert!(a.can_determine);

        let report = aggregate_project("p", dir.path(), Some(refs(&[A])), TieBreak::Path);
        assert_eq!(report.commits[A].status, CommitStatus::Malformed, "run3.json sorts last");
    }

    #[test]
    fn test_reference_from_dataset_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dataset");
        std::fs::create_dir_all(&dataset).unwrap();
        std::fs::write(
            dataset.join("issue_list.json"),
            format!(r#"[{{"repo_name":"apache/commons-lang","bug_fixing_commit":"{A}","commit_url":"u"}}]"#),
        )
        .unwrap();
        let list = reference_list(dir.path(), None).unwrap().unwrap();
        assert_eq!(list.records[0].bug_fixing_commit, A);
        assert_eq!(list.degraded, 0);

        let empty = tempfile::tempdir().unwrap();
        assert!(reference_list(empty.path(), None).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_list_entries_are_reported_as_degraded() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("lang");
        let dataset = dir.join("dataset");
        std::fs::create_dir_all(&dataset).unwrap();
        let list = dataset.join("issue_list.json");
        std::fs::write(
            &list,
            format!(
                r#"[{{"repo_name":"apache/commons-lang","bug_fixing_commit":"{A}"}},
                    {{"repo_name":"o/r","bug_fixing_commit":123}},
                    {{"repo_name":"o/r"}}]"#
            ),
        )
        .unwrap();
        write_result(&dir, A, &result(A, &["1111111"], true));

        let reports = aggregate_projects(root.path(), &["lang".to_string()], None, TieBreak::Newest, |_| {}).unwrap();
        let s = &reports["lang"].summary;
        assert_eq!(s.total_bug_fixing_commits, 1);
        assert_eq!(s.commits_with_bug_inducing, 1);
        assert_eq!(s.not_determined_commits, 0);
        assert_eq!(s.degraded_records, 2);

        let explicit = reference_list(&dir, Some(&list)).unwrap();
        let report = aggregate_project("lang", &dir, explicit, TieBreak::Newest);
        assert_eq!(report.summary.degraded_records, 2);
    }

    #[test]
    fn test_inducing_commits_are_counted_per_fix() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), A, &result(A, &["1111111"], true));
        write_result(dir.path(), B, &result(B, &["1111111"], true));

        let report = aggregate_project("lang", dir.path(), Some(refs(&[A, B])), TieBreak::Newest);
        assert_eq!(report.summary.commits_with_bug_inducing, 2);
        assert_eq!(report.summary.total_bug_inducing_commits, 2);
    }

    #[test]
    fn test_without_reference_the_files_define_the_commits() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), B, &result(B, &["1111111"], true));
        write_result(dir.path(), A, &result(A, &[], false));
        let report = aggregate_project("lang", dir.path(), None, TieBreak::Newest);
        let keys: Vec<&String> = report.commits.keys().collect();
        assert_eq!(keys, vec![A, B]);
        assert_eq!(report.commits[A].repo_name, "apache/commons-lang");
    }

    #[test]
    fn test_discover_and_aggregate_projects() {
        let dir = tempfile::tempdir().unwrap();
        for p in ["storm", "lang", ".cache"] {
            std::fs::create_dir_all(dir.path().join(p)).unwrap();
        }
        write_result(&dir.path().join("lang"), A, &result(A, &["1111111"], true));

        let projects = discover_projects(dir.path()).unwrap();
        assert_eq!(projects, vec!["lang", "storm"]);

        let mut done = Vec::new();
        let reports =
            aggregate_projects(dir.path(), &projects, None, TieBreak::Newest, |p| done.push(p.to_string())).unwrap();
        assert_eq!(done, projects);
        assert_eq!(reports["lang"].summary.total_bug_fixing_commits, 1);
        assert_eq!(reports["storm"].summary.total_bug_fixing_commits, 0);
        assert_eq!(reports["storm"].summary.bug_inducing_rate, "0.0%");

        let missing = aggregate_projects(dir.path(), &["nope".to_string()], None, TieBreak::Newest, |_| {});
        assert!(matches!(missing, Err(PipelineError::Config(_))));
    }
}
