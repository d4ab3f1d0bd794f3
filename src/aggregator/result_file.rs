use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

use crate::types::{BugInducingResult, BuggyStatement};

/// Result of reading one file from disk.
#[derive(Debug)]
pub enum FileRead {
    Parsed(BugInducingResult),
    /// Listed but gone by the time it was opened.
    Missing,
    Invalid(String),
}

/// Canonical per-commit result layout.
#[derive(Debug, Deserialize)]
struct CanonicalResult {
    repo_name: String,
    bug_fixing_commit: String,
    bug_inducing_commits: Vec<String>,
    buggy_statements: Vec<BuggyStatement>,
    can_determine: bool,
    #[serde(default)]
    changed_files: Vec<String>,
    #[serde(default)]
    token_cost: u64,
    #[serde(default, alias = "call_llm_times")]
    llm_calls: u64,
    #[serde(default)]
    elapsed_time: f64,
}

/// Keys of the external tool's raw log objects.
const RAW_KEYS: &[&str] = &[
    "llm_patch_file_names",
    "can_determine",
    "criterion",
    "s2_cand_stmts",
    "s2_cand_cids",
    "s1_ranked_stmts_infos",
    "s1_llm_file_final_cids",
    "token_cost",
    "call_llm_times",
    "elapsed_time",
];

pub fn read_result_file(path: &Path, expected_hash: &str) -> FileRead {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FileRead::Missing,
        Err(e) => return FileRead::Invalid(format!("unreadable: {e}")),
    };
    match parse_result(&content, expected_hash) {
        Ok(result) => FileRead::Parsed(result),
        Err(diagnostic) => FileRead::Invalid(diagnostic),
    }
}

/// Parses either layout and checks its cross-references. Any failure comes
/// back as a one-line diagnostic.
pub fn parse_result(content: &str, expected_hash: &str) -> Result<BugInducingResult, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))?;

    let is_canonical = value
        .as_object()
        .is_some_and(|m| m.contains_key("bug_inducing_commits"));

    let mut result = if is_canonical {
        let c: CanonicalResult =
            serde_json::from_value(value).map_err(|e| format!("invalid result record: {e}"))?;
        BugInducingResult {
            repo_name: c.repo_name,
            bug_fixing_commit: c.bug_fixing_commit,
            changed_files: c.changed_files,
            bug_inducing_commits: c.bug_inducing_commits,
            buggy_statements: c.buggy_statements,
            can_determine: c.can_determine,
            token_cost: c.token_cost,
            llm_calls: c.llm_calls,
            elapsed_time: c.elapsed_time,
        }
    } else {
        from_raw_log(&value)?
    };

    result.changed_files = dedupe_in_order(result.changed_files);
    result.bug_inducing_commits = dedupe_in_order(result.bug_inducing_commits);
    validate(&result, expected_hash)?;
    Ok(result)
}

/// The raw log is either one object or a conversation array whose objects
/// carry some of [`RAW_KEYS`]; later objects override earlier ones.
fn from_raw_log(value: &Value) -> Result<BugInducingResult, String> {
    let objects: Vec<&Map<String, Value>> = match value {
        Value::Object(m) => vec![m],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => return Err("expected a JSON object or array".to_string()),
    };

    let mut fields: Map<String, Value> = Map::new();
    for obj in objects {
        for key in RAW_KEYS {
            if let Some(v) = obj.get(*key) {
                fields.insert(key.to_string(), v.clone());
            }
        }
    }
    if fields.is_empty() {
        return Err("unrecognised result layout".to_string());
    }

    let mut bug_inducing_commits = string_list(&fields, "s2_cand_cids")?;
    bug_inducing_commits.extend(string_list(&fields, "s1_llm_file_final_cids")?);

    let mut buggy_statements = raw_statements(&fields, "s2_cand_stmts")?;
    buggy_statements.extend(raw_statements(&fields, "s1_ranked_stmts_infos")?);

    let can_determine = match fields.get("can_determine") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err("'can_determine' must be a boolean".to_string()),
    };

    Ok(BugInducingResult {
        repo_name: String::new(),
        bug_fixing_commit: String::new(),
        changed_files: string_list(&fields, "llm_patch_file_names")?,
        bug_inducing_commits,
        buggy_statements,
        can_determine,
        token_cost: number(&fields, "token_cost") as u64,
        llm_calls: number(&fields, "call_llm_times") as u64,
        elapsed_time: number(&fields, "elapsed_time"),
    })
}

fn string_list(fields: &Map<String, Value>, key: &str) -> Result<Vec<String>, String> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("'{key}' must contain only strings"))
            })
            .collect(),
        Some(_) => Err(format!("'{key}' must be an array")),
    }
}

fn raw_statements(fields: &Map<String, Value>, key: &str) -> Result<Vec<BuggyStatement>, String> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_object)
            .map(|s| BuggyStatement {
                file: s.get("file_name").and_then(Value::as_str).unwrap_or_default().to_string(),
                lineno: s.get("lineno").and_then(Value::as_u64),
                statement: s.get("buggy_stmt").and_then(Value::as_str).unwrap_or_default().to_string(),
                induce_cid: s.get("induce_cid").and_then(Value::as_str).unwrap_or_default().to_string(),
            })
            .collect()),
        Some(_) => Err(format!("'{key}' must be an array")),
    }
}

fn number(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or(0.0).max(0.0)
}

fn validate(result: &BugInducingResult, expected_hash: &str) -> Result<(), String> {
    if !result.bug_fixing_commit.is_empty() && !same_commit(&result.bug_fixing_commit, expected_hash) {
        return Err(format!(
            "bug_fixing_commit {} does not match commit {expected_hash}",
            result.bug_fixing_commit
        ));
    }
    if result.bug_inducing_commits.iter().any(|c| c.trim().is_empty()) {
        return Err("bug_inducing_commits contains an empty hash".to_string());
    }
    let known: HashSet<&str> = result.bug_inducing_commits.iter().map(String::as_str).collect();
    for stmt in &result.buggy_statements {
        if !known.contains(stmt.induce_cid.as_str()) {
            let line = stmt.lineno.map(|l| format!(":{l}")).unwrap_or_default();
            return Err(format!(
                "buggy statement {}{line} is induced by '{}', which is not in bug_inducing_commits",
                stmt.file, stmt.induce_cid
            ));
        }
    }
    Ok(())
}

/// Full and abbreviated hashes of the same commit compare equal.
pub fn same_commit(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim().to_lowercase(), b.trim().to_lowercase());
    !a.is_empty() && !b.is_empty() && (a.starts_with(&b) || b.starts_with(&a))
}

fn dedupe_in_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|s| seen.insert(s.clone())).collect()
}

/// Union of several results for the same commit, in the order given.
pub fn merge(results: Vec<BugInducingResult>) -> BugInducingResult {
    let mut merged = BugInducingResult::default();
    for r in results {
        if merged.repo_name.is_empty() {
            merged.repo_name = r.repo_name;
        }
        if merged.bug_fixing_commit.is_empty() {
            merged.bug_fixing_commit = r.bug_fixing_commit;
        }
        merged.changed_files.extend(r.changed_files);
        merged.bug_inducing_commits.extend(r.bug_inducing_commits);
        merged.buggy_statements.extend(r.buggy_statements);
        merged.can_determine |= r.can_determine;
        merged.token_cost += r.token_cost;
        merged.llm_calls += r.llm_calls;
        merged.elapsed_time += r.elapsed_time;
    }
    merged.changed_files = dedupe_in_order(merged.changed_files);
    merged.bug_inducing_commits = dedupe_in_order(merged.bug_inducing_commits);
    merged
}
