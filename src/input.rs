use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::{CommitRecord, CommitRef};

/// Entries of a JSON array that could be read, plus how many could not.
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub degraded: usize,
}

/// Reads a JSON array where each element is decoded on its own, so one bad
/// element is skipped and counted instead of failing the whole file.
fn load_array<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&content).map_err(|e| PipelineError::json(path, e))?;

    let mut loaded = Loaded { records: Vec::with_capacity(values.len()), degraded: 0 };
    for (i, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<T>(value) {
            Ok(record) => loaded.records.push(record),
            Err(e) => {
                tracing::warn!(file = %path.display(), index = i, "skipping invalid entry: {e}");
                loaded.degraded += 1;
            }
        }
    }
    Ok(loaded)
}

/// Commit records (`{hash, message, author, date}`) for the classifier.
pub fn load_commit_records(path: &Path) -> Result<Loaded<CommitRecord>> {
    load_array(path)
}

/// Hash list for aggregation, from classifier output or an `issue_list.json`.
/// Empty hashes are dropped and repeated hashes keep their first entry.
pub fn load_commit_refs(path: &Path) -> Result<Loaded<CommitRef>> {
    let mut loaded = load_array::<CommitRef>(path)?;
    let mut seen = HashSet::new();
    let before = loaded.records.len();
    loaded.records.retain(|r| {
        let hash = r.bug_fixing_commit.trim().to_lowercase();
        !hash.is_empty() && seen.insert(hash)
    });
    let dropped = before - loaded.records.len();
    if dropped > 0 {
        tracing::warn!(file = %path.display(), "ignored {dropped} empty or repeated commit hash(es)");
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_bad_entries_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "commits.json",
            r#"[{"hash":"a1","message":"Fix bug","author":"x","date":"2024-01-01T00:00:00Z"},
                42,
                {"message":"no hash"},
                {"hash":"b2"}]"#,
        );
        let loaded = load_commit_records(&path).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.degraded, 2);
        assert_eq!(loaded.records[1].message, "");
    }

    #[test]
    fn test_not_an_array_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "commits.json", r#"{"hash":"a1"}"#);
        assert!(matches!(load_commit_records(&path), Err(PipelineError::Json { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_commit_records(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_commit_refs_deduplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "issue_list.json",
            r#"[{"repo_name":"o/r","bug_fixing_commit":"ABC1234","commit_url":"u"},
                {"repo_name":"o/r","bug_fixing_commit":"abc1234"},
                {"repo_name":"o/r","hash":"def5678"},
                {"repo_name":"o/r","hash":"  "}]"#,
        );
        let loaded = load_commit_refs(&path).unwrap();
        let hashes: Vec<&str> = loaded.records.iter().map(|r| r.bug_fixing_commit.as_str()).collect();
        assert_eq!(hashes, vec!["ABC1234", "def5678"]);
    }
}
