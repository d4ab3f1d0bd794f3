use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use super::TieBreak;

/// A result file on disk and the commit it was attributed to.
#[derive(Debug, Clone)]
pub struct ResultFile {
    pub hash: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    /// `owner/repo` taken from the directories above the commit.
    pub repo_hint: Option<String>,
}

#[derive(Debug, Default)]
pub struct Discovered {
    pub files: Vec<ResultFile>,
    /// JSON files whose name and parent directory are both not a commit hash.
    pub unattributed: usize,
}

pub fn is_commit_hash(s: &str) -> bool {
    (7..=40).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Walks `save_logs/` when it exists, otherwise the whole project directory
/// minus `dataset/`. Every `*.json` is attributed to a commit by its file
/// stem or, failing that, its parent directory name.
pub fn find_result_files(project_dir: &Path) -> Discovered {
    let save_logs = project_dir.join("save_logs");
    let (root, skip_dataset) = if save_logs.is_dir() {
        (save_logs, false)
    } else {
        (project_dir.to_path_buf(), true)
    };

    let mut found = Discovered::default();
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !(skip_dataset && e.depth() == 1 && name == "dataset")
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable path under {}: {e}", root.display());
                continue;
            }
        };
        let path = entry.path();
        let is_json = entry.file_type().is_file()
            && path.extension().is_some_and(|x| x.eq_ignore_ascii_case("json"));
        if !is_json {
            continue;
        }

        let Some((hash, hash_dir_depth)) = attribute(path) else {
            tracing::warn!(file = %path.display(), "cannot tell which commit this result belongs to");
            found.unattributed += 1;
            continue;
        };

        let rel = path.strip_prefix(&root).unwrap_or(path);
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        found.files.push(ResultFile {
            hash,
            path: path.to_path_buf(),
            modified,
            repo_hint: repo_hint(rel, hash_dir_depth),
        });
    }
    found
}

/// Commit hash for `path`, and how many trailing components (file included)
/// belong to the commit rather than to the directories above it.
fn attribute(path: &Path) -> Option<(String, usize)> {
    let stem = path.file_stem()?.to_string_lossy();
    if is_commit_hash(&stem) {
        return Some((stem.to_lowercase(), 1));
    }
    let parent = path.parent()?.file_name()?.to_string_lossy();
    if is_commit_hash(&parent) {
        return Some((parent.to_lowercase(), 2));
    }
    None
}

fn repo_hint(rel: &Path, commit_components: usize) -> Option<String> {
    let dirs: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let above = dirs.len().checked_sub(commit_components)?;
    if above < 2 {
        return None;
    }
    Some(format!("{}/{}", dirs[above - 2], dirs[above - 1]))
}

/// Files to read for one commit: a single winner, or all of them for
/// [`TieBreak::Merge`] (in path order).
pub fn select(mut candidates: Vec<ResultFile>, tie_break: TieBreak) -> Vec<ResultFile> {
    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    if candidates.len() <= 1 || tie_break == TieBreak::Merge {
        return candidates;
    }
    let winner = match tie_break {
        TieBreak::Newest => candidates
            .into_iter()
            .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path))),
        _ => candidates.pop(),
    };
    if let Some(w) = &winner {
        tracing::debug!(commit = %w.hash, file = %w.path.display(), "several result files, picked one ({tie_break})");
    }
    winner.into_iter().collect()
}
