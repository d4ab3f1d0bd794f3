use std::path::Path;
use std::process::Command;

use crate::error::{PipelineError, Result};

/// Resolves `requested` to a revision `git log` accepts: the local branch,
/// then `origin/<branch>`, then the remote's default branch.
pub fn resolve_branch(cwd: &Path, requested: &str) -> Result<String> {
    for candidate in [requested.to_string(), format!("origin/{requested}")] {
        if revision_exists(cwd, &candidate) {
            return Ok(candidate);
        }
    }

    match default_branch(cwd) {
        Some(default) if default != requested => {
            tracing::warn!(
                repo = %cwd.display(),
                "Branch '{requested}' not found. Falling back to default branch '{default}'."
            );
            [default.clone(), format!("origin/{default}")]
                .into_iter()
                .find(|c| revision_exists(cwd, c))
                .ok_or_else(|| {
                    PipelineError::Git(format!("Default branch '{default}' does not resolve in {}", cwd.display()))
                })
        }
        _ => Err(PipelineError::Git(format!(
            "Branch '{requested}' not found and could not determine default branch in {}",
            cwd.display()
        ))),
    }
}

fn revision_exists(cwd: &Path, revision: &str) -> bool {
    Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("{revision}^{{commit}}")])
        .current_dir(cwd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// The remote default branch: `origin/HEAD`, else `git remote show origin`.
fn default_branch(cwd: &Path) -> Option<String> {
    let run = |args: &[&str]| -> Option<String> {
        let output = Command::new("git").args(args).current_dir(cwd).output().ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    };

    run(&["symbolic-ref", "refs/remotes/origin/HEAD"])
        .and_then(|out| parse_symbolic_ref(&out))
        .or_else(|| run(&["remote", "show", "origin"]).and_then(|out| parse_remote_head(&out)))
}

/// `refs/remotes/origin/master` → `master`
fn parse_symbolic_ref(output: &str) -> Option<String> {
    let name = output.trim().rsplit('/').next()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Picks the `HEAD branch: <name>` line out of `git remote show origin`.
fn parse_remote_head(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.contains("HEAD branch"))
        .and_then(|l| l.rsplit(':').next())
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty() && b != "(unknown)")
}
