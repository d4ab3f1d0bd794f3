use once_cell::sync::Lazy;
use regex::Regex;

use super::{IssueProximity, ProjectConfig};

static GENERIC_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\d+\b").expect("generic reference regex"));

static FIX_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfix(?:es|ed|ing)?\b").expect("fix keyword regex"));

/// Issue-tracker reference detection. The repository's own key pattern is
/// tried first; a bare `#123` only counts next to a fix keyword, where "next
/// to" is governed by [`IssueProximity`].
pub fn detect(message: &str, config: &ProjectConfig) -> Option<String> {
    if let Some(re) = &config.issue_pattern {
        if let Some(m) = re.find(message) {
            return Some(m.as_str().to_string());
        }
    }

    if !config.generic_issue_refs {
        return None;
    }

    match config.proximity {
        IssueProximity::Message => generic_reference(message),
        IssueProximity::Line => message.lines().find_map(generic_reference),
    }
}

fn generic_reference(text: &str) -> Option<String> {
    let reference = GENERIC_REFERENCE.find(text)?;
    FIX_KEYWORD
        .is_match(text)
        .then(|| reference.as_str().to_string())
}
