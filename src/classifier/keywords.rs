use once_cell::sync::Lazy;
use regex::Regex;

const SIMPLE_KEYWORDS: &[&str] = &[
    "error", "defect", "flaw", "bug", "fix", "issue", "mistake", "fault", "incorrect",
];

static SIMPLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", SIMPLE_KEYWORDS.join("|"))).expect("simple keyword regex")
});

/// Ordered vocabulary of whole words. Lookup follows vocabulary order, not
/// position in the message, so the reported word is stable for a message.
pub struct WordList {
    words: Vec<(&'static str, Regex)>,
}

impl WordList {
    fn new(words: &[&'static str]) -> Self {
        WordList {
            words: words
                .iter()
                .map(|w| (*w, Regex::new(&format!(r"(?i)\b{w}\b")).expect("word regex")))
                .collect(),
        }
    }

    pub fn first_present(&self, message: &str) -> Option<&'static str> {
        self.words
            .iter()
            .find(|(_, re)| re.is_match(message))
            .map(|(w, _)| *w)
    }
}

static STRICT_FIX_WORDS: Lazy<WordList> = Lazy::new(|| WordList::new(&["fix", "solve"]));
static STRICT_BUG_WORDS: Lazy<WordList> =
    Lazy::new(|| WordList::new(&["bug", "issue", "problem", "error", "misfeature"]));

static PANTIUCHINA_FIX_WORDS: Lazy<WordList> =
    Lazy::new(|| WordList::new(&["fix", "solve", "close"]));
static PANTIUCHINA_BUG_WORDS: Lazy<WordList> =
    Lazy::new(|| WordList::new(&["bug", "defect", "crash", "fail", "error"]));

/// Any whole-word keyword from the simple vocabulary. First hit wins; the
/// keyword is reported in lower case.
pub fn simple(message: &str) -> Option<String> {
    SIMPLE_PATTERN.find(message).map(|m| m.as_str().to_lowercase())
}

/// Rosa et al.: a fix word and a bug word, and no exclusion pattern.
pub fn strict(message: &str, exclusions: &[Regex]) -> Option<String> {
    conjunction(message, &STRICT_FIX_WORDS, &STRICT_BUG_WORDS, exclusions)
}

/// Pantiuchina et al.: same shape as [`strict`] with a wider vocabulary.
pub fn pantiuchina(message: &str, exclusions: &[Regex]) -> Option<String> {
    conjunction(message, &PANTIUCHINA_FIX_WORDS, &PANTIUCHINA_BUG_WORDS, exclusions)
}

/// Reported as `"<fix word>+<bug word>"`.
fn conjunction(
    message: &str,
    fix_words: &WordList,
    bug_words: &WordList,
    exclusions: &[Regex],
) -> Option<String> {
    if is_excluded(message, exclusions) {
        return None;
    }
    let fix = fix_words.first_present(message)?;
    let bug = bug_words.first_present(message)?;
    Some(format!("{fix}+{bug}"))
}

pub fn is_excluded(message: &str, exclusions: &[Regex]) -> bool {
    exclusions.iter().any(|re| re.is_match(message))
}
