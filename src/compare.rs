use rayon::prelude::*;

use crate::classifier::{ProjectConfig, Strategy};
use crate::types::ClassificationResult;

/// How many of the messages one strategy accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyTally {
    pub strategy: Strategy,
    pub detected: usize,
    pub total: usize,
}

/// Every strategy's verdict on every message, plus per-strategy counts.
/// `verdicts[i][j]` is strategy `Strategy::ALL[j]` applied to message `i`.
#[derive(Debug)]
pub struct Comparison {
    pub tallies: Vec<StrategyTally>,
    pub verdicts: Vec<Vec<ClassificationResult>>,
}

/// Strategies run in parallel; each one walks the messages in order.
pub fn compare_strategies(messages: &[&str], config: &ProjectConfig) -> Comparison {
    let columns: Vec<(Strategy, Vec<ClassificationResult>)> = Strategy::ALL[..]
        .par_iter()
        .filter(|s| config.ensure_supports(**s).is_ok())
        .map(|s| (*s, messages.iter().map(|m| s.classify(m, config)).collect()))
        .collect();

    let tallies = columns
        .iter()
        .map(|(strategy, results)| StrategyTally {
            strategy: *strategy,
            detected: results.iter().filter(|r| r.is_bug_fix()).count(),
            total: messages.len(),
        })
        .collect();

    let verdicts = (0..messages.len())
        .map(|i| columns.iter().map(|(_, results)| results[i].clone()).collect())
        .collect();

    Comparison { tallies, verdicts }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tallies_per_strategy() {
        let config = ProjectConfig::for_repository("apache/commons-lang");
        let messages = ["LANG-1: Fix bug in parser", "Add docs", "Fixed crash on start"];
        let cmp = compare_strategies(&messages, &config);

        let count = |s: Strategy| cmp.tallies.iter().find(|t| t.strategy == s).unwrap().detected;
        assert_eq!(cmp.tallies.len(), Strategy::ALL.len());
        assert_eq!(count(Strategy::Simple), 1);
        assert_eq!(count(Strategy::IssueId), 1);
        assert_eq!(count(Strategy::Combined), 1);
        assert_eq!(cmp.verdicts.len(), 3);
        assert!(cmp.verdicts[1].iter().all(|r| !r.is_bug_fix()));
    }

    #[test]
    fn test_unsupported_strategy_is_left_out() {
        let config = ProjectConfig::for_repository("INRIA/spoon").with_generic_issue_refs(false);
        let cmp = compare_strategies(&["fix bug"], &config);
        assert!(cmp.tallies.iter().all(|t| t.strategy != Strategy::IssueId));
        assert_eq!(cmp.verdicts[0].len(), Strategy::ALL.len() - 1);
    }
}
