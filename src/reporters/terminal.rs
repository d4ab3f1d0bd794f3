use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, Table};
use std::collections::BTreeMap;

use crate::classifier::ClassificationRun;
use crate::compare::Comparison;
use crate::types::{OverallSummary, ProjectReport};

pub fn report_classification(run: &ClassificationRun) {
    println!();
    println!(
        "{} {} ({} strategy, {} commits)",
        "🐛 bugfix-szz".red().bold(),
        run.repo_name.cyan(),
        run.strategy.to_string().bright_black(),
        run.total_commits.to_string().bright_black(),
    );
    println!();

    if run.bug_fixing.is_empty() {
        println!("{}", "  No bug-fixing commits found.".yellow());
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["METHOD", "COMMITS", "SHARE"]);
        for (method, count) in &run.by_method {
            table.add_row(vec![
                Cell::new(method.as_str()),
                Cell::new(count.to_string()),
                Cell::new(share(*count, run.total_commits)).fg(Color::DarkGrey),
            ]);
        }
        table.add_row(vec![
            Cell::new("total").add_attribute(Attribute::Bold),
            Cell::new(run.bug_fixing.len().to_string()).add_attribute(Attribute::Bold),
            Cell::new(share(run.bug_fixing.len(), run.total_commits)).add_attribute(Attribute::Bold),
        ]);
        println!("{table}");
    }

    if let Some(notice) = skipped_notice(run.degraded_records) {
        println!();
        println!("{}", notice.yellow());
    }
    println!();
}

/// Warning line for input records that could not be read, if there were any.
pub fn skipped_notice(skipped: usize) -> Option<String> {
    (skipped > 0).then(|| format!("⚠️  {skipped} commit record(s) skipped"))
}

pub fn report_aggregate(projects: &BTreeMap<String, ProjectReport>, overall: Option<&OverallSummary>) {
    println!();
    println!(
        "{} ({} project{})",
        "🐛 bugfix-szz aggregate".red().bold(),
        projects.len(),
        if projects.len() != 1 { "s" } else { "" },
    );
    println!();

    if projects.is_empty() {
        println!("{}", "  No projects found.".yellow());
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "PROJECT", "COMMITS", "WITH BIC", "BIC RATE", "DETERMINED", "DET. RATE", "BIC", "AVG", "DEGRADED",
    ]);

    for (name, report) in projects {
        let s = &report.summary;
        table.add_row(vec![
            Cell::new(name),
            Cell::new(s.total_bug_fixing_commits.to_string()),
            Cell::new(s.commits_with_bug_inducing.to_string()),
            Cell::new(&s.bug_inducing_rate).fg(Color::Cyan),
            Cell::new(s.can_determine_commits.to_string()),
            Cell::new(&s.determination_rate).fg(Color::Cyan),
            Cell::new(s.total_bug_inducing_commits.to_string()),
            Cell::new(&s.avg_bug_inducing_per_commit),
            degraded_cell(s.degraded_records),
        ]);
    }
    println!("{table}");

    let orphans: usize = projects.values().map(|p| p.summary.orphan_files).sum();
    if orphans > 0 {
        println!();
        println!(
            "{}",
            format!("⚠️  {orphans} result file(s) did not match any listed commit").yellow()
        );
    }

    if let Some(o) = overall {
        println!();
        println!("{}", "Σ Overall:".cyan().bold());
        println!(
            "    {} bug-fixing commits, {} with bug-inducing commits, {} determinable",
            o.total_bug_fixing_commits, o.commits_with_bug_inducing, o.can_determine_commits,
        );
        println!(
            "    bug-inducing rate {} pooled, {} mean",
            o.pooled_bug_inducing_rate.cyan(),
            o.mean_bug_inducing_rate.cyan(),
        );
        println!(
            "    determination rate {} pooled, {} mean",
            o.pooled_determination_rate.cyan(),
            o.mean_determination_rate.cyan(),
        );
    }
    println!();
}

pub fn report_comparison(messages: &[&str], comparison: &Comparison, show_messages: bool) {
    println!();
    println!(
        "{} ({} message{})",
        "🐛 bugfix-szz strategy comparison".red().bold(),
        messages.len(),
        if messages.len() != 1 { "s" } else { "" },
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["STRATEGY", "DETECTED", "RATE"]);
    for t in &comparison.tallies {
        table.add_row(vec![
            Cell::new(t.strategy.as_str()),
            Cell::new(t.detected.to_string()),
            Cell::new(share(t.detected, t.total)).fg(Color::Cyan),
        ]);
    }
    println!("{table}");

    if show_messages && !messages.is_empty() {
        let mut detail = Table::new();
        detail.load_preset(UTF8_FULL);
        let mut header = vec!["MESSAGE".to_string()];
        header.extend(comparison.tallies.iter().map(|t| t.strategy.as_str().to_uppercase()));
        detail.set_header(header);

        for (message, verdicts) in messages.iter().zip(&comparison.verdicts) {
            let mut row = vec![Cell::new(first_line(message, 50))];
            row.extend(verdicts.iter().map(|v| match v.matched_pattern() {
                Some(p) => Cell::new(p).fg(Color::Green),
                None => Cell::new("–").fg(Color::DarkGrey),
            }));
            detail.add_row(row);
        }
        println!();
        println!("{detail}");
    }
    println!();
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn share(count: usize, total: usize) -> String {
    crate::aggregator::stats::format_rate(count, total)
}

fn degraded_cell(n: usize) -> Cell {
    if n > 0 {
        Cell::new(n.to_string()).fg(Color::Yellow)
    } else {
        Cell::new("0").fg(Color::DarkGrey)
    }
}

/// Subject line, cut to `max` characters.
fn first_line(message: &str, max: usize) -> String {
    let line = message.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        return line.to_string();
    }
    let kept: String = line.chars().take(max - 1).collect();
    format!("{kept}…")
}
