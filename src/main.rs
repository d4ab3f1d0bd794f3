mod aggregator;
mod classifier;
mod compare;
mod config;
mod convert;
mod error;
mod git;
mod input;
mod reporters;
mod types;

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aggregator::TieBreak;
use classifier::{ClassificationRun, ProjectConfig, Strategy};
use config::{PipelineConfig, RepositoryEntry};
use error::{PipelineError, Result};
use types::CommitRecord;

const DEFAULT_CONFIG_FILE: &str = ".bugfix-szz.yml";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_RESULTS_DIR: &str = "llm4szz_datasets";
const COMMITS_FILE: &str = "bug_fixing_commits.json";

#[derive(Parser, Debug)]
#[command(
    name = "bugfix-szz",
    about = "🐛 Find bug-fixing commits and summarise SZZ bug-inducing results",
    version,
    long_about = "Classifies commit messages as bug fixes with keyword and issue-reference\n\
                  heuristics, prepares the commit list for an LLM-based SZZ tool, and\n\
                  aggregates that tool's per-commit result files into per-project statistics."
)]
struct Cli {
    /// YAML config file. Defaults to ./.bugfix-szz.yml when present.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG overrides this.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify the commits of one repository.
    Classify(ClassifyArgs),
    /// Classify every repository listed in the config file.
    Batch(BatchArgs),
    /// Turn bug_fixing_commits.json into the SZZ tool's issue_list.json.
    Convert(ConvertArgs),
    /// Summarise SZZ result files per project.
    Aggregate(AggregateArgs),
    /// Run every strategy over the same commits.
    Compare(CompareArgs),
    /// Print an annotated config template.
    GenerateConfig {
        /// Write the template here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Where commits come from: a git repository, or a JSON array of records.
#[derive(Args, Debug)]
struct CommitSource {
    /// Local git repository (default: current directory).
    #[arg(value_name = "REPO_PATH", conflicts_with = "commits")]
    repo_path: Option<PathBuf>,

    /// JSON array of {hash, message, author, date} records instead of git.
    #[arg(long, value_name = "FILE")]
    commits: Option<PathBuf>,

    /// Branch to read; falls back to the remote default branch if missing.
    #[arg(long, conflicts_with = "all")]
    branch: Option<String>,

    /// e.g. "2 years ago" or "2020-01-01". Empty means all history.
    #[arg(long, default_value = "")]
    since: String,

    /// Read commits from all refs.
    #[arg(long)]
    all: bool,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    #[command(flatten)]
    source: CommitSource,

    /// Repository identifier, owner/name. Selects the issue-tracker pattern.
    #[arg(long, value_name = "OWNER/NAME")]
    repo: String,

    /// simple, strict, pantiuchina, issue_id or combined
    #[arg(long)]
    strategy: Option<String>,

    /// Output file (default: <output_dir>/bug_fixing_commits.json).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// simple, strict, pantiuchina, issue_id or combined
    #[arg(long)]
    strategy: Option<String>,

    /// One subdirectory per repository is created here.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, default_value = "")]
    since: String,

    /// Repositories classified at the same time (default: one per core).
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// bug_fixing_commits.json produced by `classify`.
    input: PathBuf,

    /// Default: issue_list.json next to the input.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AggregateArgs {
    /// Project directory name under the results directory.
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    project: Option<String>,

    /// Aggregate every project under the results directory.
    #[arg(long)]
    all: bool,

    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Commit list to aggregate against instead of each project's dataset/issue_list.json.
    #[arg(long, value_name = "FILE")]
    commits: Option<PathBuf>,

    /// newest, path or merge
    #[arg(long)]
    tie_break: Option<String>,

    #[arg(long, default_value = "bug_inducing_summary.json")]
    output: PathBuf,

    /// Also write a row-per-commit CSV next to the JSON output.
    #[arg(long)]
    export_csv: bool,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[command(flatten)]
    source: CommitSource,

    /// Ad-hoc message to classify; repeatable. Replaces the commit source.
    #[arg(long = "message", short = 'm')]
    messages: Vec<String>,

    #[arg(long, value_name = "OWNER/NAME", default_value = "unknown/unknown")]
    repo: String,

    /// Show every message's verdicts, not just the totals.
    #[arg(long)]
    details: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("bugfix_szz={level}"))))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// `Ok(false)` means the command finished but some of its work failed.
fn run(cli: Cli) -> Result<bool> {
    if let Command::GenerateConfig { output } = &cli.command {
        config::print_template(output.as_deref())?;
        if let Some(p) = output {
            eprintln!("✓ Config template written to {}", p.display());
        }
        return Ok(true);
    }

    let cfg = load_settings(cli.config.as_deref())?;
    match cli.command {
        Command::Classify(args) => run_classify(args, &cfg).map(|_| true),
        Command::Batch(args) => run_batch(args, &cfg),
        Command::Convert(args) => run_convert(args).map(|_| true),
        Command::Aggregate(args) => run_aggregate(args, &cfg).map(|_| true),
        Command::Compare(args) => run_compare(args, &cfg).map(|_| true),
        Command::GenerateConfig { .. } => Ok(true),
    }
}

fn load_settings(explicit: Option<&Path>) -> Result<PipelineConfig> {
    match explicit {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            tracing::info!("using {DEFAULT_CONFIG_FILE}");
            config::load_config(Path::new(DEFAULT_CONFIG_FILE))
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// CLI value first, then the config file, then the built-in default.
fn resolve_strategy(flag: Option<&str>, cfg: &PipelineConfig) -> Result<Strategy> {
    match flag.or(cfg.strategy.as_deref()) {
        Some(s) => s
            .parse()
            .map_err(|e| PipelineError::Config(format!("Invalid strategy: {e}"))),
        None => Ok(Strategy::default()),
    }
}

fn resolve_tie_break(flag: Option<&str>, cfg: &PipelineConfig) -> Result<TieBreak> {
    match flag {
        Some(t) => t
            .parse()
            .map_err(|e| PipelineError::Config(format!("Invalid --tie-break: {e}"))),
        None => Ok(cfg.tie_break()),
    }
}

// ── classify ───────────────────────────────────────────────────────────────────

fn run_classify(args: ClassifyArgs, cfg: &PipelineConfig) -> Result<()> {
    let strategy = resolve_strategy(args.strategy.as_deref(), cfg)?;
    let project = ProjectConfig::from_settings(&args.repo, cfg)?;
    project.ensure_supports(strategy)?;

    let output = args.output.unwrap_or_else(|| {
        PathBuf::from(cfg.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR)).join(COMMITS_FILE)
    });

    let pb = spinner();
    let start = Instant::now();

    pb.set_message("[1/2] Reading commits...");
    let (commits, skipped) = match read_commits(&args.source) {
        Ok(c) => c,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };
    pb.println(format!("  ✓ [1/2] {} commits read              {}", commits.len(), fmt_dur(start.elapsed())));

    pb.set_message(format!("[2/2] Classifying ({strategy})..."));
    let step = Instant::now();
    let mut run = classifier::classify_commits(&commits, strategy, &project)?;
    run.degraded_records += skipped;
    pb.println(format!("  ✓ [2/2] Classified                    {}", fmt_dur(step.elapsed())));
    pb.finish_and_clear();

    reporters::json::write_json(&run.bug_fixing, Some(&output))?;
    eprintln!("✓ {} bug-fixing commits written to {}", run.bug_fixing.len(), output.display());
    reporters::terminal::report_classification(&run);
    Ok(())
}

/// Commits from the JSON file if one was given, else from `git log`.
/// The second value counts input records that had to be skipped.
fn read_commits(source: &CommitSource) -> Result<(Vec<CommitRecord>, usize)> {
    if let Some(file) = &source.commits {
        let loaded = input::load_commit_records(file)?;
        return Ok((loaded.records, loaded.degraded));
    }

    let repo = source.repo_path.clone().unwrap_or_else(|| PathBuf::from("."));
    if !repo.exists() {
        return Err(PipelineError::Config(format!("path does not exist: {}", repo.display())));
    }
    let revision = match &source.branch {
        Some(b) => Some(git::branch::resolve_branch(&repo, b)?),
        None => None,
    };
    let commits = git::log_parser::parse_log(&repo, revision.as_deref(), &source.since, source.all)?;
    Ok((commits, 0))
}

// ── batch ──────────────────────────────────────────────────────────────────────

fn run_batch(args: BatchArgs, cfg: &PipelineConfig) -> Result<bool> {
    let strategy = resolve_strategy(args.strategy.as_deref(), cfg)?;
    let repos = cfg.repositories.as_deref().unwrap_or_default();
    if repos.is_empty() {
        return Err(PipelineError::Config(
            "no repositories configured; add a 'repositories' list to the config file".to_string(),
        ));
    }

    // Settings problems stop the run before any repository is touched.
    let mut jobs: Vec<(&RepositoryEntry, ProjectConfig)> = Vec::with_capacity(repos.len());
    for entry in repos {
        let project = ProjectConfig::from_settings(&entry.name, cfg)?;
        project.ensure_supports(strategy)?;
        jobs.push((entry, project));
    }

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| PathBuf::from(cfg.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR)));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()
        .map_err(|e| PipelineError::Config(format!("cannot start worker pool: {e}")))?;

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉ "),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    let start = Instant::now();

    let outcomes: Vec<(String, Result<(ClassificationRun, PathBuf)>)> = pool.install(|| {
        jobs.par_iter()
            .map(|(entry, project)| {
                let outcome = classify_repository(entry, project, strategy, &output_dir, &args.since);
                pb.inc(1);
                pb.set_message(entry.name.clone());
                (entry.name.clone(), outcome)
            })
            .collect()
    });
    pb.finish_and_clear();

    let failed = outcomes.iter().filter(|(_, o)| o.is_err()).count();
    eprintln!(
        "✔ {} repositories in {}{}",
        outcomes.len(),
        fmt_dur(start.elapsed()),
        if failed > 0 { format!(" — ⚠ {failed} failed") } else { String::new() },
    );

    for (name, outcome) in &outcomes {
        match outcome {
            Ok((run, path)) => {
                eprintln!("✓ [{name}] {} bug-fixing commits written to {}", run.bug_fixing.len(), path.display());
                reporters::terminal::report_classification(run);
            }
            Err(e) => eprintln!("{} [{name}] {e}", "✗".red().bold()),
        }
    }
    Ok(failed == 0)
}

fn classify_repository(
    entry: &RepositoryEntry,
    project: &ProjectConfig,
    strategy: Strategy,
    output_dir: &Path,
    since: &str,
) -> Result<(ClassificationRun, PathBuf)> {
    let path = entry.path.as_deref().ok_or_else(|| {
        PipelineError::Config(format!("repository '{}' has no 'path' to a local clone", entry.name))
    })?;
    let source = CommitSource {
        repo_path: Some(PathBuf::from(path)),
        commits: None,
        branch: entry.branch.clone(),
        since: since.to_string(),
        all: false,
    };
    let (commits, skipped) = read_commits(&source)?;
    let mut run = classifier::classify_commits(&commits, strategy, project)?;
    run.degraded_records += skipped;
    tracing::info!(repo = %entry.name, commits = run.total_commits, bug_fixing = run.bug_fixing.len(), "classified");

    let out = output_dir.join(short_name(&entry.name)).join(COMMITS_FILE);
    reporters::json::write_json(&run.bug_fixing, Some(&out))?;
    Ok((run, out))
}

// ── convert ────────────────────────────────────────────────────────────────────

fn run_convert(args: ConvertArgs) -> Result<()> {
    let output = args.output.unwrap_or_else(|| args.input.with_file_name("issue_list.json"));
    let converted = convert::convert_file(&args.input, &output)?;
    eprintln!("✓ {} commits written to {}", converted.written, output.display());
    if let Some(notice) = reporters::terminal::skipped_notice(converted.skipped) {
        eprintln!("{}", notice.yellow());
    }
    Ok(())
}

// ── aggregate ──────────────────────────────────────────────────────────────────

fn run_aggregate(args: AggregateArgs, cfg: &PipelineConfig) -> Result<()> {
    let tie_break = resolve_tie_break(args.tie_break.as_deref(), cfg)?;
    let results_dir = args
        .results_dir
        .unwrap_or_else(|| PathBuf::from(cfg.results_dir().unwrap_or(DEFAULT_RESULTS_DIR)));

    let projects = match args.project {
        Some(p) => vec![p],
        None => aggregator::discover_projects(&results_dir)?,
    };
    if projects.is_empty() {
        tracing::warn!("no project directories under {}", results_dir.display());
    }

    let pb = ProgressBar::new(projects.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉ "),
    );
    let reports = aggregator::aggregate_projects(
        &results_dir,
        &projects,
        args.commits.as_deref(),
        tie_break,
        |project| {
            pb.inc(1);
            pb.set_message(project.to_string());
        },
    );
    pb.finish_and_clear();
    let reports = reports?;

    reporters::json::write_json(&reports, Some(&args.output))?;
    eprintln!("✓ Results written to {}", args.output.display());

    let overall = (reports.len() > 1).then(|| aggregator::stats::overall(&reports));
    if let Some(o) = &overall {
        let path = sibling(&args.output, "overall.json");
        reporters::json::write_json(o, Some(&path))?;
        eprintln!("✓ Overall summary written to {}", path.display());
    }

    if args.export_csv {
        let path = sibling(&args.output, "csv");
        let rows = reporters::csv::flatten(&reports);
        reporters::csv::write_csv(&rows, &path)?;
        eprintln!("✓ {} rows written to {}", rows.len(), path.display());
    }

    reporters::terminal::report_aggregate(&reports, overall.as_ref());
    Ok(())
}

// ── compare ────────────────────────────────────────────────────────────────────

fn run_compare(args: CompareArgs, cfg: &PipelineConfig) -> Result<()> {
    let project = ProjectConfig::from_settings(&args.repo, cfg)?;

    let owned: Vec<String> = if args.messages.is_empty() {
        let (commits, skipped) = read_commits(&args.source)?;
        if let Some(notice) = reporters::terminal::skipped_notice(skipped) {
            eprintln!("{}", notice.yellow());
        }
        commits.into_iter().map(|c| c.message).collect()
    } else {
        args.messages.clone()
    };
    let messages: Vec<&str> = owned.iter().map(String::as_str).collect();

    let comparison = compare::compare_strategies(&messages, &project);
    reporters::terminal::report_comparison(&messages, &comparison, args.details || !args.messages.is_empty());
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────────────

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_millis();
    if ms >= 1000 { format!("{:.1}s", d.as_secs_f64()) } else { format!("{ms}ms") }
}

/// `out/summary.json` + `csv` → `out/summary.csv`.
fn sibling(base: &Path, extension: &str) -> PathBuf {
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("bug_inducing_summary");
    base.with_file_name(format!("{stem}.{extension}"))
}

/// Directory name for a repository's output: the part after the owner,
/// with anything unusual replaced by `-`.
fn short_name(repo: &str) -> String {
    let name = repo.rsplit('/').next().unwrap_or(repo);
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .collect()
}
