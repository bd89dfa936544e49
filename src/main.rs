use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use markup_patcher::config::{
    load_from_path, DocumentOutcome, DocumentStatus, HtmlUpdater, UpdateMode, UpdateReport,
};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "markup-patcher")]
#[command(about = "Point script references in HTML/XML files at generated scripts", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite documents so their script elements reference the given scripts
    Update {
        #[command(flatten)]
        run: RunArgs,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Report documents that are not up to date; exits 1 if any are found
    Check {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Update config (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory relative config paths are resolved against (defaults to the
    /// current directory)
    #[arg(short, long)]
    base_dir: Option<PathBuf>,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,

    /// Print the report as JSON instead of a summary
    #[arg(long, conflicts_with = "diff")]
    json: bool,

    /// Generated script files the documents should reference
    #[arg(required = true)]
    scripts: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ok = match cli.command {
        Commands::Update { run, dry_run } => {
            let mode = if dry_run {
                UpdateMode::DryRun
            } else {
                UpdateMode::Write
            };
            cmd_update(&run, mode)?
        }
        Commands::Check { run } => cmd_check(&run)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Returns whether every document was handled without failure.
fn cmd_update(run: &RunArgs, mode: UpdateMode) -> Result<bool> {
    if mode == UpdateMode::DryRun && !run.json {
        println!("{}", "[DRY RUN - showing what would be updated]".cyan());
    }
    let report = run_updater(run, mode)?;
    print_report(&report, run)?;
    Ok(!report.has_failures())
}

/// Returns whether every document is already up to date.
fn cmd_check(run: &RunArgs) -> Result<bool> {
    let report = run_updater(run, UpdateMode::DryRun)?;
    print_report(&report, run)?;

    let stale = report.count(DocumentStatus::WouldUpdate);
    if stale > 0 {
        eprintln!(
            "{} {} document(s) are not up to date",
            "✗".red(),
            stale
        );
    }
    Ok(stale == 0 && !report.has_failures())
}

fn run_updater(run: &RunArgs, mode: UpdateMode) -> Result<UpdateReport> {
    let cwd = env::current_dir().context("failed to determine current directory")?;
    let config = load_from_path(&run.config)?;
    let base_dir = cwd.join(run.base_dir.as_deref().unwrap_or(Path::new(".")));
    let scripts: Vec<PathBuf> = run.scripts.iter().map(|s| cwd.join(s)).collect();

    log::debug!(
        "updating {} rule(s) in {} for {} script(s)",
        config.updates.len(),
        base_dir.display(),
        scripts.len()
    );
    let report = HtmlUpdater::new(&config, base_dir).process(&scripts, mode);

    for diagnostic in report.all_diagnostics() {
        log::log!(diagnostic.severity.level(), "{diagnostic}");
    }
    Ok(report)
}

fn print_report(report: &UpdateReport, run: &RunArgs) -> Result<()> {
    if run.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for outcome in &report.documents {
        print_outcome(outcome);
        if let (true, Some(change)) = (run.diff, &outcome.change) {
            display_diff(&outcome.path, &change.before, &change.after);
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} updated",
        format!("{}", report.count(DocumentStatus::Updated)).green()
    );
    println!(
        "  {} would update",
        format!("{}", report.count(DocumentStatus::WouldUpdate)).cyan()
    );
    println!(
        "  {} up to date",
        format!("{}", report.count(DocumentStatus::UpToDate)).yellow()
    );
    println!(
        "  {} skipped",
        format!("{}", report.count(DocumentStatus::Skipped)).yellow()
    );
    println!(
        "  {} failed",
        format!("{}", report.count(DocumentStatus::Failed)).red()
    );
    Ok(())
}

fn print_outcome(outcome: &DocumentOutcome) {
    let path = outcome.path.display();
    match outcome.status {
        DocumentStatus::Updated => println!("{} {}: Updated", "✓".green(), path),
        DocumentStatus::WouldUpdate => println!("{} {}: Would update", "✓".green(), path),
        DocumentStatus::UpToDate => println!("{} {}: Already up to date", "⊙".yellow(), path),
        DocumentStatus::Skipped => println!("{} {}: Skipped", "⊘".cyan(), path),
        DocumentStatus::Failed => eprintln!("{} {}: Failed", "✗".red(), path),
    }
}

/// Helper: Show unified diff between original and updated content
fn display_diff(file: &Path, original: &str, updated: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (updated)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, updated);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    if !updated.ends_with('\n') {
        println!();
    }
}
