//! taskweave command-line tool.
//!
//! A thin front-end over `taskweave-core`: notify the coordinator of
//! main-line commits, register tasks from their worktrees, and inspect
//! timelines, drift, merge context and conflicts between tasks.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::Cell;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use taskweave_core::conflict::{explain_conflict, format_compatibility_summary};
use taskweave_core::rules::build_default_rules;
use taskweave_core::store::{StatePaths, StoreLock, DEFAULT_STATE_DIR};
use taskweave_core::timeline::{BranchPoint, MainBranchEvent};
use taskweave_core::{CoordinatorConfig, GitCli, MergeCoordinator};

type Coordinator = MergeCoordinator<GitCli>;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// taskweave command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "taskweave",
    version,
    about = "Track and coordinate merges of concurrent tasks working in git worktrees"
)]
struct Cli {
    /// Project root (the main repository checkout).
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Path to the TOML configuration file
    /// [default: <project>/.taskweave/config.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a main-line commit on every tracked file it touches.
    NotifyCommit {
        /// Commit hash or ref.
        commit: String,
    },

    /// Show the main-line history and task views of one file.
    ShowTimeline {
        /// File path relative to the project root.
        file: String,
        #[arg(long)]
        json: bool,
    },

    /// Show how many main-line commits each of a task's files is behind.
    ShowDrift {
        task: String,
        #[arg(long)]
        json: bool,
    },

    /// Show everything a merge of one task's file needs to know.
    ShowMergeContext {
        task: String,
        file: String,
        #[arg(long)]
        json: bool,
    },

    /// List files with a timeline.
    ListTrackedFiles {
        #[arg(long)]
        json: bool,
    },

    /// Start tracking a task from its worktree.
    InitFromWorktree {
        task: String,

        /// Worktree path. Located under the worktrees directory if omitted.
        path: Option<PathBuf>,

        /// What the task is meant to achieve.
        #[arg(long, default_value = "")]
        intent: String,

        /// Short task title.
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Detect and explain conflicts between two or more tasks.
    Conflicts {
        #[arg(required = true, num_args = 2..)]
        tasks: Vec<String>,
        #[arg(long)]
        json: bool,
    },

    /// Summarize the built-in compatibility rules.
    Rules,

    /// Show tracking counters.
    Summary {
        #[arg(long)]
        json: bool,
    },

    /// Drop a task's tracking data and abandon its timeline views.
    Cleanup {
        task: String,

        /// Keep baseline snapshots of files no other task references.
        #[arg(long)]
        keep_baselines: bool,
    },

    /// Print the worktree directory of a task.
    FindWorktree { task: String },

    /// Create the state directory and a default configuration file.
    Init,
}

/// How a command that did not fail ended.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Done,
    NoData,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_config(&cli.project_dir, cli.config.as_deref());

    let level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let result = match config {
        Ok(config) => run(cli.command, &cli.project_dir, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::NoData) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, project_dir: &Path, config: CoordinatorConfig) -> Result<Outcome> {
    debug!(project = %project_dir.display(), command = ?command, "running command");

    match command {
        Commands::Init => cmd_init(project_dir, &config),
        Commands::Rules => cmd_rules(),
        Commands::FindWorktree { task } => cmd_find_worktree(project_dir, config, &task).await,
        Commands::NotifyCommit { commit } => cmd_notify_commit(project_dir, config, &commit).await,
        Commands::InitFromWorktree {
            task,
            path,
            intent,
            title,
        } => cmd_init_from_worktree(project_dir, config, &task, path, &intent, &title).await,
        Commands::Cleanup {
            task,
            keep_baselines,
        } => cmd_cleanup(project_dir, config, &task, keep_baselines),
        Commands::ShowTimeline { file, json } => {
            cmd_show_timeline(&open_coordinator(project_dir, config)?, &file, json)
        }
        Commands::ShowDrift { task, json } => {
            cmd_show_drift(&open_coordinator(project_dir, config)?, &task, json)
        }
        Commands::ShowMergeContext { task, file, json } => {
            cmd_show_merge_context(&open_coordinator(project_dir, config)?, &task, &file, json)
        }
        Commands::ListTrackedFiles { json } => {
            cmd_list_tracked_files(&open_coordinator(project_dir, config)?, json)
        }
        Commands::Conflicts { tasks, json } => {
            cmd_conflicts(&open_coordinator(project_dir, config)?, &tasks, json)
        }
        Commands::Summary { json } => cmd_summary(&open_coordinator(project_dir, config)?, json),
    }
}

// ---------------------------------------------------------------------------
// Config & state helpers
// ---------------------------------------------------------------------------

fn load_config(project_dir: &Path, explicit: Option<&Path>) -> Result<CoordinatorConfig> {
    match explicit {
        Some(path) => {
            let config = CoordinatorConfig::load_from_file(path)
                .context("failed to load configuration file")?;
            config.validate().context("invalid configuration")?;
            Ok(config)
        }
        None => {
            let path = project_dir.join(DEFAULT_STATE_DIR).join("config.toml");
            CoordinatorConfig::load_or_default(&path).context("failed to load configuration file")
        }
    }
}

fn git_for(config: &CoordinatorConfig) -> GitCli {
    GitCli::new(config.worktrees_dir.clone(), config.git_timeout())
}

fn open_coordinator(project_dir: &Path, config: CoordinatorConfig) -> Result<Coordinator> {
    let git = git_for(&config);
    MergeCoordinator::open(project_dir, config, git).context("failed to load tracking state")
}

/// Exclusive lock for commands that change tracking state.
fn lock_state(project_dir: &Path, config: &CoordinatorConfig) -> Result<StoreLock> {
    let paths = StatePaths::discover(project_dir, &config.state_dir);
    StoreLock::acquire(&paths).context("failed to lock tracking state")
}

fn no_data(msg: &str) -> Outcome {
    eprintln!("{}", style::warn(msg));
    Outcome::NoData
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn when(ts: &DateTime<Utc>) -> String {
    ts.format(TIME_FORMAT).to_string()
}

fn events_table(events: &[MainBranchEvent]) -> comfy_table::Table {
    let mut table = style::table(vec!["Commit", "Time", "Source", "Author", "Summary"]);
    for e in events {
        let source = match &e.merged_from_task {
            Some(task) => format!("{} ({})", e.source, task),
            None => e.source.to_string(),
        };
        table.add_row(vec![
            Cell::new(style::short_hash(&e.commit_hash)),
            Cell::new(when(&e.timestamp)),
            Cell::new(source),
            Cell::new(e.author.as_deref().unwrap_or("—")),
            Cell::new(&e.summary),
        ]);
    }
    table
}

// ---------------------------------------------------------------------------
// Mutating commands
// ---------------------------------------------------------------------------

async fn cmd_notify_commit(project_dir: &Path, config: CoordinatorConfig, commit: &str) -> Result<Outcome> {
    let _lock = lock_state(project_dir, &config)?;
    let mut coordinator = open_coordinator(project_dir, config)?;

    let files = coordinator
        .on_main_branch_commit(commit)
        .await
        .with_context(|| format!("failed to record commit {}", commit))?;
    coordinator.save().context("failed to save tracking state")?;

    if files.is_empty() {
        println!(
            "{}",
            style::dim(&format!("Commit {} changed no tracked file history", style::short_hash(commit)))
        );
    } else {
        println!(
            "{}",
            style::success(&format!(
                "Recorded {} on {} tracked file(s)",
                style::short_hash(commit),
                files.len()
            ))
        );
        for file in &files {
            println!("  {}", file);
        }
    }
    Ok(Outcome::Done)
}

async fn cmd_init_from_worktree(
    project_dir: &Path,
    config: CoordinatorConfig,
    task: &str,
    path: Option<PathBuf>,
    intent: &str,
    title: &str,
) -> Result<Outcome> {
    let _lock = lock_state(project_dir, &config)?;
    let mut coordinator = open_coordinator(project_dir, config)?;

    let worktree = match path {
        Some(path) => path,
        None => match coordinator.find_worktree(task).await {
            Some(path) => path,
            None => return Ok(no_data(&format!("No worktree found for task {}", task))),
        },
    };

    let files = coordinator
        .initialize_from_worktree(task, &worktree, intent, title)
        .await
        .with_context(|| format!("failed to initialize task {} from {}", task, worktree.display()))?;
    coordinator.save().context("failed to save tracking state")?;

    println!(
        "{}",
        style::success(&format!("Tracking {} file(s) for task {}", files.len(), task))
    );
    for file in &files {
        println!("  {}", file);
    }
    Ok(Outcome::Done)
}

fn cmd_cleanup(project_dir: &Path, config: CoordinatorConfig, task: &str, keep_baselines: bool) -> Result<Outcome> {
    let _lock = lock_state(project_dir, &config)?;
    let mut coordinator = open_coordinator(project_dir, config)?;

    coordinator.cleanup_task(task, !keep_baselines);
    coordinator.save().context("failed to save tracking state")?;

    println!("{}", style::success(&format!("Cleaned up task {}", task)));
    Ok(Outcome::Done)
}

fn cmd_init(project_dir: &Path, config: &CoordinatorConfig) -> Result<Outcome> {
    let default_config = r#"# taskweave configuration
# Every setting is optional; the values below are the defaults.

main_branch = "main"
worktrees_dir = ".worktrees"
state_dir = ".taskweave"
git_timeout_secs = 30
log_level = "warn"

# Files matching these globs are never tracked.
ignore_patterns = []
"#;

    let paths = StatePaths::discover(project_dir, &config.state_dir);
    paths
        .ensure_layout()
        .context("failed to create state directory")?;

    if paths.config_toml.exists() {
        println!(
            "{}",
            style::dim(&format!("Configuration already present at {}", paths.config_toml.display()))
        );
    } else {
        std::fs::write(&paths.config_toml, default_config).context("failed to write config file")?;
        println!(
            "{}",
            style::success(&format!("Default configuration written to {}", paths.config_toml.display()))
        );
    }

    println!();
    println!("Next steps:");
    println!("  1. Register a task: taskweave init-from-worktree <task> --intent \"...\"");
    println!("  2. After each main-line commit: taskweave notify-commit <hash>");
    println!("  3. Before merging: taskweave show-merge-context <task> <file>");
    Ok(Outcome::Done)
}

// ---------------------------------------------------------------------------
// Read-only commands
// ---------------------------------------------------------------------------

async fn cmd_find_worktree(project_dir: &Path, config: CoordinatorConfig, task: &str) -> Result<Outcome> {
    let git = git_for(&config);
    let coordinator = MergeCoordinator::new(project_dir, config, git);
    match coordinator.find_worktree(task).await {
        Some(path) => {
            println!("{}", path.display());
            Ok(Outcome::Done)
        }
        None => Ok(no_data(&format!("No worktree found for task {}", task))),
    }
}

fn cmd_rules() -> Result<Outcome> {
    println!("{}", format_compatibility_summary(&build_default_rules()));
    Ok(Outcome::Done)
}

fn cmd_show_timeline(coordinator: &Coordinator, file: &str, json: bool) -> Result<Outcome> {
    let Some(timeline) = coordinator.timeline().get_timeline(file) else {
        return Ok(no_data(&format!("No timeline data for {}", file)));
    };
    if json {
        print_json(timeline)?;
        return Ok(Outcome::Done);
    }

    println!();
    println!("{}", style::header(&format!("Timeline: {}", file)));
    println!();
    println!("  State        {}", coordinator.timeline().tracking_state(file));
    println!("  Created      {}", when(&timeline.created_at));
    println!("  Last updated {}", when(&timeline.last_updated));
    println!();

    if timeline.main_branch_history.is_empty() {
        println!("  {}", style::dim("No main-line commits recorded"));
    } else {
        println!("{}", style::header("Main-line history"));
        println!("{}", events_table(&timeline.main_branch_history));
    }
    println!();

    let mut table = style::table(vec!["Task", "Status", "Branch point", "Behind", "Intent"]);
    for view in timeline.task_views.values() {
        let behind = timeline.events_after(&view.branch_point).len();
        table.add_row(vec![
            Cell::new(&view.task_id),
            Cell::new(view.status),
            Cell::new(format!(
                "{} ({})",
                style::short_hash(&view.branch_point.commit_hash),
                when(&view.branch_point.timestamp)
            )),
            Cell::new(behind),
            Cell::new(&view.task_intent),
        ]);
    }
    println!("{}", style::header("Tasks"));
    println!("{}", table);
    println!();
    Ok(Outcome::Done)
}

fn cmd_show_drift(coordinator: &Coordinator, task: &str, json: bool) -> Result<Outcome> {
    let drift = coordinator.timeline().get_task_drift(task);
    if drift.is_empty() {
        return Ok(no_data(&format!("No drift data for task {}", task)));
    }
    if json {
        print_json(&drift)?;
        return Ok(Outcome::Done);
    }

    let mut table = style::table(vec!["File", "Commits behind"]);
    for (file, behind) in &drift {
        table.add_row(vec![Cell::new(file), Cell::new(behind)]);
    }

    println!();
    println!("{}", style::header(&format!("Drift for task {}", task)));
    println!("{}", table);
    if let Some(max) = drift.values().max() {
        println!("  {}", style::dim(&format!("{} file(s), at most {} commit(s) behind", drift.len(), max)));
    }
    println!();
    Ok(Outcome::Done)
}

fn cmd_show_merge_context(coordinator: &Coordinator, task: &str, file: &str, json: bool) -> Result<Outcome> {
    let Some(ctx) = coordinator.timeline().get_merge_context(task, file) else {
        return Ok(no_data(&format!("No merge context for task {} on {}", task, file)));
    };
    if json {
        print_json(&ctx)?;
        return Ok(Outcome::Done);
    }

    println!();
    println!("{}", style::header(&format!("Merge context: {} on {}", task, file)));
    println!();
    println!("  Intent        {}", ctx.task_intent);
    println!(
        "  Branch point  {} ({})",
        style::short_hash(&ctx.task_branch_point.commit_hash),
        when(&ctx.task_branch_point.timestamp)
    );
    println!("  Current main  {}", style::short_hash(&ctx.current_main_commit));
    println!("  Behind        {} commit(s)", ctx.total_commits_behind);
    println!("  Pending tasks {}", ctx.total_pending_tasks);
    println!();

    if !ctx.main_evolution.is_empty() {
        println!("{}", style::header("Main-line changes since branch point"));
        println!("{}", events_table(&ctx.main_evolution));
        println!();
    }

    if !ctx.other_pending_tasks.is_empty() {
        let mut table = style::table(vec!["Task", "Branch point", "Behind", "Intent"]);
        for other in &ctx.other_pending_tasks {
            table.add_row(vec![
                Cell::new(&other.task_id),
                Cell::new(style::short_hash(&other.branch_point.commit_hash)),
                Cell::new(other.commits_behind),
                Cell::new(&other.task_intent),
            ]);
        }
        println!("{}", style::header("Other pending tasks"));
        println!("{}", table);
        println!();
    }
    Ok(Outcome::Done)
}

fn cmd_list_tracked_files(coordinator: &Coordinator, json: bool) -> Result<Outcome> {
    let files = coordinator.timeline().tracked_files();
    if json {
        print_json(&files)?;
        return Ok(Outcome::Done);
    }
    if files.is_empty() {
        println!("No tracked files.");
        return Ok(Outcome::Done);
    }

    let mut table = style::table(vec!["File", "State"]);
    for file in &files {
        table.add_row(vec![
            Cell::new(file),
            Cell::new(coordinator.timeline().tracking_state(file)),
        ]);
    }
    println!("{}", table);
    println!("{} file(s) tracked", files.len());
    Ok(Outcome::Done)
}

fn cmd_conflicts(coordinator: &Coordinator, tasks: &[String], json: bool) -> Result<Outcome> {
    let regions = coordinator.detect_conflicts(tasks);
    if json {
        print_json(&regions)?;
        return Ok(Outcome::Done);
    }
    if regions.is_empty() {
        println!(
            "{}",
            style::success(&format!("No overlapping changes between {}", tasks.join(", ")))
        );
        return Ok(Outcome::Done);
    }

    let mut table = style::table(vec!["File", "Location", "Tasks", "Severity", "Auto-merge"]);
    for region in &regions {
        let auto = match (region.can_auto_merge, region.merge_strategy) {
            (true, Some(strategy)) => strategy.to_string(),
            (true, None) => "yes".to_string(),
            (false, _) => "no".to_string(),
        };
        table.add_row(vec![
            Cell::new(&region.file_path),
            Cell::new(&region.location),
            Cell::new(region.tasks_involved.join(", ")),
            Cell::new(region.severity),
            Cell::new(auto),
        ]);
    }

    println!();
    println!("{}", style::header(&format!("Conflict regions ({})", regions.len())));
    println!("{}", table);

    let blocking: Vec<_> = regions.iter().filter(|r| !r.can_auto_merge).collect();
    for region in &blocking {
        println!();
        println!(
            "{} {}",
            style::error(&format!("{} at {}", region.file_path, region.location)),
            style::severity(region.severity)
        );
        for line in explain_conflict(region).lines() {
            println!("  {}", line);
        }
    }

    println!();
    if blocking.is_empty() {
        println!(
            "{}",
            style::success(&format!("All {} region(s) can be auto-merged", regions.len()))
        );
    } else {
        println!(
            "{}",
            style::warn(&format!(
                "{} of {} region(s) need resolution",
                blocking.len(),
                regions.len()
            ))
        );
    }
    Ok(Outcome::Done)
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    total_files_tracked: usize,
    total_tasks: usize,
    active_tasks: Vec<&'a String>,
    files_with_potential_conflicts: usize,
    timeline_files: usize,
    current_main: Option<&'a BranchPoint>,
}

fn cmd_summary(coordinator: &Coordinator, json: bool) -> Result<Outcome> {
    let summary = coordinator.evolution().get_evolution_summary();
    let active = coordinator.evolution().get_active_tasks();
    let report = SummaryReport {
        total_files_tracked: summary.total_files_tracked,
        total_tasks: summary.total_tasks,
        active_tasks: active.iter().collect(),
        files_with_potential_conflicts: summary.files_with_potential_conflicts,
        timeline_files: coordinator.timeline().timelines().len(),
        current_main: coordinator.timeline().current_main_commit(),
    };
    if json {
        print_json(&report)?;
        return Ok(Outcome::Done);
    }

    println!();
    println!("{}", style::header("taskweave"));
    println!("{}", "═".repeat(9));
    println!();
    println!("  Files tracked        {}", report.total_files_tracked);
    println!("  Tasks                {}", report.total_tasks);
    println!("  Active tasks         {}", report.active_tasks.len());
    println!("  Potential conflicts  {}", report.files_with_potential_conflicts);
    println!("  Timeline files       {}", report.timeline_files);
    match report.current_main {
        Some(main) => println!(
            "  Current main         {} ({})",
            style::short_hash(&main.commit_hash),
            when(&main.timestamp)
        ),
        None => println!("  Current main         {}", style::dim("—")),
    }

    if !report.active_tasks.is_empty() {
        println!();
        println!("  {}", style::header("Active tasks"));
        println!("  {}", "─".repeat(40));
        for task in &report.active_tasks {
            println!("  {}", task);
        }
    }
    println!();
    Ok(Outcome::Done)
}
