//! Charter - spec-driven plan execution and governance.
//!
//! Every subcommand maps onto one coordinator call and prints the result
//! as plain text or JSON.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use charter::ai::ExternalCommandDecomposer;
use charter::core::{CharterError, Config, Event, PolicyConfig, Spec, TaskEvent, Violation};
use charter::engine::{DriftReport, ForecastResult, TransitionOutcome};
use charter::{Coordinator, CoordinatorOptions, FileRepository};

/// Spec-driven plan execution and governance
#[derive(Parser)]
#[command(name = "charter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (the directory containing `.charter/`)
    #[arg(short = 'C', long, global = true, env = "CHARTER_PROJECT", default_value = ".")]
    project: PathBuf,

    /// Name recorded on journal events
    #[arg(long, global = true, env = "CHARTER_ACTOR")]
    actor: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project with a starter spec and default policy
    Init {
        /// Project name (defaults to the directory name)
        name: Option<String>,

        /// Replace an existing spec
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect the spec
    Spec {
        #[command(subcommand)]
        operation: SpecOperation,
    },

    /// Generate and manage the plan
    Plan {
        #[command(subcommand)]
        operation: PlanOperation,
    },

    /// Move tasks through their lifecycle
    Task {
        #[command(subcommand)]
        operation: TaskOperation,
    },

    /// Record time spent
    Time {
        #[command(subcommand)]
        operation: TimeOperation,
    },

    /// Dependency graph checks
    Graph {
        #[command(subcommand)]
        operation: GraphOperation,
    },

    /// Inspect and change policy
    Policy {
        #[command(subcommand)]
        operation: PolicyOperation,
    },

    /// Compare the plan against the spec
    Drift {
        #[arg(long)]
        json: bool,

        /// Exit with an error when any drift is found
        #[arg(long)]
        strict: bool,
    },

    /// Velocity, trend and completion estimate
    Forecast {
        #[arg(long)]
        json: bool,

        /// Print the burndown series
        #[arg(long)]
        burndown: bool,
    },

    /// Journal events, most recent first
    Timeline {
        /// Maximum number of events
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only events for this task (oldest first)
        #[arg(long)]
        task: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Task statuses for the current plan
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// Show configuration
    Config {
        /// Show config file locations
        #[arg(long)]
        path: bool,
    },
}

#[derive(Subcommand)]
enum SpecOperation {
    /// Print the spec
    Show {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanOperation {
    /// Derive a new plan from the spec
    Generate {
        /// Use the configured external decomposer
        #[arg(long)]
        ai: bool,
    },
    /// Approve the current plan
    Approve,
    /// Reject the current plan
    Reject,
    /// Drop tasks whose feature left the spec
    Prune,
    /// Print the current plan
    Show {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TaskOperation {
    /// Begin work on a pending task
    Start { id: String },
    /// Mark an in-progress task as blocked
    Block { id: String },
    /// Return a blocked task to pending
    Unblock { id: String },
    /// Finish an in-progress task
    Complete { id: String },
    /// Put an in-progress task back to pending
    Stop { id: String },
    /// Resume a done or verified task
    Reopen { id: String },
    /// Verify a done task
    Verify {
        id: String,

        /// What proves the task is done (CI run, PR, review...)
        #[arg(short, long)]
        evidence: String,
    },
    /// List pending tasks whose dependencies are complete
    Ready,
}

#[derive(Subcommand)]
enum TimeOperation {
    /// Log hours spent
    Log {
        hours: f64,

        /// Task the time was spent on
        #[arg(short, long)]
        task: Option<String>,

        #[arg(short, long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
enum GraphOperation {
    /// Validate dependencies and print a valid work order
    Check,
}

#[derive(Subcommand)]
enum PolicyOperation {
    /// Evaluate policy against the current snapshot
    Check {
        #[arg(long)]
        json: bool,
    },
    /// Print the current policy
    Show,
    /// Change policy settings (unset flags keep their value)
    Set {
        /// Maximum tasks in progress (0 = unlimited)
        #[arg(long)]
        max_wip: Option<u32>,

        #[arg(long)]
        allow_ai: Option<bool>,

        /// AI token allowance (0 = unlimited)
        #[arg(long)]
        token_limit: Option<u64>,

        /// Budgeted hours (0 = unlimited)
        #[arg(long)]
        budget_hours: Option<f64>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins unless --verbose is given.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    if let Err(err) = run(cli) {
        report(&err);
        std::process::exit(1);
    }
}

fn report(err: &anyhow::Error) {
    eprintln!("Error: {err}");
    if let Some(charter_err) = err.downcast_ref::<CharterError>() {
        if let Some(hint) = charter_err.hint() {
            eprintln!("Hint: {hint}");
        }
    } else {
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
}

fn open(cli: &Cli) -> Result<(Config, Coordinator<FileRepository>)> {
    let config = Config::load(&cli.project)?;
    let options = CoordinatorOptions::from_config(&config, cli.actor.clone());
    let coordinator = Coordinator::new(FileRepository::new(&cli.project), options);
    Ok((config, coordinator))
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Init { name, force } => cmd_init(&cli, name.as_deref(), *force),
        Commands::Spec { operation: SpecOperation::Show { json } } => {
            let (_, c) = open(&cli)?;
            let spec = c.spec()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&spec)?);
            } else {
                print!("{}", serde_yaml::to_string(&spec)?);
            }
            Ok(())
        }
        Commands::Plan { operation } => cmd_plan(&cli, operation),
        Commands::Task { operation } => cmd_task(&cli, operation),
        Commands::Time { operation: TimeOperation::Log { hours, task, note } } => {
            let (_, c) = open(&cli)?;
            let findings = c.log_time(task.as_deref(), *hours, note.as_deref())?;
            println!("Logged {hours}h");
            print_findings(&findings);
            Ok(())
        }
        Commands::Graph { operation: GraphOperation::Check } => {
            let (_, c) = open(&cli)?;
            let order = c.validate_graph()?;
            println!("Dependency graph OK ({} tasks, no cycles)", order.len());
            for (i, id) in order.iter().enumerate() {
                println!("  {:>3}. {id}", i + 1);
            }
            Ok(())
        }
        Commands::Policy { operation } => cmd_policy(&cli, operation),
        Commands::Drift { json, strict } => {
            let (_, c) = open(&cli)?;
            let report = c.detect_drift()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_drift(&report);
            }
            if *strict && !report.is_clean() {
                anyhow::bail!("drift detected ({} issues)", report.issues.len());
            }
            Ok(())
        }
        Commands::Forecast { json, burndown } => {
            let (_, c) = open(&cli)?;
            let forecast = c.forecast(None)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&forecast)?);
            } else {
                print_forecast(&forecast, *burndown);
            }
            Ok(())
        }
        Commands::Timeline { limit, task, json } => {
            let (_, c) = open(&cli)?;
            let mut events = match task {
                Some(task) => c.events_for_task(task)?,
                None => c.timeline(*limit)?,
            };
            if task.is_some() {
                if let Some(limit) = limit {
                    events.truncate(*limit);
                }
            }
            if *json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No events recorded.");
            } else {
                events.iter().for_each(print_event);
            }
            Ok(())
        }
        Commands::Status { json } => {
            let (_, c) = open(&cli)?;
            let report = c.status()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("Plan {} ({})", report.plan_id, report.approval);
            for line in &report.tasks {
                let owner = line.owner.as_deref().map(|o| format!(" @{o}")).unwrap_or_default();
                let lock = if line.unlocked { "" } else { " [locked]" };
                println!("  {:<12} {}  {}{owner}{lock}", line.status.as_str(), line.task_id, line.title);
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "charter", &mut io::stdout());
            Ok(())
        }
        Commands::Config { path } => cmd_config(&cli.project, *path),
    }
}

fn cmd_init(cli: &Cli, name: Option<&str>, force: bool) -> Result<()> {
    let root = &cli.project;
    let name = match name {
        Some(name) => name.to_string(),
        None => std::fs::canonicalize(root)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "project".to_string()),
    };

    let (_, c) = open(cli)?;
    c.repo().create()?;
    c.init_project(&Spec::template(&name), force)?;

    println!("Initialized charter project in {}", c.repo().dir().display());
    println!("Edit spec.yaml, then run `charter plan generate`.");
    Ok(())
}

fn cmd_plan(cli: &Cli, operation: &PlanOperation) -> Result<()> {
    let (config, c) = open(cli)?;
    match operation {
        PlanOperation::Generate { ai: false } => {
            let plan = c.generate_plan()?;
            println!("Generated plan {} with {} tasks (pending approval)", plan.id, plan.len());
        }
        PlanOperation::Generate { ai: true } => {
            let port = ExternalCommandDecomposer::from_config(&config.ai).with_context(|| {
                format!(
                    "no AI command configured; set [ai] command in {}",
                    Config::project_config_path(&cli.project).display()
                )
            })?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            ctrlc::set_handler(move || on_interrupt.cancel())?;

            let rt = tokio::runtime::Runtime::new()?;
            let plan = rt.block_on(c.generate_plan_with_ai(&port, &cancel))?;
            println!("Generated plan {} with {} tasks via AI (pending approval)", plan.id, plan.len());
        }
        PlanOperation::Approve => {
            let plan = c.approve_plan()?;
            println!("Plan {} approved", plan.id);
        }
        PlanOperation::Reject => {
            let plan = c.reject_plan()?;
            println!("Plan {} rejected", plan.id);
        }
        PlanOperation::Prune => {
            let outcome = c.prune_plan()?;
            if outcome.is_empty() {
                println!("Nothing to prune.");
            } else {
                println!("Removed {} tasks: {}", outcome.removed.len(), outcome.removed.join(", "));
            }
        }
        PlanOperation::Show { json } => {
            let plan = c.plan()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }
            println!("Plan {} for spec '{}' ({})", plan.id, plan.spec_id, plan.approval);
            for task in &plan.tasks {
                println!("  {} [{}] {} ({})", task.id, task.priority, task.title, task.feature_id);
                if !task.depends_on.is_empty() {
                    println!("      depends on: {}", task.depends_on.join(", "));
                }
            }
        }
    }
    Ok(())
}

fn cmd_task(cli: &Cli, operation: &TaskOperation) -> Result<()> {
    let (_, c) = open(cli)?;
    let outcome = match operation {
        TaskOperation::Start { id } => c.transition(id, TaskEvent::Start, None)?,
        TaskOperation::Block { id } => c.transition(id, TaskEvent::Block, None)?,
        TaskOperation::Unblock { id } => c.transition(id, TaskEvent::Unblock, None)?,
        TaskOperation::Complete { id } => c.transition(id, TaskEvent::Complete, None)?,
        TaskOperation::Stop { id } => c.transition(id, TaskEvent::Stop, None)?,
        TaskOperation::Reopen { id } => c.transition(id, TaskEvent::Reopen, None)?,
        TaskOperation::Verify { id, evidence } => c.verify(id, evidence)?,
        TaskOperation::Ready => {
            let ready = c.ready_tasks()?;
            if ready.is_empty() {
                println!("No tasks are ready.");
            }
            for task in ready {
                println!("{}  {}", task.id, task.title);
            }
            return Ok(());
        }
    };
    print_transition(&outcome);
    Ok(())
}

fn cmd_policy(cli: &Cli, operation: &PolicyOperation) -> Result<()> {
    let (_, c) = open(cli)?;
    match operation {
        PolicyOperation::Check { json } => {
            let findings = c.check_compliance()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&findings)?);
            } else if findings.is_empty() {
                println!("All policies satisfied.");
            } else {
                for v in &findings {
                    println!("{:<8} {:<12} {}", v.level, v.rule, v.message);
                }
            }
        }
        PolicyOperation::Show => {
            print!("{}", serde_yaml::to_string(&c.policy()?)?);
        }
        PolicyOperation::Set { max_wip, allow_ai, token_limit, budget_hours } => {
            let current = c.policy()?;
            let policy = PolicyConfig {
                max_wip: max_wip.unwrap_or(current.max_wip),
                allow_ai: allow_ai.unwrap_or(current.allow_ai),
                token_limit: token_limit.unwrap_or(current.token_limit),
                budget_hours: budget_hours.unwrap_or(current.budget_hours),
            };
            c.set_policy(&policy)?;
            print!("{}", serde_yaml::to_string(&policy)?);
        }
    }
    Ok(())
}

fn cmd_config(root: &Path, show_path: bool) -> Result<()> {
    if show_path {
        println!("{}", Config::project_config_path(root).display());
        if let Some(dir) = Config::config_dir() {
            println!("{}", dir.join("config.toml").display());
        }
        return Ok(());
    }

    let config = Config::load(root)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_transition(outcome: &TransitionOutcome) {
    println!("{}: {} -> {}", outcome.task_id, outcome.from, outcome.to);
    print_findings(&outcome.warnings);
}

fn print_findings(findings: &[Violation]) {
    for v in findings {
        eprintln!("{}: [{}] {}", v.level, v.rule, v.message);
    }
}

fn print_drift(report: &DriftReport) {
    if report.spec_changed {
        println!("Spec changed since the plan was generated.");
    }
    if report.issues.is_empty() {
        println!("No drift between spec and plan.");
        return;
    }
    for issue in &report.issues {
        println!("{:<7} {:<19} {}", issue.severity, issue.kind, issue.message);
    }
}

fn print_forecast(f: &ForecastResult, burndown: bool) {
    println!(
        "Velocity: {:.2} tasks/day ({:?}, slope {:+.2}, confidence {:.0}%)",
        f.velocity,
        f.trend.direction,
        f.trend.slope,
        f.trend.confidence * 100.0
    );
    for w in &f.trend.windows {
        println!("  last {:>2} days: {} completed, {:.2}/day", w.days, w.completions, w.velocity);
    }
    println!("Progress: {}/{} done, {} remaining", f.completed, f.total, f.remaining);
    match (f.estimated_days, f.interval) {
        (Some(0), _) => println!("Estimate: complete"),
        (Some(days), Some(ci)) => println!("Estimate: {days} days (range {}-{})", ci.low, ci.high),
        (Some(days), None) => println!("Estimate: {days} days"),
        (None, _) => println!("Estimate: unknown (no recent completions)"),
    }

    if burndown {
        println!("Burndown:");
        for point in &f.burndown {
            match (point.actual, point.projected) {
                (Some(actual), _) => println!("  {}  {actual}", point.date),
                (None, Some(projected)) => println!("  {}  ~{projected:.1}", point.date),
                (None, None) => {}
            }
        }
    }
}

fn print_event(event: &Event) {
    let when = event.timestamp.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string());
    let meta: Vec<String> = event.metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
    println!("{when}  {:<10} {:<14} {}", event.actor, event.action, meta.join(" "));
}
