//! Phased task orchestration CLI.
//!
//! Manages plans under `.phasegraph/`: each plan walks a declared workflow of
//! phases, and each phase iteration holds a task graph. Every subcommand
//! prints JSON on stdout and exits with a stable code (see `exit_codes`).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use phasegraph::core::types::{ArtifactLocator, ArtifactScope};
use phasegraph::error::PhaseGraphError;
use phasegraph::exit_codes;
use phasegraph::io::init::{InitOptions, init_workspace};
use phasegraph::io::task_file::load_task_file;
use phasegraph::logging;
use phasegraph::research::Finding;
use phasegraph::schedule::WorkOutcome;
use phasegraph::task::{Task, TaskStatus};
use phasegraph::{PlanHandle, Workspace};

#[derive(Parser)]
#[command(
    name = "phasegraph",
    version,
    about = "Phased task orchestration: plans, task graphs and phase loops"
)]
struct Cli {
    /// Project root containing `.phasegraph/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Plan to operate on instead of the active one.
    #[arg(long, global = true)]
    plan: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.phasegraph/` with the default workflow.
    Init {
        /// Overwrite workflow config and task schema; plans and the active pointer are kept.
        #[arg(short, long)]
        force: bool,
    },
    /// Create, list and switch plans.
    #[command(subcommand)]
    Plan(PlanCommand),
    /// Summary of the plan's active phase and iteration.
    Show,
    /// Print a task's status record.
    Status { task: String },
    /// Move a task along a legal status edge (todo, in-progress, done, blocked).
    SetStatus { task: String, status: TaskStatus },
    /// Append a progress line to a task's log.
    Log { task: String, message: String },
    /// Record a 1-5 confidence score for a task.
    Confidence {
        task: String,
        score: u8,
        rationale: String,
    },
    /// Record a task's output for its children.
    Output {
        task: String,
        /// Output text; use --file to read it from disk instead.
        text: Option<String>,
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
    /// Tasks whose recorded confidence is below a threshold.
    LowConfidence {
        #[arg(long)]
        below: Option<u8>,
    },
    /// Declared tasks of the current iteration.
    Tasks,
    /// Tasks that may start now (todo with every parent done).
    Available,
    /// Blocked tasks; exits 3 when any exist.
    Blocked,
    /// Declare tasks in the current iteration.
    AddTask(AddTaskArgs),
    /// Replace a task's parents.
    Reparent {
        task: String,
        #[arg(long = "parent")]
        parents: Vec<String>,
    },
    /// Concurrency groups of available tasks.
    Schedule,
    /// What workers should do next (exit 2 complete, 3 halted).
    Next,
    /// Leave the active phase along a declared transition.
    Advance {
        target: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Start a fresh iteration of the active phase.
    Loop {
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Return to an earlier or declared phase in a fresh iteration.
    LoopTo {
        target: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Every phase transition of the plan in order.
    History,
    /// Record a named artifact as a file path or inline text.
    Artifact(ArtifactArgs),
    /// Render the worker prompt for a task.
    Prompt { task: String },
    /// Outputs of a task's parents.
    ParentOutputs { task: String },
    /// Search or extend the research cache.
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Record or check approaches that did not work.
    #[command(subcommand)]
    DeadEnd(DeadEndCommand),
    /// Check the current iteration's semantic invariants.
    Validate,
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Create a plan in the workflow's initial phase.
    Create {
        id: String,
        #[arg(long, default_value = "")]
        reason: String,
        /// Also make it the active plan.
        #[arg(long)]
        activate: bool,
    },
    List,
    /// Print the active-plan pointer.
    Active,
    /// Make a plan active; --expected-version turns it into a compare-and-swap.
    Switch {
        id: String,
        #[arg(long)]
        expected_version: Option<u64>,
    },
}

#[derive(Args)]
struct AddTaskArgs {
    /// JSON file with one task or an array of tasks.
    #[arg(long, conflicts_with = "id")]
    file: Option<PathBuf>,
    #[arg(long, requires = "description")]
    id: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "step")]
    steps: Vec<String>,
    #[arg(long = "parent")]
    parents: Vec<String>,
    #[arg(long = "lock")]
    locks: Vec<String>,
    #[arg(long)]
    executor: Option<String>,
    /// Artifact names to inject into the task's prompt.
    #[arg(long = "artifact")]
    artifacts: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Phase,
    Plan,
}

impl From<ScopeArg> for ArtifactScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Phase => ArtifactScope::Phase,
            ScopeArg::Plan => ArtifactScope::Plan,
        }
    }
}

#[derive(Args)]
struct ArtifactArgs {
    name: String,
    #[arg(long, value_enum, default_value = "phase")]
    scope: ScopeArg,
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    path: Option<PathBuf>,
    #[arg(long)]
    text: Option<String>,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Rank cached findings for a query.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Store a finding.
    Add {
        #[arg(long)]
        query: String,
        #[arg(long)]
        findings: String,
        #[arg(long, default_value = "web")]
        source_type: String,
        #[arg(long)]
        source_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum DeadEndCommand {
    /// Append an entry to the plan's ledger.
    Add {
        #[arg(long)]
        approach: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        task: Option<String>,
    },
    /// Prior entries similar to an approach.
    Check { approach: String },
    /// Every ledger entry.
    List,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

/// Map typed rejections to their stable exit codes.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PhaseGraphError>() {
        Some(PhaseGraphError::IterationLimitExceeded { .. }) => exit_codes::LIMIT,
        Some(PhaseGraphError::PlanFinished(_)) => exit_codes::COMPLETE,
        _ => exit_codes::INVALID,
    }
}

fn run(cli: Cli) -> Result<i32> {
    let command = match cli.command {
        Command::Init { force } => {
            let paths = init_workspace(&cli.root, &InitOptions { force })?;
            return print_ok(&serde_json::json!({ "state_dir": paths.state_dir }));
        }
        command => command,
    };

    let ws = Workspace::open(&cli.root)?;
    match command {
        Command::Plan(command) => run_plan(&ws, command),
        Command::Cache(CacheCommand::Search { query, limit }) => {
            print_ok(&ws.cache_search(&query, limit)?)
        }
        command => {
            let plan = match &cli.plan {
                Some(id) => ws.plan(id)?,
                None => ws.active_plan().context("no --plan given and no active plan")?,
            };
            run_plan_command(&plan, command)
        }
    }
}

fn run_plan(ws: &Workspace, command: PlanCommand) -> Result<i32> {
    match command {
        PlanCommand::Create {
            id,
            reason,
            activate,
        } => {
            let plan = ws.create_plan(&id, &reason)?;
            if activate {
                ws.switch_active(plan.id(), None)?;
            }
            print_ok(&plan.status()?)
        }
        PlanCommand::List => print_ok(&ws.list_plans()?),
        PlanCommand::Active => print_ok(&ws.active_pointer()?),
        PlanCommand::Switch {
            id,
            expected_version,
        } => print_ok(&ws.switch_active(&id, expected_version)?),
    }
}

fn run_plan_command(plan: &PlanHandle<'_>, command: Command) -> Result<i32> {
    match command {
        Command::Show => print_ok(&plan.status()?),
        Command::Status { task } => print_ok(&plan.get_status(&task)?),
        Command::SetStatus { task, status } => print_ok(&plan.set_status(&task, status)?),
        Command::Log { task, message } => print_ok(&plan.append_log(&task, &message)?),
        Command::Confidence {
            task,
            score,
            rationale,
        } => print_ok(&plan.record_confidence(&task, score, &rationale)?),
        Command::Output { task, text, file } => {
            let output = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("read output {}", path.display()))?,
                (None, None) => bail!("output needs TEXT or --file"),
            };
            print_ok(&plan.record_output(&task, &output)?)
        }
        Command::LowConfidence { below } => print_ok(&plan.low_confidence_tasks(below)?),
        Command::Tasks => print_ok(&plan.tasks()?),
        Command::Available => print_ok(&plan.available_tasks()?),
        Command::Blocked => {
            let blocked = plan.blocked_tasks()?;
            print_json(&blocked)?;
            Ok(if blocked.is_empty() {
                exit_codes::OK
            } else {
                exit_codes::HALTED
            })
        }
        Command::AddTask(args) => {
            let tasks = tasks_from_args(plan, args)?;
            print_ok(&plan.add_tasks(tasks)?)
        }
        Command::Reparent { task, parents } => {
            print_ok(&plan.update_task_parents(&task, parents)?)
        }
        Command::Schedule => print_ok(&plan.schedule()?),
        Command::Next => {
            let outcome = plan.next_work()?;
            print_json(&outcome)?;
            Ok(match outcome {
                WorkOutcome::Ready { .. }
                | WorkOutcome::Waiting { .. }
                | WorkOutcome::Empty { .. } => exit_codes::OK,
                WorkOutcome::Halted { .. } => exit_codes::HALTED,
                WorkOutcome::IterationComplete { .. } | WorkOutcome::PlanFinished { .. } => {
                    exit_codes::COMPLETE
                }
            })
        }
        Command::Advance { target, reason } => print_ok(&plan.advance(&target, &reason)?),
        Command::Loop { reason } => print_ok(&plan.loop_phase(&reason)?),
        Command::LoopTo { target, reason } => print_ok(&plan.loop_to_phase(&target, &reason)?),
        Command::History => print_ok(&plan.phase_history()?),
        Command::Artifact(args) => {
            let locator = match (args.path, args.text) {
                (Some(path), _) => ArtifactLocator::Path(path),
                (None, Some(text)) => ArtifactLocator::Text(text),
                (None, None) => bail!("artifact needs --path or --text"),
            };
            print_ok(&plan.record_artifact(args.scope.into(), &args.name, locator)?)
        }
        Command::Prompt { task } => {
            print!("{}", plan.build_task_prompt(&task)?);
            Ok(exit_codes::OK)
        }
        Command::ParentOutputs { task } => print_ok(&plan.parent_outputs(&task)?),
        Command::Cache(CacheCommand::Search { query, limit }) => {
            print_ok(&plan.cache_search(&query, limit)?)
        }
        Command::Cache(CacheCommand::Add {
            query,
            findings,
            source_type,
            source_url,
        }) => print_ok(&plan.cache_add(Finding {
            query,
            findings,
            source_type,
            source_url,
        })?),
        Command::DeadEnd(DeadEndCommand::Add {
            approach,
            reason,
            task,
        }) => print_ok(&plan.dead_end_add(&approach, &reason, task.as_deref())?),
        Command::DeadEnd(DeadEndCommand::Check { approach }) => {
            print_ok(&plan.dead_end_check(&approach)?)
        }
        Command::DeadEnd(DeadEndCommand::List) => print_ok(&plan.dead_ends()?),
        Command::Validate => {
            let errors = plan.validate()?;
            print_json(&errors)?;
            Ok(if errors.is_empty() {
                exit_codes::OK
            } else {
                exit_codes::INVALID
            })
        }
        Command::Init { .. } | Command::Plan(_) => bail!("command does not operate on a plan"),
    }
}

fn tasks_from_args(plan: &PlanHandle<'_>, args: AddTaskArgs) -> Result<Vec<Task>> {
    if let Some(file) = args.file {
        let schema_path = &plan.workspace().paths().task_schema_path;
        return load_task_file(schema_path, &file);
    }
    let (Some(id), Some(description)) = (args.id, args.description) else {
        bail!("add-task needs --file or --id with --description");
    };
    let mut task = Task::new(id, description);
    task.steps = args.steps;
    task.parents = args.parents;
    task.locks = args.locks.into_iter().collect();
    task.executor = args.executor;
    task.context_artifacts = args.artifacts;
    Ok(vec![task])
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn print_ok<T: Serialize>(value: &T) -> Result<i32> {
    print_json(value)?;
    Ok(exit_codes::OK)
}
