use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orca_lift::config::Backend;
use orca_lift::dag::{RunSnapshot, TaskOutput};
use orca_lift::deliberation::SpecialistEntry;
use orca_lift::model::{EquipmentInventory, GoalStatement, RevisionPoint, UserProfile};
use orca_lift::{
    Config, ExecutionEvent, Executor, JsonRenderer, PipelineError, PolicyKind, ProgramGenerator,
    ProgramRenderer, RunArchive, RunContext, RunObserver,
};

#[derive(Parser)]
#[command(name = "orca-lift")]
#[command(about = "Training program generation with specialist deliberation", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for archived runs
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Evaluator backend: rules or claude
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// Arbitration policy: majority or domain_priority
    #[arg(long, global = true)]
    policy: Option<PolicyKind>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ProgramRequest {
    /// Goal statement, e.g. "build strength on the main lifts"
    goal: String,

    /// User profile (YAML or JSON)
    #[arg(short, long)]
    profile: PathBuf,

    /// Equipment inventory (YAML or JSON)
    #[arg(short, long)]
    equipment: PathBuf,

    /// Program length in weeks (1-6)
    #[arg(short, long, default_value = "4")]
    weeks: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a program and archive the run
    Generate {
        #[command(flatten)]
        request: ProgramRequest,

        /// Write the program here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the phases a generation run would execute
    Plan {
        #[command(flatten)]
        request: ProgramRequest,
    },

    /// Refine the program of an archived run
    Refine {
        /// Run ID or prefix
        run_id: String,

        /// What to change, e.g. "less volume on leg day"
        instruction: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Regenerate an archived run's program from a week and day on,
    /// keeping the sessions before it unchanged
    Revise {
        /// Run ID or prefix
        run_id: String,

        /// First week to regenerate (1-based)
        #[arg(long)]
        from_week: u32,

        /// First day of that week to regenerate (1-based)
        #[arg(long, default_value = "1")]
        from_day: u32,

        /// Why the program needs revising, e.g. "missed a week, knee is sore"
        #[arg(default_value = "")]
        reason: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List archived runs
    Runs,

    /// Show an archived run phase by phase
    Inspect {
        /// Run ID or prefix
        run_id: String,

        /// Include specialist entries and arbitration decisions
        #[arg(long)]
        deliberation: bool,
    },
}

/// Prints progress to stderr so stdout stays clean for the program
struct ProgressPrinter;

impl RunObserver for ProgressPrinter {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted { run_id, phases, tasks } => {
                eprintln!("Run {}: {} tasks in {} phases", run_id, tasks, phases);
            }
            ExecutionEvent::PhaseStarted { phase, tasks } => {
                eprintln!("Phase {} ({} tasks)", phase, tasks.len());
            }
            ExecutionEvent::TaskRetrying {
                task_id,
                attempt,
                delay,
                error,
            } => {
                eprintln!(
                    "  [~] {} attempt {} failed, retrying in {:?}: {}",
                    task_id, attempt, delay, error
                );
            }
            ExecutionEvent::TaskFinished { task_id, status, .. } => {
                let icon = if status.label() == "succeeded" { "✓" } else { "✗" };
                match status.reason() {
                    Some(reason) => eprintln!("  [{}] {} ({})", icon, task_id, reason),
                    None => eprintln!("  [{}] {}", icon, task_id),
                }
            }
            ExecutionEvent::RunCancelled { phase } => {
                eprintln!("Run cancelled during phase {}", phase);
            }
            ExecutionEvent::RunFinished { run_id, status } => {
                eprintln!("Run {} {}", run_id, status.as_str());
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "orca_lift=debug"
    } else {
        "orca_lift=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Generate { request, output } => {
            let (profile, goals, equipment) = read_request(&request)?;
            let generator = create_generator(&config)?;
            let result = generator.generate(profile, goals, equipment).await;
            finish(result, output.as_deref())?;
        }

        Commands::Plan { request } => {
            let (profile, goals, equipment) = read_request(&request)?;
            let generator = create_generator(&config)?;
            let dag = generator.plan(&profile, &goals, &equipment)?;
            let phases = dag.phases()?;

            println!("{} tasks in {} phases:", dag.len(), phases.len());
            for (phase, ids) in phases.iter().enumerate() {
                println!("Phase {}:", phase);
                for id in ids {
                    if let Some(task) = dag.get_task(id) {
                        let deps = dag.dependencies(id);
                        let after = if deps.is_empty() {
                            String::new()
                        } else {
                            format!("  <- {}", deps.join(", "))
                        };
                        println!("  - {} ({}){}", task.id, task.subject, after);
                    }
                }
            }
        }

        Commands::Refine {
            run_id,
            instruction,
            output,
        } => {
            let archive = RunArchive::new(config.data_dir())?;
            let prior = archive.load(&run_id)?;
            let generator = create_generator(&config)?;
            let result = generator.refine_from(&prior, &instruction).await;
            finish(result, output.as_deref())?;
        }

        Commands::Revise {
            run_id,
            from_week,
            from_day,
            reason,
            output,
        } => {
            let archive = RunArchive::new(config.data_dir())?;
            let prior = archive.load(&run_id)?;
            let generator = create_generator(&config)?;
            let point = RevisionPoint::new(from_week, from_day);
            let result = generator.revise_from(&prior, point, &reason).await;
            finish(result, output.as_deref())?;
        }

        Commands::Runs => {
            let archive = RunArchive::new(config.data_dir())?;
            let runs = archive.list()?;
            if runs.is_empty() {
                println!("No runs found. Run 'orca-lift generate' to create one.");
            } else {
                println!("Runs:");
                println!("{}", "=".repeat(70));
                for run in runs {
                    println!("{}", run.display_line());
                }
            }
        }

        Commands::Inspect {
            run_id,
            deliberation,
        } => {
            let archive = RunArchive::new(config.data_dir())?;
            let snapshot = archive.load(&run_id)?;
            print_run(&snapshot);
            if deliberation {
                print_deliberation(&snapshot);
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(backend) = cli.backend {
        config.evaluator.backend = backend;
    }
    if let Some(policy) = cli.policy {
        config.arbitration.policy = policy;
    }
    config.validate()?;
    Ok(config)
}

fn create_generator(config: &Config) -> Result<ProgramGenerator> {
    let executor = Executor::new(
        config.evaluator()?,
        config.arbiter(),
        config.executor_config(),
    )
    .with_observer(Arc::new(ProgressPrinter));
    let archive = RunArchive::new(config.data_dir())?;
    Ok(ProgramGenerator::new(executor, config.roster.clone())?.with_archive(archive))
}

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read: {:?}", path))?;
    // YAML is a superset of JSON
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse: {:?}", path))
}

fn read_request(
    request: &ProgramRequest,
) -> Result<(UserProfile, GoalStatement, EquipmentInventory)> {
    let profile: UserProfile = read_file(&request.profile)?;
    let equipment: EquipmentInventory = read_file(&request.equipment)?;
    let goals = GoalStatement::new(request.goal.clone()).with_weeks(request.weeks);
    Ok((profile, goals, equipment))
}

/// Print the program, or a failure report naming the failing task
fn finish(result: Result<RunContext, PipelineError>, output: Option<&Path>) -> Result<()> {
    match result {
        Ok(ctx) => {
            let program = ctx
                .program()
                .ok_or_else(|| anyhow!("run {} produced no program", ctx.run_id()))?;
            let rendered = JsonRenderer.render(program)?;
            match output {
                Some(path) => {
                    std::fs::write(path, rendered)
                        .with_context(|| format!("Failed to write: {:?}", path))?;
                    eprintln!("Program written to {:?}", path);
                }
                None => println!("{}", rendered),
            }
            if !program.unavailable_specialists.is_empty() {
                eprintln!(
                    "Confidence {:.2}: {} specialist(s) unavailable",
                    program.confidence,
                    program.unavailable_specialists.len()
                );
            }
            eprintln!("Run {} archived", ctx.run_id());
            Ok(())
        }
        Err(PipelineError::Plan(e)) => Err(anyhow!("Invalid request: {}", e)),
        Err(PipelineError::Execution(e)) => {
            eprintln!("Run {} failed", e.context.run_id());
            if let Some(task_id) = e.failing_task() {
                eprintln!("  Task:  {}", task_id);
            }
            eprintln!("  Cause: {}", e.cause);
            eprintln!(
                "Use 'orca-lift inspect {}' for details",
                e.context.run_id()
            );
            Err(anyhow!(e.cause.clone()))
        }
    }
}

fn print_run(snapshot: &RunSnapshot) {
    println!("Run: {}", snapshot.run_id);
    println!("  Status:    {}", snapshot.status.as_str());
    println!("  Goals:     {}", snapshot.inputs.goals.text);
    println!("  Created:   {}", snapshot.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(completed) = snapshot.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M"));
    }
    if let Some(parent) = &snapshot.parent_run {
        println!("  Refines:   {} (iteration {})", parent, snapshot.iteration);
    }
    if let Some(point) = &snapshot.inputs.revision {
        println!("  Revised:   from {}", point.describe());
    }

    for (phase, ids) in snapshot.phases.iter().enumerate() {
        println!("\nPhase {}:", phase);
        for id in ids {
            let Some(task) = snapshot.dag.tasks.iter().find(|t| &t.id == id) else {
                continue;
            };
            let icon = match task.status.label() {
                "succeeded" => "[✓]",
                "pending" | "ready" => "[ ]",
                "running" => "[~]",
                "skipped" => "[-]",
                _ => "[✗]",
            };
            println!(
                "  {} {} - {} ({} attempt(s))",
                icon,
                task.id,
                task.subject,
                task.attempts.len()
            );
            if let Some(reason) = task.status.reason() {
                println!("      {}", reason);
            }
        }
    }

    if !snapshot.errors.is_empty() {
        println!("\nErrors:");
        for err in &snapshot.errors {
            let kind = if err.recoverable { "recovered" } else { "fatal" };
            println!(
                "  [{}] {}: {}",
                kind,
                err.task_id.as_deref().unwrap_or("-"),
                err.error
            );
        }
    }
}

fn print_deliberation(snapshot: &RunSnapshot) {
    for (arbiter_id, input) in &snapshot.deliberations {
        println!("\nDeliberation for {}:", arbiter_id);
        for entry in &input.entries {
            match entry {
                SpecialistEntry::Available { kind, opinion, .. } => {
                    println!("  {} ({} proposals): {}", kind, opinion.proposals.len(), opinion.summary);
                    for proposal in &opinion.proposals {
                        println!(
                            "    - {}: {}",
                            proposal.adjustment.describe(),
                            proposal.rationale
                        );
                    }
                }
                SpecialistEntry::Unavailable { kind, reason, .. } => {
                    println!("  {} unavailable: {}", kind, reason);
                }
            }
        }

        if let Some(TaskOutput::Arbitration(arbitration)) = snapshot.results.get(arbiter_id) {
            println!(
                "\n  Arbitration ({}, confidence {:.2}):",
                arbitration.policy, arbitration.confidence
            );
            for resolution in &arbitration.resolutions {
                let winner = resolution
                    .candidates
                    .get(resolution.chosen)
                    .map(|c| c.adjustment.describe())
                    .unwrap_or_default();
                let names = |kinds: &[orca_lift::SpecialistKind]| {
                    kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
                };
                println!("    {} by {}", winner, resolution.rule);
                println!("      accepted:   {}", names(&resolution.accepted));
                println!("      overridden: {}", names(&resolution.overridden));
            }
            println!("  {}", arbitration.rationale);
        }
    }
}
