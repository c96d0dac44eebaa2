#![forbid(unsafe_code)]

//! `yak-box` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use yak_box::models::worker::{AgentMode, AgentTool, RuntimePreference};
use yak_box::opencode::MessageFormat;
use yak_box::orchestrator::{
    CheckRequest, MessageRequest, Orchestrator, SpawnRequest, StatusFilter, StopRequest,
};
use yak_box::registry::SessionRegistry;
use yak_box::runtime::command::SystemCommandRunner;
use yak_box::runtime::profile::PROFILE_NAMES;
use yak_box::workspace::Workspace;
use yak_box::{AppError, Result, YakBoxConfig};

/// Multiplexer session inherited when `--session` is not given.
const SESSION_ENV: &str = "ZELLIJ_SESSION_NAME";

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "yak-box", about = "Sandboxed and native AI worker orchestration", version, long_about = None)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Spawn a new worker.
    Spawn(SpawnArgs),
    /// Stop a worker, clearing its task assignments unless forced.
    Stop(StopArgs),
    /// List registered workers and persona homes.
    Status,
    /// Send a message to a running worker's opencode session.
    Message(MessageArgs),
    /// Show diffs for every repository in a persona home.
    Diff(DiffArgs),
    /// Report sessions, homes, task statuses and worker containers.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct SpawnArgs {
    /// Working directory for the worker (required).
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Worker name used in logs and metadata (required).
    #[arg(long)]
    name: Option<String>,

    /// Multiplexer session to open the tab in (default: the current one).
    #[arg(long)]
    session: Option<String>,

    /// Agent mode.
    #[arg(long, value_enum, default_value_t = AgentMode::Build)]
    mode: AgentMode,

    /// Resource profile: light, default, heavy, or ram.
    #[arg(long, default_value = "default")]
    resources: String,

    /// Task paths to assign (repeatable).
    #[arg(long = "yaks", visible_alias = "task", value_delimiter = ',')]
    yaks: Vec<String>,

    /// Task tracker directory (default: discovered above --cwd).
    #[arg(long)]
    yak_path: Option<PathBuf>,

    /// Runtime.
    #[arg(long, value_enum, default_value_t = RuntimePreference::Auto)]
    runtime: RuntimePreference,

    /// Agent tool for native workers.
    #[arg(long, value_enum, default_value_t = AgentTool::Claude)]
    tool: AgentTool,

    /// Model override (defaults: claude=default, cursor=auto).
    #[arg(long)]
    model: Option<String>,

    /// Clean the worker home directory before spawning.
    #[arg(long)]
    clean: bool,

    /// Create and use a git worktree for the first task.
    #[arg(long)]
    auto_worktree: bool,

    /// Instruction appended to the prompt.
    instruction: Option<String>,
}

#[derive(Debug, Args)]
struct StopArgs {
    /// Worker name to stop (required).
    #[arg(long)]
    name: Option<String>,

    /// Container stop and process kill timeout (e.g. 30s, 1m).
    #[arg(long)]
    timeout: Option<String>,

    /// Skip task cleanup.
    #[arg(short, long)]
    force: bool,

    /// Show what would happen without stopping anything.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct MessageArgs {
    /// Registered worker name.
    worker: String,

    /// Message text; several words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = MessageFormat::Default)]
    format: MessageFormat,

    /// Opencode session id (skips discovery).
    #[arg(long)]
    session: Option<String>,
}

#[derive(Debug, Args)]
struct DiffArgs {
    /// Persona whose home is inspected (required).
    #[arg(long)]
    name: Option<String>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Show only blocked tasks.
    #[arg(long)]
    blocked: bool,

    /// Show only work-in-progress tasks.
    #[arg(long)]
    wip: bool,

    /// Only show tasks under this tracker path (e.g. auth/api).
    #[arg(long)]
    prefix: Option<String>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Runtime(format!("failed to build tokio runtime: {err}")))
        .and_then(|rt| rt.block_on(run(args.command)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let runner = SystemCommandRunner;
    let workspace = Workspace::discover(&runner).await?;
    let config = workspace.load_config()?;
    debug!(root = %workspace.root().display(), "workspace loaded");

    match command {
        Command::Spawn(args) => spawn(&runner, &workspace, &config, args).await,
        Command::Stop(args) => stop(&runner, &workspace, &config, args).await,
        Command::Status => status(&workspace),
        Command::Message(args) => message(&runner, &workspace, &config, args).await,
        Command::Diff(args) => diff(&runner, &workspace, &config, args).await,
        Command::Check(args) => check(&runner, &workspace, &config, args).await,
    }
}

fn validation_failure(errors: &[String]) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let mut combined = String::from("Validation errors:\n");
    for err in errors {
        combined.push_str("  - ");
        combined.push_str(err);
        combined.push('\n');
    }
    Err(AppError::Validation(combined))
}

async fn spawn(
    runner: &SystemCommandRunner,
    workspace: &Workspace,
    config: &YakBoxConfig,
    args: SpawnArgs,
) -> Result<()> {
    let mut errors = Vec::new();
    if args.cwd.is_none() {
        errors.push("--cwd is required (working directory for the worker)".to_owned());
    }
    if !args.name.as_deref().is_some_and(|n| !n.trim().is_empty()) {
        errors.push("--name is required (worker name used in logs and metadata)".to_owned());
    }
    if !PROFILE_NAMES.contains(&args.resources.as_str()) {
        errors.push(format!(
            "--resources must be 'light', 'default', 'heavy', or 'ram', got '{}'",
            args.resources
        ));
    }
    validation_failure(&errors)?;

    let request = SpawnRequest {
        cwd: args.cwd.unwrap_or_default(),
        session_name: args.name.unwrap_or_default(),
        multiplexer_session: args
            .session
            .or_else(|| std::env::var(SESSION_ENV).ok())
            .filter(|s| !s.is_empty()),
        mode: args.mode,
        resources: args.resources,
        tasks: args.yaks,
        yak_path: args.yak_path,
        runtime: args.runtime,
        tool: args.tool,
        model: args.model,
        instruction: args.instruction,
        clean_home: args.clean,
        auto_worktree: args.auto_worktree,
    };

    let report = Orchestrator::for_workspace(runner, workspace, config)
        .spawn(&request)
        .await?;
    let worker = &report.worker;
    println!(
        "Spawned {} ({}) in {}",
        worker.persona, worker.session_name, worker.runtime
    );
    Ok(())
}

async fn stop(
    runner: &SystemCommandRunner,
    workspace: &Workspace,
    config: &YakBoxConfig,
    args: StopArgs,
) -> Result<()> {
    let mut errors = Vec::new();
    if !args.name.as_deref().is_some_and(|n| !n.trim().is_empty()) {
        errors.push("--name is required (worker name to stop)".to_owned());
    }
    let timeout = match args.timeout.as_deref() {
        Some(raw) => match humantime::parse_duration(raw) {
            Ok(timeout) => Some(timeout),
            Err(err) => {
                errors.push(format!(
                    "--timeout has invalid format: {err} (use '30s', '1m', '5m30s', etc.)"
                ));
                None
            }
        },
        None => None,
    };
    validation_failure(&errors)?;

    let request = StopRequest {
        session_name: args.name.unwrap_or_default(),
        timeout: match timeout {
            Some(timeout) => timeout,
            None => config.stop_timeout()?,
        },
        force: args.force,
        dry_run: args.dry_run,
    };

    let report = Orchestrator::for_workspace(runner, workspace, config)
        .stop(&request)
        .await?;
    for action in &report.actions {
        if report.dry_run {
            println!("[dry-run] Would {action}");
        } else {
            println!("{action}");
        }
    }
    println!("Stopped: {}", report.session_name);
    Ok(())
}

fn status(workspace: &Workspace) -> Result<()> {
    let sessions = SessionRegistry::for_workspace(workspace).list()?;
    if sessions.is_empty() {
        println!("No workers registered.");
    } else {
        println!(
            "{:<24} {:<12} {:<10} {:<32} SPAWNED",
            "NAME", "PERSONA", "RUNTIME", "TASK"
        );
        for (name, session) in &sessions {
            println!(
                "{:<24} {:<12} {:<10} {:<32} {}",
                name,
                session.worker,
                session.runtime.as_str(),
                session.task.as_deref().unwrap_or("-"),
                session.spawned_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    let homes = workspace.list_homes()?;
    if !homes.is_empty() {
        println!("\nPersona homes: {}", homes.join(", "));
    }
    Ok(())
}

async fn message(
    runner: &SystemCommandRunner,
    workspace: &Workspace,
    config: &YakBoxConfig,
    args: MessageArgs,
) -> Result<()> {
    let text = args.text.join(" ");
    let mut errors = Vec::new();
    if args.worker.trim().is_empty() {
        errors.push("worker name cannot be empty".to_owned());
    }
    if text.trim().is_empty() {
        errors.push("message text cannot be empty".to_owned());
    }
    validation_failure(&errors)?;

    let request = MessageRequest {
        session_name: args.worker,
        text,
        opencode_session: args.session,
        format: args.format,
    };
    let report = Orchestrator::for_workspace(runner, workspace, config)
        .message(&request)
        .await?;

    match args.format {
        MessageFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        MessageFormat::Default => {
            print!("{}", report.output);
            println!("Message delivered to {}", report.worker);
        }
    }
    Ok(())
}

async fn diff(
    runner: &SystemCommandRunner,
    workspace: &Workspace,
    config: &YakBoxConfig,
    args: DiffArgs,
) -> Result<()> {
    let Some(name) = args.name.filter(|n| !n.trim().is_empty()) else {
        return validation_failure(&["--name is required (worker name)".to_owned()]);
    };

    let report = Orchestrator::for_workspace(runner, workspace, config)
        .diff(&name)
        .await?;
    if report.repos.is_empty() {
        println!("No git repos found in {}", report.home.display());
    }
    for repo in &report.repos {
        println!("\n=== {} (diff against {}) ===", repo.repo, repo.base);
        match &repo.diff {
            Ok(diff) => print!("{diff}"),
            Err(reason) => eprintln!("Warning: git diff failed for {}: {reason}", repo.repo),
        }
    }
    Ok(())
}

async fn check(
    runner: &SystemCommandRunner,
    workspace: &Workspace,
    config: &YakBoxConfig,
    args: CheckArgs,
) -> Result<()> {
    if args.blocked && args.wip {
        validation_failure(&[
            "--blocked and --wip are mutually exclusive (cannot filter for both states \
             simultaneously)"
                .to_owned(),
        ])?;
    }
    let request = CheckRequest {
        status: if args.blocked {
            Some(StatusFilter::Blocked)
        } else if args.wip {
            Some(StatusFilter::Wip)
        } else {
            None
        },
        prefix: args.prefix,
    };

    let report = Orchestrator::for_workspace(runner, workspace, config)
        .check(&request)
        .await?;

    println!("=== Active Sessions ===");
    if report.sessions.is_empty() {
        println!("No active sessions.");
    }
    for (name, session) in &report.sessions {
        println!(
            "{:<24} {:<12} {:<10} {}",
            name,
            session.worker,
            session.runtime.as_str(),
            session.task.as_deref().unwrap_or("-")
        );
    }

    println!("\n=== Worker Homes ===");
    if report.homes.is_empty() {
        println!("No persistent worker homes.");
    }
    for home in &report.homes {
        #[allow(clippy::cast_precision_loss)]
        let megabytes = home.bytes as f64 / 1024.0 / 1024.0;
        println!("  {} (~{megabytes:.1} MB)", home.persona);
    }

    println!("\n=== Tasks ===");
    match &report.tasks {
        None => println!("No tasks found under {}", report.task_root.display()),
        Some(tasks) => {
            for task in tasks {
                println!("{:<50} {}", task.task, task.status);
            }
        }
    }

    println!("\n=== Running Workers ===");
    if report.running.is_empty() {
        println!("No running worker containers.");
    } else {
        for worker in &report.running {
            let c = &worker.container;
            println!("{:<32} {:<24} {}", c.name, c.status, c.running_for);
        }
        println!("\nLive Cost:");
        for worker in &report.running {
            if let Some(cost) = &worker.cost {
                println!("  {:<30} {cost}", worker.container.name);
            }
        }
    }

    println!("\n=== Stopped Workers ===");
    if report.stopped.is_empty() {
        println!("No stopped worker containers.");
    } else {
        for container in &report.stopped {
            println!("{:<32} {}", container.name, container.status);
        }
        println!("\nRun 'yak-box stop --name <worker>' to clean up stopped containers.");
    }

    for note in &report.notes {
        eprintln!("Warning: {note}");
    }
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
