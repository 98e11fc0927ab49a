use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use agent_runtime::config::{resolve_runtime_name, RuntimeRegistryConfig, ScopeOverride};
use agent_runtime::hooks::{HookSink, JsonLinesSink, NoopSink};
use agent_runtime::runtime::Profile;
use agent_runtime::{
    AgentRuntime, Delivery, Message, Mode, Registry, SessionFilter, SessionHandle, StartOptions,
    TerminalBackend, TmuxClient,
};

#[derive(Parser)]
#[command(name = "agent-runtime")]
#[command(about = "Start, drive and supervise AI coding agents in tmux sessions")]
#[command(version)]
struct Cli {
    /// Runtime adapter to use (defaults to the scope override, then the configured default)
    #[arg(short, long, global = true, env = "GT_RUNTIME")]
    runtime: Option<String>,

    /// Runtime registry file (defaults to ~/.agent-runtime/runtimes.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write lifecycle hook events to stdout as JSON lines
    #[arg(long, global = true)]
    hooks: bool,

    /// tmux binary
    #[arg(long, global = true, default_value = "tmux")]
    tmux: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch an agent in a session and wait for it to become ready
    Start {
        session: String,

        /// Launch command (defaults to the runtime's binary)
        #[arg(long)]
        command: Option<String>,

        /// Working directory (defaults to the current directory)
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// Account directory exported to the agent under its native variable
        #[arg(long)]
        account_dir: Option<PathBuf>,

        /// Extra environment for a new session, KEY=VALUE
        #[arg(short, long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// First message, delivered once the agent is ready
        #[arg(long)]
        prompt: Option<String>,

        /// Require the session to exist instead of creating it
        #[arg(long)]
        minimal: bool,
    },

    /// Relaunch the agent in an existing session from its persisted session id
    Resume {
        session: String,

        #[arg(short, long)]
        work_dir: Option<PathBuf>,
    },

    /// Deliver a message to a running agent
    Send {
        session: String,

        text: String,

        /// Delivery channel (defaults to the runtime's preferred channel)
        #[arg(short, long)]
        delivery: Option<Delivery>,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Kill a session
    Stop {
        session: String,

        #[arg(long, default_value = "requested")]
        reason: String,
    },

    /// Check whether the agent accepts input
    Ready { session: String },

    /// Check whether the agent is the session's foreground process
    Running { session: String },

    /// List sessions known to the backend
    List {
        /// Only sessions whose pane directory is exactly this path
        #[arg(short, long)]
        work_dir: Option<String>,
    },

    /// Show registered runtimes
    Runtimes,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results and hook events
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(RuntimeRegistryConfig::default_path);
    let config = RuntimeRegistryConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load runtime config {}", config_path.display()))?;

    let hooks: Arc<dyn HookSink> = if cli.hooks {
        Arc::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Arc::new(NoopSink)
    };
    let registry = Registry::from_config(&config, hooks);
    let backend: Arc<dyn TerminalBackend> = Arc::new(TmuxClient::with_path(cli.tmux.clone()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    if let Commands::Runtimes = cli.command {
        let default = resolve_runtime_name(None, None, &config);
        for name in registry.names() {
            let marker = if name == default { "*" } else { " " };
            println!("{} {}", marker, name);
        }
        return Ok(());
    }

    let scope_dir = match &cli.command {
        Commands::Start { work_dir: Some(dir), .. } | Commands::Resume { work_dir: Some(dir), .. } => {
            dir.clone()
        }
        _ => current_dir()?,
    };
    let scope = ScopeOverride::load(&scope_dir)
        .with_context(|| format!("Failed to read scope override in {}", scope_dir.display()))?;
    let name = resolve_runtime_name(cli.runtime.as_deref(), scope.as_ref(), &config);
    let profile = config.runtimes.get(&name).cloned().unwrap_or_default().profile(&name);
    let runtime = registry.get(&name, backend)?;

    run(cli.command, runtime.as_ref(), &profile, &cancel).await
}

async fn run(
    command: Commands,
    runtime: &dyn AgentRuntime,
    profile: &Profile,
    cancel: &CancellationToken,
) -> Result<()> {
    let handle = |session: String| SessionHandle::partial(runtime.name(), session);

    match command {
        Commands::Start {
            session,
            command,
            work_dir,
            account_dir,
            env,
            prompt,
            minimal,
        } => {
            let work_dir = match work_dir {
                Some(dir) => dir,
                None => current_dir()?,
            };
            let mut opts = StartOptions::new(session, command.unwrap_or_else(|| profile.binary.clone()))
                .work_dir(work_dir)
                .runtime(runtime.name())
                .mode(if minimal { Mode::Minimal } else { Mode::Tmux });
            if let Some(dir) = account_dir {
                opts = opts.account_dir(dir);
            }
            if let Some(prompt) = prompt {
                opts = opts.initial_prompt(prompt);
            }
            for (key, value) in env {
                opts = opts.env(key, value);
            }

            let started = runtime.start(opts, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&started)?);
        }
        Commands::Resume { session, work_dir } => {
            let mut target = handle(session);
            if let Some(dir) = work_dir {
                target = target.with_work_dir(dir);
            }
            runtime.resume(&target, cancel).await?;
        }
        Commands::Send {
            session,
            text,
            delivery,
            timeout,
        } => {
            let msg = Message::new(text)
                .via(delivery.unwrap_or(profile.default_delivery))
                .timeout(Duration::from_secs(timeout));
            runtime.send_message(&handle(session), &msg, cancel).await?;
        }
        Commands::Stop { session, reason } => {
            runtime.stop(&handle(session), &reason).await?;
        }
        Commands::Ready { session } => {
            println!("{}", runtime.is_ready(&handle(session), cancel).await?);
        }
        Commands::Running { session } => {
            println!("{}", runtime.detect_running(&handle(session)).await?);
        }
        Commands::List { work_dir } => {
            let mut filter = SessionFilter::default();
            if let Some(dir) = work_dir {
                filter = filter.work_dir(dir);
            }
            for found in runtime.list_sessions(&filter).await? {
                println!("{}", found.session_id);
            }
        }
        Commands::Runtimes => {}
    }
    Ok(())
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to determine current directory")
}
