mod access;
mod config;
mod error;
mod github;
mod ipc;
mod server;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{PeekConfig, CONFIG_DIR, CONFIG_FILE, DEFAULT_CONFIG};
use server::ToolContext;

#[derive(Parser)]
#[command(name = "peek")]
#[command(about = "Read-only code search, file reading and GitHub tools over MCP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level filter (e.g. debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Sandbox root for local file tools (overrides server.root)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file to use instead of .peek/config.toml lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdin/stdout (default)
    Serve,

    /// Print the tool catalog
    Tools,

    /// Run a single tool and print its text result
    Call {
        /// Tool name, e.g. read_file
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Show or create configuration (.peek/config.toml)
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Create default config.toml in .peek/
    Init,
    /// Show path to the config file
    Path,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let root = cli.root.as_deref();
    let config_file = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => handle_serve(root, config_file),
        Commands::Tools => handle_tools(),
        Commands::Call { tool, args } => handle_call(root, config_file, &tool, &args),
        Commands::Config { action } => handle_config(root, config_file, action),
    }
}

/// Logs always go to stderr; stdout carries protocol frames only.
/// JSON lines via PEEK_LOG_JSON=1.
fn init_logging(level: &str) {
    let json_logging = std::env::var("PEEK_LOG_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("peek={}", level).into());

    if json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Directory used for `.peek/config.toml` lookup.
fn config_home(root: Option<&Path>) -> anyhow::Result<PathBuf> {
    match root {
        Some(r) => Ok(r.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}

/// Load config, apply CLI and environment overrides, canonicalize the root.
fn effective_config(
    root: Option<&Path>,
    config_file: Option<&Path>,
) -> anyhow::Result<(PeekConfig, Option<PathBuf>)> {
    let (mut config, source) = config::load_config(config_file, &config_home(root)?)?;
    if let Some(root) = root {
        config.server.root = root.to_path_buf();
    }
    let mut config = config.with_env_token(std::env::var("GITHUB_TOKEN").ok());

    config.server.root = std::fs::canonicalize(&config.server.root).with_context(|| {
        format!(
            "Server root directory is not accessible: {}",
            config.server.root.display()
        )
    })?;

    Ok((config, source))
}

fn cli_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

// === CLI handlers ===

fn handle_serve(root: Option<&Path>, config_file: Option<&Path>) -> anyhow::Result<()> {
    let (config, source) = effective_config(root, config_file)?;
    let rt = cli_runtime()?;

    let result = rt.block_on(async {
        let ctx = ToolContext::from_config(&config)?;
        let shutdown = CancellationToken::new();
        spawn_signal_handler(shutdown.clone());

        tracing::info!(
            root = %config.server.root.display(),
            config = ?source,
            github_token = ctx.github.has_token(),
            "peek MCP server starting on stdio"
        );

        ipc::server::serve(tokio::io::stdin(), tokio::io::stdout(), ctx, shutdown).await?;
        tracing::info!("peek MCP server stopped");
        anyhow::Ok(())
    });

    // The blocking stdin reader may still be parked on a read.
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

#[cfg(unix)]
fn spawn_signal_handler(token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to register signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, initiating graceful shutdown");
            }
        }
        token.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, initiating graceful shutdown");
            token.cancel();
        }
    });
}

fn handle_tools() -> anyhow::Result<()> {
    let catalog = json!({ "tools": server::tools::tools_list() });
    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}

fn handle_call(
    root: Option<&Path>,
    config_file: Option<&Path>,
    tool: &str,
    args: &str,
) -> anyhow::Result<()> {
    let args: Value = serde_json::from_str(args).context("--args must be valid JSON")?;
    let (config, _) = effective_config(root, config_file)?;
    let rt = cli_runtime()?;

    let result = rt.block_on(async {
        let ctx = ToolContext::from_config(&config)?;
        let result = server::tools::dispatch(tool, &args, &ctx).await?;
        anyhow::Ok(result)
    })?;

    let is_error = result.is_error();
    println!("{}", result.into_text());
    if is_error {
        std::process::exit(2);
    }
    Ok(())
}

fn handle_config(
    root: Option<&Path>,
    config_file: Option<&Path>,
    action: Option<ConfigAction>,
) -> anyhow::Result<()> {
    let peek_dir = config_home(root)?.join(CONFIG_DIR);
    let config_path = peek_dir.join(CONFIG_FILE);

    match action {
        Some(ConfigAction::Path) => {
            println!("{}", config_path.display());
        }
        Some(ConfigAction::Init) => {
            std::fs::create_dir_all(&peek_dir)?;
            if config_path.exists() {
                eprintln!("Config already exists: {}", config_path.display());
                return Ok(());
            }
            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            println!("Created: {}", config_path.display());
        }
        None => {
            // Show effective config
            let (config, source) = effective_config(root, config_file)?;
            let origin = source
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            println!("# Effective config ({})\n", origin);
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}
