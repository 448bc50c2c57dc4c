//! sbx-daemon - Container registry health supervisor for sandbox sessions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandbox_registry_core::ContainerConnection;
use sandbox_registry_core::config::{ConfigOverrides, resolve_config};
use sandbox_registry_daemon::StartupReconciler;
use sandbox_registry_daemon::daemon::{self, DaemonContext, StatusWriter};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// sbx-daemon - Container registry health supervisor for sandbox sessions
#[derive(Parser, Debug)]
#[command(name = "sbx-daemon")]
#[command(about = "Container registry health supervisor for sandbox sessions")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Shared state store URL
    #[arg(long, value_name = "URL", global = true)]
    redis_url: Option<String>,

    /// Session store connection string
    #[arg(long, value_name = "URL", global = true)]
    database_url: Option<String>,

    /// Seconds between health checks
    #[arg(long, value_name = "SECS", global = true)]
    interval_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile, then supervise until SIGINT/SIGTERM (default)
    Run,
    /// List registered container connections
    List {
        /// Only connections owned by this user
        #[arg(long, value_name = "ID")]
        user: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print one connection as JSON
    Show {
        session_id: String,
    },
    /// Remove a connection from the registry
    Evict {
        session_id: String,
    },
    /// Run startup reconciliation once and exit
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    sandbox_registry_core::logging::init(args.verbose);

    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        redis_url: args.redis_url.clone(),
        database_url: args.database_url.clone(),
        interval_secs: args.interval_secs,
    };
    let config = resolve_config(&overrides, &current_dir, &home_dir)
        .context("Failed to resolve configuration")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let ctx = DaemonContext::connect(config).await?;
            run(ctx, &home_dir).await
        }
        Command::List { user, json } => {
            let registry = daemon::connect_registry(&config).await?;
            let connections = match &user {
                Some(user_id) => registry.get_user_containers(user_id).await?,
                None => registry.get_all_containers().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&connections)?);
            } else {
                print_table(&connections);
            }
            Ok(())
        }
        Command::Show { session_id } => {
            let registry = daemon::connect_registry(&config).await?;
            let connection = registry
                .get_container_connection(&session_id)
                .await?
                .with_context(|| format!("No container registered for session {session_id}"))?;
            println!("{}", serde_json::to_string_pretty(&connection)?);
            println!("tool server: {}", connection.tool_server_url());
            println!("dev server:  {}", connection.dev_server_url());
            Ok(())
        }
        Command::Evict { session_id } => {
            let registry = daemon::connect_registry(&config).await?;
            registry.unregister_container(&session_id).await;
            println!("Evicted {session_id}");
            Ok(())
        }
        Command::Reconcile => {
            let registry = daemon::connect_registry(&config).await?;
            let runtime = daemon::connect_runtime(&config)?;
            let report = StartupReconciler::new(registry, runtime)
                .reconcile()
                .await
                .context("Reconciliation failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn run(ctx: DaemonContext, home_dir: &std::path::Path) -> Result<()> {
    info!("sbx-daemon starting...");

    let status = StatusWriter::new(ctx.status_dir(home_dir), env!("CARGO_PKG_VERSION").to_string());
    info!("Status file: {}", status.status_path().display());

    let cancel = CancellationToken::new();
    daemon::spawn_signal_listener(cancel.clone());

    daemon::run(&ctx, &status, cancel)
        .await
        .context("Daemon event loop failed")?;

    info!("sbx-daemon shutdown complete");
    Ok(())
}

fn print_table(connections: &[ContainerConnection]) {
    if connections.is_empty() {
        println!("No registered containers");
        return;
    }
    println!(
        "{:<38} {:<20} {:<14} {:<9} {:<10} REGISTERED",
        "SESSION", "USER", "CONTAINER", "STATUS", "HEALTH"
    );
    for c in connections {
        let container: String = c.container_id.chars().take(12).collect();
        let health = c.health_status.map_or("-", |h| h.as_str());
        println!(
            "{:<38} {:<20} {:<14} {:<9} {:<10} {}",
            c.session_id,
            c.user_id,
            container,
            c.status.as_str(),
            health,
            c.registered_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
