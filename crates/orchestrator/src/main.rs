use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ha_domain::config::{Config, ConfigSeverity};
use ha_orchestrator::api;
use ha_orchestrator::bootstrap;
use ha_orchestrator::runtime::{CancelToken, Worker};
use ha_orchestrator::state::AppState;

#[derive(Parser)]
#[command(name = "hyperagent", about = "Agentic orchestration backend")]
struct Cli {
    /// Path to config.toml (defaults are used when absent).
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server plus an embedded worker (default).
    Serve,
    /// Run a worker process only.
    Worker,
    /// Validate the configuration and exit.
    Config,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(config, true).await
        }
        Some(Command::Worker) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(config, false).await
        }
        Some(Command::Config) => {
            let config = load_config(&cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                println!("{:?}: {issue}", issue.severity);
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("configuration ok");
            Ok(())
        }
        Some(Command::Version) => {
            println!("hyperagent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for server processes.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ha_orchestrator=debug")),
        )
        .json()
        .init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<Arc<Config>> {
    let config = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?,
        Err(_) => {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Config::default()
        }
    };

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    Ok(Arc::new(config))
}

/// Start the process: background hooks, worker, and (optionally) the API.
async fn run_server(config: Arc<Config>, with_api: bool) -> anyhow::Result<()> {
    tracing::info!("HyperAgent starting");

    let state = bootstrap::build_state(config.clone());
    if state.llm.is_empty() {
        tracing::warn!(
            "no LLM providers initialized — the API will run but task \
             submissions will be rejected until a provider is configured"
        );
        for error in state.llm.init_errors() {
            tracing::warn!(
                provider = %error.provider_id,
                kind = %error.kind,
                error = %error.error,
                "provider init failed"
            );
        }
    }

    // ── Startup hooks ─────────────────────────────────────────────
    let background = bootstrap::spawn_background_tasks(&state);

    let shutdown = CancelToken::new();
    let worker_id = format!("worker-{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let worker = Worker::new(state.worker_context(worker_id));
    let worker_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    // ── API server ────────────────────────────────────────────────
    if with_api {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("invalid server host/port")?;
        let router = api::build_router(state.clone());
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        tracing::info!(%addr, "API listening");

        let serve_shutdown = shutdown.clone();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            serve_shutdown.cancel();
        })
        .await
        .context("serving API")?;
    } else {
        shutdown_signal().await;
        shutdown.cancel();
    }

    // ── Shutdown hooks: drain the worker, then release sandboxes ──
    tracing::info!("shutting down");
    shutdown.cancel();
    let _ = worker_handle.await;
    for handle in background {
        handle.abort();
    }
    state.sandboxes.execution.cleanup_all().await;
    state.sandboxes.desktop.cleanup_all().await;
    state.sandboxes.app.cleanup_all().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
