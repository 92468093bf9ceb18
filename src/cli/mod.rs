mod doctor;

use crate::config::{self, Config, Transport};
use crate::exec::runner::ToolRunner;
use crate::exec::supervisor::OutputLimits;
use crate::gateway::{self, GatewayState};
use crate::health::HealthMonitor;
use crate::health::checks::default_checks;
use crate::metrics::MetricsRegistry;
use crate::stdio::StdioServer;
use crate::tools::build_tools;
use crate::tools::registry::ToolRegistry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "scangate")]
#[command(version = crate::VERSION)]
#[command(about = "Security-tool gateway for curated network scanners")]
pub struct Cli {
    /// Path to a JSON config file (env vars override its values)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Serve {
        /// Transport override: stdio or http
        #[arg(long)]
        transport: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run system diagnostics
    Doctor,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve {
        transport: None,
        host: None,
        port: None,
    });

    match command {
        Commands::Serve {
            transport,
            host,
            port,
        } => {
            let mut loaded = match config::load_config(cli.config.as_deref()) {
                Ok(loaded) => loaded,
                Err(e) => {
                    error!("config.invalid error={:#}", e);
                    std::process::exit(2);
                }
            };
            if let Some(transport) = transport {
                match transport.to_lowercase().as_str() {
                    "stdio" => loaded.server.transport = Transport::Stdio,
                    "http" => loaded.server.transport = Transport::Http,
                    other => {
                        error!("config.invalid error=unknown transport {:?}", other);
                        std::process::exit(2);
                    }
                }
            }
            if let Some(host) = host {
                loaded.server.host = host;
            }
            if let Some(port) = port {
                loaded.server.port = port;
            }

            if let Err(e) = serve(loaded).await {
                error!("server.startup_failed error={:#}", e);
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Doctor => doctor::doctor_command(cli.config.as_deref()).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let prometheus = if config.metrics.prometheus_enabled {
        crate::metrics::install_prometheus()
    } else {
        None
    };

    let metrics = Arc::new(MetricsRegistry::new(
        config.metrics.max_tools,
        Duration::from_secs(config.metrics.cleanup_interval_secs),
    ));
    let limits = OutputLimits {
        max_stdout: config.security.max_stdout_bytes,
        max_stderr: config.security.max_stderr_bytes,
    };
    let runner = Arc::new(ToolRunner::new(limits, metrics.clone()));
    let registry = Arc::new(ToolRegistry::new(
        build_tools(&config),
        &config.tool.include,
        &config.tool.exclude,
    ));
    let health = Arc::new(HealthMonitor::new(
        default_checks(&config, &registry, &runner),
        Duration::from_secs(config.health.check_interval_secs),
        Duration::from_secs(config.health.check_timeout_secs),
    ));

    let (enabled, total) = registry.counts();
    info!(
        "server.initialized transport={} tools={}/{} intrusive={}",
        config.server.transport, enabled, total, config.security.allow_intrusive
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = health.clone().spawn(shutdown_rx.clone());
    spawn_signal_listener(shutdown_tx.clone());

    match config.server.transport {
        Transport::Stdio => {
            let stdio = StdioServer::new(registry.clone(), runner.clone(), metrics.clone());
            stdio.serve(shutdown_rx.clone()).await?;
        }
        Transport::Http => {
            let state = GatewayState {
                registry: registry.clone(),
                runner: runner.clone(),
                health: health.clone(),
                metrics: metrics.clone(),
                prometheus,
            };
            let app = gateway::build_router(state);
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("server.listening addr={}", addr);

            let mut graceful = shutdown_rx.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = graceful.changed().await;
                })
                .await
                .context("HTTP server error")?;
        }
    }

    // Stop periodic work, then wait out inflight executions
    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    info!(
        "server.shutting_down grace={:.0}s inflight={}",
        grace.as_secs_f64(),
        runner.inflight_count()
    );
    if !runner.drain(grace).await {
        warn!(
            "server.shutdown_forced timeout={:.0}s inflight={}",
            grace.as_secs_f64(),
            runner.inflight_count()
        );
    }
    let _ = monitor_handle.await;
    info!("server.shutdown_completed");
    Ok(())
}

fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("server.signal_handler_failed error={}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("server.signal_received initiating_shutdown");
        let _ = shutdown_tx.send(true);
    });
}
