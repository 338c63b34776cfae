use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use mender_server::api::{self, AppState};
use mender_server::config::MenderConfig;
use mender_server::recovery_factory;

/// Mender recovery engine HTTP server.
#[derive(Parser, Debug)]
#[command(name = "mender-server", about = "Automated incident recovery server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "mender.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration and every playbook, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = MenderConfig::load(&cli.config)?;

    if let Some(Commands::CheckConfig) = cli.command {
        let catalog = config.validate()?;
        println!(
            "{}: ok ({} recovery actions, {} circuit overrides)",
            cli.config,
            catalog.len(),
            config.circuit_breaker.circuits.len()
        );
        return Ok(());
    }

    mender_server::telemetry::init(&config.logging);

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let runtime =
        recovery_factory::create_runtime(&config, recovery_factory::default_handlers())?;

    let background = recovery_factory::create_background(&config, &runtime)?;
    let background_shutdown = if let Some((mut processor, shutdown_tx)) = background {
        tokio::spawn(async move { processor.run().await });
        info!("background processor started");
        Some(shutdown_tx)
    } else {
        None
    };

    let state = AppState {
        orchestrator: runtime.orchestrator.clone(),
        alerts: runtime.alerts.clone(),
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "mender server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    if let Some(tx) = background_shutdown
        && tx.send(()).await.is_err()
    {
        warn!("background processor already stopped");
    }

    let timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    if tokio::time::timeout(timeout, runtime.orchestrator.shutdown())
        .await
        .is_err()
    {
        warn!(
            timeout_seconds = config.server.shutdown_timeout_seconds,
            active = runtime.orchestrator.active_recoveries().len(),
            "timed out waiting for in-flight recoveries"
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
