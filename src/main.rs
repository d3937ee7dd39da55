use clawgate::admin::{AdminServer, AdminState, PKG_NAME, VERSION};
use clawgate::auth::Credentials;
use clawgate::config::Config;
use clawgate::status::has_provider_key;
use clawgate::supervisor::GatewaySupervisor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clawgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load settings; the file is optional
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("clawgate.toml"));

    let config = Config::from_env_or_file(Some(&config_path)).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load settings");
        e
    })?;

    print_startup_banner(&config);

    let credentials = match config.server.admin_password.clone() {
        Some(password) => Credentials::new(config.server.admin_username.clone(), password),
        None => {
            let credentials = Credentials::generate(config.server.admin_username.clone());
            info!(
                username = credentials.username(),
                password = credentials.password(),
                "Generated admin password (set ADMIN_PASSWORD to use a fixed value)"
            );
            credentials
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let home = config.home_dir();
    let supervisor = GatewaySupervisor::new(config.gateway.clone());
    let state = AdminState::new(home, Arc::clone(&supervisor), credentials);

    if config.gateway.auto_start {
        if has_provider_key(&state.store.load()) {
            info!("Provider key found, starting gateway");
            supervisor.start().await;
        } else {
            warn!("No provider API key configured, gateway not started");
        }
    }

    let admin_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid admin bind address");
            anyhow::anyhow!("Invalid admin bind address: {}", e)
        })?;

    let admin_server = AdminServer::new(admin_addr, state, shutdown_rx);
    let admin_handle = tokio::spawn(async move {
        if let Err(e) = admin_server.run().await {
            error!(error = %e, "Admin server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    info!("Stopping gateway...");
    supervisor.shutdown().await;

    let _ = shutdown_tx.send(true);

    // Wait for the admin server to stop (with timeout)
    if tokio::time::timeout(Duration::from_secs(5), admin_handle)
        .await
        .is_err()
    {
        warn!("Admin server did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting gateway control plane");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        username = %config.server.admin_username,
        "Admin server configuration"
    );
    info!(
        home = %config.home_dir().display(),
        command = %config.gateway.command,
        stop_timeout_secs = config.gateway.stop_timeout_secs,
        log_capacity = config.gateway.log_capacity,
        auto_start = config.gateway.auto_start,
        "Gateway settings"
    );
}
