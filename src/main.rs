use anyhow::{Context, Result};
use helios::config::Config;
use helios::driver::{ShutdownHandle, SwitchDriver};
use tracing::{error, info, warn};

/// Trigger shutdown on Ctrl-C or SIGTERM
async fn wait_for_signal(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
    handle.request_shutdown();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!(e)
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid configuration")?;

    helios::logging::init_logging(&config.logging).map_err(|e| anyhow::anyhow!(e))?;
    info!("Helios {} starting up", env!("APP_VERSION"));

    let mut driver = SwitchDriver::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create driver: {}", e))?;

    let signals = tokio::spawn(wait_for_signal(driver.shutdown_handle()));

    let outcome = driver.run().await;
    signals.abort();

    match outcome {
        Ok(()) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
