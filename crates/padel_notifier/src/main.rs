//! Main entry point for the padel court notifier.
//! Polls the club's booking site and emails new court openings.

mod config;
mod scan_manager;

use config::Config;
use scan_manager::ScanManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting padel court notifier...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            log::error!("💡 Check the variables in your .env file");
            return Err(e.into());
        }
    };

    log::info!(
        "🎾 Watching {} for {} recipient(s)",
        config.target_times,
        config.recipients.len()
    );

    let mut manager = ScanManager::new(config);
    manager.start().await?;

    wait_for_shutdown_signal().await;
    log::info!("🛑 Shutdown requested, finishing the current cycle");

    manager.stop().await;
    log::info!("👋 Padel court notifier stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("❌ Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("❌ Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
