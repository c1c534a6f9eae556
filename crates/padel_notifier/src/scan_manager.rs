use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use court_scan::{
    AvailabilityProvider, IntervalTicker, LogNotifier, Notifier, PadelClient, ScanExecutor,
    SesEmailNotifier, SessionManager, SmtpEmailNotifier, StateStore,
};
use notification_services::{NotificationService, SmtpService};

use crate::config::{Config, NotifierKind};

/// Owns the background scan loop
pub struct ScanManager {
    config: Config,
    shutdown_tx: watch::Sender<bool>,
    executor_handle: Option<JoinHandle<ScanExecutor>>,
}

impl ScanManager {
    /// Create a new scan manager
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            shutdown_tx,
            executor_handle: None,
        }
    }

    /// Build the collaborators and start polling in a background task
    pub async fn start(&mut self) -> anyhow::Result<()> {
        log::info!("Starting scan execution system");

        let mut executor = self.build_executor().await?;
        let mut ticker = IntervalTicker::new(self.config.check_interval(), self.shutdown_tx.subscribe());

        let handle = tokio::spawn(async move {
            executor.start(&mut ticker).await;
            executor
        });
        self.executor_handle = Some(handle);

        log::info!(
            "✅ Scan execution system started, checking every {} minute(s)",
            self.config.check_interval_minutes
        );
        Ok(())
    }

    /// Ask the loop to stop and wait for the running cycle to finish
    pub async fn stop(&mut self) {
        log::info!("Stopping scan execution system");

        // Receivers may already be gone if the loop ended on its own
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.executor_handle.take() {
            match handle.await {
                Ok(executor) => log::info!(
                    "Scan execution system stopped with {} tracked slot(s) and {} notified date(s)",
                    executor.store().slot_count(),
                    executor.store().known_date_count()
                ),
                Err(e) => log::error!("❌ Scan executor task failed: {}", e),
            }
        }
    }

    async fn build_executor(&self) -> anyhow::Result<ScanExecutor> {
        let session_manager = SessionManager::new(self.config.session_config())
            .context("Failed to create booking site session")?;

        let provider: Arc<dyn AvailabilityProvider> =
            Arc::new(PadelClient::new(session_manager, self.config.planning_url.clone()));

        let notifier: Arc<dyn Notifier> = match self.config.notifier {
            NotifierKind::Log => {
                log::warn!("🔧 NOTIFIER=log, emails are only logged");
                Arc::new(LogNotifier)
            }
            NotifierKind::Ses => {
                let from_email = self
                    .config
                    .from_email
                    .clone()
                    .context("FROM_EMAIL is required to send emails")?;
                let service = NotificationService::new(from_email)
                    .await
                    .context("Failed to initialize notification service")?;
                log::info!("📧 Notification service initialized successfully");
                Arc::new(SesEmailNotifier::new(service))
            }
            NotifierKind::Smtp => {
                let settings = self
                    .config
                    .smtp_settings()
                    .context("SMTP_USERNAME, SMTP_PASSWORD and a sender are required to send emails")?;
                log::info!("📧 Sending emails through {}:{}", settings.server, settings.port);
                let service =
                    SmtpService::new(settings).context("Failed to initialize SMTP service")?;
                Arc::new(SmtpEmailNotifier::new(service))
            }
        };

        let store = StateStore::load(&self.config.state_dir);
        log::info!(
            "🗃️ Loaded state from {}: {} slot(s), {} notified date(s)",
            self.config.state_dir.display(),
            store.slot_count(),
            store.known_date_count()
        );

        Ok(ScanExecutor::new(
            provider,
            notifier,
            store,
            Some(self.config.executor_config()),
        ))
    }
}

impl Drop for ScanManager {
    fn drop(&mut self) {
        if let Some(handle) = self.executor_handle.take() {
            handle.abort();
        }
    }
}
