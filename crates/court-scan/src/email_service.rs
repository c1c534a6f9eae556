use async_trait::async_trait;
use notification_services::{NotificationError, NotificationService, SmtpService};
use tracing::info;

use crate::executor::Notifier;
use crate::scan_types::NotifyError;

/// AWS SES email notifier
pub struct SesEmailNotifier {
    service: NotificationService,
}

impl SesEmailNotifier {
    /// Wrap an initialised SES notification service
    pub fn new(service: NotificationService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Notifier for SesEmailNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError> {
        let message_id = self
            .service
            .send_email(recipient, subject, body)
            .await
            .map_err(notify_error)?;

        info!("Email {} delivered to {}", message_id, recipient);
        Ok(())
    }
}

/// SMTP relay email notifier
pub struct SmtpEmailNotifier {
    service: SmtpService,
}

impl SmtpEmailNotifier {
    /// Wrap a configured SMTP service
    pub fn new(service: SmtpService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Notifier for SmtpEmailNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError> {
        let reply = self
            .service
            .send_email(recipient, subject, body)
            .await
            .map_err(notify_error)?;

        info!("Email delivered to {} (SMTP {})", recipient, reply);
        Ok(())
    }
}

fn notify_error(error: NotificationError) -> NotifyError {
    match error {
        NotificationError::InvalidEmail(address) => NotifyError::InvalidRecipient(address),
        other => NotifyError::Email(other.to_string()),
    }
}

/// Notifier that only logs, for dry runs
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError> {
        info!("📧 [DRY RUN EMAIL] To: {}", recipient);
        info!("📧 [DRY RUN EMAIL] Subject: {}", subject);
        info!("📧 [DRY RUN EMAIL] Body:\n{}", body);
        Ok(())
    }
}
