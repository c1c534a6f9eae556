/// Errors raised while sending notifications.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Simple email service (SES) errors.
    #[error("AWS SES error: {0}")]
    SesError(String),

    /// SMTP relay errors.
    #[error("SMTP error: {0}")]
    SmtpError(String),

    /// Invalid email format.
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),
}
