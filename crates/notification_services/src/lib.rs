//! # Notification Services
//!
//! This crate delivers notification emails through AWS SES or an SMTP relay.

/// Email delivery through AWS SES.
pub mod service;
/// Email delivery through an SMTP relay.
pub mod smtp;
/// Errors raised while sending notifications.
pub mod types;

pub use service::NotificationService;
pub use smtp::{SmtpService, SmtpSettings};
pub use types::NotificationError;
