use crate::service::{check_address, text_to_html};
use crate::types::*;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Connection settings of an SMTP relay reached with STARTTLS.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Relay host name
    pub server: String,
    /// Relay port (587 for submission)
    pub port: u16,
    /// Login of the relay account
    pub username: String,
    /// Password of the relay account
    pub password: String,
    /// Address the emails are sent from
    pub from_email: String,
}

/// Notification service sending emails through an SMTP relay.
pub struct SmtpService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpService {
    /// Creates the transport. No connection is made until the first email.
    pub fn new(settings: SmtpSettings) -> Result<Self, NotificationError> {
        let from = parse_mailbox(&settings.from_email)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
            .map_err(|e| {
                log::error!("❌ Failed to configure SMTP relay {}: {}", settings.server, e);
                NotificationError::SmtpError(format!("Invalid relay {}: {}", settings.server, e))
            })?
            .port(settings.port)
            .credentials(Credentials::new(settings.username, settings.password))
            .build();

        Ok(Self { transport, from })
    }

    /// Sends a plain-text email, with an HTML copy of the same text.
    /// Returns the relay's reply code.
    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
    ) -> Result<String, NotificationError> {
        let message = self.build_message(to, subject, text_body)?;

        log::info!("📧 Sending email to {} with subject: {}", to.trim(), subject);

        match self.transport.send(message).await {
            Ok(response) => {
                let code = response.code().to_string();
                log::info!("✅ Email sent to {}, SMTP reply: {}", to.trim(), code);
                Ok(code)
            }
            Err(e) => {
                log::error!("❌ SMTP error: {}", e);
                Err(NotificationError::SmtpError(e.to_string()))
            }
        }
    }

    fn build_message(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
    ) -> Result<Message, NotificationError> {
        let to = parse_mailbox(to.trim())?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text_body.to_string(),
                text_to_html(text_body),
            ))
            .map_err(|e| {
                log::error!("❌ Failed to build email: {}", e);
                NotificationError::SmtpError(format!("Failed to build email: {}", e))
            })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    check_address(address)?;
    address
        .parse()
        .map_err(|_| NotificationError::InvalidEmail(address.to_string()))
}
