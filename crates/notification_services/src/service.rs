use crate::types::*;
use aws_config::BehaviorVersion;
use aws_sdk_ses::Client as SesClient;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use validator::ValidateEmail;

/// Notification service sending emails through AWS SES.
#[derive(Debug, Clone)]
pub struct NotificationService {
    ses_client: SesClient,
    from_email: String,
}

impl NotificationService {
    /// Creates a new instance of the NotificationService with the AWS client initialized
    /// from the default credential chain.
    pub async fn new(from_email: impl Into<String>) -> Result<Self, NotificationError> {
        let from_email = from_email.into();
        check_address(&from_email)?;

        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let ses_client = SesClient::new(&config);

        Ok(Self {
            ses_client,
            from_email,
        })
    }

    /// Address the emails are sent from.
    pub fn from_email(&self) -> &str {
        &self.from_email
    }

    /// Sends a plain-text email, with an HTML copy of the same text.
    /// Returns the SES message id.
    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
    ) -> Result<String, NotificationError> {
        let to = to.trim();
        check_address(to)?;

        log::info!("📧 Sending email to {} with subject: {}", to, subject);

        let subject_content = Content::builder()
            .data(subject)
            .charset("UTF-8")
            .build()
            .map_err(|e| {
                log::error!("❌ Failed to build subject content: {}", e);
                NotificationError::SesError(format!("Failed to build subject: {}", e))
            })?;

        let html_content = Content::builder()
            .data(text_to_html(text_body))
            .charset("UTF-8")
            .build()
            .map_err(|e| {
                log::error!("❌ Failed to build HTML content: {}", e);
                NotificationError::SesError(format!("Failed to build HTML body: {}", e))
            })?;

        let text_content = Content::builder()
            .data(text_body)
            .charset("UTF-8")
            .build()
            .map_err(|e| {
                log::error!("❌ Failed to build text content: {}", e);
                NotificationError::SesError(format!("Failed to build text body: {}", e))
            })?;

        let body = Body::builder().html(html_content).text(text_content).build();

        let message = Message::builder()
            .subject(subject_content)
            .body(body)
            .build();

        let destination = Destination::builder().to_addresses(to).build();

        let result = self
            .ses_client
            .send_email()
            .source(&self.from_email)
            .destination(destination)
            .message(message)
            .send()
            .await;

        match result {
            Ok(output) => {
                let message_id = output.message_id().to_string();
                log::info!("✅ Email sent to {}, SES Message ID: {}", to, message_id);
                Ok(message_id)
            }
            Err(e) => {
                log::error!("❌ AWS SES error: {:#?}", e);
                let error_msg = if let Some(service_error) = e.as_service_error() {
                    format!("AWS SES service error: {:?}", service_error)
                } else {
                    format!("AWS SES error: {}", e)
                };
                Err(NotificationError::SesError(error_msg))
            }
        }
    }
}

/// Reject addresses SES would bounce
pub(crate) fn check_address(address: &str) -> Result<(), NotificationError> {
    if address.validate_email() {
        Ok(())
    } else {
        Err(NotificationError::InvalidEmail(address.to_string()))
    }
}

/// HTML rendering of a plain-text body: escaped, with line breaks kept.
pub fn text_to_html(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    format!(
        "<html><body style=\"font-family: Arial, sans-serif;\">{}</body></html>",
        escaped.replace('\n', "<br>")
    )
}
