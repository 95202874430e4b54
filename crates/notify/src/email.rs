//! SMTP email notifier via `lettre` with TLS support.
//!
//! Delivers events as plain-text emails and attaches the snapshot image
//! when the event carries one.

use std::path::Path;
use std::sync::Arc;

use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use smartcam_core::config::EmailConfig;

use crate::templating::TemplateRenderer;
use crate::traits::{NotificationEvent, Notifier, NotifyError};

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    renderer: Arc<TemplateRenderer>,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from the `[notify.email]` section.
    ///
    /// Port 465 uses implicit TLS; any other port uses STARTTLS. The
    /// sender address doubles as the SMTP username.
    pub fn from_config(config: &EmailConfig, renderer: Arc<TemplateRenderer>) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .sender_email
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("sender_email: {e}")))?;
        let to: Mailbox = config
            .recipient_email
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("recipient_email: {e}")))?;

        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
        }
        .map_err(|e| NotifyError::Config(e.to_string()))?
        .port(config.smtp_port);

        let builder = if config.sender_password.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.sender_email.clone(),
                config.sender_password.clone(),
            ))
        };

        Ok(Self {
            transport: builder.build(),
            from,
            to,
            renderer,
        })
    }

    /// Render `event` into a message, attaching its snapshot if readable.
    pub async fn build_message(&self, event: &NotificationEvent) -> Result<Message, NotifyError> {
        let subject = self.renderer.subject(event)?;
        let text = self.renderer.body(event)?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject);

        let attachment = match &event.data.snapshot {
            Some(path) => read_attachment(path).await,
            None => None,
        };

        let message = match attachment {
            Some((filename, bytes)) => {
                let content_type = ContentType::parse("image/jpeg")
                    .map_err(|e| NotifyError::Attachment(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(text))
                        .singlepart(Attachment::new(filename).body(bytes, content_type)),
                )
            }
            None => builder.body(text),
        };
        message.map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

/// Read a snapshot for attachment. A missing or unreadable file is not an
/// error: the email goes out without it.
async fn read_attachment(path: &Path) -> Option<(String, Vec<u8>)> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "snapshot.jpg".to_string());
            Some((filename, bytes))
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "snapshot not attached");
            None
        }
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let email = self.build_message(event).await?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::debug!(
            channel = "email",
            kind = event.kind.key(),
            recipient = %self.to,
            "email sent"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
