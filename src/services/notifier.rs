//! Outbound member notifications over SMTP.
//!
//! Delivery is best-effort: callers log failures but never roll back the
//! state change that triggered the message.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use thiserror::Error;

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid mail address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// The lifecycle events a member is mailed about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    Registered,
    Approved,
    Rejected,
    PictureReminder,
}

impl NotificationTemplate {
    fn subject(self) -> &'static str {
        match self {
            Self::Registered => "Registration received",
            Self::Approved => "Your membership has been approved",
            Self::Rejected => "Your membership application",
            Self::PictureReminder => "Reminder: profile picture required",
        }
    }

    fn body(self, full_name: &str) -> String {
        match self {
            Self::Registered => format!(
                "Hi {full_name},\n\nWe received your registration. You will get \
                 another message once the board has reviewed it.\n"
            ),
            Self::Approved => format!(
                "Hi {full_name},\n\nYour membership has been approved. Welcome \
                 aboard!\n\nPlease remember to upload a profile picture if you \
                 have not done so already.\n"
            ),
            Self::Rejected => format!(
                "Hi {full_name},\n\nUnfortunately your membership application \
                 was not approved. If you believe this is a mistake, contact \
                 the board.\n"
            ),
            Self::PictureReminder => format!(
                "Hi {full_name},\n\nYour profile picture is still missing and \
                 the upload deadline has passed. Please upload one as soon as \
                 possible.\n"
            ),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        full_name: &str,
        template: NotificationTemplate,
    ) -> Result<(), NotifyError>;
}

/// SMTP-backed notifier.
pub struct LettreNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    send_timeout: Duration,
}

impl LettreNotifier {
    pub fn from_config(config: &MailConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
            send_timeout: Duration::from_secs(config.send_timeout_seconds),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for LettreNotifier {
    async fn send(
        &self,
        recipient: &str,
        full_name: &str,
        template: NotificationTemplate,
    ) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::Address(self.from_address.clone()))?,
            )
            .to(recipient
                .parse()
                .map_err(|_| NotifyError::Address(recipient.to_string()))?)
            .subject(template.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(template.body(full_name))
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        match tokio::time::timeout(self.send_timeout, self.transport.send(message)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(NotifyError::Transport(e.to_string())),
            Err(_) => Err(NotifyError::Timeout(self.send_timeout)),
        }
    }
}

/// Notifier used when mail is disabled; sends nothing.
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(
        &self,
        _recipient: &str,
        _full_name: &str,
        _template: NotificationTemplate,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_address_the_member_by_name() {
        for template in [
            NotificationTemplate::Registered,
            NotificationTemplate::Approved,
            NotificationTemplate::Rejected,
            NotificationTemplate::PictureReminder,
        ] {
            let body = template.body("Ada Lovelace");
            assert!(body.contains("Ada Lovelace"));
            assert!(!template.subject().is_empty());
        }
    }

    #[tokio::test]
    async fn noop_notifier_always_succeeds() {
        let notifier = NoopNotifier;
        notifier
            .send("a@b.c", "A", NotificationTemplate::Approved)
            .await
            .unwrap();
    }
}
