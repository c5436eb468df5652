// src/services/notify.rs

//! Best-effort failure notifications.
//!
//! Messages go to a chat webhook first and to email when the webhook fails.
//! Delivery never fails the caller: the last resort is a log line.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::NotifyConfig;

/// Subject line of fallback emails.
pub const EMAIL_SUBJECT: &str = "Static mirror encountered an error";

/// Outbound mail transport used as the fallback channel.
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

#[cfg(feature = "email")]
pub use smtp::SmtpRelay;

#[cfg(feature = "email")]
mod smtp {
    use async_trait::async_trait;
    use lettre::message::Mailbox;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

    use super::MailRelay;
    use crate::error::{AppError, Result};

    /// Plain SMTP relay without authentication, as internal mail hubs expect.
    pub struct SmtpRelay {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        to: Vec<Mailbox>,
    }

    impl SmtpRelay {
        pub fn new(relay: &str, from: &str, to: &[String]) -> Result<Self> {
            let from = from.parse::<Mailbox>().map_err(AppError::notify)?;
            let to = to
                .iter()
                .map(|addr| addr.parse::<Mailbox>().map_err(AppError::notify))
                .collect::<Result<Vec<_>>>()?;
            if to.is_empty() {
                return Err(AppError::config("notify.email_to is empty"));
            }

            Ok(Self {
                transport: AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(relay).build(),
                from,
                to,
            })
        }
    }

    #[async_trait]
    impl MailRelay for SmtpRelay {
        async fn send(&self, subject: &str, body: &str) -> Result<()> {
            let mut builder = Message::builder().from(self.from.clone()).subject(subject);
            for to in &self.to {
                builder = builder.to(to.clone());
            }
            let message = builder.body(body.to_string()).map_err(AppError::notify)?;

            self.transport
                .send(message)
                .await
                .map_err(AppError::notify)?;
            Ok(())
        }
    }
}

/// Delivers failure messages to chat, falling back to email.
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
    fallback: Option<Box<dyn MailRelay>>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>, fallback: Option<Box<dyn MailRelay>>) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
            fallback,
        }
    }

    /// Build a notifier from configuration.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let fallback: Option<Box<dyn MailRelay>> = match &config.smtp_relay {
            #[cfg(feature = "email")]
            Some(relay) => Some(Box::new(SmtpRelay::new(
                relay,
                &config.email_from,
                &config.email_to,
            )?)),
            #[cfg(not(feature = "email"))]
            Some(_) => {
                log::warn!("notify.smtp_relay is set but email support is not compiled in");
                None
            }
            None => None,
        };
        Ok(Self::new(config.slack_url.clone(), fallback))
    }

    /// Post to the webhook; on failure, email. Never returns an error.
    pub async fn notify(&self, message: &str) {
        let webhook_error = match &self.webhook_url {
            Some(url) => match self.post_webhook(url, message).await {
                Ok(()) => return,
                Err(e) => {
                    log::error!("Exception sending error message to chat webhook: {e}");
                    e.to_string()
                }
            },
            None => "no chat webhook configured".to_string(),
        };

        let Some(relay) = &self.fallback else {
            log::warn!("Dropping notification, no fallback channel: {message}");
            return;
        };

        let body = format!("Original error: {message}\n\nChat webhook error: {webhook_error}");
        if let Err(e) = relay.send(EMAIL_SUBJECT, &body).await {
            log::error!("Exception sending error email: {e}");
        }
    }

    async fn post_webhook(&self, url: &str, message: &str) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(&json!({ "text": message }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::notify(format!("webhook returned {status}")));
        }
        Ok(())
    }
}
