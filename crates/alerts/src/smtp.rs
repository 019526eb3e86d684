//! SMTP implementation of [`EmailSender`].

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use pw_domain::config::AlertsConfig;
use pw_domain::{Error, Result};

use crate::sender::{EmailOutcome, EmailSender};

/// Sends alerts through an SMTP relay with STARTTLS.
///
/// Built once at startup; the transport keeps its connection pool for
/// the life of the process.
#[derive(Debug)]
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    /// Build the sender from config. The SMTP password is read from
    /// the environment variable named in `smtp_password_env`; the
    /// secret itself never appears in the config file.
    pub fn from_config(config: &AlertsConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| Error::Email(format!("SMTP relay setup failed: {e}")))?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            let password = std::env::var(&config.smtp_password_env).map_err(|_| {
                Error::Email(format!(
                    "environment variable '{}' not set or not valid UTF-8",
                    config.smtp_password_env
                ))
            })?;
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                password,
            ));
        }

        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| Error::Email(format!("invalid from_address: {e}")))?;

        tracing::info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            from = %from,
            "SMTP sender ready"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> EmailOutcome {
        let recipient: Mailbox = match to.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => return EmailOutcome::failed(format!("invalid recipient {to:?}: {e}")),
        };

        let message = match Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .body(body.to_owned())
        {
            Ok(message) => message,
            Err(e) => return EmailOutcome::failed(format!("failed to build message: {e}")),
        };

        match self.transport.send(message).await {
            Ok(response) => {
                let detail: String = response.message().collect::<Vec<_>>().join(" ");
                let message_id = if detail.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    detail
                };
                EmailOutcome::sent(message_id)
            }
            Err(e) => EmailOutcome::failed(format!("SMTP send failed: {e}")),
        }
    }
}
