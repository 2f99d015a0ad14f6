use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::Config;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mailbox address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp transport error: {0}")]
    Transport(String),
}

/// Something that can put a finished message on the wire.
/// One call is one all-or-nothing delivery attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), MailError>;
}

/// How the SMTP session is encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// TLS from the first byte (SMTPS, port 465)
    ImplicitTls,
    /// Plain connect upgraded with STARTTLS (submission, port 587)
    StartTls,
}

impl SmtpSecurity {
    pub fn for_port(port: u16) -> Self {
        match port {
            587 => SmtpSecurity::StartTls,
            _ => SmtpSecurity::ImplicitTls,
        }
    }
}

/// Authenticated, encrypted SMTP
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn new(config: &Config) -> Result<Self, MailError> {
        let builder = match SmtpSecurity::for_port(config.smtp_port) {
            SmtpSecurity::ImplicitTls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host),
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            }
        };

        let transport = builder
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(&self, message: &Message) -> Result<(), MailError> {
        self.transport
            .send(message.clone())
            .await
            .map(|_| ())
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

/// Outcome of a successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub attempts: u32,
}

/// Builds multipart digests and sends them with a single delayed retry
pub struct Mailer<'a> {
    transport: &'a dyn MailTransport,
    from: String,
    retry_delay: Duration,
}

impl<'a> Mailer<'a> {
    pub fn new(transport: &'a dyn MailTransport, from: impl Into<String>, retry_delay: Duration) -> Self {
        Self {
            transport,
            from: from.into(),
            retry_delay,
        }
    }

    /// Plain text and HTML as `multipart/alternative`
    pub fn build_message(
        &self,
        to: &str,
        subject: &str,
        plain_text: &str,
        html: &str,
    ) -> Result<Message, MailError> {
        let from: Mailbox = self.from.parse()?;
        let to: Mailbox = to.parse()?;

        Ok(Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                plain_text.to_string(),
                html.to_string(),
            ))?)
    }

    /// Send the digest. A transport failure is retried once after the retry
    /// delay; a second failure is returned to the caller.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        plain_text: &str,
        html: &str,
    ) -> Result<Delivery, MailError> {
        let message = self.build_message(to, subject, plain_text, html)?;

        match self.transport.deliver(&message).await {
            Ok(()) => {
                info!("Sent '{}' to {}", subject, to);
                return Ok(Delivery { attempts: 1 });
            }
            Err(e) => {
                error!("Failed to send '{}' to {}: {}", subject, to, e);
                warn!("Retrying in {}s", self.retry_delay.as_secs());
            }
        }

        tokio::time::sleep(self.retry_delay).await;

        match self.transport.deliver(&message).await {
            Ok(()) => {
                info!("Sent '{}' to {} on retry", subject, to);
                Ok(Delivery { attempts: 2 })
            }
            Err(e) => {
                error!("Retry failed for '{}' to {}: {}", subject, to, e);
                Err(e)
            }
        }
    }
}
