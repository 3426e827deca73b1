//! Outbound email
//!
//! A small trait seam over lettre so tests can capture messages
//! instead of talking to a relay.

use axum::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MagicLinkConfig;
use crate::error::AppError;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a magic sign-in link to `to`.
    async fn send_magic_link(&self, to: &str, link: &str) -> Result<(), AppError>;
}

/// Production mailer backed by an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MagicLinkConfig) -> Result<Self, AppError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| AppError::Config(format!("Invalid SMTP relay: {}", e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ))
            .build();

        let from = config
            .from_address
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid from address: {}", e)))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_magic_link(&self, to: &str, link: &str) -> Result<(), AppError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid email address: {}", e)))?;

        let body = format!(
            "<p>Click the link below to sign in to Dox:</p>\
             <p><a href=\"{link}\">Sign in to Dox</a></p>\
             <p>This link expires in 10 minutes and can be used once.</p>\
             <p>If you did not request this, you can safely ignore this email.</p>"
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Your Dox sign-in link")
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| AppError::Delivery(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        Ok(())
    }
}
