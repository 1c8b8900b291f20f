//! Outgoing email over SMTP
//!
//! Delivery is best-effort: callers log failures and carry on. With
//! `email.enabled = false` nothing is sent and the attempt is only logged.

use anyhow::{anyhow, Result};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use argon2::password_hash::rand_core::{OsRng, RngCore};

use crate::config::EmailConfig;

/// Minutes a password reset code stays valid
pub const RESET_CODE_MINUTES: i64 = 15;

/// Email service for sending emails
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.smtp_host.trim().is_empty()
    }

    /// Send a password reset code
    pub async fn send_reset_code(&self, to_email: &str, code: &str) -> Result<()> {
        let subject = format!("[{}] Password reset code", self.config.from_name);
        let body = format!(
            "Hello!\n\nYour PrepPAL password reset code is: {}\n\n\
             The code expires in {} minutes. If you did not ask for a reset, you can ignore this email.\n\n\
             Stay safe,\nThe {} team",
            code, RESET_CODE_MINUTES, self.config.from_name
        );
        self.send(to_email, &subject, body).await
    }

    async fn send(&self, to_email: &str, subject: &str, body: String) -> Result<()> {
        if !self.is_enabled() {
            tracing::info!(to = %to_email, subject, "Email delivery disabled, message not sent");
            return Ok(());
        }

        let from = format!("{} <{}>", self.config.from_name, self.config.from_address);
        let email = Message::builder()
            .from(from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(to_email.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(self.config.smtp_port);
        if !self.config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.smtp_username.clone(),
                self.config.smtp_password.clone(),
            ));
        }
        let mailer = builder.build();

        mailer
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::info!(to = %to_email, subject, "Email sent");
        Ok(())
    }
}

/// Generate a random 6-digit code, zero padded
pub fn generate_reset_code() -> String {
    format!("{:06}", OsRng.next_u32() % 1_000_000)
}
