//! Password reset mail over SMTP (lettre).
//!
//! The sender mailbox is parsed once at startup, so a bad `SMTP_FROM` fails
//! the boot rather than every send.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

const RESET_SUBJECT: &str = "Reset your Customer Manager password";

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, MailError> {
    let address = address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))?;
    Ok(Mailbox::new(name.map(str::to_string), address))
}

/// A password reset notice for one recipient.
struct ResetMail<'a> {
    name: &'a str,
    url: &'a str,
}

impl ResetMail<'_> {
    fn text(&self) -> String {
        format!(
            "Hi {},\n\n\
             Someone asked to reset the password for your Customer Manager account.\n\
             Open this link within one hour to choose a new password:\n\n\
             {}\n\n\
             If this wasn't you, ignore this email; your password stays the same.\n",
            self.name, self.url
        )
    }

    fn html(&self) -> String {
        let name = escape_html(self.name);
        let url = escape_html(self.url);
        format!(
            "<p>Hi {name},</p>\
             <p>Someone asked to reset the password for your Customer Manager account. \
             Open this link within one hour to choose a new password:</p>\
             <p><a href=\"{url}\">{url}</a></p>\
             <p>If this wasn't you, ignore this email; your password stays the same.</p>"
        )
    }

    fn message(&self, from: Mailbox, to: Mailbox) -> Result<Message, MailError> {
        Ok(Message::builder()
            .from(from)
            .to(to)
            .subject(RESET_SUBJECT)
            .multipart(MultiPart::alternative_plain_html(self.text(), self.html()))?)
    }
}

/// Sends password reset links.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Build the SMTP transport (STARTTLS relay).
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be configured or the sender
    /// address does not parse.
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from: mailbox(Some("Customer Manager"), &config.from_address)?,
        })
    }

    /// Mail a reset link to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be built or delivered.
    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        reset_url: &str,
    ) -> Result<(), MailError> {
        let mail = ResetMail {
            name,
            url: reset_url,
        };
        let message = mail.message(self.from.clone(), mailbox(Some(name), to)?)?;
        self.mailer.send(message).await?;
        tracing::info!("Password reset email sent");
        Ok(())
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
