//! Outbound email.
//!
//! Handlers render an [`EmailTemplate`] into an [`Email`] and hand it to a
//! [`Mailer`]. The SMTP adapter lives in [`smtp`]; [`RecordingMailer`] keeps
//! messages in memory for development and tests.

mod smtp;

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

pub use smtp::{SmtpConfig, SmtpMailer};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A rendered plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// The messages the application sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    /// Sent after signup; `url` points at the account page.
    Welcome { name: String, url: String },

    /// Carries the plain reset token inside `url`.
    PasswordReset { url: String },
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::Welcome { .. } => "Welcome to the Tourbook family!",
            EmailTemplate::PasswordReset { .. } => "Your password reset token (valid for only 10 minutes)",
        }
    }

    pub fn render(&self, to: impl Into<String>) -> Email {
        let text = match self {
            EmailTemplate::Welcome { name, url } => {
                let first = name.split_whitespace().next().unwrap_or(name);
                format!(
                    "Hi {first},\n\n\
                    Welcome to Tourbook, we're glad to have you!\n\n\
                    Upload a photo and complete your profile here: {url}\n"
                )
            }
            EmailTemplate::PasswordReset { url } => format!(
                "Forgot your password? Submit a PATCH request with your new password and passwordConfirm to: {url}\n\
                If you didn't forget your password, please ignore this email!\n"
            ),
        };
        Email {
            to: to.into(),
            subject: self.subject().to_string(),
            text,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Keeps every message in memory instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: RwLock<Vec<Email>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.read().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<Email> {
        self.sent().into_iter().rev().find(|email| email.to == to)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("recording mailer set to fail".to_string()));
        }
        tracing::info!(to = %email.to, subject = %email.subject, "recorded email");
        self.sent
            .write()
            .map_err(|_| MailError::Transport("mailbox lock poisoned".to_string()))?
            .push(email);
        Ok(())
    }
}
