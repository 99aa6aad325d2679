use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Failed to render template {template}: {message}")]
    TemplateRender { template: String, message: String },

    #[error("Failed to load templates: {0}")]
    TemplateLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("SMTP transport error: {}", format_reply(.code, .message))]
    Transport { code: Option<u16>, message: String },

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Delivery failed after {attempts} attempt(s): {last_error}")]
    DeliveryFailed {
        attempts: u32,
        last_error: Box<MailError>,
    },
}

impl MailError {
    /// Whether the failure belongs to the network/session step and may clear
    /// up on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MailError::Io(_)
                | MailError::Connect(_)
                | MailError::Tls(_)
                | MailError::Transport { .. }
                | MailError::Timeout(_)
        )
    }

    /// SMTP reply code attached to a transport error, if any
    pub fn smtp_code(&self) -> Option<u16> {
        match self {
            MailError::Transport { code, .. } => *code,
            MailError::DeliveryFailed { last_error, .. } => last_error.smtp_code(),
            _ => None,
        }
    }
}

fn format_reply(code: &Option<u16>, message: &str) -> String {
    match code {
        Some(code) => format!("{} {}", code, message),
        None => message.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, MailError>;
