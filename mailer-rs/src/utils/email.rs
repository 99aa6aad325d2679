use crate::error::{MailError, Result};
use std::fmt;
use std::str::FromStr;

/// Basic email validation
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(MailError::InvalidEmail("Email is empty".to_string()));
    }

    if email.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(MailError::InvalidEmail(format!(
            "Email contains whitespace or control characters: {:?}",
            email
        )));
    }

    if email.contains(['<', '>', '"', ',']) {
        return Err(MailError::InvalidEmail(format!(
            "Email contains reserved characters: {}",
            email
        )));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(MailError::InvalidEmail(format!(
            "Invalid email format: {}",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(MailError::InvalidEmail(
            "Email parts cannot be empty".to_string(),
        ));
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(MailError::InvalidEmail(format!(
            "Invalid domain: {}",
            domain
        )));
    }

    Ok(())
}

/// An address with an optional display name, e.g. `Greenlight <no-reply@example.com>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub email: String,
}

impl Mailbox {
    pub fn new(name: Option<String>, email: impl Into<String>) -> Result<Self> {
        let email = email.into();
        validate_email(&email)?;

        if let Some(name) = &name {
            if name.chars().any(|c| c.is_control()) {
                return Err(MailError::InvalidEmail(format!(
                    "Display name contains control characters: {:?}",
                    name
                )));
            }
        }

        Ok(Self { name, email })
    }

    /// Domain part of the address
    pub fn domain(&self) -> &str {
        self.email.rsplit('@').next().unwrap_or_default()
    }
}

impl FromStr for Mailbox {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains(['\r', '\n']) {
            return Err(MailError::InvalidEmail(
                "Address contains a line break".to_string(),
            ));
        }

        let s = s.trim();

        match (s.rfind('<'), s.ends_with('>')) {
            (Some(open), true) => {
                let email = s[open + 1..s.len() - 1].trim();
                let name = s[..open].trim().trim_matches('"').trim();
                let name = (!name.is_empty()).then(|| name.to_string());
                Mailbox::new(name, email)
            }
            (None, false) => Mailbox::new(None, s),
            _ => Err(MailError::InvalidEmail(format!(
                "Unbalanced angle brackets: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => f.write_str(&self.email),
        }
    }
}
