use crate::error::{MailError, Result};
use crate::smtp::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Envelope and header sender, e.g. `Greenlight <no-reply@example.com>`
    pub sender: String,
    #[serde(default)]
    pub tls: TlsMode,
    /// Extra PEM bundle trusted in addition to the system roots
    pub ca_cert_path: Option<PathBuf>,
    /// Name announced in EHLO (defaults to the local hostname)
    pub helo_name: Option<String>,
}

/// How the relay connection is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// TLS from the first byte (port 465)
    #[default]
    Implicit,
    /// Plaintext greeting upgraded with STARTTLS (port 587)
    StartTls,
    /// No encryption; local relays and tests only
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 500,
            attempt_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplatesConfig {
    /// Directory of `*.toml` bundles; the built-in bundles are used when unset
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MailError::Config(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MailError::Config(e.to_string()))
    }

    /// Layer the defaults, an optional TOML file and `MAILER__SECTION__KEY`
    /// environment variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Self::default())
            .map_err(|e| MailError::Config(e.to_string()))?;

        let mut builder = ::config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix("MAILER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MailError::Config(e.to_string()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            delay: Duration::from_millis(self.retry.delay_ms),
            attempt_timeout: Duration::from_secs(self.retry.attempt_timeout_secs),
        }
    }

    pub fn default() -> Self {
        Self {
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 465,
                username: None,
                password: None,
                sender: "Greenlight <no-reply@greenlight.localhost.localdomain>".to_string(),
                tls: TlsMode::Implicit,
                ca_cert_path: None,
                helo_name: None,
            },
            retry: RetryConfig::default(),
            templates: TemplatesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
