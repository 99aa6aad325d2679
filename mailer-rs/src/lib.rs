//! mailer-rs: transactional email over SMTP
//!
//! Renders a named template bundle against a payload, builds a
//! multipart/alternative message and submits it to a single SMTP relay,
//! retrying transport failures a bounded number of times.
//!
//! # Features
//!
//! - **Templates**: subject, plain-text and HTML sections per bundle, strict
//!   about missing fields, HTML auto-escaped
//! - **SMTP**: implicit TLS, STARTTLS or plaintext; AUTH PLAIN
//! - **Retry**: 3 attempts, 500 ms apart, each under a deadline
//! - **Concurrency**: a [`Mailer`] is cheap to clone and safe to share across tasks
//!
//! # Example
//!
//! ```no_run
//! use mailer_rs::{Config, Mailer};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Some("mailer.toml".as_ref()))?;
//!     let mailer = Mailer::from_config(&config)?;
//!
//!     mailer
//!         .send(
//!             "alice@example.com",
//!             "token_activation",
//!             &json!({"activation_token": "Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"}),
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`mailer`]: The send pipeline
//! - [`mime`]: Message composition
//! - [`smtp`]: SMTP client and retry
//! - [`security`]: TLS client setup
//! - [`templates`]: Template bundles
//! - [`utils`]: Address validation

pub mod config;
pub mod error;
pub mod mailer;
pub mod mime;
pub mod security;
pub mod smtp;
pub mod templates;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{MailError, Result};
pub use mailer::{Mailer, SendRequest};
