//! SMTP submission to the configured relay
//!
//! - [`client`]: the [`DeliveryClient`] seam and the SMTP implementation
//! - [`reply`]: server reply parsing
//! - [`retry`]: bounded retry with a fixed delay

pub mod client;
pub mod reply;
pub mod retry;

pub use client::{Credentials, DeliveryClient, SmtpClient, SmtpSession};
pub use reply::SmtpReply;
pub use retry::{DeliveryOutcome, RetryController, RetryPolicy};
