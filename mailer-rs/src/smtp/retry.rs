//! Bounded retry around single delivery attempts
//!
//! ```text
//! ┌──────┐     ┌────────────┐  ok   ┌───────────┐
//! │ Idle │ ──→ │ Attempting │ ────→ │ Delivered │
//! └──────┘     └────────────┘       └───────────┘
//!                 ↑      │ transient error, attempts left
//!                 └ sleep┘
//!                        │ attempts spent    ┌───────────┐
//!                        └─────────────────→ │ Exhausted │
//!                                            └───────────┘
//! ```
//!
//! Each attempt is `dial` + `send_once` under one deadline. Once the relay
//! accepts the message the attempt is final; the session is closed outside
//! that deadline. Only transport failures (see [`MailError::is_transient`])
//! are retried; anything else is returned at once.

use crate::error::{MailError, Result};
use crate::mime::ComposedMessage;
use crate::smtp::client::DeliveryClient;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Default number of attempts per send
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Default deadline for one dial + send
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (values below 1 count as 1)
    pub max_attempts: u32,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Terminal result of a send
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed(MailError),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            DeliveryOutcome::Delivered { .. } => Ok(()),
            DeliveryOutcome::Failed(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    Idle,
    Attempting(u32),
    Delivered(u32),
    Exhausted(u32),
}

/// Drives one message through up to `max_attempts` delivery attempts
pub struct RetryController<'a, C: DeliveryClient> {
    client: &'a C,
    policy: &'a RetryPolicy,
}

impl<'a, C: DeliveryClient> RetryController<'a, C> {
    pub fn new(client: &'a C, policy: &'a RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn deliver(&self, message: &ComposedMessage) -> DeliveryOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = RetryState::Idle;
        let mut last_error = None;

        loop {
            state = match state {
                RetryState::Idle => RetryState::Attempting(1),
                RetryState::Attempting(attempt) => {
                    debug!(
                        "Delivery attempt {}/{} for {}",
                        attempt, max_attempts, message.message_id
                    );

                    match self.attempt(message).await {
                        Ok(session) => {
                            // Accepted; ending the session can no longer fail the send
                            let closing = self.client.close(session);
                            let _ = timeout(self.policy.attempt_timeout, closing).await;
                            RetryState::Delivered(attempt)
                        }
                        Err(e) if !e.is_transient() => {
                            error!(
                                "Giving up on {} after non-retryable error: {}",
                                message.message_id, e
                            );
                            return DeliveryOutcome::Failed(e);
                        }
                        Err(e) => {
                            warn!(
                                "Attempt {}/{} for {} failed: {}",
                                attempt, max_attempts, message.message_id, e
                            );
                            last_error = Some(e);

                            if attempt < max_attempts {
                                sleep(self.policy.delay).await;
                                RetryState::Attempting(attempt + 1)
                            } else {
                                RetryState::Exhausted(attempt)
                            }
                        }
                    }
                }
                RetryState::Delivered(attempts) => {
                    info!(
                        "Delivered {} to {} after {} attempt(s)",
                        message.message_id, message.to.email, attempts
                    );
                    return DeliveryOutcome::Delivered { attempts };
                }
                RetryState::Exhausted(attempts) => {
                    let last_error = last_error.unwrap_or_else(|| MailError::Transport {
                        code: None,
                        message: "No attempt was made".to_string(),
                    });
                    error!(
                        "Delivery of {} to {} failed after {} attempt(s): {}",
                        message.message_id, message.to.email, attempts, last_error
                    );
                    return DeliveryOutcome::Failed(MailError::DeliveryFailed {
                        attempts,
                        last_error: Box::new(last_error),
                    });
                }
            };
        }
    }

    /// One dial + transaction under the attempt deadline; hands back the
    /// session once the relay has accepted the message
    async fn attempt(&self, message: &ComposedMessage) -> Result<C::Session> {
        let round_trip = async {
            let mut session = self.client.dial().await?;
            self.client.send_once(&mut session, message).await?;
            Ok::<_, MailError>(session)
        };

        match timeout(self.policy.attempt_timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout(self.policy.attempt_timeout)),
        }
    }
}
