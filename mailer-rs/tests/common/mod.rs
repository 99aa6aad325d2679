//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mailer_rs::mime::{compose, ComposedMessage, RenderedTemplate};
use mailer_rs::smtp::{DeliveryClient, RetryPolicy};
use mailer_rs::{MailError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Delivery client that fails according to a script and records every call
///
/// `dial` pops from `dial_failures`; `send_once` pops from `send_failures`.
/// An empty script means success. `hang` makes `dial` sleep past any
/// reasonable deadline; `close_hang` does the same for `close`.
#[derive(Default)]
pub struct ScriptedClient {
    dial_failures: Mutex<VecDeque<MailError>>,
    send_failures: Mutex<VecDeque<MailError>>,
    hang: Option<Duration>,
    close_hang: Option<Duration>,
    pub dials: AtomicU32,
    pub sends: AtomicU32,
    pub closes: AtomicU32,
    pub send_times: Mutex<Vec<Instant>>,
    pub delivered: Mutex<Vec<ComposedMessage>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_dial_with(self, errors: impl IntoIterator<Item = MailError>) -> Self {
        self.dial_failures.lock().unwrap().extend(errors);
        self
    }

    pub fn fail_send_with(self, errors: impl IntoIterator<Item = MailError>) -> Self {
        self.send_failures.lock().unwrap().extend(errors);
        self
    }

    pub fn hang_for(mut self, duration: Duration) -> Self {
        self.hang = Some(duration);
        self
    }

    pub fn hang_on_close(mut self, duration: Duration) -> Self {
        self.close_hang = Some(duration);
        self
    }

    pub fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryClient for ScriptedClient {
    type Session = ();

    async fn dial(&self) -> Result<()> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        if let Some(duration) = self.hang {
            tokio::time::sleep(duration).await;
        }

        match self.dial_failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_once(&self, _: &mut (), message: &ComposedMessage) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.send_times.lock().unwrap().push(Instant::now());

        match self.send_failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => {
                self.delivered.lock().unwrap().push(message.clone());
                Ok(())
            }
        }
    }

    async fn close(&self, _: ()) {
        self.closes.fetch_add(1, Ordering::SeqCst);

        if let Some(duration) = self.close_hang {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Delivery client whose failure script is chosen per recipient
#[derive(Default)]
pub struct PerRecipientClient {
    failures_left: Mutex<HashMap<String, u32>>,
    pub attempts: Mutex<HashMap<String, u32>>,
}

impl PerRecipientClient {
    pub fn new(failures: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self {
            failures_left: Mutex::new(failures.into_iter().collect()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn attempts_for(&self, recipient: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(recipient)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryClient for PerRecipientClient {
    type Session = ();

    async fn dial(&self) -> Result<()> {
        Ok(())
    }

    async fn send_once(&self, _: &mut (), message: &ComposedMessage) -> Result<()> {
        let recipient = message.to.email.clone();
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(recipient.clone())
            .or_insert(0) += 1;

        // Yield so concurrent sends interleave
        tokio::task::yield_now().await;

        let mut failures = self.failures_left.lock().unwrap();
        match failures.get_mut(&recipient) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(MailError::Transport {
                    code: Some(451),
                    message: format!("try again later ({})", recipient),
                })
            }
            _ => Ok(()),
        }
    }
}

pub fn test_message(recipient: &str) -> ComposedMessage {
    compose(
        &"Greenlight <no-reply@greenlight.example.com>".parse().unwrap(),
        &recipient.parse().unwrap(),
        RenderedTemplate {
            subject: "Welcome to Greenlight, Alice!".to_string(),
            plain_body: "Hi Alice,\n\nYour user ID number is 42.".to_string(),
            html_body: "<p>Hi Alice,</p><p>Your user ID number is 42.</p>".to_string(),
        },
    )
    .unwrap()
}

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_millis(10),
        attempt_timeout: Duration::from_secs(5),
    }
}

pub fn transient(code: u16, message: &str) -> MailError {
    MailError::Transport {
        code: Some(code),
        message: message.to_string(),
    }
}
