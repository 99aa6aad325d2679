//! Transactional mailer: render, compose, deliver with bounded retry

use crate::config::{Config, SmtpConfig, TlsMode};
use crate::error::{MailError, Result};
use crate::mime::{compose, ComposedMessage};
use crate::smtp::{DeliveryClient, DeliveryOutcome, RetryController, RetryPolicy, SmtpClient};
use crate::templates::{TemplateRegistry, TemplateStore};
use crate::utils::Mailbox;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// One notification to send
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub recipient: String,
    pub template_name: String,
    pub payload: serde_json::Value,
}

impl SendRequest {
    pub fn new(
        recipient: impl Into<String>,
        template_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            template_name: template_name.into(),
            payload,
        }
    }
}

struct Inner<C> {
    templates: Arc<dyn TemplateStore>,
    client: C,
    sender: Mailbox,
    policy: RetryPolicy,
}

/// Sends templated emails through a [`DeliveryClient`]
///
/// Cloning is cheap and clones share the same read-only configuration, so a
/// single mailer can serve any number of concurrent sends.
///
/// # Examples
/// ```no_run
/// use mailer_rs::Mailer;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mailer = Mailer::new(
///     "sandbox.smtp.mailtrap.io",
///     465,
///     "username",
///     "password",
///     "Greenlight <no-reply@greenlight.example.com>",
/// )?;
///
/// mailer
///     .send(
///         "alice@example.com",
///         "user_welcome",
///         &json!({"id": 42, "name": "Alice", "activation_token": "Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"}),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Mailer<C: DeliveryClient = SmtpClient> {
    inner: Arc<Inner<C>>,
}

impl<C: DeliveryClient> Clone for Mailer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Mailer<SmtpClient> {
    /// Mailer for an implicit-TLS relay with the built-in templates and the
    /// default retry policy (3 attempts, 500 ms apart)
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        sender: &str,
    ) -> Result<Self> {
        let smtp = SmtpConfig {
            host: host.to_string(),
            port,
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            sender: sender.to_string(),
            tls: TlsMode::Implicit,
            ca_cert_path: None,
            helo_name: None,
        };

        Self::with_client(
            SmtpClient::from_config(&smtp)?,
            Arc::new(TemplateRegistry::embedded()?),
            sender,
            RetryPolicy::default(),
        )
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let templates = TemplateRegistry::from_config(&config.templates)?;

        info!(
            "Mailer configured for {}:{} ({:?}), sender {}",
            config.smtp.host, config.smtp.port, config.smtp.tls, config.smtp.sender
        );

        Self::with_client(
            SmtpClient::from_config(&config.smtp)?,
            Arc::new(templates),
            &config.smtp.sender,
            config.retry_policy(),
        )
    }
}

impl<C: DeliveryClient> Mailer<C> {
    /// Mailer over any delivery client and template store
    pub fn with_client(
        client: C,
        templates: Arc<dyn TemplateStore>,
        sender: &str,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let sender: Mailbox = sender.parse()?;

        Ok(Self {
            inner: Arc::new(Inner {
                templates,
                client,
                sender,
                policy,
            }),
        })
    }

    pub fn sender(&self) -> &Mailbox {
        &self.inner.sender
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    pub fn templates(&self) -> &dyn TemplateStore {
        self.inner.templates.as_ref()
    }

    /// Render `template_name` with `payload` and deliver it to `recipient`
    ///
    /// # Errors
    /// - `InvalidEmail`, `TemplateNotFound`, `TemplateRender`, `Build`:
    ///   returned before any network activity
    /// - `AuthenticationFailed`: the relay rejected the credentials
    /// - `DeliveryFailed`: every attempt failed; carries the last error
    pub async fn send<T>(&self, recipient: &str, template_name: &str, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let payload =
            serde_json::to_value(payload).map_err(|e| MailError::TemplateRender {
                template: template_name.to_string(),
                message: format!("payload is not serializable: {}", e),
            })?;

        self.deliver(&SendRequest::new(recipient, template_name, payload))
            .await
            .into_result()
    }

    /// Like [`Mailer::send`], reporting the number of attempts on success
    pub async fn deliver(&self, request: &SendRequest) -> DeliveryOutcome {
        let message = match self.prepare(request) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Failed to prepare {} for {}: {}",
                    request.template_name, request.recipient, e
                );
                return DeliveryOutcome::Failed(e);
            }
        };

        RetryController::new(&self.inner.client, &self.inner.policy)
            .deliver(&message)
            .await
    }

    /// Validate the recipient, render and compose, without touching the
    /// network
    pub fn prepare(&self, request: &SendRequest) -> Result<ComposedMessage> {
        let recipient: Mailbox = request.recipient.parse()?;

        let rendered = self
            .inner
            .templates
            .render(&request.template_name, &request.payload)?;

        let message = compose(&self.inner.sender, &recipient, rendered)?;
        debug!(
            "Composed {} ({} bytes) from template {}",
            message.message_id,
            message.size(),
            request.template_name
        );

        Ok(message)
    }

    /// Deliver on a background task so the caller does not wait for the relay
    ///
    /// Must be called from within a Tokio runtime. Failures are logged; the
    /// handle still yields the outcome for callers that want it.
    pub fn send_in_background(&self, request: SendRequest) -> JoinHandle<DeliveryOutcome> {
        let mailer = self.clone();

        tokio::spawn(async move {
            let outcome = mailer.deliver(&request).await;
            if let DeliveryOutcome::Failed(e) = &outcome {
                error!(
                    "Background delivery of {} to {} failed: {}",
                    request.template_name, request.recipient, e
                );
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::store::MockTemplateStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts dials and always fails; used to prove no network is touched
    #[derive(Default)]
    struct CountingClient {
        dials: AtomicU32,
    }

    #[async_trait]
    impl DeliveryClient for CountingClient {
        type Session = ();

        async fn dial(&self) -> Result<()> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Err(MailError::Connect("unreachable".into()))
        }

        async fn send_once(&self, _: &mut (), _: &ComposedMessage) -> Result<()> {
            Ok(())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: std::time::Duration::from_millis(1),
            attempt_timeout: std::time::Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_unknown_template_never_dials() {
        let mut store = MockTemplateStore::new();
        store
            .expect_render()
            .returning(|name, _| Err(MailError::TemplateNotFound(name.to_string())));

        let mailer = Mailer::with_client(
            CountingClient::default(),
            Arc::new(store),
            "no-reply@example.com",
            fast_policy(),
        )
        .unwrap();

        let err = mailer
            .send("alice@example.com", "missing", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, MailError::TemplateNotFound(name) if name == "missing"));
        assert_eq!(mailer.inner.client.dials.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_recipient_never_renders() {
        let mut store = MockTemplateStore::new();
        store.expect_render().never();

        let mailer = Mailer::with_client(
            CountingClient::default(),
            Arc::new(store),
            "no-reply@example.com",
            fast_policy(),
        )
        .unwrap();

        let err = mailer
            .send("alice@example.com\r\nBcc: x@evil.com", "user_welcome", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, MailError::InvalidEmail(_)));
        assert_eq!(mailer.inner.client.dials.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_rendering_is_used_for_every_attempt() {
        let mut store = MockTemplateStore::new();
        store.expect_render().times(1).returning(|_, _| {
            Ok(crate::mime::RenderedTemplate {
                subject: "s".into(),
                plain_body: "p".into(),
                html_body: "h".into(),
            })
        });

        let mailer = Mailer::with_client(
            CountingClient::default(),
            Arc::new(store),
            "no-reply@example.com",
            fast_policy(),
        )
        .unwrap();

        let err = mailer
            .send("alice@example.com", "any", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, MailError::DeliveryFailed { attempts: 3, .. }));
        assert_eq!(mailer.inner.client.dials.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let result = Mailer::with_client(
            CountingClient::default(),
            Arc::new(MockTemplateStore::new()),
            "not-an-address",
            fast_policy(),
        );
        assert!(matches!(result, Err(MailError::InvalidEmail(_))));
    }
}
