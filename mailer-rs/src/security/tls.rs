//! TLS for outgoing SMTP connections
//!
//! Builds the rustls client configuration used for implicit TLS (port 465)
//! and for STARTTLS upgrades.
//!
//! # Trust
//! - Platform root store (via `rustls-native-certs`)
//! - Optional extra PEM bundle for private relays
//! - TLS 1.2+ only (rustls safe defaults)

use crate::error::{MailError, Result};
use rustls::{ClientConfig, RootCertStore, ServerName};
use rustls_pemfile::certs;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// TLS configuration for relay connections
#[derive(Clone)]
pub struct TlsConfig {
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a client config trusting the system roots and, when given,
    /// every certificate in `ca_cert_path`.
    ///
    /// # Examples
    /// ```no_run
    /// use mailer_rs::security::TlsConfig;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let tls = TlsConfig::client(Some("/etc/mail/relay-ca.pem".as_ref()))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn client(ca_cert_path: Option<&Path>) -> Result<Self> {
        let mut roots = RootCertStore::empty();

        match rustls_native_certs::load_native_certs() {
            Ok(native) => {
                let der: Vec<Vec<u8>> = native.into_iter().map(|c| c.0).collect();
                let (added, ignored) = roots.add_parsable_certificates(&der);
                debug!("Loaded {} system root(s), ignored {}", added, ignored);
            }
            Err(e) => warn!("Failed to load system root certificates: {}", e),
        }

        if let Some(path) = ca_cert_path {
            info!("Loading relay CA certificates from {:?}", path);
            let added = Self::add_pem_file(&mut roots, path)?;
            debug!("Loaded {} certificate(s) from {:?}", added, path);
        }

        if roots.is_empty() {
            return Err(MailError::Tls(
                "No trusted root certificates available".to_string(),
            ));
        }

        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    fn add_pem_file(roots: &mut RootCertStore, path: &Path) -> Result<usize> {
        let file = File::open(path).map_err(|e| {
            MailError::Tls(format!("Failed to open CA file {:?}: {}", path, e))
        })?;
        let mut reader = BufReader::new(file);

        let der = certs(&mut reader)
            .map_err(|e| MailError::Tls(format!("Failed to read certificates: {}", e)))?;

        if der.is_empty() {
            return Err(MailError::Tls(format!(
                "No certificates found in {:?}",
                path
            )));
        }

        for cert in &der {
            roots
                .add(&rustls::Certificate(cert.clone()))
                .map_err(|e| MailError::Tls(format!("Invalid CA certificate: {}", e)))?;
        }

        Ok(der.len())
    }

    /// Create a connector for implicit TLS or a STARTTLS upgrade
    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config.clone())
    }
}

/// Parse the relay host into the name checked against its certificate
pub fn server_name(host: &str) -> Result<ServerName> {
    ServerName::try_from(host)
        .map_err(|_| MailError::Tls(format!("Invalid TLS server name: {}", host)))
}
