//! SMTP client for submitting outgoing emails to the configured relay
//!
//! # Features
//! - Implicit TLS (port 465), STARTTLS (RFC 3207) or plaintext
//! - AUTH PLAIN (RFC 4616)
//! - Multi-line reply parsing
//! - Dot-stuffing of the message data
//!
//! One call to [`DeliveryClient::send_once`] is one mail transaction. The
//! client never retries; see [`crate::smtp::retry`].

use crate::config::{SmtpConfig, TlsMode};
use crate::error::{MailError, Result};
use crate::mime::ComposedMessage;
use crate::security::tls::{server_name, TlsConfig};
use crate::smtp::reply::{parse_reply_line, SmtpReply};
use async_trait::async_trait;
use base64::Engine;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info};

/// How long to wait for the reply to QUIT once the message is accepted
pub const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Hands a composed message to a remote mail-submission endpoint
#[async_trait]
pub trait DeliveryClient: Send + Sync + 'static {
    /// An open, authenticated connection
    type Session: Send;

    /// Connect and authenticate
    ///
    /// # Errors
    /// - `AuthenticationFailed` if the relay rejects the credentials
    /// - `Connect`, `Tls`, `Io` or `Transport` for network and session failures
    async fn dial(&self) -> Result<Self::Session>;

    /// Submit one message over an open session, with exactly one mail
    /// transaction
    async fn send_once(&self, session: &mut Self::Session, message: &ComposedMessage)
        -> Result<()>;

    /// End a session after a successful transaction
    ///
    /// The message is already accepted at this point, so this never fails.
    async fn close(&self, session: Self::Session) {
        drop(session);
    }
}

#[async_trait]
impl<C: DeliveryClient> DeliveryClient for Arc<C> {
    type Session = C::Session;

    async fn dial(&self) -> Result<Self::Session> {
        (**self).dial().await
    }

    async fn send_once(&self, session: &mut Self::Session, message: &ComposedMessage)
        -> Result<()> {
        (**self).send_once(session, message).await
    }

    async fn close(&self, session: Self::Session) {
        (**self).close(session).await
    }
}

/// Username/password pair for AUTH PLAIN
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Initial response for `AUTH PLAIN`: base64 of `\0user\0pass`
    fn plain_token(&self) -> String {
        base64::engine::general_purpose::STANDARD
            .encode(format!("\0{}\0{}", self.username, self.password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

trait SmtpStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SmtpStream for T {}

/// Open connection to the relay, authenticated when credentials are set
pub struct SmtpSession {
    stream: BufReader<Box<dyn SmtpStream>>,
    capabilities: SmtpReply,
}

impl SmtpSession {
    fn new<S: AsyncRead + AsyncWrite + Unpin + Send + 'static>(stream: S) -> Self {
        Self {
            stream: BufReader::new(Box::new(stream)),
            capabilities: SmtpReply {
                code: 0,
                lines: Vec::new(),
            },
        }
    }

    /// Extensions advertised in the last EHLO reply
    pub fn supports(&self, keyword: &str) -> bool {
        self.capabilities.has_extension(keyword)
    }

    async fn read_reply(&mut self) -> Result<SmtpReply> {
        let mut lines = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let n = self.stream.read_line(&mut line).await?;
            if n == 0 {
                return Err(MailError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Connection closed by server",
                )));
            }
            debug!("< {}", line.trim_end());

            let parsed = parse_reply_line(&line)?;
            if let Some(code) = lines.first().map(|(code, _)| *code) {
                if code != parsed.code {
                    return Err(MailError::Transport {
                        code: None,
                        message: format!(
                            "Inconsistent reply codes {} and {}",
                            code, parsed.code
                        ),
                    });
                }
            }
            lines.push((parsed.code, parsed.text.to_string()));

            if !parsed.more {
                break;
            }
        }

        Ok(SmtpReply {
            code: lines[0].0,
            lines: lines.into_iter().map(|(_, text)| text).collect(),
        })
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        debug!("> {}", line);
        self.write_raw(line).await
    }

    async fn write_raw(&mut self, line: &str) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Send a command and require one of the `expected` reply codes
    async fn command(&mut self, line: &str, expected: &[u16]) -> Result<SmtpReply> {
        self.write_line(line).await?;
        self.expect(expected).await
    }

    async fn expect(&mut self, expected: &[u16]) -> Result<SmtpReply> {
        let reply = self.read_reply().await?;

        if !expected.contains(&reply.code) {
            error!("Unexpected response: {} {}", reply.code, reply.message());
            return Err(reply.into_error());
        }

        Ok(reply)
    }

    async fn ehlo(&mut self, helo_name: &str) -> Result<()> {
        self.capabilities = self.command(&format!("EHLO {}", helo_name), &[250]).await?;
        Ok(())
    }

    async fn auth_plain(&mut self, credentials: &Credentials) -> Result<()> {
        debug!("> AUTH PLAIN <redacted>");
        self.write_raw(&format!("AUTH PLAIN {}", credentials.plain_token()))
            .await?;

        let reply = self.read_reply().await?;
        match reply.code {
            235 => Ok(()),
            _ if reply.is_permanent_negative() => {
                error!("Relay rejected credentials: {} {}", reply.code, reply.message());
                Err(MailError::AuthenticationFailed(format!(
                    "{} {}",
                    reply.code,
                    reply.message()
                )))
            }
            _ => Err(reply.into_error()),
        }
    }

    async fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(&dot_stuff(data)).await?;
        stream.write_all(b".\r\n").await?;
        stream.flush().await?;
        Ok(())
    }

    async fn upgrade(self, connector: &TlsConnector, host: &str) -> Result<Self> {
        let name = server_name(host)?;
        let inner = self.stream.into_inner();
        let tls = connector
            .connect(name, inner)
            .await
            .map_err(|e| MailError::Tls(format!("TLS handshake with {} failed: {}", host, e)))?;

        Ok(Self::new(tls))
    }
}

/// Escape lines starting with `.` and normalize line endings to CRLF,
/// so the result always ends with CRLF and never contains the terminator.
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64 + 2);
    let mut at_line_start = true;
    let mut prev = 0u8;

    for &b in data {
        match b {
            b'\n' => {
                if prev != b'\r' {
                    out.push(b'\r');
                }
                out.push(b'\n');
                at_line_start = true;
            }
            b'\r' => {
                out.push(b'\r');
                at_line_start = false;
            }
            _ => {
                if prev == b'\r' {
                    // Lone CR becomes a line break
                    out.push(b'\n');
                    at_line_start = true;
                }
                if at_line_start && b == b'.' {
                    out.push(b'.');
                }
                out.push(b);
                at_line_start = false;
            }
        }
        prev = b;
    }

    if prev == b'\r' {
        out.push(b'\n');
    } else if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }

    out
}

/// SMTP client for the single configured relay
///
/// # Examples
/// ```no_run
/// use mailer_rs::config::TlsMode;
/// use mailer_rs::smtp::{DeliveryClient, SmtpClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SmtpClient::new("smtp.example.com", 465, TlsMode::Implicit)?
///     .with_credentials("user", "secret");
/// let session = client.dial().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SmtpClient {
    host: String,
    port: u16,
    tls: TlsMode,
    connector: Option<TlsConnector>,
    credentials: Option<Credentials>,
    helo_name: String,
}

impl SmtpClient {
    /// Create a new SMTP client
    pub fn new(host: impl Into<String>, port: u16, tls: TlsMode) -> Result<Self> {
        Self::build(host.into(), port, tls, None)
    }

    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        let mut client = Self::build(
            config.host.clone(),
            config.port,
            config.tls,
            config.ca_cert_path.as_deref(),
        )?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            client = client.with_credentials(username.clone(), password.clone());
        }

        if let Some(helo_name) = &config.helo_name {
            client = client.with_helo_name(helo_name.clone());
        }

        Ok(client)
    }

    fn build(
        host: String,
        port: u16,
        tls: TlsMode,
        ca_cert_path: Option<&std::path::Path>,
    ) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(MailError::Config("SMTP host is empty".to_string()));
        }

        let connector = match tls {
            TlsMode::None => None,
            TlsMode::Implicit | TlsMode::StartTls => {
                // Validate the name once so a typo fails at startup
                server_name(&host)?;
                Some(TlsConfig::client(ca_cert_path)?.connector())
            }
        };

        Ok(Self {
            host,
            port,
            tls,
            connector,
            credentials: None,
            helo_name: local_hostname(),
        })
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = helo_name.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn tls_connector(&self) -> Result<&TlsConnector> {
        self.connector
            .as_ref()
            .ok_or_else(|| MailError::Tls("TLS connector not configured".to_string()))
    }
}

#[async_trait]
impl DeliveryClient for SmtpClient {
    type Session = SmtpSession;

    async fn dial(&self) -> Result<SmtpSession> {
        debug!("Connecting to {}:{} ({:?})", self.host, self.port, self.tls);

        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| MailError::Connect(format!("{}:{}: {}", self.host, self.port, e)))?;

        let mut session = SmtpSession::new(tcp);
        if self.tls == TlsMode::Implicit {
            session = session.upgrade(self.tls_connector()?, &self.host).await?;
        }

        // Read greeting
        session.expect(&[220]).await?;
        session.ehlo(&self.helo_name).await?;

        if self.tls == TlsMode::StartTls {
            if !session.supports("STARTTLS") {
                return Err(MailError::Tls(format!(
                    "{} does not advertise STARTTLS",
                    self.host
                )));
            }
            session.command("STARTTLS", &[220]).await?;
            session = session.upgrade(self.tls_connector()?, &self.host).await?;
            session.ehlo(&self.helo_name).await?;
        }

        if let Some(credentials) = &self.credentials {
            session.auth_plain(credentials).await?;
            debug!("Authenticated as {}", credentials.username);
        }

        Ok(session)
    }

    async fn send_once(&self, session: &mut SmtpSession, message: &ComposedMessage) -> Result<()> {
        info!(
            "Sending {} from {} to {} via {}:{}",
            message.message_id, message.from.email, message.to.email, self.host, self.port
        );

        session
            .command(&format!("MAIL FROM:<{}>", message.from.email), &[250])
            .await?;
        session
            .command(&format!("RCPT TO:<{}>", message.to.email), &[250, 251])
            .await?;
        session.command("DATA", &[354]).await?;

        session.write_data(&message.formatted).await?;
        let accepted = session.expect(&[250]).await?;

        info!("Relay accepted {}: {}", message.message_id, accepted.message());
        Ok(())
    }

    async fn close(&self, mut session: SmtpSession) {
        match timeout(QUIT_TIMEOUT, session.command("QUIT", &[221])).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("QUIT failed after delivery: {}", e),
            Err(_) => debug!("No reply to QUIT within {:?}", QUIT_TIMEOUT),
        }
    }
}

/// Get local hostname
fn local_hostname() -> String {
    let name = gethostname::gethostname().to_string_lossy().to_string();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SmtpClient::new("mail.example.com", 2525, TlsMode::None).unwrap();
        assert_eq!(client.host(), "mail.example.com");
        assert_eq!(client.port(), 2525);
        assert!(client.connector.is_none());
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(matches!(
            SmtpClient::new("  ", 25, TlsMode::None),
            Err(MailError::Config(_))
        ));
    }

    #[test]
    fn test_plain_token() {
        let credentials = Credentials::new("user", "pass");
        // base64("\0user\0pass")
        assert_eq!(credentials.plain_token(), "AHVzZXIAcGFzcw==");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("user", "hunter2");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_dot_stuff_leading_dots() {
        let out = dot_stuff(b"Hello\r\n.hidden\r\n..two\r\nend");
        assert_eq!(out, b"Hello\r\n..hidden\r\n...two\r\nend\r\n".to_vec());
    }

    #[test]
    fn test_dot_stuff_first_line_and_bare_lf() {
        let out = dot_stuff(b".start\nnext\n");
        assert_eq!(out, b"..start\r\nnext\r\n".to_vec());
    }

    #[test]
    fn test_dot_stuff_lone_terminator_is_escaped() {
        let out = dot_stuff(b"body\r\n.\r\nmore");
        assert_eq!(out, b"body\r\n..\r\nmore\r\n".to_vec());
    }

    #[test]
    fn test_dot_stuff_lone_cr() {
        let out = dot_stuff(b"a\rb\r");
        assert_eq!(out, b"a\r\nb\r\n".to_vec());
    }
}
