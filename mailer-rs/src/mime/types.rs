use crate::utils::Mailbox;

/// The three sections of a rendered template bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

/// A fully rendered message, serialized once and re-sent as-is on every
/// delivery attempt
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    /// Message-ID without angle brackets
    pub message_id: String,
    pub from: Mailbox,
    pub to: Mailbox,
    /// Single-line subject
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
    /// RFC 5322 message (headers + multipart/alternative body), CRLF line endings
    pub formatted: Vec<u8>,
}

impl ComposedMessage {
    /// Size of the serialized message in bytes
    pub fn size(&self) -> usize {
        self.formatted.len()
    }
}
