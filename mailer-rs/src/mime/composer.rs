use crate::error::{MailError, Result};
use crate::mime::types::{ComposedMessage, RenderedTemplate};
use crate::utils::Mailbox;
use mail_builder::headers::address::Address;
use mail_builder::MessageBuilder;
use uuid::Uuid;

/// Assemble a multipart/alternative message (plain text first, HTML second)
///
/// The subject is collapsed to a single line before use, so rendered payload
/// content cannot add header lines.
pub fn compose(
    sender: &Mailbox,
    recipient: &Mailbox,
    rendered: RenderedTemplate,
) -> Result<ComposedMessage> {
    let subject = sanitize_header(&rendered.subject);
    let message_id = format!("{}@{}", Uuid::new_v4().simple(), sender.domain());

    let formatted = MessageBuilder::new()
        .from(address(sender))
        .to(address(recipient))
        .subject(subject.as_str())
        .message_id(message_id.as_str())
        .text_body(rendered.plain_body.as_str())
        .html_body(rendered.html_body.as_str())
        .write_to_vec()
        .map_err(|e| MailError::Build(e.to_string()))?;

    Ok(ComposedMessage {
        message_id,
        from: sender.clone(),
        to: recipient.clone(),
        subject,
        plain_body: rendered.plain_body,
        html_body: rendered.html_body,
        formatted,
    })
}

fn address(mailbox: &Mailbox) -> Address<'_> {
    Address::new_address(mailbox.name.as_deref(), mailbox.email.as_str())
}

/// Collapse line breaks and other control characters into single spaces
pub fn sanitize_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;

    for c in value.chars() {
        if c.is_control() || c == '\u{2028}' || c == '\u{2029}' {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with(' ') && c != ' ' {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(subject: &str) -> RenderedTemplate {
        RenderedTemplate {
            subject: subject.to_string(),
            plain_body: "Hi Alice,\n\nYour ID is 42.".to_string(),
            html_body: "<p>Hi Alice,</p><p>Your ID is 42.</p>".to_string(),
        }
    }

    fn mailboxes() -> (Mailbox, Mailbox) {
        (
            "Greenlight <no-reply@greenlight.example.com>".parse().unwrap(),
            "alice@example.com".parse().unwrap(),
        )
    }

    #[test]
    fn test_sanitize_header() {
        assert_eq!(sanitize_header("Welcome!"), "Welcome!");
        assert_eq!(sanitize_header("Welcome\r\nBcc: evil@example.com"), "Welcome Bcc: evil@example.com");
        assert_eq!(sanitize_header("\n  Welcome \n"), "Welcome");
        assert_eq!(sanitize_header("a\r\n\r\nb"), "a b");
        assert_eq!(sanitize_header("a \nb"), "a b");
        assert_eq!(sanitize_header("tab\there"), "tab here");
    }

    #[test]
    fn test_compose_fields() {
        let (sender, recipient) = mailboxes();
        let message = compose(&sender, &recipient, rendered("Welcome to Greenlight!")).unwrap();

        assert_eq!(message.from, sender);
        assert_eq!(message.to, recipient);
        assert_eq!(message.subject, "Welcome to Greenlight!");
        assert!(message.message_id.ends_with("@greenlight.example.com"));
        assert!(message.size() > 0);
    }

    #[test]
    fn test_compose_multipart_alternative() {
        let (sender, recipient) = mailboxes();
        let message = compose(&sender, &recipient, rendered("Welcome")).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted).to_string();

        assert!(raw.contains("multipart/alternative"));
        let text = raw.find("text/plain").expect("text part");
        let html = raw.find("text/html").expect("html part");
        assert!(text < html, "plain text must be the primary alternative");
    }

    #[test]
    fn test_compose_subject_injection() {
        let (sender, recipient) = mailboxes();
        let message = compose(
            &sender,
            &recipient,
            rendered("Welcome\r\nBcc: attacker@evil.example"),
        )
        .unwrap();

        assert!(!message.subject.contains('\n'));
        assert!(!message.subject.contains('\r'));

        let raw = String::from_utf8_lossy(&message.formatted).to_string();
        assert!(!raw.contains("\r\nBcc:"));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let (sender, recipient) = mailboxes();
        let a = compose(&sender, &recipient, rendered("a")).unwrap();
        let b = compose(&sender, &recipient, rendered("a")).unwrap();
        assert_ne!(a.message_id, b.message_id);
    }
}
