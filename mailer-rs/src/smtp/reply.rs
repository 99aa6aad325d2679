//! SMTP reply parsing (RFC 5321 §4.2)

use crate::error::{MailError, Result};

/// A complete (possibly multi-line) server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    /// Reply text with continuation lines joined by spaces
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    pub fn is_permanent_negative(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Whether an EHLO reply advertises `keyword` (case-insensitive)
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(keyword))
        })
    }

    pub fn into_error(self) -> MailError {
        MailError::Transport {
            code: Some(self.code),
            message: self.message(),
        }
    }
}

/// One parsed reply line: code, whether more lines follow, and the text
#[derive(Debug, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    pub code: u16,
    pub more: bool,
    pub text: &'a str,
}

pub fn parse_reply_line(line: &str) -> Result<ReplyLine<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);

    let code = line
        .get(..3)
        .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| malformed(line))?;

    let (more, text) = match line.as_bytes().get(3) {
        None => (false, ""),
        Some(b' ') => (false, &line[4..]),
        Some(b'-') => (true, &line[4..]),
        Some(_) => return Err(malformed(line)),
    };

    Ok(ReplyLine { code, more, text })
}

fn malformed(line: &str) -> MailError {
    MailError::Transport {
        code: None,
        message: format!("Malformed reply: {:?}", line),
    }
}
