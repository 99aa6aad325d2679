//! Template bundle types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named set of three sections sharing one payload binding
///
/// Bundles are stored as TOML:
///
/// ```toml
/// subject = "Welcome, {{ name }}!"
/// plain_body = "Hi {{ name }}, ..."
/// html_body = "<p>Hi {{ name }}, ...</p>"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateBundle {
    pub subject: Option<String>,
    pub plain_body: Option<String>,
    pub html_body: Option<String>,
}

impl TemplateBundle {
    pub fn new(
        subject: impl Into<String>,
        plain_body: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            plain_body: Some(plain_body.into()),
            html_body: Some(html_body.into()),
        }
    }

    pub fn section(&self, section: Section) -> Option<&str> {
        match section {
            Section::Subject => self.subject.as_deref(),
            Section::PlainBody => self.plain_body.as_deref(),
            Section::HtmlBody => self.html_body.as_deref(),
        }
    }
}

/// One renderable part of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Subject,
    PlainBody,
    HtmlBody,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Subject, Section::PlainBody, Section::HtmlBody];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Subject => "subject",
            Section::PlainBody => "plain_body",
            Section::HtmlBody => "html_body",
        }
    }

    /// Name under which the section is registered; the extension selects
    /// auto-escaping, so only the HTML body escapes payload values.
    pub fn template_key(&self, bundle: &str) -> String {
        match self {
            Section::Subject => format!("{}/subject.txt", bundle),
            Section::PlainBody => format!("{}/plain_body.txt", bundle),
            Section::HtmlBody => format!("{}/html_body.html", bundle),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
