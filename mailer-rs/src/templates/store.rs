use crate::error::Result;
use crate::mime::RenderedTemplate;

/// Read-only source of named template bundles
///
/// The production implementation is [`crate::templates::TemplateRegistry`];
/// tests can provide their own in-memory stores.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateStore: Send + Sync {
    /// Render all three sections of `name` with the same payload
    ///
    /// # Errors
    /// - `TemplateNotFound` if no bundle is registered under `name`
    /// - `TemplateRender` if a section is missing or fails to evaluate
    fn render(&self, name: &str, payload: &serde_json::Value) -> Result<RenderedTemplate>;

    fn contains(&self, name: &str) -> bool;

    /// Registered bundle names, sorted
    fn names(&self) -> Vec<String>;
}
