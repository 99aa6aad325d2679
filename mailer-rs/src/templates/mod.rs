//! Email template bundles
//!
//! Each bundle defines a subject, a plain-text body and an HTML body, all
//! rendered from the same payload. Bundles ship with the crate under
//! `templates/`; adding a notification type means adding a bundle.

pub mod registry;
pub mod store;
pub mod types;

pub use registry::TemplateRegistry;
pub use store::TemplateStore;
pub use types::{Section, TemplateBundle};
