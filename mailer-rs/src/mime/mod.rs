//! MIME message composition
//!
//! This module turns a rendered template bundle into a single
//! multipart/alternative message ready for submission.

pub mod composer;
pub mod types;

pub use composer::{compose, sanitize_header};
pub use types::{ComposedMessage, RenderedTemplate};
