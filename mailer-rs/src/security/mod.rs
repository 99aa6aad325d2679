//! Transport security for relay connections

pub mod tls;

pub use tls::TlsConfig;
