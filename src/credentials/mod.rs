//! Credential resolution
//!
//! Turns a per-cluster description of how to authenticate into a validated
//! [`ConnectionDescriptor`] that the session layer can dial.

pub mod kubeconfig;
pub mod source;
pub mod token;

pub use kubeconfig::KubeconfigSource;
pub use source::{ConfigSource, ConnectionDescriptor, CredentialError, TlsPolicy, REQUEST_TIMEOUT};
pub use token::TokenSource;
