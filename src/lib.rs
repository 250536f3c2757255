pub mod config;
pub mod credentials;
pub mod error;
pub mod kubernetes;
pub mod registry;

pub use config::{AppConfig, ClusterDefinition};
pub use credentials::{ConfigSource, ConnectionDescriptor, CredentialError, KubeconfigSource, TlsPolicy, TokenSource};
pub use error::ErrorKind;
pub use kubernetes::{Session, SessionError};
pub use registry::{ClusterRegistry, RegistryError};
