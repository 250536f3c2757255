use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::kubernetes::config::KubeConfigError;

/// Timeout applied to every request issued through a session
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API server endpoint is empty")]
    MissingEndpoint,
    #[error("No token provided for API server {0}")]
    NoToken(String),
    #[error("Failed to read token from {path}: {source}")]
    ReadToken {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Insecure is set to false, but no CA certificate path is provided for API server {0}")]
    MissingCaCert(String),
    #[error("Token file {0} is not valid UTF-8")]
    TokenNotUtf8(PathBuf),
    #[error("CA certificate file not found: {0}")]
    CaCertNotFound(PathBuf),
    #[error("Failed to stat CA certificate file {path}: {source}")]
    CaCertInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeConfigError),
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CredentialError::ReadToken { .. } | CredentialError::TokenNotUtf8(_) => ErrorKind::Read,
            CredentialError::Kubeconfig(KubeConfigError::ReadError(_)) => ErrorKind::Read,
            _ => ErrorKind::Config,
        }
    }
}

/// How the server certificate is checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Certificate validation is disabled
    SkipVerify,
    /// Validate against the CA certificate at this path
    VerifyWith { ca_cert_path: PathBuf },
}

impl TlsPolicy {
    /// Build a verifying policy, checking that the CA file exists
    pub async fn verify_with(ca_cert_path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let ca_cert_path = ca_cert_path.into();
        match tokio::fs::metadata(&ca_cert_path).await {
            Ok(_) => Ok(TlsPolicy::VerifyWith { ca_cert_path }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("CA certificate file does not exist at path: {:?}", ca_cert_path);
                Err(CredentialError::CaCertNotFound(ca_cert_path))
            }
            Err(source) => {
                tracing::warn!("Failed to stat CA certificate {:?}: {}", ca_cert_path, source);
                Err(CredentialError::CaCertInaccessible {
                    path: ca_cert_path,
                    source,
                })
            }
        }
    }

    pub fn skip_verify(&self) -> bool {
        matches!(self, TlsPolicy::SkipVerify)
    }

    pub fn ca_cert_path(&self) -> Option<&Path> {
        match self {
            TlsPolicy::SkipVerify => None,
            TlsPolicy::VerifyWith { ca_cert_path } => Some(ca_cert_path),
        }
    }
}

/// Everything needed to open a session against one API server.
///
/// A descriptor always carries a non-empty endpoint and bearer token, and a
/// verifying [`TlsPolicy`] always points at a CA file that existed when the
/// policy was built.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    endpoint: String,
    bearer_token: String,
    tls: TlsPolicy,
    timeout: Duration,
}

impl ConnectionDescriptor {
    pub fn new(
        endpoint: impl Into<String>,
        bearer_token: impl Into<String>,
        tls: TlsPolicy,
    ) -> Result<Self, CredentialError> {
        let endpoint = endpoint.into();
        let bearer_token = bearer_token.into();
        if endpoint.is_empty() {
            return Err(CredentialError::MissingEndpoint);
        }
        if bearer_token.is_empty() {
            return Err(CredentialError::NoToken(endpoint));
        }
        Ok(Self {
            endpoint,
            bearer_token,
            tls,
            timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn tls(&self) -> &TlsPolicy {
        &self.tls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("endpoint", &self.endpoint)
            .field("bearer_token", &"<redacted>")
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A source of connection parameters for one cluster.
///
/// Implementations may do I/O (reading token files, running exec plugins,
/// talking to an identity provider) but must not mutate themselves.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn resolve(&self) -> Result<ConnectionDescriptor, CredentialError>;
}
