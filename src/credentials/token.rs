//! Bearer-token credential source
//!
//! The token is either passed inline or read from a file. Token file content
//! is used exactly as read, trailing newlines included; it must be UTF-8.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use super::source::{ConfigSource, ConnectionDescriptor, CredentialError, TlsPolicy};

/// Connection parameters for a cluster authenticated with a bearer token
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenSource {
    /// API server URL
    pub endpoint: String,
    /// Inline token, takes precedence over `token_path`
    pub token: Option<String>,
    /// File to read the token from
    pub token_path: Option<PathBuf>,
    /// Skip TLS certificate validation
    pub insecure_skip_verify: bool,
    /// CA certificate, required unless `insecure_skip_verify` is set
    pub ca_cert_path: Option<PathBuf>,
}

impl TokenSource {
    /// Create a source that uses the given token string
    pub fn with_token(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        insecure_skip_verify: bool,
        ca_cert_path: Option<PathBuf>,
    ) -> Self {
        let endpoint = endpoint.into();
        tracing::debug!("Creating token source with provided token for API server {}", endpoint);
        Self {
            endpoint,
            token: Some(token.into()),
            token_path: None,
            insecure_skip_verify,
            ca_cert_path,
        }
    }

    /// Create a source that reads its token from a file
    pub fn with_file(
        endpoint: impl Into<String>,
        token_path: impl Into<PathBuf>,
        insecure_skip_verify: bool,
        ca_cert_path: Option<PathBuf>,
    ) -> Self {
        let endpoint = endpoint.into();
        let token_path = token_path.into();
        tracing::debug!(
            "Creating token source with token file {:?} for API server {}",
            token_path,
            endpoint
        );
        Self {
            endpoint,
            token: None,
            token_path: Some(token_path),
            insecure_skip_verify,
            ca_cert_path,
        }
    }

    async fn bearer_token(&self) -> Result<String, CredentialError> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            tracing::debug!("Using provided token for API server {}", self.endpoint);
            return Ok(token.to_string());
        }

        match self.token_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => {
                tracing::debug!("Reading token from file: {:?}", path);
                let bytes = tokio::fs::read(path).await.map_err(|source| {
                    tracing::warn!("Failed to read token file {:?}: {}", path, source);
                    CredentialError::ReadToken {
                        path: path.clone(),
                        source,
                    }
                })?;
                String::from_utf8(bytes).map_err(|_| {
                    tracing::warn!("Token file {:?} is not valid UTF-8", path);
                    CredentialError::TokenNotUtf8(path.clone())
                })
            }
            None => {
                tracing::warn!("No token provided for API server {}", self.endpoint);
                Err(CredentialError::NoToken(self.endpoint.clone()))
            }
        }
    }

    async fn tls_policy(&self) -> Result<TlsPolicy, CredentialError> {
        if self.insecure_skip_verify {
            tracing::debug!(
                "Insecure TLS is enabled, certificate validation is skipped for API server {}",
                self.endpoint
            );
            return Ok(TlsPolicy::SkipVerify);
        }

        match self.ca_cert_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => {
                let policy = TlsPolicy::verify_with(path.clone()).await?;
                tracing::debug!("Using CA certificate from: {:?}", path);
                Ok(policy)
            }
            None => Err(CredentialError::MissingCaCert(self.endpoint.clone())),
        }
    }
}

#[async_trait]
impl ConfigSource for TokenSource {
    async fn resolve(&self) -> Result<ConnectionDescriptor, CredentialError> {
        let token = self.bearer_token().await?;
        let tls = self.tls_policy().await?;
        let descriptor = ConnectionDescriptor::new(self.endpoint.clone(), token, tls)?;
        tracing::info!("Resolved credentials for API server {}", self.endpoint);
        Ok(descriptor)
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_path", &self.token_path)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("ca_cert_path", &self.ca_cert_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENDPOINT: &str = "https://host:6443";

    fn token_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_no_token_source_is_config_error() {
        let source = TokenSource {
            endpoint: ENDPOINT.to_string(),
            insecure_skip_verify: true,
            ..Default::default()
        };
        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, CredentialError::NoToken(_)));
        assert_eq!(err.kind(), ErrorKind::Config);

        let source = TokenSource {
            endpoint: ENDPOINT.to_string(),
            token: Some(String::new()),
            token_path: Some(PathBuf::new()),
            insecure_skip_verify: true,
            ..Default::default()
        };
        assert_eq!(source.resolve().await.unwrap_err().kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_inline_token() {
        let source = TokenSource::with_token(ENDPOINT, "abc", true, None);
        let descriptor = source.resolve().await.unwrap();
        assert_eq!(descriptor.endpoint(), ENDPOINT);
        assert_eq!(descriptor.bearer_token(), "abc");
        assert!(descriptor.tls().skip_verify());
    }

    #[tokio::test]
    async fn test_inline_token_takes_precedence() {
        let file = token_file("from-file");
        let source = TokenSource {
            endpoint: ENDPOINT.to_string(),
            token: Some("inline".to_string()),
            token_path: Some(file.path().to_path_buf()),
            insecure_skip_verify: true,
            ca_cert_path: None,
        };
        assert_eq!(source.resolve().await.unwrap().bearer_token(), "inline");
    }

    #[tokio::test]
    async fn test_token_file_content_is_not_trimmed() {
        let file = token_file("xyz\n");
        let source = TokenSource::with_file(ENDPOINT, file.path(), true, None);
        let descriptor = source.resolve().await.unwrap();
        assert_eq!(descriptor.bearer_token(), "xyz\n");
    }

    #[tokio::test]
    async fn test_missing_token_file_is_read_error() {
        let source = TokenSource::with_file(ENDPOINT, "/path/to/nonexistent/token", true, None);
        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, CredentialError::ReadToken { .. }));
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[tokio::test]
    async fn test_non_utf8_token_file_is_read_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x61, 0xff, 0xfe, 0x0a]).unwrap();
        let source = TokenSource::with_file(ENDPOINT, file.path(), true, None);

        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, CredentialError::TokenNotUtf8(_)));
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[tokio::test]
    async fn test_empty_token_file_is_rejected() {
        let file = token_file("");
        let source = TokenSource::with_file(ENDPOINT, file.path(), true, None);
        assert_eq!(source.resolve().await.unwrap_err().kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_insecure_ignores_ca_path() {
        for ca in [None, Some(PathBuf::new()), Some(PathBuf::from("/nonexistent/ca.crt"))] {
            let source = TokenSource::with_token(ENDPOINT, "abc", true, ca);
            let descriptor = source.resolve().await.unwrap();
            assert_eq!(descriptor.tls(), &TlsPolicy::SkipVerify);
        }
    }

    #[tokio::test]
    async fn test_secure_requires_ca_path() {
        let source = TokenSource::with_token(ENDPOINT, "abc", false, None);
        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, CredentialError::MissingCaCert(_)));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_secure_with_nonexistent_ca_is_config_error() {
        let source = TokenSource::with_token(ENDPOINT, "abc", false, Some(PathBuf::from("/nonexistent/ca.crt")));
        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, CredentialError::CaCertNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_secure_with_existing_ca() {
        let ca = NamedTempFile::new().unwrap();
        let source = TokenSource::with_token(ENDPOINT, "abc", false, Some(ca.path().to_path_buf()));
        let descriptor = source.resolve().await.unwrap();
        assert_eq!(descriptor.tls().ca_cert_path(), Some(ca.path()));
    }

    #[tokio::test]
    async fn test_empty_endpoint_is_config_error() {
        let source = TokenSource::with_token("", "abc", true, None);
        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, CredentialError::MissingEndpoint));
    }

    #[test]
    fn test_debug_redacts_token() {
        let source = TokenSource::with_token(ENDPOINT, "super-secret", true, None);
        assert!(!format!("{:?}", source).contains("super-secret"));
    }
}
