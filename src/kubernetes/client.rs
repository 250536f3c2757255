//! Kubernetes API sessions
//!
//! Wraps the kube crate to turn a [`ConnectionDescriptor`] into a client and
//! to provide namespace and pod listing on top of it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::{
    api::{Api, ListParams},
    Client, Config,
};
use rustls::pki_types::{pem::PemObject, CertificateDer};
use thiserror::Error;
use tokio::sync::watch;

use crate::credentials::ConnectionDescriptor;
use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid API server URL {url}: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error("API server URL {0} must include a scheme and a host")]
    IncompleteEndpoint(String),
    #[error("Failed to load CA certificate {path:?}: {reason}")]
    CaCertificate { path: PathBuf, reason: String },
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Bearer token for {0} is not a valid Authorization header value")]
    InvalidToken(String),
    #[error("Session has been closed")]
    Closed,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Connection
    }
}

/// A Kubernetes namespace
#[derive(Debug, Clone)]
pub struct KubeNamespace {
    pub name: String,
    pub status: String,
}

/// A Kubernetes pod
#[derive(Debug, Clone)]
pub struct KubePod {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub ready: String,
    pub containers: Vec<String>,
}

struct SessionInner {
    client: Client,
    descriptor: ConnectionDescriptor,
    /// Set when the token cannot be sent as a header; requests are refused
    unusable_token: bool,
    closed: watch::Sender<bool>,
}

/// An established client for one cluster.
///
/// Clones share the same underlying connection. Closing a session cancels
/// its in-flight requests and rejects new ones.
///
/// A bearer token that is not a valid header value, such as one read from a
/// file with a trailing newline, does not prevent the session from being
/// created. Every request on it fails with [`SessionError::InvalidToken`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Build a client from a resolved descriptor.
    ///
    /// No request is sent; this must be called from within a Tokio runtime.
    pub fn connect(descriptor: ConnectionDescriptor) -> Result<Self, SessionError> {
        let unusable_token = !is_valid_bearer(descriptor.bearer_token());
        if unusable_token {
            tracing::warn!(
                "Bearer token for {} is not a valid header value, requests will be refused",
                descriptor.endpoint()
            );
        }
        let config = Self::kube_config(&descriptor, !unusable_token)?;

        // Both rustls providers may be compiled in; pin the one we depend on
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let start = std::time::Instant::now();
        let client = Client::try_from(config)?;
        tracing::debug!("Client for {} created in {:?}", descriptor.endpoint(), start.elapsed());

        let (closed, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                descriptor,
                unusable_token,
                closed,
            }),
        })
    }

    fn kube_config(descriptor: &ConnectionDescriptor, with_token: bool) -> Result<Config, SessionError> {
        let url = descriptor.endpoint();
        let cluster_url: http::Uri = url.parse().map_err(|source| SessionError::InvalidEndpoint {
            url: url.to_string(),
            source,
        })?;
        if cluster_url.scheme().is_none() || cluster_url.authority().is_none() {
            return Err(SessionError::IncompleteEndpoint(url.to_string()));
        }

        let mut config = Config::new(cluster_url);
        config.accept_invalid_certs = descriptor.tls().skip_verify();
        if let Some(path) = descriptor.tls().ca_cert_path() {
            config.root_cert = Some(load_root_certs(path)?);
        }
        // kube panics while building the client on a token it cannot send
        if with_token {
            config.auth_info.token = Some(descriptor.bearer_token().to_string().into());
        }

        let timeout = descriptor.timeout();
        config.connect_timeout = Some(timeout);
        config.read_timeout = Some(timeout);
        config.write_timeout = Some(timeout);
        Ok(config)
    }

    /// API server this session talks to
    pub fn endpoint(&self) -> &str {
        self.inner.descriptor.endpoint()
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.inner.descriptor
    }

    /// Get the raw kube client, unless the session cannot authenticate
    pub fn client(&self) -> Result<&Client, SessionError> {
        self.check_usable()?;
        Ok(&self.inner.client)
    }

    fn check_usable(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if self.inner.unusable_token {
            return Err(SessionError::InvalidToken(self.endpoint().to_string()));
        }
        Ok(())
    }

    /// Whether `other` is a handle to the same session
    pub fn same_session(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Cancel in-flight requests and reject new ones
    pub fn close(&self) {
        if !self.inner.closed.send_replace(true) {
            tracing::debug!("Closed session for {}", self.endpoint());
        }
    }

    /// Run a request under the session timeout, aborting it if the session
    /// is closed first
    async fn run<T, F>(&self, request: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        self.check_usable()?;
        let mut closed = self.inner.closed.subscribe();

        let timeout = self.inner.descriptor.timeout();
        tokio::select! {
            result = tokio::time::timeout(timeout, request) => match result {
                Ok(result) => Ok(result?),
                Err(_) => Err(SessionError::Timeout(timeout)),
            },
            _ = closed.wait_for(|closed| *closed) => Err(SessionError::Closed),
        }
    }

    /// List all namespaces
    pub async fn list_namespaces(&self) -> Result<Vec<KubeNamespace>, SessionError> {
        let namespaces: Api<Namespace> = Api::all(self.inner.client.clone());
        let list = self.run(namespaces.list(&ListParams::default())).await?;

        Ok(list
            .items
            .into_iter()
            .map(|ns| {
                let name = ns.metadata.name.unwrap_or_default();
                let status = ns
                    .status
                    .and_then(|s| s.phase)
                    .unwrap_or_else(|| "Unknown".to_string());
                KubeNamespace { name, status }
            })
            .collect())
    }

    /// List pods in a namespace, or in every namespace when `namespace` is `None`
    pub async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<KubePod>, SessionError> {
        let start = std::time::Instant::now();
        let pods: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.inner.client.clone(), ns),
            None => Api::all(self.inner.client.clone()),
        };
        let list = self.run(pods.list(&ListParams::default())).await?;
        tracing::debug!(
            "list_pods({:?}) on {} took {:?}",
            namespace,
            self.endpoint(),
            start.elapsed()
        );

        Ok(list.items.into_iter().map(convert_pod).collect())
    }

    /// Get a specific pod
    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<KubePod, SessionError> {
        let pods: Api<Pod> = Api::namespaced(self.inner.client.clone(), namespace);
        let pod = self.run(pods.get(name)).await?;
        Ok(convert_pod(pod))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("descriptor", &self.inner.descriptor)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Whether `token` can be sent as `Authorization: Bearer <token>`
fn is_valid_bearer(token: &str) -> bool {
    http::HeaderValue::try_from(format!("Bearer {}", token)).is_ok()
}

/// Read every PEM certificate in `path` as DER
fn load_root_certs(path: &Path) -> Result<Vec<Vec<u8>>, SessionError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|e| SessionError::CaCertificate {
            path: path.to_path_buf(),
            reason: format!("{:?}", e),
        })?;
    if certs.is_empty() {
        return Err(SessionError::CaCertificate {
            path: path.to_path_buf(),
            reason: "no PEM certificates found".to_string(),
        });
    }
    Ok(certs.into_iter().map(|cert| cert.as_ref().to_vec()).collect())
}

/// Convert a k8s Pod to our KubePod type
fn convert_pod(pod: Pod) -> KubePod {
    let name = pod.metadata.name.unwrap_or_default();
    let namespace = pod.metadata.namespace.unwrap_or_default();

    let (status, ready, containers) = match pod.status {
        Some(status) => {
            let phase = status.phase.unwrap_or_else(|| "Unknown".to_string());
            let container_statuses = status.container_statuses.unwrap_or_default();
            let ready_count = container_statuses.iter().filter(|c| c.ready).count();
            let ready = format!("{}/{}", ready_count, container_statuses.len());
            let containers = container_statuses.into_iter().map(|c| c.name).collect();
            (phase, ready, containers)
        }
        None => ("Unknown".to_string(), "0/0".to_string(), vec![]),
    };

    KubePod {
        name,
        namespace,
        status,
        ready,
        containers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TlsPolicy;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn insecure(endpoint: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(endpoint, "abc", TlsPolicy::SkipVerify).unwrap()
    }

    #[tokio::test]
    async fn test_connect_insecure() {
        let session = Session::connect(insecure("https://host:6443")).unwrap();
        assert_eq!(session.endpoint(), "https://host:6443");
        assert_eq!(session.descriptor().bearer_token(), "abc");
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_malformed_endpoint() {
        let err = Session::connect(insecure("not a url")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidEndpoint { .. }));

        let err = Session::connect(insecure("host:6443")).unwrap_err();
        assert!(matches!(err, SessionError::IncompleteEndpoint(_)));
    }

    #[tokio::test]
    async fn test_ca_file_without_certificates() {
        let mut ca = NamedTempFile::new().unwrap();
        ca.write_all(b"not a certificate").unwrap();
        let tls = TlsPolicy::verify_with(ca.path()).await.unwrap();
        let descriptor = ConnectionDescriptor::new("https://host:6443", "abc", tls).unwrap();

        let err = Session::connect(descriptor).unwrap_err();
        assert!(matches!(err, SessionError::CaCertificate { .. }));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_requests() {
        let session = Session::connect(insecure("https://host:6443")).unwrap();
        let clone = session.clone();
        session.close();

        assert!(clone.is_closed());
        assert!(matches!(clone.list_namespaces().await, Err(SessionError::Closed)));
        assert!(matches!(clone.list_pods(None).await, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_request() {
        // Accepts TCP but never answers the TLS handshake
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("https://{}", listener.local_addr().unwrap());
        let session = Session::connect(insecure(&endpoint)).unwrap();

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.list_namespaces().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.close();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(SessionError::Closed)));
        drop(listener);
    }

    #[tokio::test]
    async fn test_token_with_control_characters() {
        for token in ["abc\n", "a\rb"] {
            let descriptor = ConnectionDescriptor::new("https://host:6443", token, TlsPolicy::SkipVerify).unwrap();
            let session = Session::connect(descriptor).unwrap();
            assert_eq!(session.descriptor().bearer_token(), token);

            let err = session.list_namespaces().await.unwrap_err();
            assert!(matches!(err, SessionError::InvalidToken(_)));
            assert_eq!(err.kind(), ErrorKind::Connection);
            assert!(matches!(session.client(), Err(SessionError::InvalidToken(_))));
        }
    }

    #[test]
    fn test_is_valid_bearer() {
        assert!(is_valid_bearer("abc"));
        assert!(is_valid_bearer("eyJhbGciOiJSUzI1NiJ9.e30.sig"));
        assert!(!is_valid_bearer("xyz\n"));
        assert!(!is_valid_bearer("a\rb"));
    }

    #[tokio::test]
    async fn test_client_access() {
        let session = Session::connect(insecure("https://host:6443")).unwrap();
        assert!(session.client().is_ok());
        session.close();
        assert!(matches!(session.client(), Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_same_session() {
        let session = Session::connect(insecure("https://host:6443")).unwrap();
        let other = Session::connect(insecure("https://host:6443")).unwrap();
        assert!(session.same_session(&session.clone()));
        assert!(!session.same_session(&other));
    }

    #[test]
    fn test_convert_pod() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web-0".to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.status = Some(PodStatus {
            phase: Some("Running".to_string()),
            container_statuses: Some(vec![
                ContainerStatus {
                    name: "app".to_string(),
                    ready: true,
                    ..Default::default()
                },
                ContainerStatus {
                    name: "sidecar".to_string(),
                    ready: false,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        });

        let converted = convert_pod(pod);
        assert_eq!(converted.name, "web-0");
        assert_eq!(converted.status, "Running");
        assert_eq!(converted.ready, "1/2");
        assert_eq!(converted.containers, vec!["app", "sidecar"]);

        let bare = convert_pod(Pod::default());
        assert_eq!(bare.status, "Unknown");
        assert_eq!(bare.ready, "0/0");
    }
}
