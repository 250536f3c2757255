use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::credentials::{ConfigSource, CredentialError};
use crate::error::ErrorKind;
use crate::kubernetes::{Session, SessionError};

/// Errors that can occur while managing cluster sessions
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid credentials for cluster {cluster}: {source}")]
    Credentials {
        cluster: String,
        #[source]
        source: CredentialError,
    },

    #[error("Failed to create client for cluster {cluster}: {source}")]
    Connection {
        cluster: String,
        #[source]
        source: SessionError,
    },

    #[error("Client for cluster {0} already exists")]
    Duplicate(String),

    #[error("Client not found for cluster: {0}")]
    NotFound(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Credentials { source, .. } => source.kind(),
            RegistryError::Connection { .. } => ErrorKind::Connection,
            RegistryError::Duplicate(_) => ErrorKind::Duplicate,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Name of the cluster the failed operation targeted
    pub fn cluster(&self) -> &str {
        match self {
            RegistryError::Credentials { cluster, .. }
            | RegistryError::Connection { cluster, .. }
            | RegistryError::Duplicate(cluster)
            | RegistryError::NotFound(cluster) => cluster,
        }
    }
}

/// Owns one session per cluster name.
///
/// Lookups share a read lock. Add, replace and shutdown hold the write lock
/// for their whole resolve-and-store sequence, so a reader never sees a
/// half-built entry and two adds for one name cannot both succeed.
#[derive(Default)]
pub struct ClusterRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn establish(name: &str, source: &dyn ConfigSource) -> Result<Session, RegistryError> {
        let descriptor = source.resolve().await.map_err(|source| {
            tracing::warn!("Failed to resolve credentials for cluster {}: {}", name, source);
            RegistryError::Credentials {
                cluster: name.to_string(),
                source,
            }
        })?;

        Session::connect(descriptor).map_err(|source| {
            tracing::warn!("Failed to create client for cluster {}: {}", name, source);
            RegistryError::Connection {
                cluster: name.to_string(),
                source,
            }
        })
    }

    /// Register a new cluster, failing if the name is already taken
    pub async fn add(&self, name: &str, source: &dyn ConfigSource) -> Result<Session, RegistryError> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(name) {
            tracing::warn!("Client for cluster {} already exists, skipping creation", name);
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        let session = Self::establish(name, source).await?;
        sessions.insert(name.to_string(), session.clone());
        tracing::info!("Added client for cluster {} ({})", name, session.endpoint());
        Ok(session)
    }

    /// Register a cluster, closing any session it supersedes.
    ///
    /// On failure the existing entry, if any, is left in place.
    pub async fn replace(&self, name: &str, source: &dyn ConfigSource) -> Result<Session, RegistryError> {
        let mut sessions = self.sessions.write().await;

        let session = Self::establish(name, source).await?;
        match sessions.insert(name.to_string(), session.clone()) {
            Some(previous) => {
                previous.close();
                tracing::info!("Replaced client for cluster {} ({})", name, session.endpoint());
            }
            None => {
                tracing::info!("Added client for cluster {} ({})", name, session.endpoint());
            }
        }
        Ok(session)
    }

    /// Look up the session for a cluster
    pub async fn get(&self, name: &str) -> Result<Session, RegistryError> {
        let sessions = self.sessions.read().await;
        match sessions.get(name) {
            Some(session) => Ok(session.clone()),
            None => {
                tracing::debug!("Client not found for cluster {}", name);
                Err(RegistryError::NotFound(name.to_string()))
            }
        }
    }

    /// Close and remove every session. The registry stays usable.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        for (name, session) in sessions.drain() {
            session.close();
            tracing::info!("Client for cluster {} has been shut down", name);
        }
    }

    /// Registered cluster names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.sessions.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TokenSource;

    fn insecure(endpoint: &str, token: &str) -> TokenSource {
        TokenSource::with_token(endpoint, token, true, None)
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let registry = ClusterRegistry::new();
        registry
            .add("clusterA", &insecure("https://host:6443", "abc"))
            .await
            .unwrap();

        let session = registry.get("clusterA").await.unwrap();
        assert_eq!(session.endpoint(), "https://host:6443");
        assert_eq!(session.descriptor().bearer_token(), "abc");

        let err = registry.get("clusterB").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.cluster(), "clusterB");
    }

    #[tokio::test]
    async fn test_duplicate_add_keeps_first() {
        let registry = ClusterRegistry::new();
        let first = registry
            .add("prod", &insecure("https://one:6443", "abc"))
            .await
            .unwrap();

        let err = registry
            .add("prod", &insecure("https://two:6443", "def"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);

        let current = registry.get("prod").await.unwrap();
        assert!(current.same_session(&first));
        assert_eq!(current.endpoint(), "https://one:6443");
        assert!(!first.is_closed());
    }

    #[tokio::test]
    async fn test_replace_closes_previous() {
        let registry = ClusterRegistry::new();
        let first = registry
            .add("prod", &insecure("https://one:6443", "abc"))
            .await
            .unwrap();

        let second = registry
            .replace("prod", &insecure("https://two:6443", "def"))
            .await
            .unwrap();

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(registry.get("prod").await.unwrap().endpoint(), "https://two:6443");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_clears_and_stays_usable() {
        let registry = ClusterRegistry::new();
        let a = registry.add("a", &insecure("https://a:6443", "t")).await.unwrap();
        registry.add("b", &insecure("https://b:6443", "t")).await.unwrap();
        assert_eq!(registry.names().await, vec!["a", "b"]);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
        assert!(a.is_closed());
        assert_eq!(registry.get("a").await.unwrap_err().kind(), ErrorKind::NotFound);

        registry.add("a", &insecure("https://a:6443", "t")).await.unwrap();
        assert!(registry.contains("a").await);
    }
}
