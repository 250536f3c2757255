//! Kubeconfig-backed credential source
//!
//! Picks a context from a kubeconfig file and resolves its cluster and user
//! with the same rules as [`TokenSource`].

use std::path::PathBuf;

use async_trait::async_trait;

use super::source::{ConfigSource, ConnectionDescriptor, CredentialError};
use super::token::TokenSource;
use crate::kubernetes::config::KubeConfig;

/// Connection parameters taken from a kubeconfig context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeconfigSource {
    /// Kubeconfig file; `KUBECONFIG` or ~/.kube/config when unset
    pub path: Option<PathBuf>,
    /// Context name; the current context when unset
    pub context: Option<String>,
}

impl KubeconfigSource {
    pub fn new(path: Option<PathBuf>, context: Option<String>) -> Self {
        Self { path, context }
    }

    async fn load(&self) -> Result<KubeConfig, CredentialError> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => KubeConfig::default_path()?,
        };
        tracing::debug!("Loading kubeconfig from {:?}", path);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CredentialError::Kubeconfig(e.into()))?;
        Ok(KubeConfig::parse(&content, path)?)
    }

    /// Map the selected context onto a token source
    pub async fn token_source(&self) -> Result<TokenSource, CredentialError> {
        let config = self.load().await?;
        let (context, cluster, user) = config.select(self.context.as_deref())?;
        tracing::debug!(
            "Using context {} from {:?} (cluster {}, user {}, namespace {})",
            context.name,
            config.path,
            cluster.name,
            user.name,
            context.namespace.as_deref().unwrap_or("default")
        );
        Ok(TokenSource {
            endpoint: cluster.server.clone(),
            token: user.token.clone(),
            token_path: user.token_file.clone(),
            insecure_skip_verify: cluster.insecure_skip_tls_verify,
            ca_cert_path: cluster.certificate_authority.clone(),
        })
    }
}

#[async_trait]
impl ConfigSource for KubeconfigSource {
    async fn resolve(&self) -> Result<ConnectionDescriptor, CredentialError> {
        self.token_source().await?.resolve().await
    }
}
