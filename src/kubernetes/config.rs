//! Kubernetes configuration parsing
//!
//! Parses kubeconfig files (typically ~/.kube/config) to extract the
//! clusters, contexts and token-based users needed to build a credential
//! source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeConfigError {
    #[error("Failed to read kubeconfig: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse kubeconfig: {0}")]
    ParseError(#[from] serde_yaml_ng::Error),
    #[error("Context not found: {0}")]
    ContextNotFound(String),
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("No current context set")]
    NoCurrentContext,
    #[error("No kubeconfig found")]
    NotFound,
}

/// A Kubernetes cluster from kubeconfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeCluster {
    pub name: String,
    pub server: String,
    pub certificate_authority: Option<PathBuf>,
    pub insecure_skip_tls_verify: bool,
}

/// A Kubernetes context from kubeconfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeContext {
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
}

/// Token credentials of a kubeconfig user
#[derive(Clone, PartialEq, Eq)]
pub struct KubeUser {
    pub name: String,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
}

impl std::fmt::Debug for KubeUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeUser")
            .field("name", &self.name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .finish()
    }
}

/// Parsed kubeconfig
#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub path: PathBuf,
    pub current_context: Option<String>,
    pub contexts: Vec<KubeContext>,
    pub clusters: HashMap<String, KubeCluster>,
    pub users: HashMap<String, KubeUser>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<Named<RawCluster>>,
    #[serde(default)]
    contexts: Vec<Named<RawContext>>,
    #[serde(default)]
    users: Vec<Named<RawUser>>,
}

#[derive(Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "context", alias = "user")]
    item: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCluster {
    #[serde(default)]
    server: String,
    certificate_authority: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Deserialize)]
struct RawContext {
    #[serde(default)]
    cluster: String,
    #[serde(default)]
    user: String,
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<String>,
}

impl KubeConfig {
    /// Get the default kubeconfig path
    pub fn default_path() -> Result<PathBuf, KubeConfigError> {
        // KUBECONFIG may hold a list; only the first entry is used
        if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
            if let Some(first) = std::env::split_paths(&kubeconfig).next() {
                if first.exists() {
                    return Ok(first);
                }
            }
        }

        let home = dirs::home_dir().ok_or(KubeConfigError::NotFound)?;
        let path = home.join(".kube").join("config");
        if path.exists() {
            Ok(path)
        } else {
            Err(KubeConfigError::NotFound)
        }
    }

    /// Parse kubeconfig YAML content.
    ///
    /// Relative file references are resolved against the directory that
    /// contains `path`.
    pub fn parse(content: &str, path: PathBuf) -> Result<Self, KubeConfigError> {
        let raw: RawConfig = serde_yaml_ng::from_str(content)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let resolve = |file: String| {
            let file = PathBuf::from(file);
            if file.is_relative() {
                base.join(file)
            } else {
                file
            }
        };

        let clusters = raw
            .clusters
            .into_iter()
            .filter_map(|named| {
                let cluster = named.item?;
                Some((
                    named.name.clone(),
                    KubeCluster {
                        name: named.name,
                        server: cluster.server,
                        certificate_authority: cluster.certificate_authority.map(&resolve),
                        insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
                    },
                ))
            })
            .collect();

        let contexts = raw
            .contexts
            .into_iter()
            .filter_map(|named| {
                let context = named.item?;
                Some(KubeContext {
                    name: named.name,
                    cluster: context.cluster,
                    user: context.user,
                    namespace: context.namespace,
                })
            })
            .collect();

        let users = raw
            .users
            .into_iter()
            .map(|named| {
                let (token, token_file) = named
                    .item
                    .map(|user| (user.token, user.token_file.map(&resolve)))
                    .unwrap_or_default();
                (
                    named.name.clone(),
                    KubeUser {
                        name: named.name,
                        token,
                        token_file,
                    },
                )
            })
            .collect();

        Ok(Self {
            path,
            current_context: raw.current_context.filter(|c| !c.is_empty()),
            contexts,
            clusters,
            users,
        })
    }

    /// Get the current context
    pub fn current_context(&self) -> Option<&KubeContext> {
        self.current_context
            .as_ref()
            .and_then(|name| self.get_context(name))
    }

    /// Get a context by name
    pub fn get_context(&self, name: &str) -> Option<&KubeContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Get a cluster by name
    pub fn get_cluster(&self, name: &str) -> Option<&KubeCluster> {
        self.clusters.get(name)
    }

    /// Get a user by name
    pub fn get_user(&self, name: &str) -> Option<&KubeUser> {
        self.users.get(name)
    }

    /// Look up the context, cluster and user for `context`, or for the
    /// current context when `context` is `None`
    pub fn select(
        &self,
        context: Option<&str>,
    ) -> Result<(&KubeContext, &KubeCluster, &KubeUser), KubeConfigError> {
        let ctx = match context {
            Some(name) => self
                .get_context(name)
                .ok_or_else(|| KubeConfigError::ContextNotFound(name.to_string()))?,
            None => {
                let name = self
                    .current_context
                    .as_deref()
                    .ok_or(KubeConfigError::NoCurrentContext)?;
                self.current_context()
                    .ok_or_else(|| KubeConfigError::ContextNotFound(name.to_string()))?
            }
        };
        let cluster = self
            .get_cluster(&ctx.cluster)
            .ok_or_else(|| KubeConfigError::ClusterNotFound(ctx.cluster.clone()))?;
        let user = self
            .get_user(&ctx.user)
            .ok_or_else(|| KubeConfigError::UserNotFound(ctx.user.clone()))?;
        Ok((ctx, cluster, user))
    }
}
