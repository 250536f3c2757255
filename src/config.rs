use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::credentials::{ConfigSource, KubeconfigSource, TokenSource};

/// Errors that can occur during config operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error("Cluster {0} is defined more than once")]
    DuplicateCluster(String),

    #[error("Cluster definition without a name")]
    UnnamedCluster,
}

/// One cluster entry of the clusters file
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterDefinition {
    /// Registry key
    pub name: String,

    /// API server URL
    #[serde(default)]
    pub endpoint: String,

    /// Inline bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// File holding the bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,

    /// Skip TLS certificate validation
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// CA certificate used when verification is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,

    /// Take the connection settings from this kubeconfig instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context; implies a kubeconfig-backed definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ClusterDefinition {
    /// Whether this definition points at a kubeconfig rather than a token
    pub fn uses_kubeconfig(&self) -> bool {
        self.kubeconfig.is_some() || self.context.is_some()
    }

    /// Build the credential source described by this entry
    pub fn source(&self) -> Arc<dyn ConfigSource> {
        if self.uses_kubeconfig() {
            Arc::new(KubeconfigSource::new(self.kubeconfig.clone(), self.context.clone()))
        } else {
            Arc::new(TokenSource {
                endpoint: self.endpoint.clone(),
                token: self.token.clone(),
                token_path: self.token_path.clone(),
                insecure_skip_verify: self.insecure_skip_verify,
                ca_cert_path: self.ca_cert_path.clone(),
            })
        }
    }
}

impl fmt::Debug for ClusterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterDefinition")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_path", &self.token_path)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("kubeconfig", &self.kubeconfig)
            .field("context", &self.context)
            .finish()
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Clusters to register at startup
    #[serde(default)]
    pub clusters: Vec<ClusterDefinition>,
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        Ok(dirs::config_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join("kubehub"))
    }

    /// Get the default clusters file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("clusters.json"))
    }

    /// Load the clusters file from the default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::info!("Config file not found at {:?}, no clusters configured", path);
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load a clusters file; `.yaml`/`.yml` files are read as YAML, anything else as JSON
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            Self::from_yaml(&contents)?
        } else {
            Self::from_json(&contents)?
        };

        tracing::info!(
            "Loaded {} cluster definitions from {:?}",
            config.clusters.len(),
            path
        );
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.is_empty() {
                return Err(ConfigError::UnnamedCluster);
            }
            if !seen.insert(cluster.name.as_str()) {
                return Err(ConfigError::DuplicateCluster(cluster.name.clone()));
            }
        }
        Ok(())
    }
}
