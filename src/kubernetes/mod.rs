//! Kubernetes integration module
//!
//! Provides kubeconfig parsing and the API sessions stored in the registry.

pub mod client;
pub mod config;

pub use client::{KubeNamespace, KubePod, Session, SessionError};
pub use config::{KubeCluster, KubeConfig, KubeConfigError, KubeContext, KubeUser};
