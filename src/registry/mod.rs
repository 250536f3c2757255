//! Concurrent registry of per-cluster sessions

pub mod manager;

pub use manager::{ClusterRegistry, RegistryError};
