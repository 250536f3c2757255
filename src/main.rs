use std::path::PathBuf;
use std::process::ExitCode;

use futures::future::try_join_all;
use kubehub::{AppConfig, ClusterRegistry, RegistryError, SessionError};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum ListError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Failed to list pods in cluster {cluster}: {source}")]
    Session {
        cluster: String,
        #[source]
        source: SessionError,
    },
}

/// Print every pod of one cluster
async fn list_cluster_pods(registry: &ClusterRegistry, cluster: &str) -> Result<(), ListError> {
    let session = registry.get(cluster).await?;
    let pods = session.list_pods(None).await.map_err(|source| ListError::Session {
        cluster: cluster.to_string(),
        source,
    })?;

    for pod in pods {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            cluster, pod.namespace, pod.name, pod.ready, pod.status
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting KubeHub");

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => AppConfig::load_from(&path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load cluster definitions: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = ClusterRegistry::new();
    for cluster in &config.clusters {
        if let Err(e) = registry.add(&cluster.name, cluster.source().as_ref()).await {
            tracing::error!("Failed to add {}: {}", cluster.name, e);
            return ExitCode::FAILURE;
        }
    }

    let listings = config
        .clusters
        .iter()
        .map(|cluster| list_cluster_pods(&registry, &cluster.name));
    let result = try_join_all(listings).await;

    registry.shutdown().await;

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
