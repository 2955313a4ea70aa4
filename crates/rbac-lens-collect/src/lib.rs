//! Raw object collection for RBAC audits
//!
//! Gathers the objects the permission graph is built from, either from a
//! live cluster or from a snapshot directory, together with cluster
//! metadata and (optionally) discovered protections.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod live;
pub mod metadata;
pub mod offline;
pub mod protections;
pub mod source;

pub use config::CollectConfig;
pub use error::Error;
pub use live::KubeSource;
pub use offline::OfflineSource;
pub use source::ObjectSource;

use rbac_lens_graph::{build_graph, RbacGraph, ResolveReport};
use tracing::{info, warn};

/// Result type alias using the collection Error type
pub type Result<T> = std::result::Result<T, Error>;

/// A built graph and what was skipped while building it
#[derive(Clone, Debug)]
pub struct Collection {
    /// The permission graph
    pub graph: RbacGraph,
    /// Omissions encountered during resolution
    pub report: ResolveReport,
}

/// The source `config` selects: the snapshot directory if set, otherwise
/// the live cluster
pub async fn source_for(config: &CollectConfig) -> Result<Box<dyn ObjectSource>> {
    match config.offline_dir.as_deref() {
        Some(dir) => Ok(Box::new(OfflineSource::new(dir))),
        None => Ok(Box::new(KubeSource::connect(&config.graph).await?)),
    }
}

/// Collect raw objects from `source` and build the permission graph
pub async fn collect(source: &dyn ObjectSource, config: &CollectConfig) -> Result<Collection> {
    let objects = source.fetch().await?;
    let mut metadata = source.metadata().await;
    if config.discover_protections {
        metadata.features =
            protections::discover(source, &objects, &metadata, &config.graph).await;
    }

    let (graph, report) = build_graph(objects, metadata, &config.graph);
    if report.dangling > 0 || !report.diagnostics.is_empty() {
        warn!(
            dangling = report.dangling,
            malformed_subjects = report.malformed_subjects(),
            "some bindings could not be fully resolved"
        );
    }
    info!(
        cluster = %graph.metadata.cluster_name,
        bindings = report.bindings,
        grants = report.grants,
        "collection complete"
    );
    Ok(Collection { graph, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockObjectSource;
    use rbac_lens_graph::{ClusterMetadata, ClusterObjects};

    #[tokio::test]
    async fn test_collect_builds_graph_with_metadata() {
        let mut source = MockObjectSource::new();
        source
            .expect_fetch()
            .returning(|| Ok(ClusterObjects::default()));
        source.expect_metadata().returning(|| ClusterMetadata {
            cluster_name: "prod".to_string(),
            ..Default::default()
        });
        source.expect_node_restriction_enabled().never();

        let collection = collect(&source, &CollectConfig::default()).await.unwrap();
        assert_eq!(collection.graph.metadata.cluster_name, "prod");
        assert!(collection.graph.service_accounts.is_empty());
        assert_eq!(collection.report, ResolveReport::default());
    }

    #[tokio::test]
    async fn test_collect_propagates_fetch_failure() {
        let mut source = MockObjectSource::new();
        source.expect_fetch().returning(|| {
            Err(Error::NoInputFiles {
                path: "/snap".into(),
            })
        });
        source.expect_metadata().never();

        let err = collect(&source, &CollectConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::NoInputFiles { .. }));
    }

    #[tokio::test]
    async fn test_collect_discovers_protections_when_asked() {
        let mut source = MockObjectSource::new();
        source
            .expect_fetch()
            .returning(|| Ok(ClusterObjects::default()));
        source.expect_metadata().returning(ClusterMetadata::default);
        let config = CollectConfig {
            discover_protections: true,
            ..Default::default()
        };

        let collection = collect(&source, &config).await.unwrap();
        // nothing to sample and no nodes to impersonate
        assert!(collection.graph.metadata.features.is_empty());
    }
}
