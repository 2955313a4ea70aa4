//! Raw object providers

use async_trait::async_trait;
use rbac_lens_graph::{ClusterMetadata, ClusterObjects};

use crate::Result;

#[cfg(test)]
use mockall::automock;

/// Supplies the raw objects a graph is built from.
///
/// Implemented by the live cluster ([`crate::KubeSource`]) and by snapshot
/// directories ([`crate::OfflineSource`]); mocked in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch every object kind the graph needs. Any failure is fatal.
    async fn fetch(&self) -> Result<ClusterObjects>;

    /// Cluster name, version and platform. Best effort: fields that
    /// can't be determined are left empty.
    async fn metadata(&self) -> ClusterMetadata;

    /// Whether a kubelet credential for `node` is rejected when creating a
    /// non-mirror pod. Sources that can't check report `false`.
    async fn node_restriction_enabled(&self, node: &str) -> bool;
}
