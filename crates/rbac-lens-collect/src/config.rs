//! Collection configuration

use std::path::PathBuf;

use rbac_lens_graph::GraphConfig;

/// How and from where raw objects are collected
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectConfig {
    /// Graph construction options, including the namespace scope
    pub graph: GraphConfig,
    /// Snapshot directory; `None` collects from the live cluster
    pub offline_dir: Option<PathBuf>,
    /// Check the cluster for protections policies can take into account
    pub discover_protections: bool,
}

impl CollectConfig {
    /// Whether collection reads a snapshot instead of a live cluster
    pub fn is_offline(&self) -> bool {
        self.offline_dir.is_some()
    }
}
