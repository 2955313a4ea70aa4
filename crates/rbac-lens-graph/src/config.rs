//! Graph construction options

use crate::DEFAULT_NODE_GROUP;

/// Options controlling which identities enter the graph and how node
/// credentials are recognized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphConfig {
    /// Keep every service account, not only those with pods
    pub all_service_accounts: bool,
    /// Drop control-plane nodes and the pods scheduled on them
    pub ignore_control_plane: bool,
    /// Only consider pods and service accounts in this namespace
    pub namespace: Option<String>,
    /// Groups that every node belongs to
    pub node_groups: Vec<String>,
    /// Single user name shared by every node, instead of the node
    /// authorizer's `system:node:<name>` convention
    pub node_user: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            all_service_accounts: false,
            ignore_control_plane: false,
            namespace: None,
            node_groups: vec![DEFAULT_NODE_GROUP.to_string()],
            node_user: None,
        }
    }
}

impl GraphConfig {
    /// Whether `group` is one of the configured node groups
    pub fn is_node_group(&self, group: &str) -> bool {
        self.node_groups.iter().any(|g| g == group)
    }
}
