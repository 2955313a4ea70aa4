//! Serialized graph document
//!
//! [`RbacGraph`] is the only contract between graph construction, the
//! policy runtime, and offline snapshots of previous runs. Field names are
//! camelCase and empty optional fields are omitted.

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::api::rbac::v1::PolicyRule;
use serde::{Deserialize, Serialize};

/// Placement bucket holding pods that are not scheduled on any node
pub const UNSCHEDULED: &str = "";

/// Full name of a namespaced object (`namespace:name`)
pub fn full_name(namespace: &str, name: &str) -> String {
    format!("{}:{}", namespace, name)
}

/// Key of a role definition: (name, defining namespace)
pub type RoleKey<'a> = (&'a str, Option<&'a str>);

/// API server version of the audited cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersion {
    /// Major version
    #[serde(default)]
    pub major: String,
    /// Minor version (may carry a `+` suffix on managed platforms)
    #[serde(default)]
    pub minor: String,
    /// Full git version, e.g. `v1.29.3-eks-adc7111`
    #[serde(default)]
    pub git_version: String,
}

/// Cluster-level facts carried alongside the identities
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    /// Cluster name from the kubeconfig context or snapshot
    #[serde(rename = "cluster", default)]
    pub cluster_name: String,
    /// Managed platform (`eks`, `gke`) or empty
    #[serde(default)]
    pub platform: String,
    /// API server version
    #[serde(default)]
    pub version: ClusterVersion,
    /// Discovered protections (feature gates, admission plugins)
    #[serde(default)]
    pub features: Vec<String>,
}

/// A grant: reference to a role definition plus where it applies
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// Role name
    pub name: String,
    /// Namespace the role is defined in; `None` for ClusterRoles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Namespace the grant applies in; `None` for cluster-wide grants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_namespace: Option<String>,
}

impl RoleRef {
    /// Catalog key of the referenced definition (ignores effective namespace)
    pub fn key(&self) -> RoleKey<'_> {
        (self.name.as_str(), self.namespace.as_deref())
    }

    /// Whether this grant references `role`
    pub fn references(&self, role: &RoleEntry) -> bool {
        self.key() == role.key()
    }
}

/// A role definition: Role or ClusterRole with its opaque rules
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Role name
    pub name: String,
    /// Defining namespace; `None` for ClusterRoles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Permission rules, carried unchanged
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl RoleEntry {
    /// Catalog key: (name, defining namespace)
    pub fn key(&self) -> RoleKey<'_> {
        (self.name.as_str(), self.namespace.as_deref())
    }
}

/// Pods of one service account running on one node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePods {
    /// Node name, or [`UNSCHEDULED`]
    pub name: String,
    /// Pod names
    pub pods: Vec<String>,
}

/// A service account and the grants it holds
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountEntry {
    /// Service account name
    pub name: String,
    /// Service account namespace
    pub namespace: String,
    /// Where the service account's pods run; always present, possibly empty
    #[serde(default)]
    pub nodes: Vec<NodePods>,
    /// Cloud IAM identities linked through annotations (`aws`, `gcp`)
    #[serde(
        rename = "providerIAM",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub provider_iam: BTreeMap<String, String>,
    /// Grants
    #[serde(default)]
    pub roles: Vec<RoleRef>,
}

impl ServiceAccountEntry {
    /// `namespace:name`
    pub fn full_name(&self) -> String {
        full_name(&self.namespace, &self.name)
    }

    /// Whether this is the service account `namespace/name`
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }

    /// Number of distinct nodes hosting this service account's pods,
    /// not counting the unscheduled bucket
    pub fn scheduled_node_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.name != UNSCHEDULED)
            .map(|n| n.name.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// A node identity and the grants it holds
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    /// Node name
    pub name: String,
    /// Grants
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Full names of service accounts with pods on this node
    #[serde(default)]
    pub service_accounts: Vec<String>,
}

/// A user or group, identified by name only
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry {
    /// User or group name
    pub name: String,
    /// Grants
    #[serde(default)]
    pub roles: Vec<RoleRef>,
}

/// The resolved permission graph
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacGraph {
    /// Cluster metadata
    #[serde(default)]
    pub metadata: ClusterMetadata,
    /// Service accounts
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccountEntry>,
    /// Nodes
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    /// Users
    #[serde(default)]
    pub users: Vec<NamedEntry>,
    /// Groups
    #[serde(default)]
    pub groups: Vec<NamedEntry>,
    /// Role definitions referenced by at least one grant
    #[serde(default)]
    pub roles: Vec<RoleEntry>,
}

impl RbacGraph {
    /// Every grant held by any identity, across all identity kinds
    pub fn grants(&self) -> impl Iterator<Item = &RoleRef> {
        self.service_accounts
            .iter()
            .flat_map(|sa| sa.roles.iter())
            .chain(self.nodes.iter().flat_map(|n| n.roles.iter()))
            .chain(self.users.iter().flat_map(|u| u.roles.iter()))
            .chain(self.groups.iter().flat_map(|g| g.roles.iter()))
    }

    /// Look up a role definition by its catalog key
    pub fn role(&self, name: &str, namespace: Option<&str>) -> Option<&RoleEntry> {
        self.roles.iter().find(|r| r.key() == (name, namespace))
    }
}
