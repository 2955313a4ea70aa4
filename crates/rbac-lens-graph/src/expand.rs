//! Expansion for display
//!
//! Replaces each grant with a self-contained record carrying the rule
//! payload of the definition it references. Definitions are looked up by
//! (name, defining namespace); the effective namespace is only a label.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use k8s_openapi::api::rbac::v1::PolicyRule;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{ClusterMetadata, NodePods, RbacGraph, RoleKey, RoleRef};

/// A grant with its rules inlined
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedRole {
    /// Role name
    pub name: String,
    /// Namespace the grant applies in; `None` for cluster-wide grants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_namespace: Option<String>,
    /// Rules of the referenced definition
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Service account with expanded grants
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedServiceAccount {
    /// Service account name
    pub name: String,
    /// Service account namespace
    pub namespace: String,
    /// Where the service account's pods run; always present, possibly empty
    #[serde(default)]
    pub nodes: Vec<NodePods>,
    /// Cloud IAM identities linked through annotations
    #[serde(
        rename = "providerIAM",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub provider_iam: BTreeMap<String, String>,
    /// Expanded grants
    #[serde(default)]
    pub roles: Vec<ExpandedRole>,
}

/// Node with expanded grants
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedNode {
    /// Node name
    pub name: String,
    /// Expanded grants
    #[serde(default)]
    pub roles: Vec<ExpandedRole>,
    /// Full names of service accounts with pods on this node
    #[serde(default)]
    pub service_accounts: Vec<String>,
}

/// User or group with expanded grants
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandedNamedEntry {
    /// User or group name
    pub name: String,
    /// Expanded grants
    #[serde(default)]
    pub roles: Vec<ExpandedRole>,
}

/// The graph with every grant expanded and no separate role list
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedGraph {
    /// Cluster metadata
    #[serde(default)]
    pub metadata: ClusterMetadata,
    /// Service accounts
    #[serde(default)]
    pub service_accounts: Vec<ExpandedServiceAccount>,
    /// Nodes
    #[serde(default)]
    pub nodes: Vec<ExpandedNode>,
    /// Users
    #[serde(default)]
    pub users: Vec<ExpandedNamedEntry>,
    /// Groups
    #[serde(default)]
    pub groups: Vec<ExpandedNamedEntry>,
}

/// Expand every grant of `graph`.
///
/// A grant whose definition is missing expands with no rules.
pub fn expand(graph: &RbacGraph) -> ExpandedGraph {
    let rules: HashMap<RoleKey<'_>, &[PolicyRule]> = graph
        .roles
        .iter()
        .map(|r| (r.key(), r.rules.as_slice()))
        .collect();

    ExpandedGraph {
        metadata: graph.metadata.clone(),
        service_accounts: graph
            .service_accounts
            .iter()
            .map(|sa| ExpandedServiceAccount {
                name: sa.name.clone(),
                namespace: sa.namespace.clone(),
                nodes: sa.nodes.clone(),
                provider_iam: sa.provider_iam.clone(),
                roles: expand_roles(&sa.roles, &rules),
            })
            .collect(),
        nodes: graph
            .nodes
            .iter()
            .map(|n| ExpandedNode {
                name: n.name.clone(),
                roles: expand_roles(&n.roles, &rules),
                service_accounts: n.service_accounts.clone(),
            })
            .collect(),
        users: graph
            .users
            .iter()
            .map(|u| ExpandedNamedEntry {
                name: u.name.clone(),
                roles: expand_roles(&u.roles, &rules),
            })
            .collect(),
        groups: graph
            .groups
            .iter()
            .map(|g| ExpandedNamedEntry {
                name: g.name.clone(),
                roles: expand_roles(&g.roles, &rules),
            })
            .collect(),
    }
}

fn expand_roles<'a>(
    roles: &'a [RoleRef],
    rules: &HashMap<RoleKey<'a>, &'a [PolicyRule]>,
) -> Vec<ExpandedRole> {
    roles
        .iter()
        .map(|grant| ExpandedRole {
            name: grant.name.clone(),
            effective_namespace: grant.effective_namespace.clone(),
            rules: rules
                .get(&grant.key())
                .map(|r| r.to_vec())
                .unwrap_or_default(),
        })
        .collect()
}

/// Selects a single identity, parsed from `sa=ns:name`, `node=name`,
/// `user=name` or `group=name`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentitySelector {
    /// Service account by namespace and name
    ServiceAccount {
        /// Namespace
        namespace: String,
        /// Name
        name: String,
    },
    /// Node by name
    Node(String),
    /// User by name
    User(String),
    /// Group by name
    Group(String),
}

impl FromStr for IdentitySelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, identity) = s.split_once('=').ok_or_else(|| {
            Error::invalid_config(format!(
                "invalid zoom '{}', expected <type>=<identity>",
                s
            ))
        })?;
        if identity.is_empty() {
            return Err(Error::invalid_config(format!(
                "invalid zoom '{}', identity is empty",
                s
            )));
        }
        match kind {
            "sa" | "serviceaccount" => {
                let (namespace, name) = identity
                    .split_once(':')
                    .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
                    .ok_or_else(|| {
                        Error::invalid_config(format!(
                            "invalid service account '{}', expected <namespace>:<name>",
                            identity
                        ))
                    })?;
                Ok(Self::ServiceAccount {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            "node" => Ok(Self::Node(identity.to_string())),
            "user" => Ok(Self::User(identity.to_string())),
            "group" => Ok(Self::Group(identity.to_string())),
            other => Err(Error::invalid_config(format!(
                "unsupported zoom type '{}', expected 'sa', 'node', 'user' or 'group'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for IdentitySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount { namespace, name } => write!(f, "sa={}:{}", namespace, name),
            Self::Node(name) => write!(f, "node={}", name),
            Self::User(name) => write!(f, "user={}", name),
            Self::Group(name) => write!(f, "group={}", name),
        }
    }
}

/// One expanded identity, borrowed from an [`ExpandedGraph`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExpandedIdentity<'a> {
    /// A service account
    ServiceAccount(&'a ExpandedServiceAccount),
    /// A node
    Node(&'a ExpandedNode),
    /// A user or group
    Named(&'a ExpandedNamedEntry),
}

impl ExpandedGraph {
    /// Find the identity `selector` names
    pub fn find(&self, selector: &IdentitySelector) -> Option<ExpandedIdentity<'_>> {
        match selector {
            IdentitySelector::ServiceAccount { namespace, name } => self
                .service_accounts
                .iter()
                .find(|sa| &sa.namespace == namespace && &sa.name == name)
                .map(ExpandedIdentity::ServiceAccount),
            IdentitySelector::Node(name) => self
                .nodes
                .iter()
                .find(|n| &n.name == name)
                .map(ExpandedIdentity::Node),
            IdentitySelector::User(name) => self
                .users
                .iter()
                .find(|u| &u.name == name)
                .map(ExpandedIdentity::Named),
            IdentitySelector::Group(name) => self
                .groups
                .iter()
                .find(|g| &g.name == name)
                .map(ExpandedIdentity::Named),
        }
    }
}
