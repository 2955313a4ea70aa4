//! Identity catalog
//!
//! Owns every identity in the graph. Nodes and service accounts are seeded
//! once from the raw objects; users and groups are created lazily the first
//! time a binding subject names them. Each kind is kept in insertion order
//! and indexed by key.

use std::collections::{BTreeMap, HashMap, HashSet};

use k8s_openapi::api::core::v1::ServiceAccount;
use tracing::debug;

use crate::config::GraphConfig;
use crate::model::{NamedEntry, NodeEntry, RoleRef, ServiceAccountEntry};
use crate::objects::ClusterObjects;
use crate::placement::{PlacementIndex, Workload};

/// Annotation linking a service account to an AWS IAM role
pub const EKS_ROLE_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

/// Annotation linking a service account to a GCP service account
pub const GKE_SA_ANNOTATION: &str = "iam.gke.io/gcp-service-account";

/// Position of an identity in the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityId {
    /// Index into the service account list
    ServiceAccount(usize),
    /// Index into the node list
    Node(usize),
    /// Index into the user list
    User(usize),
    /// Index into the group list
    Group(usize),
}

/// Every identity known to the graph
#[derive(Debug, Default)]
pub struct IdentityCatalog {
    service_accounts: Vec<ServiceAccountEntry>,
    sa_index: HashMap<(String, String), usize>,
    nodes: Vec<NodeEntry>,
    node_index: HashMap<String, usize>,
    users: Vec<NamedEntry>,
    user_index: HashMap<String, usize>,
    groups: Vec<NamedEntry>,
    group_index: HashMap<String, usize>,
}

impl IdentityCatalog {
    /// Seed nodes and service accounts from `objects`.
    ///
    /// Every node becomes an identity. Service accounts are enumerated as
    /// candidates, pods are indexed against them, and a candidate is kept
    /// only if it has pods or `all_service_accounts` is set.
    pub fn build(objects: &ClusterObjects, config: &GraphConfig) -> Self {
        let mut catalog = Self::default();

        for node in &objects.nodes {
            if let Some(name) = node.metadata.name.as_deref() {
                catalog.seed_node(name);
            }
        }

        let mut seen = HashSet::new();
        let candidates: Vec<&ServiceAccount> = objects
            .service_accounts
            .iter()
            .filter(|sa| {
                let key = (
                    sa.metadata.namespace.clone().unwrap_or_default(),
                    sa.metadata.name.clone().unwrap_or_default(),
                );
                seen.insert(key)
            })
            .collect();

        let mut placements = PlacementIndex::build(
            objects
                .pods
                .iter()
                .filter_map(Workload::from_pod)
                .filter(|w| seen.contains(&(w.namespace.to_string(), w.service_account.to_string()))),
        );

        for node in &mut catalog.nodes {
            node.service_accounts = placements.take_service_accounts_on(&node.name);
        }

        let mut skipped = 0usize;
        for sa in candidates {
            let namespace = sa.metadata.namespace.clone().unwrap_or_default();
            let name = sa.metadata.name.clone().unwrap_or_default();
            let nodes = placements.take_placements(&namespace, &name);
            if nodes.is_empty() && !config.all_service_accounts {
                skipped += 1;
                continue;
            }
            catalog.seed_service_account(ServiceAccountEntry {
                name,
                namespace,
                nodes,
                provider_iam: provider_iam(sa),
                roles: vec![],
            });
        }

        debug!(
            nodes = catalog.nodes.len(),
            service_accounts = catalog.service_accounts.len(),
            skipped_service_accounts = skipped,
            "seeded identity catalog"
        );
        catalog
    }

    fn seed_node(&mut self, name: &str) {
        if self.node_index.contains_key(name) {
            return;
        }
        self.node_index.insert(name.to_string(), self.nodes.len());
        self.nodes.push(NodeEntry {
            name: name.to_string(),
            roles: vec![],
            service_accounts: vec![],
        });
    }

    fn seed_service_account(&mut self, entry: ServiceAccountEntry) {
        let key = (entry.namespace.clone(), entry.name.clone());
        if self.sa_index.contains_key(&key) {
            return;
        }
        self.sa_index.insert(key, self.service_accounts.len());
        self.service_accounts.push(entry);
    }

    /// The service account `namespace/name`, if present
    pub fn service_account(&self, namespace: &str, name: &str) -> Option<IdentityId> {
        self.sa_index
            .get(&(namespace.to_string(), name.to_string()))
            .map(|&i| IdentityId::ServiceAccount(i))
    }

    /// Every service account
    pub fn all_service_accounts(&self) -> impl Iterator<Item = IdentityId> + '_ {
        (0..self.service_accounts.len()).map(IdentityId::ServiceAccount)
    }

    /// Every service account in `namespace`
    pub fn service_accounts_in<'a>(
        &'a self,
        namespace: &'a str,
    ) -> impl Iterator<Item = IdentityId> + 'a {
        self.service_accounts
            .iter()
            .enumerate()
            .filter(move |(_, sa)| sa.namespace == namespace)
            .map(|(i, _)| IdentityId::ServiceAccount(i))
    }

    /// The node `name`, if present
    pub fn node(&self, name: &str) -> Option<IdentityId> {
        self.node_index.get(name).map(|&i| IdentityId::Node(i))
    }

    /// Every node
    pub fn all_nodes(&self) -> impl Iterator<Item = IdentityId> + '_ {
        (0..self.nodes.len()).map(IdentityId::Node)
    }

    /// Every identity of every kind
    pub fn all_identities(&self) -> impl Iterator<Item = IdentityId> + '_ {
        self.all_service_accounts()
            .chain(self.all_nodes())
            .chain((0..self.users.len()).map(IdentityId::User))
            .chain((0..self.groups.len()).map(IdentityId::Group))
    }

    /// The user `name`, created on first reference
    pub fn user_or_insert(&mut self, name: &str) -> IdentityId {
        IdentityId::User(named_or_insert(&mut self.users, &mut self.user_index, name))
    }

    /// The group `name`, created on first reference
    pub fn group_or_insert(&mut self, name: &str) -> IdentityId {
        IdentityId::Group(named_or_insert(&mut self.groups, &mut self.group_index, name))
    }

    /// Append a grant to an identity
    pub fn grant(&mut self, id: IdentityId, role: RoleRef) {
        let roles = match id {
            IdentityId::ServiceAccount(i) => &mut self.service_accounts[i].roles,
            IdentityId::Node(i) => &mut self.nodes[i].roles,
            IdentityId::User(i) => &mut self.users[i].roles,
            IdentityId::Group(i) => &mut self.groups[i].roles,
        };
        roles.push(role);
    }

    /// Service accounts, in seed order
    pub fn service_accounts(&self) -> &[ServiceAccountEntry] {
        &self.service_accounts
    }

    /// Nodes, in seed order
    pub fn nodes(&self) -> &[NodeEntry] {
        &self.nodes
    }

    /// Users, in creation order
    pub fn users(&self) -> &[NamedEntry] {
        &self.users
    }

    /// Groups, in creation order
    pub fn groups(&self) -> &[NamedEntry] {
        &self.groups
    }

    /// Consume the catalog into (service accounts, nodes, users, groups)
    pub fn into_parts(
        self,
    ) -> (
        Vec<ServiceAccountEntry>,
        Vec<NodeEntry>,
        Vec<NamedEntry>,
        Vec<NamedEntry>,
    ) {
        (self.service_accounts, self.nodes, self.users, self.groups)
    }
}

fn named_or_insert(
    entries: &mut Vec<NamedEntry>,
    index: &mut HashMap<String, usize>,
    name: &str,
) -> usize {
    if let Some(&i) = index.get(name) {
        return i;
    }
    let i = entries.len();
    entries.push(NamedEntry {
        name: name.to_string(),
        roles: vec![],
    });
    index.insert(name.to_string(), i);
    i
}

/// Cloud IAM identities a service account is linked to through annotations
pub fn provider_iam(sa: &ServiceAccount) -> BTreeMap<String, String> {
    let mut iam = BTreeMap::new();
    let Some(annotations) = sa.metadata.annotations.as_ref() else {
        return iam;
    };
    if let Some(arn) = annotations.get(EKS_ROLE_ANNOTATION) {
        iam.insert("aws".to_string(), arn.clone());
    }
    if let Some(gsa) = annotations.get(GKE_SA_ANNOTATION) {
        iam.insert("gcp".to_string(), gsa.clone());
    }
    iam
}
