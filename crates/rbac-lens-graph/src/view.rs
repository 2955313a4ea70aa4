//! Post-build views over the graph
//!
//! Each filter mutates the graph in place. [`apply`] runs them in order and
//! finishes with [`purge_dangling_roles`], so every grant still references a
//! role in `roles` and every role is referenced by some grant.

use std::collections::HashSet;
use std::str::FromStr;

use tracing::debug;

use crate::error::Error;
use crate::model::RbacGraph;

/// Violation categories a consumer is interested in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViolationTypes {
    /// Service account violations
    pub service_accounts: bool,
    /// Node violations
    pub nodes: bool,
    /// Violations combining a node with the service accounts it hosts
    pub combined: bool,
    /// User violations
    pub users: bool,
    /// Group violations
    pub groups: bool,
}

impl Default for ViolationTypes {
    fn default() -> Self {
        Self {
            service_accounts: true,
            nodes: true,
            combined: true,
            users: false,
            groups: false,
        }
    }
}

impl ViolationTypes {
    /// Every category enabled
    pub fn all() -> Self {
        Self {
            service_accounts: true,
            nodes: true,
            combined: true,
            users: true,
            groups: true,
        }
    }

    /// No category enabled
    pub fn none() -> Self {
        Self {
            service_accounts: false,
            nodes: false,
            combined: false,
            users: false,
            groups: false,
        }
    }

    /// Whether any category is enabled
    pub fn any(&self) -> bool {
        self.service_accounts || self.nodes || self.combined || self.users || self.groups
    }

    /// Parse a list of names: `sa`/`sas`, `node`/`nodes`, `combined`,
    /// `user`/`users`, `group`/`groups`, or `all`
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, Error> {
        let mut types = Self::none();
        for name in names {
            match name.as_ref() {
                "all" => return Ok(Self::all()),
                "sa" | "sas" => types.service_accounts = true,
                "node" | "nodes" => types.nodes = true,
                "combined" => types.combined = true,
                "user" | "users" => types.users = true,
                "group" | "groups" => types.groups = true,
                other => {
                    return Err(Error::invalid_config(format!(
                        "unrecognized violation type '{}', supported types are 'sa', 'node', 'combined', 'user', 'group' or 'all'",
                        other
                    )))
                }
            }
        }
        if !types.any() {
            return Err(Error::invalid_config("cannot disable all violation types"));
        }
        Ok(types)
    }
}

impl FromStr for ViolationTypes {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
        Self::from_names(&names)
    }
}

/// Which views to apply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewConfig {
    /// Categories to keep identities for
    pub violation_types: ViolationTypes,
    /// Keep only service accounts present on every node
    pub only_service_accounts_on_all_nodes: bool,
    /// Namespaces whose service accounts are dropped
    pub ignored_namespaces: Vec<String>,
}

/// Apply every configured view, then purge roles no grant references
pub fn apply(graph: &mut RbacGraph, config: &ViewConfig) {
    remove_excluded_identities(graph, &config.violation_types);
    if config.only_service_accounts_on_all_nodes {
        retain_service_accounts_on_all_nodes(graph);
    }
    if !config.ignored_namespaces.is_empty() {
        ignore_namespaces(graph, &config.ignored_namespaces);
    }
    purge_dangling_roles(graph);
}

/// Clear identity lists whose category is disabled. Service accounts and
/// nodes are kept whenever combined violations are requested.
pub fn remove_excluded_identities(graph: &mut RbacGraph, types: &ViolationTypes) {
    if !types.combined {
        if !types.service_accounts {
            graph.service_accounts.clear();
        }
        if !types.nodes {
            graph.nodes.clear();
        }
    }
    if !types.users {
        graph.users.clear();
    }
    if !types.groups {
        graph.groups.clear();
    }
}

/// Keep only service accounts with pods on at least as many distinct nodes
/// as the graph has. Unscheduled pods don't count.
pub fn retain_service_accounts_on_all_nodes(graph: &mut RbacGraph) {
    let node_count = graph.nodes.len();
    let before = graph.service_accounts.len();
    graph
        .service_accounts
        .retain(|sa| sa.scheduled_node_count() >= node_count);
    debug!(
        nodes = node_count,
        dropped = before - graph.service_accounts.len(),
        "kept service accounts present on all nodes"
    );
}

/// Drop service accounts in `namespaces` and scrub them from every node's
/// service account list. Nodes themselves are kept.
pub fn ignore_namespaces<S: AsRef<str>>(graph: &mut RbacGraph, namespaces: &[S]) {
    let ignored: HashSet<&str> = namespaces.iter().map(AsRef::as_ref).collect();

    graph
        .service_accounts
        .retain(|sa| !ignored.contains(sa.namespace.as_str()));

    for node in &mut graph.nodes {
        node.service_accounts.retain(|full_name| {
            let namespace = full_name.split_once(':').map_or(full_name.as_str(), |(ns, _)| ns);
            !ignored.contains(namespace)
        });
    }
}

/// Remove roles that no surviving grant references. Returns how many were
/// removed.
pub fn purge_dangling_roles(graph: &mut RbacGraph) -> usize {
    let referenced: HashSet<(String, Option<String>)> = graph
        .grants()
        .map(|g| (g.name.clone(), g.namespace.clone()))
        .collect();

    let before = graph.roles.len();
    graph
        .roles
        .retain(|r| referenced.contains(&(r.name.clone(), r.namespace.clone())));
    let purged = before - graph.roles.len();
    if purged > 0 {
        debug!(purged, remaining = graph.roles.len(), "purged dangling roles");
    }
    purged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NamedEntry, NodeEntry, NodePods, RoleEntry, RoleRef, ServiceAccountEntry};

    fn grant(name: &str, ns: Option<&str>, effective: Option<&str>) -> RoleRef {
        RoleRef {
            name: name.to_string(),
            namespace: ns.map(String::from),
            effective_namespace: effective.map(String::from),
        }
    }

    fn role(name: &str, ns: Option<&str>) -> RoleEntry {
        RoleEntry {
            name: name.to_string(),
            namespace: ns.map(String::from),
            rules: vec![],
        }
    }

    fn sa(ns: &str, name: &str, nodes: &[&str], roles: Vec<RoleRef>) -> ServiceAccountEntry {
        ServiceAccountEntry {
            name: name.to_string(),
            namespace: ns.to_string(),
            nodes: nodes
                .iter()
                .map(|n| NodePods {
                    name: n.to_string(),
                    pods: vec![format!("{}-pod", name)],
                })
                .collect(),
            roles,
            ..Default::default()
        }
    }

    fn node(name: &str, sas: &[&str]) -> NodeEntry {
        NodeEntry {
            name: name.to_string(),
            roles: vec![],
            service_accounts: sas.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn named(name: &str, roles: Vec<RoleRef>) -> NamedEntry {
        NamedEntry {
            name: name.to_string(),
            roles,
        }
    }

    #[test]
    fn test_violation_types_from_names() {
        let types = ViolationTypes::from_names(&["sa", "groups"]).unwrap();
        assert!(types.service_accounts && types.groups);
        assert!(!types.nodes && !types.users && !types.combined);

        assert_eq!(
            ViolationTypes::from_names(&["node", "all"]).unwrap(),
            ViolationTypes::all()
        );
        assert!(ViolationTypes::from_names(&["pods"]).is_err());
        assert!(ViolationTypes::from_names::<&str>(&[]).is_err());
    }

    #[test]
    fn test_violation_types_from_str() {
        let types: ViolationTypes = "sa, node,combined".parse().unwrap();
        assert_eq!(types, ViolationTypes::default());
    }

    #[test]
    fn test_remove_excluded_identities() {
        let mut graph = RbacGraph {
            service_accounts: vec![sa("prod", "api", &["n1"], vec![])],
            nodes: vec![node("n1", &[])],
            users: vec![named("alice", vec![])],
            groups: vec![named("devs", vec![])],
            ..Default::default()
        };

        let types = ViolationTypes::from_names(&["user"]).unwrap();
        remove_excluded_identities(&mut graph, &types);

        assert!(graph.service_accounts.is_empty());
        assert!(graph.nodes.is_empty());
        assert_eq!(graph.users.len(), 1);
        assert!(graph.groups.is_empty());
    }

    #[test]
    fn test_combined_keeps_service_accounts_and_nodes() {
        let mut graph = RbacGraph {
            service_accounts: vec![sa("prod", "api", &["n1"], vec![])],
            nodes: vec![node("n1", &[])],
            ..Default::default()
        };

        let types = ViolationTypes::from_names(&["combined"]).unwrap();
        remove_excluded_identities(&mut graph, &types);

        assert_eq!(graph.service_accounts.len(), 1);
        assert_eq!(graph.nodes.len(), 1);
    }

    #[test]
    fn test_on_all_nodes_with_two_nodes() {
        let mut graph = RbacGraph {
            service_accounts: vec![sa("kube-system", "proxy", &["a", "b"], vec![])],
            nodes: vec![node("a", &[]), node("b", &[])],
            ..Default::default()
        };

        retain_service_accounts_on_all_nodes(&mut graph);
        assert_eq!(graph.service_accounts.len(), 1);
    }

    #[test]
    fn test_on_all_nodes_excludes_when_node_missing() {
        let mut graph = RbacGraph {
            service_accounts: vec![sa("kube-system", "proxy", &["a", "b"], vec![])],
            nodes: vec![node("a", &[]), node("b", &[]), node("c", &[])],
            ..Default::default()
        };

        retain_service_accounts_on_all_nodes(&mut graph);
        assert!(graph.service_accounts.is_empty());
    }

    #[test]
    fn test_on_all_nodes_ignores_unscheduled_bucket() {
        let mut graph = RbacGraph {
            service_accounts: vec![sa("prod", "job", &["a", ""], vec![])],
            nodes: vec![node("a", &[]), node("b", &[])],
            ..Default::default()
        };

        retain_service_accounts_on_all_nodes(&mut graph);
        assert!(graph.service_accounts.is_empty());
    }

    #[test]
    fn test_ignore_namespaces() {
        let mut graph = RbacGraph {
            service_accounts: vec![
                sa("kube-system", "coredns", &["n1"], vec![]),
                sa("kube-systemd", "agent", &["n1"], vec![]),
                sa("prod", "api", &["n1"], vec![]),
            ],
            nodes: vec![
                node(
                    "n1",
                    &["kube-system:coredns", "kube-systemd:agent", "prod:api"],
                ),
                node("n2", &["kube-system:coredns"]),
            ],
            ..Default::default()
        };

        ignore_namespaces(&mut graph, &["kube-system"]);

        let names: Vec<_> = graph.service_accounts.iter().map(|s| s.full_name()).collect();
        assert_eq!(names, vec!["kube-systemd:agent", "prod:api"]);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            graph.nodes[0].service_accounts,
            vec!["kube-systemd:agent", "prod:api"]
        );
        assert!(graph.nodes[1].service_accounts.is_empty());
    }

    #[test]
    fn test_purge_dangling_roles() {
        let mut graph = RbacGraph {
            service_accounts: vec![sa(
                "prod",
                "api",
                &["n1"],
                vec![grant("reader", Some("prod"), Some("prod"))],
            )],
            groups: vec![named("devs", vec![grant("view", None, Some("dev"))])],
            roles: vec![
                role("reader", Some("prod")),
                role("reader", None),
                role("view", None),
                role("edit", None),
            ],
            ..Default::default()
        };

        assert_eq!(purge_dangling_roles(&mut graph), 2);
        assert_eq!(graph.roles, vec![role("reader", Some("prod")), role("view", None)]);

        // idempotent
        let snapshot = graph.clone();
        assert_eq!(purge_dangling_roles(&mut graph), 0);
        assert_eq!(graph, snapshot);
    }

    #[test]
    fn test_apply_order_purges_after_filters() {
        let mut graph = RbacGraph {
            service_accounts: vec![
                sa("kube-system", "coredns", &["n1"], vec![grant("dns", None, None)]),
                sa("prod", "api", &["n1"], vec![grant("view", None, None)]),
            ],
            nodes: vec![node("n1", &["kube-system:coredns", "prod:api"])],
            users: vec![named("alice", vec![grant("edit", None, None)])],
            roles: vec![role("dns", None), role("view", None), role("edit", None)],
            ..Default::default()
        };
        let config = ViewConfig {
            ignored_namespaces: vec!["kube-system".to_string()],
            ..Default::default()
        };

        apply(&mut graph, &config);

        assert!(graph.users.is_empty());
        assert_eq!(graph.service_accounts.len(), 1);
        assert_eq!(graph.roles, vec![role("view", None)]);
        for grant in graph.grants() {
            assert!(graph.role(&grant.name, grant.namespace.as_deref()).is_some());
        }
    }
}
