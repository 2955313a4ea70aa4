//! Graph construction entry point

use tracing::info;

use crate::catalog::IdentityCatalog;
use crate::config::GraphConfig;
use crate::model::{ClusterMetadata, RbacGraph};
use crate::objects::ClusterObjects;
use crate::resolver::{GrantResolver, ResolveReport};
use crate::rules::{RoleDefinitions, RuleSetCatalog};

/// Build the permission graph from raw objects.
///
/// Namespace scoping and control-plane dropping are applied here so that
/// live collections and snapshots produce the same graph. Never fails; see
/// the returned report for what was skipped.
pub fn build_graph(
    mut objects: ClusterObjects,
    metadata: ClusterMetadata,
    config: &GraphConfig,
) -> (RbacGraph, ResolveReport) {
    if let Some(ns) = config.namespace.as_deref() {
        objects.scope_to_namespace(ns);
    }
    if config.ignore_control_plane {
        objects.drop_control_plane();
    }

    let mut catalog = IdentityCatalog::build(&objects, config);
    let definitions = RoleDefinitions::new(&objects);
    let mut rules = RuleSetCatalog::default();
    let report =
        GrantResolver::new(&definitions, config).resolve(&objects.bindings(), &mut catalog, &mut rules);

    let (service_accounts, nodes, users, groups) = catalog.into_parts();
    let graph = RbacGraph {
        metadata,
        service_accounts,
        nodes,
        users,
        groups,
        roles: rules.into_entries(),
    };

    info!(
        service_accounts = graph.service_accounts.len(),
        nodes = graph.nodes.len(),
        users = graph.users.len(),
        groups = graph.groups.len(),
        roles = graph.roles.len(),
        "built permission graph"
    );
    (graph, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::fixtures::*;

    #[test]
    fn test_empty_objects_build_empty_graph() {
        let (graph, report) = build_graph(
            ClusterObjects::default(),
            ClusterMetadata::default(),
            &GraphConfig::default(),
        );
        assert_eq!(graph, RbacGraph::default());
        assert_eq!(report, ResolveReport::default());
    }

    #[test]
    fn test_control_plane_dropped_before_indexing() {
        let objects = ClusterObjects {
            nodes: vec![control_plane_node("cp"), node("w1")],
            service_accounts: vec![
                service_account("kube-system", "kube-proxy"),
                service_account("kube-system", "etcd"),
            ],
            pods: vec![
                pod("kube-system", "kube-proxy-cp", "kube-proxy", Some("cp")),
                pod("kube-system", "kube-proxy-w1", "kube-proxy", Some("w1")),
                pod("kube-system", "etcd-cp", "etcd", Some("cp")),
            ],
            ..Default::default()
        };
        let config = GraphConfig {
            ignore_control_plane: true,
            ..Default::default()
        };

        let (graph, _) = build_graph(objects, ClusterMetadata::default(), &config);

        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.service_accounts.len(), 1);
        let proxy = &graph.service_accounts[0];
        assert_eq!(proxy.full_name(), "kube-system:kube-proxy");
        assert_eq!(proxy.nodes.len(), 1);
        assert_eq!(proxy.nodes[0].name, "w1");
    }

    #[test]
    fn test_namespace_scope() {
        let objects = ClusterObjects {
            nodes: vec![node("n1")],
            service_accounts: vec![service_account("prod", "api"), service_account("dev", "api")],
            pods: vec![
                pod("prod", "api-1", "api", Some("n1")),
                pod("dev", "api-1", "api", Some("n1")),
            ],
            ..Default::default()
        };
        let config = GraphConfig {
            namespace: Some("dev".to_string()),
            ..Default::default()
        };

        let (graph, _) = build_graph(objects, ClusterMetadata::default(), &config);

        assert_eq!(graph.service_accounts.len(), 1);
        assert_eq!(graph.nodes[0].service_accounts, vec!["dev:api"]);
    }
}
