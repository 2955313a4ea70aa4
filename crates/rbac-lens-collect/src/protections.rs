//! Protection discovery
//!
//! Best-effort detection of control-plane settings that blunt certain
//! escalation paths. Policies read the result from `metadata.features`.
//! The NodeRestriction check impersonates a node and issues a dry-run
//! create, which changes nothing but may show up in audit logs.

use rbac_lens_graph::{ClusterMetadata, ClusterObjects, GraphConfig};
use tracing::info;

use crate::metadata::version_at_least;
use crate::source::ObjectSource;

/// Service account tokens are no longer stored as secrets
pub const LEGACY_TOKEN_SECRETS_REDUCTED: &str = "LegacyTokenSecretsReducted";

/// The NodeRestriction admission plugin is enabled
pub const NODE_RESTRICTION: &str = "NodeRestriction";

/// NodeRestriction as of 1.17, which also restricts node labels
pub const NODE_RESTRICTION_1_17: &str = "NodeRestriction1.17";

/// Service account sampled for auto-generated token secrets
const TOKEN_SAMPLE: (&str, &str) = ("kube-system", "replicaset-controller");

/// Whether the sampled controller service account has no token secrets.
/// `false` when the sample wasn't collected.
pub fn legacy_token_secrets_reducted(objects: &ClusterObjects) -> bool {
    let (namespace, name) = TOKEN_SAMPLE;
    objects
        .service_accounts
        .iter()
        .find(|sa| {
            sa.metadata.namespace.as_deref() == Some(namespace)
                && sa.metadata.name.as_deref() == Some(name)
        })
        .is_some_and(|sa| sa.secrets.as_ref().map_or(true, |s| s.is_empty()))
}

/// Discover protections and return their feature names.
///
/// NodeRestriction only applies to the node authorizer's per-node
/// credentials, so it isn't checked when a shared node user is configured.
pub async fn discover(
    source: &dyn ObjectSource,
    objects: &ClusterObjects,
    metadata: &ClusterMetadata,
    config: &GraphConfig,
) -> Vec<String> {
    let mut features = Vec::new();

    if legacy_token_secrets_reducted(objects) {
        features.push(LEGACY_TOKEN_SECRETS_REDUCTED.to_string());
    }

    let first_node = objects
        .nodes
        .first()
        .and_then(|n| n.metadata.name.as_deref());
    if let (None, Some(node)) = (config.node_user.as_deref(), first_node) {
        if source.node_restriction_enabled(node).await {
            features.push(NODE_RESTRICTION.to_string());
            if version_at_least(&metadata.version, 1, 17) {
                features.push(NODE_RESTRICTION_1_17.to_string());
            }
        }
    }

    info!(features = ?features, "discovered protections");
    features
}
