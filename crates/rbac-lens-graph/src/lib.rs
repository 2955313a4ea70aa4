//! Permission graph for Kubernetes RBAC audits
//!
//! Resolves raw RBAC objects (roles, bindings, service accounts, nodes,
//! pods) into a per-identity view of "who can do what, and through which
//! role". Rule payloads are carried through unchanged and never interpreted.
//!
//! # Pipeline
//!
//! ```text
//! ClusterObjects ──► IdentityCatalog ──► GrantResolver ──► RbacGraph ──► view / expand
//!                    (+ placement)       (+ RuleSetCatalog)
//! ```
//!
//! Construction never fails: dangling role references and malformed
//! subjects are skipped and recorded in the [`ResolveReport`].

#![deny(missing_docs)]

pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod expand;
pub mod model;
pub mod objects;
pub mod placement;
pub mod resolver;
pub mod rules;
pub mod view;

pub use builder::build_graph;
pub use config::GraphConfig;
pub use error::Error;
pub use expand::{expand, ExpandedGraph, ExpandedIdentity, IdentitySelector};
pub use model::{
    full_name, ClusterMetadata, ClusterVersion, NamedEntry, NodeEntry, NodePods, RbacGraph,
    RoleEntry, RoleRef, ServiceAccountEntry, UNSCHEDULED,
};
pub use objects::ClusterObjects;
pub use resolver::ResolveReport;
pub use view::{ViewConfig, ViolationTypes};

/// Result type alias using the graph Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Group every authenticated identity belongs to
pub const ALL_AUTHENTICATED_GROUP: &str = "system:authenticated";

/// Group every service account belongs to
pub const ALL_SERVICE_ACCOUNTS_GROUP: &str = "system:serviceaccounts";

/// Superuser group; its grants are deliberately left out of the graph
pub const SUPERUSER_GROUP: &str = "system:masters";

/// Default group node credentials belong to
pub const DEFAULT_NODE_GROUP: &str = "system:nodes";

/// Username prefix the node authorizer assigns to kubelet credentials
pub const NODE_USER_PREFIX: &str = "system:node:";
