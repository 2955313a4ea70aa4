//! Raw Kubernetes objects the graph is built from
//!
//! The collector fills a [`ClusterObjects`] either from a live API server or
//! from a snapshot directory; the graph doesn't care which. Bindings of both
//! scopes are normalized into [`Binding`] before resolution.

use k8s_openapi::api::core::v1::{Node, Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, Role, RoleBinding, Subject as K8sSubject,
};
use serde::{Deserialize, Serialize};

/// Node labels that mark a control-plane node
pub const CONTROL_PLANE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Whether `node` carries a control-plane role label
pub fn is_control_plane(node: &Node) -> bool {
    node.metadata
        .labels
        .as_ref()
        .is_some_and(|labels| CONTROL_PLANE_LABELS.iter().any(|l| labels.contains_key(*l)))
}

/// Every raw object the graph needs, as plain in-memory lists
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterObjects {
    /// Pods (only name, namespace, service account and node are used)
    #[serde(default)]
    pub pods: Vec<Pod>,
    /// Nodes
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Service accounts
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccount>,
    /// Namespaced roles
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Cluster roles
    #[serde(default)]
    pub cluster_roles: Vec<ClusterRole>,
    /// Namespaced role bindings
    #[serde(default)]
    pub role_bindings: Vec<RoleBinding>,
    /// Cluster role bindings
    #[serde(default)]
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
}

impl ClusterObjects {
    /// Drop pods and service accounts outside `namespace`
    pub fn scope_to_namespace(&mut self, namespace: &str) {
        self.pods
            .retain(|p| p.metadata.namespace.as_deref() == Some(namespace));
        self.service_accounts
            .retain(|sa| sa.metadata.namespace.as_deref() == Some(namespace));
    }

    /// Drop control-plane nodes, then every pod scheduled on a node that is
    /// no longer present. Unscheduled pods are kept.
    pub fn drop_control_plane(&mut self) {
        self.nodes.retain(|n| !is_control_plane(n));

        let nodes = &self.nodes;
        self.pods.retain(|pod| {
            match pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) {
                None | Some("") => true,
                Some(host) => nodes
                    .iter()
                    .any(|n| n.metadata.name.as_deref() == Some(host)),
            }
        });
    }

    /// All bindings in resolution order: namespaced first, then cluster-wide
    pub fn bindings(&self) -> Vec<Binding> {
        self.role_bindings
            .iter()
            .map(Binding::from_role_binding)
            .chain(
                self.cluster_role_bindings
                    .iter()
                    .map(Binding::from_cluster_role_binding),
            )
            .collect()
    }
}

/// Kind of role a binding references
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleKind {
    /// Cluster-wide definition
    ClusterRole,
    /// Namespaced definition
    Role,
    /// Anything else; never resolves
    Unknown(String),
}

impl RoleKind {
    /// Parse a `roleRef.kind`
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "ClusterRole" => Self::ClusterRole,
            "Role" => Self::Role,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The Kubernetes kind string
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClusterRole => "ClusterRole",
            Self::Role => "Role",
            Self::Unknown(kind) => kind,
        }
    }
}

/// Kind of a binding subject
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubjectKind {
    /// `ServiceAccount`
    ServiceAccount,
    /// `User`
    User,
    /// `Group`
    Group,
    /// Anything else; never matches
    Unknown(String),
}

impl SubjectKind {
    /// Parse a `subjects[].kind`
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "ServiceAccount" => Self::ServiceAccount,
            "User" => Self::User,
            "Group" => Self::Group,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A binding subject
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    /// Subject kind
    pub kind: SubjectKind,
    /// Subject name
    pub name: String,
    /// Explicit namespace (service accounts only)
    pub namespace: Option<String>,
}

impl Subject {
    fn from_k8s(subject: &K8sSubject) -> Self {
        Self {
            kind: SubjectKind::from_kind(&subject.kind),
            name: subject.name.clone(),
            namespace: subject.namespace.clone().filter(|ns| !ns.is_empty()),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            SubjectKind::ServiceAccount => "ServiceAccount",
            SubjectKind::User => "User",
            SubjectKind::Group => "Group",
            SubjectKind::Unknown(kind) => kind.as_str(),
        };
        write!(f, "{}/{}", kind, self.name)
    }
}

/// A RoleBinding or ClusterRoleBinding, normalized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Binding name
    pub name: String,
    /// Referenced role name
    pub role_name: String,
    /// Referenced role kind
    pub role_kind: RoleKind,
    /// Binding namespace; `None` for ClusterRoleBindings
    pub namespace: Option<String>,
    /// Subjects, in declaration order
    pub subjects: Vec<Subject>,
}

impl Binding {
    /// Normalize a RoleBinding
    pub fn from_role_binding(rb: &RoleBinding) -> Self {
        Self {
            name: rb.metadata.name.clone().unwrap_or_default(),
            role_name: rb.role_ref.name.clone(),
            role_kind: RoleKind::from_kind(&rb.role_ref.kind),
            namespace: rb.metadata.namespace.clone().filter(|ns| !ns.is_empty()),
            subjects: subjects_of(rb.subjects.as_deref()),
        }
    }

    /// Normalize a ClusterRoleBinding
    pub fn from_cluster_role_binding(crb: &ClusterRoleBinding) -> Self {
        Self {
            name: crb.metadata.name.clone().unwrap_or_default(),
            role_name: crb.role_ref.name.clone(),
            role_kind: RoleKind::from_kind(&crb.role_ref.kind),
            namespace: None,
            subjects: subjects_of(crb.subjects.as_deref()),
        }
    }

    /// `namespace/name` or `name`, for diagnostics
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

fn subjects_of(subjects: Option<&[K8sSubject]>) -> Vec<Subject> {
    subjects
        .unwrap_or_default()
        .iter()
        .map(Subject::from_k8s)
        .collect()
}
