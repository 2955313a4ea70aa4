//! Role definitions
//!
//! [`RoleDefinitions`] indexes the raw Roles and ClusterRoles for lookup by
//! binding. [`RuleSetCatalog`] is the deduplicated set of definitions that
//! end up in the graph, populated only as bindings grant them.

use std::collections::{HashMap, HashSet};

use k8s_openapi::api::rbac::v1::{ClusterRole, Role};

use crate::model::RoleEntry;
use crate::objects::{Binding, ClusterObjects, RoleKind};

/// Raw role definitions indexed by key. The first definition with a given
/// key wins.
#[derive(Debug, Default)]
pub struct RoleDefinitions<'a> {
    cluster_roles: HashMap<&'a str, &'a ClusterRole>,
    roles: HashMap<(String, String), &'a Role>,
}

impl<'a> RoleDefinitions<'a> {
    /// Index the Roles and ClusterRoles of `objects`
    pub fn new(objects: &'a ClusterObjects) -> Self {
        let mut defs = Self::default();
        for cr in &objects.cluster_roles {
            if let Some(name) = cr.metadata.name.as_deref() {
                defs.cluster_roles.entry(name).or_insert(cr);
            }
        }
        for role in &objects.roles {
            if let (Some(ns), Some(name)) = (
                role.metadata.namespace.as_deref(),
                role.metadata.name.as_deref(),
            ) {
                defs.roles
                    .entry((ns.to_string(), name.to_string()))
                    .or_insert(role);
            }
        }
        defs
    }

    /// Whether the definition a binding references exists
    pub fn exists(&self, binding: &Binding) -> bool {
        match &binding.role_kind {
            RoleKind::ClusterRole => self.cluster_roles.contains_key(binding.role_name.as_str()),
            RoleKind::Role => binding.namespace.as_ref().is_some_and(|ns| {
                self.roles
                    .contains_key(&(ns.clone(), binding.role_name.clone()))
            }),
            RoleKind::Unknown(_) => false,
        }
    }

    /// Find the definition a binding references.
    ///
    /// A `Role` reference resolves in the binding's own namespace, so
    /// cluster-wide bindings can never reference one.
    pub fn resolve(&self, binding: &Binding) -> Option<RoleEntry> {
        match &binding.role_kind {
            RoleKind::ClusterRole => {
                let cr = self.cluster_roles.get(binding.role_name.as_str())?;
                Some(RoleEntry {
                    name: binding.role_name.clone(),
                    namespace: None,
                    rules: cr.rules.clone().unwrap_or_default(),
                })
            }
            RoleKind::Role => {
                let ns = binding.namespace.as_deref()?;
                let role = self
                    .roles
                    .get(&(ns.to_string(), binding.role_name.clone()))?;
                Some(RoleEntry {
                    name: binding.role_name.clone(),
                    namespace: Some(ns.to_string()),
                    rules: role.rules.clone().unwrap_or_default(),
                })
            }
            RoleKind::Unknown(_) => None,
        }
    }
}

/// Deduplicated role definitions, unique by (name, defining namespace)
#[derive(Debug, Default)]
pub struct RuleSetCatalog {
    entries: Vec<RoleEntry>,
    keys: HashSet<(String, Option<String>)>,
}

impl RuleSetCatalog {
    /// Add `entry` unless one with the same key exists. Returns whether it
    /// was added.
    pub fn upsert(&mut self, entry: RoleEntry) -> bool {
        if !self.keys.insert((entry.name.clone(), entry.namespace.clone())) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Whether a definition with this key is present
    pub fn contains(&self, name: &str, namespace: Option<&str>) -> bool {
        self.keys
            .contains(&(name.to_string(), namespace.map(String::from)))
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Definitions, in insertion order
    pub fn into_entries(self) -> Vec<RoleEntry> {
        self.entries
    }
}
