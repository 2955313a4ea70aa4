//! Grant resolver
//!
//! Walks every binding in order, matches its subjects against the identity
//! catalog, and appends a grant to each matched identity. A role definition
//! enters the [`RuleSetCatalog`] only once some binding actually grants it to
//! an identity in the graph.
//!
//! # Subject matching
//!
//! | Subject | Matches |
//! |---------|---------|
//! | `ServiceAccount` | the service account (namespace defaults to the binding's) |
//! | `Group system:authenticated` | every identity of every kind |
//! | `Group system:serviceaccounts` | every service account |
//! | `Group system:serviceaccounts:<ns>` | every service account in `<ns>` |
//! | `Group <node group>` | every node |
//! | `Group system:masters` | nothing |
//! | `User <node user>` (override set) | every node |
//! | `User system:node:<n>` (no override) | node `<n>` |
//! | any other `User` / `Group` | that user / group |
//!
//! Users and groups named by any resolvable binding are registered before
//! the first grant, so `system:authenticated` reaches them regardless of
//! binding order.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::catalog::{IdentityCatalog, IdentityId};
use crate::config::GraphConfig;
use crate::error::Error;
use crate::model::{RoleEntry, RoleRef};
use crate::objects::{Binding, RoleKind, Subject, SubjectKind};
use crate::rules::{RoleDefinitions, RuleSetCatalog};
use crate::{
    ALL_AUTHENTICATED_GROUP, ALL_SERVICE_ACCOUNTS_GROUP, NODE_USER_PREFIX, SUPERUSER_GROUP,
};

/// What a single subject resolves to, before identities are enumerated
#[derive(Clone, Debug, PartialEq, Eq)]
enum SubjectTarget {
    ServiceAccount { namespace: String, name: String },
    AllIdentities,
    AllServiceAccounts,
    ServiceAccountsIn(String),
    AllNodes,
    Node(String),
    User(String),
    Group(String),
    Nothing,
}

/// Outcome of a resolution pass. Every omission is counted; the conditions
/// worth a closer look are kept as diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Bindings examined
    pub bindings: usize,
    /// Bindings whose role doesn't exist
    pub dangling: usize,
    /// Bindings that resolved but matched no identity
    pub unmatched: usize,
    /// Grants appended across all identities
    pub grants: usize,
    /// Per-binding problems, in encounter order
    pub diagnostics: Vec<Error>,
}

impl ResolveReport {
    /// Number of malformed subjects encountered
    pub fn malformed_subjects(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Error::MalformedSubject { .. }))
            .count()
    }
}

/// Resolves bindings into grants
pub struct GrantResolver<'a> {
    definitions: &'a RoleDefinitions<'a>,
    config: &'a GraphConfig,
}

impl<'a> GrantResolver<'a> {
    /// Create a resolver over the given role definitions
    pub fn new(definitions: &'a RoleDefinitions<'a>, config: &'a GraphConfig) -> Self {
        Self {
            definitions,
            config,
        }
    }

    /// Resolve every binding in order, writing grants into `catalog` and
    /// granted definitions into `rules`
    pub fn resolve(
        &self,
        bindings: &[Binding],
        catalog: &mut IdentityCatalog,
        rules: &mut RuleSetCatalog,
    ) -> ResolveReport {
        self.register_named_subjects(bindings, catalog);

        let mut report = ResolveReport::default();
        for binding in bindings {
            self.resolve_binding(binding, catalog, rules, &mut report);
        }

        debug!(
            bindings = report.bindings,
            dangling = report.dangling,
            unmatched = report.unmatched,
            malformed_subjects = report.malformed_subjects(),
            grants = report.grants,
            roles = rules.len(),
            "resolved bindings"
        );
        report
    }

    /// Create every user and group a binding to an existing role names, in
    /// binding order
    fn register_named_subjects(&self, bindings: &[Binding], catalog: &mut IdentityCatalog) {
        for binding in bindings.iter().filter(|b| self.definitions.exists(b)) {
            for subject in &binding.subjects {
                match self.target(binding, subject) {
                    Ok(SubjectTarget::User(name)) => {
                        catalog.user_or_insert(&name);
                    }
                    Ok(SubjectTarget::Group(name)) => {
                        catalog.group_or_insert(&name);
                    }
                    _ => {}
                }
            }
        }
    }

    fn resolve_binding(
        &self,
        binding: &Binding,
        catalog: &mut IdentityCatalog,
        rules: &mut RuleSetCatalog,
        report: &mut ResolveReport,
    ) {
        report.bindings += 1;

        let Some(role) = self.definitions.resolve(binding) else {
            debug!(
                binding = %binding.display_name(),
                kind = binding.role_kind.as_str(),
                role = %binding.role_name,
                "skipping binding to missing role"
            );
            report.dangling += 1;
            report.diagnostics.push(Error::dangling_role_ref(
                binding.display_name(),
                binding.role_kind.as_str(),
                &binding.role_name,
            ));
            return;
        };

        let grant = RoleRef {
            name: role.name.clone(),
            namespace: role.namespace.clone(),
            effective_namespace: effective_namespace(binding, &role),
        };

        // An identity named by several subjects of one binding gets one grant
        let mut matched = BTreeSet::new();
        for subject in &binding.subjects {
            match self.target(binding, subject) {
                Ok(target) => matched.extend(identities(&target, catalog)),
                Err(err) => {
                    warn!(error = %err, "skipping subject");
                    report.diagnostics.push(err);
                }
            }
        }

        if matched.is_empty() {
            report.unmatched += 1;
            return;
        }

        report.grants += matched.len();
        for id in matched {
            catalog.grant(id, grant.clone());
        }
        rules.upsert(role);
    }

    fn target(&self, binding: &Binding, subject: &Subject) -> Result<SubjectTarget, Error> {
        let name = subject.name.as_str();
        let target = match &subject.kind {
            SubjectKind::ServiceAccount => {
                let namespace = subject
                    .namespace
                    .as_deref()
                    .or(binding.namespace.as_deref())
                    .ok_or_else(|| {
                        Error::malformed_subject(
                            binding.display_name(),
                            subject.to_string(),
                            "service account subject has no namespace and the binding is cluster-wide",
                        )
                    })?;
                SubjectTarget::ServiceAccount {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
            }
            SubjectKind::Group => self.group_target(name),
            SubjectKind::User => self.user_target(name),
            SubjectKind::Unknown(_) => SubjectTarget::Nothing,
        };
        Ok(target)
    }

    fn group_target(&self, name: &str) -> SubjectTarget {
        if name == ALL_AUTHENTICATED_GROUP {
            return SubjectTarget::AllIdentities;
        }
        if name == ALL_SERVICE_ACCOUNTS_GROUP {
            return SubjectTarget::AllServiceAccounts;
        }
        if let Some(ns) = name
            .strip_prefix(ALL_SERVICE_ACCOUNTS_GROUP)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return SubjectTarget::ServiceAccountsIn(ns.to_string());
        }
        if self.config.is_node_group(name) {
            return SubjectTarget::AllNodes;
        }
        if name == SUPERUSER_GROUP {
            return SubjectTarget::Nothing;
        }
        SubjectTarget::Group(name.to_string())
    }

    fn user_target(&self, name: &str) -> SubjectTarget {
        match self.config.node_user.as_deref() {
            Some(node_user) if name == node_user => SubjectTarget::AllNodes,
            Some(_) => SubjectTarget::User(name.to_string()),
            None => match name.strip_prefix(NODE_USER_PREFIX) {
                Some(node) => SubjectTarget::Node(node.to_string()),
                None => SubjectTarget::User(name.to_string()),
            },
        }
    }
}

/// Namespace a grant applies in: the binding's namespace for namespaced
/// bindings (equal to the role's own namespace for Roles), cluster-wide
/// otherwise
fn effective_namespace(binding: &Binding, role: &RoleEntry) -> Option<String> {
    match binding.role_kind {
        RoleKind::Role => role.namespace.clone(),
        _ => binding.namespace.clone(),
    }
}

fn identities(target: &SubjectTarget, catalog: &mut IdentityCatalog) -> Vec<IdentityId> {
    match target {
        SubjectTarget::ServiceAccount { namespace, name } => {
            catalog.service_account(namespace, name).into_iter().collect()
        }
        SubjectTarget::AllIdentities => catalog.all_identities().collect(),
        SubjectTarget::AllServiceAccounts => catalog.all_service_accounts().collect(),
        SubjectTarget::ServiceAccountsIn(ns) => catalog.service_accounts_in(ns).collect(),
        SubjectTarget::AllNodes => catalog.all_nodes().collect(),
        // A node credential for a node outside the graph is not a user
        SubjectTarget::Node(name) => catalog.node(name).into_iter().collect(),
        SubjectTarget::User(name) => vec![catalog.user_or_insert(name)],
        SubjectTarget::Group(name) => vec![catalog.group_or_insert(name)],
        SubjectTarget::Nothing => vec![],
    }
}
