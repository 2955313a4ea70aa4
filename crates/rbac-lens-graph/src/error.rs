//! Error types for graph construction and views
//!
//! Graph construction degrades by omission: resolver errors are recorded
//! per binding in the [`ResolveReport`](crate::ResolveReport) and never abort
//! a run. Only configuration parsing returns them directly.

use thiserror::Error;

/// Recoverable conditions raised while building or viewing the graph
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A binding points at a role that does not exist
    #[error("binding {binding} references missing {kind} {role}")]
    DanglingRoleRef {
        /// Binding as `namespace/name`, or `name` for cluster-wide bindings
        binding: String,
        /// Referenced role kind
        kind: String,
        /// Referenced role name
        role: String,
    },

    /// A subject that can't be matched as written
    #[error("binding {binding} has malformed subject {subject}: {message}")]
    MalformedSubject {
        /// Binding as `namespace/name`, or `name` for cluster-wide bindings
        binding: String,
        /// Subject as `kind/name`
        subject: String,
        /// Description of what's wrong
        message: String,
    },

    /// Invalid view or graph configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Create a dangling role reference error
    pub fn dangling_role_ref(
        binding: impl Into<String>,
        kind: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self::DanglingRoleRef {
            binding: binding.into(),
            kind: kind.into(),
            role: role.into(),
        }
    }

    /// Create a malformed subject error
    pub fn malformed_subject(
        binding: impl Into<String>,
        subject: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::MalformedSubject {
            binding: binding.into(),
            subject: subject.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_role_ref_message() {
        let err = Error::dangling_role_ref("prod/readers", "Role", "reader");
        assert_eq!(
            err.to_string(),
            "binding prod/readers references missing Role reader"
        );
    }

    #[test]
    fn test_malformed_subject_message() {
        let err = Error::malformed_subject("admins", "ServiceAccount/deployer", "no namespace");
        assert!(err.to_string().contains("ServiceAccount/deployer"));
        assert!(err.to_string().contains("no namespace"));
    }
}
