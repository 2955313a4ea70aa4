//! Error types for policy evaluation
//!
//! Errors about a single policy are counted in the summary and evaluation
//! moves on. Only discovery and input errors abort a run.

use std::path::PathBuf;

use thiserror::Error;

/// Evaluation errors
#[derive(Debug, Error)]
pub enum Error {
    /// Reading a policy or library file failed
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// Walking a policy directory failed
    #[error("failed to walk {path}: {message}")]
    Walk {
        /// Directory being walked
        path: PathBuf,
        /// Description of what failed
        message: String,
    },

    /// No `.rego` files under the policy path
    #[error("no policy files with a '.rego' suffix under {path}")]
    NoPolicies {
        /// Policy path
        path: PathBuf,
    },

    /// The policy runtime rejected a policy or failed to evaluate it
    #[error("policy {policy}: {message}")]
    Runtime {
        /// Policy file
        policy: String,
        /// Description of what failed
        message: String,
    },

    /// A `main` result has no `violations` field, or it has the wrong shape
    #[error("policy {policy}: malformed violations: {message}")]
    MalformedViolations {
        /// Policy file
        policy: String,
        /// Description of what's invalid
        message: String,
    },

    /// Unknown severity name
    #[error("invalid severity '{value}', expected Low, Medium, High or Critical")]
    InvalidSeverity {
        /// The rejected value
        value: String,
    },

    /// Serializing the graph for the runtime failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a runtime error for `policy`
    pub fn runtime(policy: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Runtime {
            policy: policy.into(),
            message: msg.into(),
        }
    }

    /// Create a malformed violations error for `policy`
    pub fn malformed_violations(policy: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedViolations {
            policy: policy.into(),
            message: msg.into(),
        }
    }
}
