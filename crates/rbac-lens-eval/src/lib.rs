//! Policy evaluation over RBAC permission graphs
//!
//! Runs a directory of policies against a (filtered) permission graph and
//! summarizes which policies found violations. Policies are executed by a
//! [`PolicyRuntime`]; [`RegoRuntime`] runs Rego policies in-process.

#![deny(missing_docs)]

pub mod error;
pub mod eval;
pub mod policy_files;
pub mod runtime;
pub mod types;

pub use error::Error;
pub use eval::evaluate;
pub use policy_files::policy_files;
pub use runtime::{PolicyDescription, PolicyRuntime, RegoRuntime};
pub use types::{
    AbbreviatedPolicyResults, EvalConfig, PolicyResult, PolicyResults, Severity, Summary,
    Violations,
};

/// Result type alias using the evaluation Error type
pub type Result<T> = std::result::Result<T, Error>;
