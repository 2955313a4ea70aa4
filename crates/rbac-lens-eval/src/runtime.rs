//! Policy runtimes
//!
//! [`PolicyRuntime`] is the seam between evaluation orchestration and the
//! engine that actually runs policies. [`RegoRuntime`] runs Rego policies
//! with the `regorus` interpreter.

use std::path::{Path, PathBuf};

use regorus::{Engine, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::policy_files::needs_wrapping;
use crate::types::Violations;
use crate::{Error, Result};

#[cfg(test)]
use mockall::automock;

/// Query for a policy's severity and description
pub const DESCRIBE_QUERY: &str = "data.policy.describe[_]";

/// Query for a policy that defines its own `main` rule
pub const MAIN_QUERY: &str = "data.policy.main[_]";

/// Query for a policy evaluated through the wrapper library
pub const WRAPPED_MAIN_QUERY: &str = "data.wrapper.main[_]";

/// Helper functions every policy may use, relative to the library dir
pub const BUILTINS_LIB: &str = "utils/builtins.rego";

/// Wrapper supplying `main` for policies without one, relative to the
/// library dir
pub const WRAPPER_LIB: &str = "utils/wrapper.rego";

/// Default library directory
pub const DEFAULT_LIB_DIR: &str = "lib";

/// Output of a policy's `describe` rule
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescription {
    /// Declared severity, empty if none
    #[serde(default)]
    pub severity: String,
    /// Declared description, empty if none
    #[serde(default, rename = "desc")]
    pub description: String,
}

/// Runs policies against a serialized graph
#[cfg_attr(test, automock)]
pub trait PolicyRuntime: Send + Sync {
    /// The policy's description, or `None` if it doesn't declare one
    fn describe(&self, policy: &Path) -> Result<Option<PolicyDescription>>;

    /// Evaluate the policy over `input` with `data` loaded, returning the
    /// `violations` of every `main` result. No results means no violations.
    fn evaluate(
        &self,
        policy: &Path,
        input: &serde_json::Value,
        data: &serde_json::Value,
    ) -> Result<Vec<Violations>>;
}

/// [`PolicyRuntime`] backed by the `regorus` Rego interpreter
#[derive(Clone, Debug)]
pub struct RegoRuntime {
    lib_dir: PathBuf,
}

impl Default for RegoRuntime {
    fn default() -> Self {
        Self::new(DEFAULT_LIB_DIR)
    }
}

impl RegoRuntime {
    /// Runtime loading its library modules from `lib_dir`
    pub fn new(lib_dir: impl Into<PathBuf>) -> Self {
        Self {
            lib_dir: lib_dir.into(),
        }
    }

    /// Engine with `policy` and its library modules loaded. Returns the
    /// engine and the query for `main`.
    fn load(&self, policy: &Path, with_wrapper: bool) -> Result<(Engine, &'static str)> {
        let source = read(policy)?;
        let wrap = with_wrapper && needs_wrapping(&source);

        let mut engine = Engine::new();
        add_policy(&mut engine, policy, policy, source)?;
        let builtins = self.lib_dir.join(BUILTINS_LIB);
        add_policy(&mut engine, policy, &builtins, read(&builtins)?)?;
        if wrap {
            let wrapper = self.lib_dir.join(WRAPPER_LIB);
            add_policy(&mut engine, policy, &wrapper, read(&wrapper)?)?;
        }

        let query = if wrap { WRAPPED_MAIN_QUERY } else { MAIN_QUERY };
        Ok((engine, query))
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

fn add_policy(engine: &mut Engine, policy: &Path, file: &Path, source: String) -> Result<()> {
    engine
        .add_policy(file.display().to_string(), source)
        .map_err(|e| Error::runtime(policy.display().to_string(), e.to_string()))?;
    Ok(())
}

fn to_rego(policy: &Path, value: &serde_json::Value) -> Result<Value> {
    Value::from_json_str(&value.to_string())
        .map_err(|e| Error::runtime(policy.display().to_string(), e.to_string()))
}

/// First expression of every result of `query`, as JSON
fn query(engine: &mut Engine, policy: &Path, query: &str) -> Result<Vec<serde_json::Value>> {
    let results = engine
        .eval_query(query.to_string(), false)
        .map_err(|e| Error::runtime(policy.display().to_string(), e.to_string()))?;
    let mut values = Vec::with_capacity(results.result.len());
    for result in results.result {
        if let Some(expression) = result.expressions.into_iter().next() {
            values.push(serde_json::to_value(&expression.value)?);
        }
    }
    debug!(policy = %policy.display(), query, results = values.len(), "evaluated query");
    Ok(values)
}

impl PolicyRuntime for RegoRuntime {
    fn describe(&self, policy: &Path) -> Result<Option<PolicyDescription>> {
        let (mut engine, _) = self.load(policy, false)?;
        let Some(value) = query(&mut engine, policy, DESCRIBE_QUERY)?.into_iter().next() else {
            return Ok(None);
        };
        let description = serde_json::from_value(value)
            .map_err(|e| Error::runtime(policy.display().to_string(), e.to_string()))?;
        Ok(Some(description))
    }

    fn evaluate(
        &self,
        policy: &Path,
        input: &serde_json::Value,
        data: &serde_json::Value,
    ) -> Result<Vec<Violations>> {
        let (mut engine, main) = self.load(policy, true)?;
        engine
            .add_data(to_rego(policy, data)?)
            .map_err(|e| Error::runtime(policy.display().to_string(), e.to_string()))?;
        engine.set_input(to_rego(policy, input)?);

        query(&mut engine, policy, main)?
            .into_iter()
            .map(|result| {
                let violations = result.get("violations").cloned().ok_or_else(|| {
                    Error::malformed_violations(
                        policy.display().to_string(),
                        "result has no 'violations' field",
                    )
                })?;
                serde_json::from_value(violations).map_err(|e| {
                    Error::malformed_violations(policy.display().to_string(), e.to_string())
                })
            })
            .collect()
    }
}
