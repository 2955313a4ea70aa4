//! Evaluation orchestration
//!
//! Applies the configured views to a graph, then runs every discovered
//! policy over it through a [`PolicyRuntime`]. A policy that errors is
//! counted and skipped; it never aborts the run.

use std::path::Path;

use rbac_lens_graph::{view, RbacGraph};
use tracing::{debug, info, warn};

use crate::policy_files::policy_files;
use crate::runtime::{PolicyDescription, PolicyRuntime};
use crate::types::{policy_data, EvalConfig, PolicyResult, PolicyResults, Summary, Violations};
use crate::Result;

/// Evaluate every policy under `policy_path` against `graph`
pub fn evaluate(
    runtime: &dyn PolicyRuntime,
    policy_path: &Path,
    mut graph: RbacGraph,
    config: &EvalConfig,
) -> Result<PolicyResults> {
    view::apply(&mut graph, &config.view);
    let input = serde_json::to_value(&graph)?;
    let data = policy_data(config.violation_types());
    let policies = policy_files(policy_path)?;

    let mut results = PolicyResults::default();
    let mut skipped = 0usize;
    for policy in &policies {
        match evaluate_policy(runtime, policy, &input, &data, config) {
            Ok(Outcome::Skipped) => skipped += 1,
            Ok(Outcome::Passed) => {}
            Ok(Outcome::Failed(result)) => results.policy_results.push(result),
            Err(e) => {
                warn!(policy = %policy.display(), error = %e, "policy evaluation failed");
                results.summary.errors += 1;
            }
        }
    }

    let summary = &mut results.summary;
    summary.evaluated = policies.len();
    summary.failed = results.policy_results.len();
    summary.passed = summary.evaluated - summary.failed - summary.errors;
    log_summary(&results.summary, skipped);
    Ok(results)
}

enum Outcome {
    Skipped,
    Passed,
    Failed(PolicyResult),
}

fn evaluate_policy(
    runtime: &dyn PolicyRuntime,
    policy: &Path,
    input: &serde_json::Value,
    data: &serde_json::Value,
    config: &EvalConfig,
) -> Result<Outcome> {
    let description = describe(runtime, policy);
    if !config.severity_threshold.admits(&description.severity) {
        debug!(
            policy = %policy.display(),
            severity = %description.severity,
            threshold = %config.severity_threshold,
            "skipping policy below severity threshold"
        );
        return Ok(Outcome::Skipped);
    }

    let mut violations = Violations::default();
    for found in runtime.evaluate(policy, input, data)? {
        violations.merge(found, config.violation_types());
    }
    if violations.is_empty() {
        debug!(policy = %policy.display(), "policy passed");
        return Ok(Outcome::Passed);
    }

    info!(policy = %policy.display(), "policy found violations");
    Ok(Outcome::Failed(PolicyResult {
        policy: policy.display().to_string(),
        severity: description.severity,
        description: description.description,
        violations,
    }))
}

/// The policy's description. Policies that fail to describe themselves
/// are evaluated as if they declared nothing.
fn describe(runtime: &dyn PolicyRuntime, policy: &Path) -> PolicyDescription {
    match runtime.describe(policy) {
        Ok(description) => description.unwrap_or_default(),
        Err(e) => {
            debug!(policy = %policy.display(), error = %e, "policy has no usable description");
            PolicyDescription::default()
        }
    }
}

fn log_summary(summary: &Summary, skipped: usize) {
    info!(
        evaluated = summary.evaluated,
        failed = summary.failed,
        passed = summary.passed,
        errors = summary.errors,
        skipped,
        "evaluation complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockPolicyRuntime;
    use crate::Error;
    use crate::types::Severity;
    use rbac_lens_graph::{NamedEntry, RoleEntry, RoleRef, ServiceAccountEntry, ViolationTypes};
    use std::path::PathBuf;

    fn policy_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), "package policy\n").unwrap();
        }
        dir
    }

    fn named(path: &Path, name: &str) -> bool {
        path.file_name().and_then(|n| n.to_str()) == Some(name)
    }

    fn graph() -> RbacGraph {
        let grant = RoleRef {
            name: "admin".to_string(),
            namespace: None,
            effective_namespace: Some("prod".to_string()),
        };
        RbacGraph {
            service_accounts: vec![ServiceAccountEntry {
                name: "api".to_string(),
                namespace: "prod".to_string(),
                roles: vec![grant.clone()],
                ..Default::default()
            }],
            users: vec![NamedEntry {
                name: "alice".to_string(),
                roles: vec![grant],
            }],
            roles: vec![RoleEntry {
                name: "admin".to_string(),
                namespace: None,
                rules: Vec::new(),
            }],
            ..Default::default()
        }
    }

    fn sa_violation() -> Violations {
        serde_json::from_value(serde_json::json!({
            "serviceAccounts": [{ "name": "api", "namespace": "prod" }],
            "users": ["alice"]
        }))
        .unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let dir = policy_dir(&["a.rego", "b.rego", "c.rego", "d.rego"]);
        let mut runtime = MockPolicyRuntime::new();
        runtime.expect_describe().returning(|policy| {
            if named(policy, "d.rego") {
                Ok(Some(PolicyDescription {
                    severity: "Low".to_string(),
                    description: String::new(),
                }))
            } else {
                Ok(Some(PolicyDescription {
                    severity: "High".to_string(),
                    description: "privileged".to_string(),
                }))
            }
        });
        runtime.expect_evaluate().returning(|policy, _, _| {
            if named(policy, "a.rego") {
                Ok(vec![sa_violation()])
            } else if named(policy, "b.rego") {
                Ok(Vec::new())
            } else if named(policy, "c.rego") {
                Err(Error::runtime("c.rego", "undefined function"))
            } else {
                panic!("policy below threshold must not be evaluated");
            }
        });
        let config = EvalConfig {
            severity_threshold: Severity::Medium,
            ..Default::default()
        };

        let results = evaluate(&runtime, dir.path(), graph(), &config).unwrap();
        assert_eq!(
            results.summary,
            Summary {
                failed: 1,
                passed: 2,
                errors: 1,
                evaluated: 4,
            }
        );
        let failed = &results.policy_results[0];
        assert!(failed.policy.ends_with("a.rego"));
        assert_eq!(failed.severity, "High");
        assert_eq!(failed.description, "privileged");
        assert_eq!(failed.violations.service_accounts[0].name, "api");
        // users are not an enabled category by default
        assert!(failed.violations.users.is_empty());
    }

    #[test]
    fn test_disabled_categories_pass() {
        let dir = policy_dir(&["users.rego"]);
        let mut runtime = MockPolicyRuntime::new();
        runtime.expect_describe().returning(|_| Ok(None));
        runtime.expect_evaluate().returning(|_, _, _| {
            Ok(vec![Violations {
                users: vec!["alice".to_string()],
                ..Default::default()
            }])
        });

        let results = evaluate(&runtime, dir.path(), graph(), &EvalConfig::default()).unwrap();
        assert!(results.policy_results.is_empty());
        assert_eq!(results.summary.passed, 1);
    }

    #[test]
    fn test_describe_failure_still_evaluates() {
        let dir = policy_dir(&["p.rego"]);
        let mut runtime = MockPolicyRuntime::new();
        runtime
            .expect_describe()
            .returning(|_| Err(Error::runtime("p.rego", "parse error")));
        runtime
            .expect_evaluate()
            .times(1)
            .returning(|_, _, _| Ok(vec![sa_violation()]));
        let config = EvalConfig {
            severity_threshold: Severity::Critical,
            ..Default::default()
        };

        let results = evaluate(&runtime, dir.path(), graph(), &config).unwrap();
        assert_eq!(results.summary.failed, 1);
        assert!(results.policy_results[0].severity.is_empty());
    }

    #[test]
    fn test_runtime_sees_filtered_graph_and_config() {
        let dir = policy_dir(&["p.rego"]);
        let mut runtime = MockPolicyRuntime::new();
        runtime.expect_describe().returning(|_| Ok(None));
        runtime
            .expect_evaluate()
            .withf(|_, input, data| {
                input["users"].as_array().is_some_and(|u| u.is_empty())
                    && input["serviceAccounts"][0]["name"] == "api"
                    && data["config"]["evalUserViolations"] == false
                    && data["config"]["evalSaViolations"] == true
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let results = evaluate(&runtime, dir.path(), graph(), &EvalConfig::default()).unwrap();
        assert_eq!(results.summary.passed, 1);
    }

    #[test]
    fn test_ignored_namespace_purges_roles() {
        let dir = policy_dir(&["p.rego"]);
        let mut runtime = MockPolicyRuntime::new();
        runtime.expect_describe().returning(|_| Ok(None));
        runtime
            .expect_evaluate()
            .withf(|_, input, _| {
                input["serviceAccounts"].as_array().is_some_and(|s| s.is_empty())
                    && input["roles"].as_array().is_some_and(|r| r.is_empty())
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        let mut config = EvalConfig::default();
        config.view.ignored_namespaces = vec!["prod".to_string()];
        config.view.violation_types = ViolationTypes::from_names(&["sa"]).unwrap();

        evaluate(&runtime, dir.path(), graph(), &config).unwrap();
    }

    #[test]
    fn test_missing_policies_is_error() {
        let runtime = MockPolicyRuntime::new();
        let err = evaluate(
            &runtime,
            &PathBuf::from("/nonexistent/policies"),
            graph(),
            &EvalConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
