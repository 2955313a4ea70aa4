//! Evaluation configuration and result documents

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rbac_lens_graph::{full_name, ViewConfig, ViolationTypes};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Policy severity, ordered from least to most severe
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Low
    #[default]
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Critical
    Critical,
}

impl Severity {
    /// Name as written in policies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Whether a policy declaring `declared` should run under this
    /// threshold. Policies without a severity always run; an unrecognized
    /// severity never does.
    pub fn admits(&self, declared: &str) -> bool {
        let rank = match declared {
            "" => u8::MAX,
            other => other.parse::<Severity>().map_or(0, |s| s.rank()),
        };
        rank >= self.rank()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the exact names policies declare; `high` is not `High`
impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            "Critical" => Ok(Self::Critical),
            _ => Err(Error::InvalidSeverity {
                value: s.to_string(),
            }),
        }
    }
}

/// Evaluation options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalConfig {
    /// Views applied to the graph before evaluation
    pub view: ViewConfig,
    /// Policies below this severity are skipped
    pub severity_threshold: Severity,
}

impl EvalConfig {
    /// Violation categories being evaluated
    pub fn violation_types(&self) -> &ViolationTypes {
        &self.view.violation_types
    }
}

/// Configuration block handed to policies as `data.config`
pub fn policy_data(types: &ViolationTypes) -> serde_json::Value {
    serde_json::json!({
        "config": {
            "evalSaViolations": types.service_accounts,
            "evalNodeViolations": types.nodes,
            "evalCombinedViolations": types.combined,
            "evalUserViolations": types.users,
            "evalGroupViolations": types.groups,
        }
    })
}

/// A violating service account
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountViolation {
    /// Service account name
    pub name: String,
    /// Service account namespace
    pub namespace: String,
    /// Nodes hosting the service account, as `{node: [pods]}` maps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<BTreeMap<String, Vec<String>>>,
    /// Linked cloud IAM identities
    #[serde(
        rename = "providerIAM",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub provider_iam: BTreeMap<String, String>,
}

/// A violating node together with the service accounts it hosts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedViolation {
    /// Node name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node: String,
    /// Full names of the hosted service accounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<String>,
}

/// Violations of one policy, by category
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violations {
    /// Service account violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<ServiceAccountViolation>,
    /// Node violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    /// Combined node and service account violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combined: Vec<CombinedViolation>,
    /// User violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    /// Group violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl Violations {
    /// Whether there are no violations in any category
    pub fn is_empty(&self) -> bool {
        self.service_accounts.is_empty()
            && self.nodes.is_empty()
            && self.combined.is_empty()
            && self.users.is_empty()
            && self.groups.is_empty()
    }

    /// Append the categories of `other` that `types` enables
    pub fn merge(&mut self, other: Violations, types: &ViolationTypes) {
        if types.service_accounts {
            self.service_accounts.extend(other.service_accounts);
        }
        if types.nodes {
            self.nodes.extend(other.nodes);
        }
        if types.combined {
            self.combined.extend(other.combined);
        }
        if types.users {
            self.users.extend(other.users);
        }
        if types.groups {
            self.groups.extend(other.groups);
        }
    }

    /// Collapse service account violations to `namespace:name`
    pub fn abbreviate(self) -> AbbreviatedViolations {
        AbbreviatedViolations {
            service_accounts: self
                .service_accounts
                .iter()
                .map(|sa| full_name(&sa.namespace, &sa.name))
                .collect(),
            nodes: self.nodes,
            combined: self.combined,
            users: self.users,
            groups: self.groups,
        }
    }
}

/// Violations with service accounts reduced to their full names
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbbreviatedViolations {
    /// `namespace:name` of each violating service account
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<String>,
    /// Node violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    /// Combined node and service account violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combined: Vec<CombinedViolation>,
    /// User violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    /// Group violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// A failed policy and what it found
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    /// Policy file
    pub policy: String,
    /// Declared severity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
    /// Declared description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Violations found
    pub violations: Violations,
}

/// A failed policy, abbreviated
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbbreviatedPolicyResult {
    /// Policy file
    pub policy: String,
    /// Declared severity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
    /// Declared description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Violations found
    pub violations: AbbreviatedViolations,
}

/// Counts over every discovered policy.
///
/// `passed` includes policies skipped for being below the severity
/// threshold, so `failed + passed + errors == evaluated`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Policies with at least one violation
    pub failed: usize,
    /// Policies without violations
    pub passed: usize,
    /// Policies the runtime failed on
    pub errors: usize,
    /// Policies discovered
    pub evaluated: usize,
}

/// Results of an evaluation run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResults {
    /// One entry per failed policy
    pub policy_results: Vec<PolicyResult>,
    /// Counts
    pub summary: Summary,
}

/// Results of an evaluation run, abbreviated
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbbreviatedPolicyResults {
    /// One entry per failed policy
    pub policy_results: Vec<AbbreviatedPolicyResult>,
    /// Counts
    pub summary: Summary,
}

impl PolicyResults {
    /// Abbreviate every result
    pub fn abbreviate(self) -> AbbreviatedPolicyResults {
        AbbreviatedPolicyResults {
            policy_results: self
                .policy_results
                .into_iter()
                .map(|r| AbbreviatedPolicyResult {
                    policy: r.policy,
                    severity: r.severity,
                    description: r.description,
                    violations: r.violations.abbreviate(),
                })
                .collect(),
            summary: self.summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_threshold() {
        assert!(Severity::Low.admits("Low"));
        assert!(Severity::Medium.admits("Critical"));
        assert!(!Severity::High.admits("Medium"));
        // no declared severity always runs
        assert!(Severity::Critical.admits(""));
        // unknown severities never do
        assert!(!Severity::Low.admits("Info"));
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!("High".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("Critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("urgent".parse::<Severity>().is_err());
        // names are case sensitive
        assert!("high".parse::<Severity>().is_err());
        assert!(!Severity::Low.admits("critical"));
    }

    #[test]
    fn test_policy_data() {
        let data = policy_data(&ViolationTypes::default());
        assert_eq!(data["config"]["evalSaViolations"], true);
        assert_eq!(data["config"]["evalCombinedViolations"], true);
        assert_eq!(data["config"]["evalUserViolations"], false);
    }

    fn violations() -> Violations {
        Violations {
            service_accounts: vec![ServiceAccountViolation {
                name: "api".to_string(),
                namespace: "prod".to_string(),
                nodes: vec![BTreeMap::from([(
                    "n1".to_string(),
                    vec!["api-1".to_string()],
                )])],
                ..Default::default()
            }],
            nodes: vec!["n1".to_string()],
            users: vec!["alice".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_drops_disabled_categories() {
        let mut merged = Violations::default();
        merged.merge(violations(), &ViolationTypes::default());

        assert_eq!(merged.service_accounts.len(), 1);
        assert_eq!(merged.nodes, vec!["n1"]);
        assert!(merged.users.is_empty());

        let mut none = Violations::default();
        none.merge(violations(), &ViolationTypes::from_names(&["group"]).unwrap());
        assert!(none.is_empty());
    }

    #[test]
    fn test_abbreviate() {
        let results = PolicyResults {
            policy_results: vec![PolicyResult {
                policy: "lib/secrets.rego".to_string(),
                severity: "High".to_string(),
                description: "reads secrets".to_string(),
                violations: violations(),
            }],
            summary: Summary {
                failed: 1,
                passed: 0,
                errors: 0,
                evaluated: 1,
            },
        };

        let short = results.abbreviate();
        assert_eq!(
            short.policy_results[0].violations.service_accounts,
            vec!["prod:api"]
        );
        assert_eq!(short.summary.failed, 1);

        let json = serde_json::to_value(&short).unwrap();
        assert_eq!(json["policyResults"][0]["violations"]["serviceAccounts"][0], "prod:api");
        assert!(json["policyResults"][0]["violations"].get("combined").is_none());
    }

    #[test]
    fn test_violations_from_policy_output() {
        let parsed: Violations = serde_json::from_value(serde_json::json!({
            "serviceAccounts": [{
                "name": "api",
                "namespace": "prod",
                "providerIAM": { "aws": "arn:aws:iam::111122223333:role/api" }
            }],
            "combined": [{ "node": "n1", "serviceAccounts": ["prod:api"] }]
        }))
        .unwrap();

        assert_eq!(parsed.service_accounts[0].provider_iam["aws"], "arn:aws:iam::111122223333:role/api");
        assert_eq!(parsed.combined[0].service_accounts, vec!["prod:api"]);
        assert!(parsed.nodes.is_empty());
    }
}
