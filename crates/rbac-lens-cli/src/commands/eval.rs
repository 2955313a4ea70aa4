//! Eval command - evaluate identities' permissions against policies

use std::path::PathBuf;

use clap::Args;
use rbac_lens_eval::{evaluate, EvalConfig, RegoRuntime, Severity};
use rbac_lens_graph::{ViewConfig, ViolationTypes};
use tracing::info;

use super::{load_graph, CollectArgs, OutputArgs};
use crate::Result;

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Policy file, or directory of `.rego` policies
    pub policies: PathBuf,

    /// Graph previously written by `collect` (collects from the cluster if
    /// not specified)
    pub graph_file: Option<PathBuf>,

    /// Abbreviate results
    #[arg(long)]
    pub short: bool,

    /// Only evaluate service accounts present on every node
    #[arg(long = "only-sas-on-all-nodes")]
    pub only_sas_on_all_nodes: bool,

    /// Skip policies below this severity (Low, Medium, High, Critical)
    #[arg(long, short = 's', default_value = "Low")]
    pub severity_threshold: Severity,

    /// Ignore service accounts from these namespaces
    #[arg(long, value_delimiter = ',')]
    pub ignored_namespaces: Vec<String>,

    /// Violation types to search for: sa, node, combined, user, group or all
    #[arg(long, value_delimiter = ',', default_value = "sa,node,combined")]
    pub violations: Vec<String>,

    /// Directory holding the policy library (utils/builtins.rego,
    /// utils/wrapper.rego)
    #[arg(long, default_value = rbac_lens_eval::runtime::DEFAULT_LIB_DIR)]
    pub lib_dir: PathBuf,
}

impl EvalArgs {
    /// Evaluation configuration these options describe
    pub fn to_config(&self) -> Result<EvalConfig> {
        Ok(EvalConfig {
            view: ViewConfig {
                violation_types: ViolationTypes::from_names(self.violations.as_slice())?,
                only_service_accounts_on_all_nodes: self.only_sas_on_all_nodes,
                ignored_namespaces: self.ignored_namespaces.clone(),
            },
            severity_threshold: self.severity_threshold,
        })
    }
}

pub async fn run(args: EvalArgs, collect: &CollectArgs, output: &OutputArgs) -> Result<()> {
    let config = args.to_config()?;
    let graph = load_graph(args.graph_file.as_deref(), collect).await?;

    let runtime = RegoRuntime::new(&args.lib_dir);
    let results = evaluate(&runtime, &args.policies, graph, &config)?;
    info!(
        failed = results.summary.failed,
        errors = results.summary.errors,
        "policies evaluated"
    );

    if args.short {
        output.emit(&results.abbreviate())
    } else {
        output.emit(&results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;

    fn eval_args(argv: &[&str]) -> EvalArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            crate::Commands::Eval(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_eval_defaults() {
        let args = eval_args(&["rbac-lens", "eval", "policies/"]);
        let config = args.to_config().unwrap();

        assert_eq!(config.severity_threshold, Severity::Low);
        assert_eq!(config.view.violation_types, ViolationTypes::default());
        assert!(config.view.ignored_namespaces.is_empty());
        assert_eq!(args.lib_dir, PathBuf::from("lib"));
        assert!(args.graph_file.is_none());
    }

    #[test]
    fn test_eval_options() {
        let args = eval_args(&[
            "rbac-lens",
            "eval",
            "policies/",
            "graph.json",
            "-s",
            "High",
            "--violations",
            "user,group",
            "--ignored-namespaces",
            "kube-system,monitoring",
            "--only-sas-on-all-nodes",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(args.graph_file, Some(PathBuf::from("graph.json")));
        assert_eq!(config.severity_threshold, Severity::High);
        assert!(config.view.violation_types.users);
        assert!(!config.view.violation_types.service_accounts);
        assert_eq!(
            config.view.ignored_namespaces,
            vec!["kube-system", "monitoring"]
        );
        assert!(config.view.only_service_accounts_on_all_nodes);
    }

    #[test]
    fn test_eval_rejects_unknown_violation_type() {
        let args = eval_args(&["rbac-lens", "eval", "p.rego", "--violations", "pods"]);
        assert!(args.to_config().is_err());

        assert!(Cli::try_parse_from(["rbac-lens", "eval", "p.rego", "-s", "urgent"]).is_err());
        assert!(Cli::try_parse_from(["rbac-lens", "eval", "p.rego", "-s", "high"]).is_err());
    }

    #[test]
    fn test_global_collection_options() {
        let cli = Cli::try_parse_from([
            "rbac-lens",
            "eval",
            "p.rego",
            "--ignore-controlplane",
            "--node-groups",
            "workers,gpu",
            "-j",
            "0",
        ])
        .unwrap();

        assert!(cli.collect.ignore_control_plane);
        assert_eq!(cli.collect.node_groups, vec!["workers", "gpu"]);
        assert_eq!(cli.output.json_indent, 0);
    }
}
