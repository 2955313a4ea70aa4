//! CLI commands

use std::fmt::Display;
use std::path::{Path, PathBuf};

use clap::Args;
use rbac_lens_collect::{collect, source_for, CollectConfig};
use rbac_lens_graph::{GraphConfig, RbacGraph, DEFAULT_NODE_GROUP};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::debug;

use crate::{Error, Result};

pub mod collect;
pub mod eval;
pub mod expand;

/// Widest JSON indent accepted; larger values are clamped
pub const MAX_JSON_INDENT: usize = 12;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Where and how results are written
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Save results to this file instead of printing them
    #[arg(long, short = 'o', global = true)]
    pub out_file: Option<PathBuf>,

    /// Print results even when saving them to a file
    #[arg(long, short = 'l', global = true)]
    pub loud: bool,

    /// JSON indent width, 0 for compact output
    #[arg(long, short = 'j', default_value_t = 4, global = true)]
    pub json_indent: usize,
}

impl OutputArgs {
    /// Serialize `value` and write it out
    pub fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        let output = to_json(value, self.json_indent)?;
        if let Some(path) = &self.out_file {
            std::fs::write(path, &output).map_err(|source| Error::WriteOutput {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "results saved");
            if !self.loud {
                return Ok(());
            }
        }
        println!("{}", output);
        Ok(())
    }
}

/// Serialize `value` as JSON indented by `indent` spaces (at most
/// [`MAX_JSON_INDENT`]), or compact when `indent` is 0
pub fn to_json<T: Serialize>(value: &T, indent: usize) -> Result<String> {
    if indent == 0 {
        return Ok(serde_json::to_string(value)?);
    }
    let indent = vec![b' '; indent.min(MAX_JSON_INDENT)];
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(&indent));
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).cmd_err()
}

/// Options that only apply when collecting from a cluster or snapshot
#[derive(Args, Debug, Clone, Default)]
pub struct CollectArgs {
    /// Include every service account, not only those assigned to a pod
    #[arg(long = "all-serviceaccounts", short = 'a', global = true)]
    pub all_service_accounts: bool,

    /// Check for admission controllers and feature gates that limit
    /// certain attacks (impersonation and dry-run writes)
    #[arg(long, short = 'w', global = true)]
    pub discover_protections: bool,

    /// Drop control-plane nodes and the pods scheduled on them
    #[arg(long = "ignore-controlplane", global = true)]
    pub ignore_control_plane: bool,

    /// Groups every node belongs to [default: system:nodes]
    #[arg(long, value_delimiter = ',', global = true)]
    pub node_groups: Vec<String>,

    /// User shared by every node, instead of system:node:<name>
    #[arg(long, global = true)]
    pub node_user: Option<String>,

    /// Only collect service accounts and pods in this namespace
    #[arg(long, short = 'n', global = true)]
    pub namespace: Option<String>,

    /// Read cluster objects from a snapshot directory instead of a cluster
    #[arg(long, global = true)]
    pub local_dir: Option<PathBuf>,
}

impl CollectArgs {
    /// Whether any collection option differs from its default
    pub fn is_set(&self) -> bool {
        let custom_node_groups =
            !self.node_groups.is_empty() && self.node_groups != [DEFAULT_NODE_GROUP];
        self.all_service_accounts
            || self.discover_protections
            || self.ignore_control_plane
            || custom_node_groups
            || self.node_user.is_some()
            || self.namespace.is_some()
            || self.local_dir.is_some()
    }

    /// Collection configuration these options describe
    pub fn to_config(&self) -> CollectConfig {
        let mut graph = GraphConfig {
            all_service_accounts: self.all_service_accounts,
            ignore_control_plane: self.ignore_control_plane,
            namespace: self.namespace.clone(),
            node_user: self.node_user.clone(),
            ..Default::default()
        };
        if !self.node_groups.is_empty() {
            graph.node_groups = self.node_groups.clone();
        }
        CollectConfig {
            graph,
            offline_dir: self.local_dir.clone(),
            discover_protections: self.discover_protections,
        }
    }
}

/// Collect the permission graph as `args` describe
pub async fn collect_graph(args: &CollectArgs) -> Result<RbacGraph> {
    let config = args.to_config();
    let source = source_for(&config).await?;
    let collection = collect(source.as_ref(), &config).await?;
    Ok(collection.graph)
}

/// The graph stored in `graph_file`, or a freshly collected one
pub async fn load_graph(graph_file: Option<&Path>, args: &CollectArgs) -> Result<RbacGraph> {
    let Some(path) = graph_file else {
        return collect_graph(args).await;
    };
    if args.is_set() {
        return Err(Error::validation(
            "collection options only apply when collecting",
        ));
    }
    read_graph(path)
}

/// Read a graph previously written by `collect`
pub fn read_graph(path: &Path) -> Result<RbacGraph> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_indent() {
        let value = serde_json::json!({ "a": [1] });
        assert_eq!(to_json(&value, 0).unwrap(), r#"{"a":[1]}"#);
        assert_eq!(to_json(&value, 2).unwrap(), "{\n  \"a\": [\n    1\n  ]\n}");

        let capped = to_json(&value, 40).unwrap();
        let expected = format!("{}\"a\": [", " ".repeat(MAX_JSON_INDENT));
        assert_eq!(capped.lines().nth(1), Some(expected.as_str()));
    }

    #[test]
    fn test_collection_options_set() {
        assert!(!CollectArgs::default().is_set());

        let default_groups = CollectArgs {
            node_groups: vec![DEFAULT_NODE_GROUP.to_string()],
            ..Default::default()
        };
        assert!(!default_groups.is_set());

        let namespaced = CollectArgs {
            namespace: Some("prod".to_string()),
            ..Default::default()
        };
        assert!(namespaced.is_set());
    }

    #[test]
    fn test_to_config_keeps_default_node_group() {
        let config = CollectArgs::default().to_config();
        assert_eq!(config.graph.node_groups, vec![DEFAULT_NODE_GROUP]);
        assert!(!config.is_offline());

        let config = CollectArgs {
            node_groups: vec!["workers".to_string(), "gpu".to_string()],
            local_dir: Some(PathBuf::from("/snap")),
            ..Default::default()
        }
        .to_config();
        assert_eq!(config.graph.node_groups, vec!["workers", "gpu"]);
        assert!(config.is_offline());
    }

    #[tokio::test]
    async fn test_graph_file_rejects_collection_options() {
        let args = CollectArgs {
            ignore_control_plane: true,
            ..Default::default()
        };
        let err = load_graph(Some(Path::new("graph.json")), &args)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_read_graph_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let err = read_graph(&path).unwrap_err();
        assert!(matches!(err, Error::ReadInput { path: ref p, .. } if p == &path));
    }

    #[tokio::test]
    async fn test_load_graph_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"metadata":{"cluster":"prod"},"serviceAccounts":[{"name":"api","namespace":"prod","roles":[]}]}"#,
        )
        .unwrap();

        let graph = load_graph(Some(&path), &CollectArgs::default())
            .await
            .unwrap();
        assert_eq!(graph.service_accounts[0].full_name(), "prod:api");
        assert_eq!(graph.metadata.cluster_name, "prod");
    }
}
