//! Snapshot directories
//!
//! A snapshot holds the output of `kubectl get <kind> -A -o json` (or
//! `-o yaml`) for each kind, in any number of files, plus optional
//! `cluster_name` and `version.json` files for metadata.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rbac_lens_graph::{ClusterMetadata, ClusterObjects, ClusterVersion};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::metadata::platform_from_version;
use crate::source::ObjectSource;
use crate::{Error, Result};

/// File holding the cluster name
pub const CLUSTER_NAME_FILE: &str = "cluster_name";

/// File holding the server version, as served by `/version`
pub const VERSION_FILE: &str = "version.json";

/// A generic `List` document
#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// Reads raw objects from a snapshot directory
#[derive(Clone, Debug)]
pub struct OfflineSource {
    dir: PathBuf,
}

impl OfflineSource {
    /// Source reading from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Snapshot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::io(&self.dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(&self.dir, e))?
        {
            let path = entry.path();
            if !path.is_file() || is_metadata_file(&path) {
                continue;
            }
            if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json" | "yaml" | "yml")
            ) {
                files.push(path);
            }
        }
        // read_dir order is platform dependent
        files.sort();
        Ok(files)
    }
}

fn is_metadata_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some(CLUSTER_NAME_FILE | VERSION_FILE)
    )
}

fn parse_list(path: &Path, text: &str) -> Result<ObjectList> {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let list: ObjectList = if is_json {
        serde_json::from_str(text).map_err(|e| Error::decode(path, e.to_string()))?
    } else {
        serde_yaml::from_str(text).map_err(|e| Error::decode(path, e.to_string()))?
    };
    if !list.kind.ends_with("List") {
        return Err(Error::decode(
            path,
            format!("expected a List document, got kind '{}'", list.kind),
        ));
    }
    Ok(list)
}

fn decode<T: DeserializeOwned>(path: &Path, index: usize, item: serde_json::Value) -> Result<T> {
    serde_json::from_value(item)
        .map_err(|e| Error::decode(path, format!("items[{}]: {}", index, e)))
}

/// Append every item of `list` to `objects`, dispatched on its kind
fn dispatch(path: &Path, list: ObjectList, objects: &mut ClusterObjects) -> Result<()> {
    for (index, item) in list.items.into_iter().enumerate() {
        let kind = item
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "Pod" => objects.pods.push(decode(path, index, item)?),
            "Node" => objects.nodes.push(decode(path, index, item)?),
            "ServiceAccount" => objects.service_accounts.push(decode(path, index, item)?),
            "Role" => objects.roles.push(decode(path, index, item)?),
            "ClusterRole" => objects.cluster_roles.push(decode(path, index, item)?),
            "RoleBinding" => objects.role_bindings.push(decode(path, index, item)?),
            "ClusterRoleBinding" => objects
                .cluster_role_bindings
                .push(decode(path, index, item)?),
            _ => return Err(Error::unexpected_kind(path, index, kind)),
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectSource for OfflineSource {
    async fn fetch(&self) -> Result<ClusterObjects> {
        let files = self.list_files().await?;
        if files.is_empty() {
            return Err(Error::NoInputFiles {
                path: self.dir.clone(),
            });
        }

        let mut objects = ClusterObjects::default();
        for path in &files {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::io(path, e))?;
            let list = parse_list(path, &text)?;
            debug!(path = %path.display(), items = list.items.len(), "read object list");
            dispatch(path, list, &mut objects)?;
        }

        info!(
            dir = %self.dir.display(),
            files = files.len(),
            pods = objects.pods.len(),
            nodes = objects.nodes.len(),
            service_accounts = objects.service_accounts.len(),
            "loaded snapshot"
        );
        Ok(objects)
    }

    async fn metadata(&self) -> ClusterMetadata {
        let mut metadata = ClusterMetadata::default();

        let name_path = self.dir.join(CLUSTER_NAME_FILE);
        match tokio::fs::read_to_string(&name_path).await {
            Ok(name) => metadata.cluster_name = name.trim().to_string(),
            Err(e) => warn!(path = %name_path.display(), error = %e, "failed to read cluster name"),
        }

        let version_path = self.dir.join(VERSION_FILE);
        let version = match tokio::fs::read_to_string(&version_path).await {
            Ok(text) => serde_json::from_str::<ClusterVersion>(&text).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match version {
            Ok(version) => {
                metadata.platform = platform_from_version(&version.git_version).to_string();
                metadata.version = version;
            }
            Err(e) => warn!(path = %version_path.display(), error = %e, "failed to read server version"),
        }

        metadata
    }

    async fn node_restriction_enabled(&self, _node: &str) -> bool {
        debug!("node restriction can't be checked from a snapshot");
        false
    }
}
