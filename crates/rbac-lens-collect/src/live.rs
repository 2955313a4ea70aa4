//! Live cluster collection through the Kubernetes API

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Node, Pod, PodSpec, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::config::Kubeconfig;
use kube::{Client, Config, Resource};
use rbac_lens_graph::{
    ClusterMetadata, ClusterObjects, ClusterVersion, GraphConfig, ALL_AUTHENTICATED_GROUP,
    DEFAULT_NODE_GROUP, NODE_USER_PREFIX,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::metadata::platform_from_version;
use crate::source::ObjectSource;
use crate::{Error, Result};

/// Label selector excluding control-plane nodes
pub const WORKER_NODE_SELECTOR: &str =
    "!node-role.kubernetes.io/master,!node-role.kubernetes.io/control-plane";

/// Rejection the NodeRestriction admission plugin returns for non-mirror pods
pub const MIRROR_POD_REJECTION: &str =
    "pod does not have \"kubernetes.io/config.mirror\" annotation";

/// Name of the pod used for the dry-run NodeRestriction check
pub const DRY_RUN_POD_NAME: &str = "rbac-lens-dry-run-test-pod";

/// Namespace the NodeRestriction check pod is created in
const DRY_RUN_NAMESPACE: &str = "default";

/// Reads raw objects from a live cluster
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
    config: Config,
    cluster_name: String,
    namespace: Option<String>,
    ignore_control_plane: bool,
}

impl KubeSource {
    /// Connect using the default kubeconfig resolution (`KUBECONFIG`,
    /// `~/.kube/config`, in-cluster)
    pub async fn connect(graph: &GraphConfig) -> Result<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| Error::kube_config(e.to_string()))?;
        let cluster_name = current_cluster_name().unwrap_or_default();
        Self::new(config, cluster_name, graph)
    }

    /// Source using an explicit client configuration
    pub fn new(config: Config, cluster_name: impl Into<String>, graph: &GraphConfig) -> Result<Self> {
        let client = Client::try_from(config.clone())?;
        Ok(Self {
            client,
            config,
            cluster_name: cluster_name.into(),
            namespace: graph.namespace.clone(),
            ignore_control_plane: graph.ignore_control_plane,
        })
    }

    /// Api for a namespaced kind, scoped to the configured namespace if any
    fn scoped_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn node_params(&self) -> ListParams {
        if self.ignore_control_plane {
            ListParams::default().labels(WORKER_NODE_SELECTOR)
        } else {
            ListParams::default()
        }
    }
}

/// Cluster of the kubeconfig's current context, if there is a kubeconfig
fn current_cluster_name() -> Option<String> {
    let kubeconfig = match Kubeconfig::read() {
        Ok(kubeconfig) => kubeconfig,
        Err(e) => {
            warn!(error = %e, "failed to read kubeconfig, cluster name unknown");
            return None;
        }
    };
    let current = kubeconfig.current_context.as_deref()?;
    kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == current)
        .and_then(|c| c.context.as_ref())
        .map(|c| c.cluster.clone())
}

async fn list<K>(api: Api<K>, params: &ListParams, kind: &'static str) -> Result<Vec<K>>
where
    K: Clone + DeserializeOwned + Debug,
{
    let list = api
        .list(params)
        .await
        .map_err(|source| Error::list(kind, source))?;
    debug!(kind, count = list.items.len(), "listed objects");
    Ok(list.items)
}

fn dry_run_pod(node: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(DRY_RUN_POD_NAME.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node.to_string()),
            containers: vec![Container {
                name: DRY_RUN_POD_NAME.to_string(),
                image: Some(DRY_RUN_POD_NAME.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ObjectSource for KubeSource {
    async fn fetch(&self) -> Result<ClusterObjects> {
        let all = ListParams::default();
        let node_params = self.node_params();
        let (
            pods,
            nodes,
            service_accounts,
            roles,
            cluster_roles,
            role_bindings,
            cluster_role_bindings,
        ) = tokio::try_join!(
            list(self.scoped_api::<Pod>(), &all, "pods"),
            list(Api::<Node>::all(self.client.clone()), &node_params, "nodes"),
            list(self.scoped_api::<ServiceAccount>(), &all, "serviceaccounts"),
            // bindings in other namespaces may still name scoped service accounts
            list(Api::<Role>::all(self.client.clone()), &all, "roles"),
            list(Api::<ClusterRole>::all(self.client.clone()), &all, "clusterroles"),
            list(Api::<RoleBinding>::all(self.client.clone()), &all, "rolebindings"),
            list(
                Api::<ClusterRoleBinding>::all(self.client.clone()),
                &all,
                "clusterrolebindings"
            ),
        )?;

        info!(
            pods = pods.len(),
            nodes = nodes.len(),
            service_accounts = service_accounts.len(),
            roles = roles.len() + cluster_roles.len(),
            bindings = role_bindings.len() + cluster_role_bindings.len(),
            "collected cluster objects"
        );
        Ok(ClusterObjects {
            pods,
            nodes,
            service_accounts,
            roles,
            cluster_roles,
            role_bindings,
            cluster_role_bindings,
        })
    }

    async fn metadata(&self) -> ClusterMetadata {
        let mut metadata = ClusterMetadata {
            cluster_name: self.cluster_name.clone(),
            ..Default::default()
        };
        match self.client.apiserver_version().await {
            Ok(info) => {
                metadata.platform = platform_from_version(&info.git_version).to_string();
                metadata.version = ClusterVersion {
                    major: info.major,
                    minor: info.minor,
                    git_version: info.git_version,
                };
            }
            Err(e) => warn!(error = %e, "failed to get server version"),
        }
        metadata
    }

    async fn node_restriction_enabled(&self, node: &str) -> bool {
        let mut config = self.config.clone();
        config.auth_info.impersonate = Some(format!("{}{}", NODE_USER_PREFIX, node));
        config.auth_info.impersonate_groups = Some(vec![
            DEFAULT_NODE_GROUP.to_string(),
            ALL_AUTHENTICATED_GROUP.to_string(),
        ]);
        let client = match Client::try_from(config) {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "failed to build impersonating client");
                return false;
            }
        };

        let pods: Api<Pod> = Api::namespaced(client, DRY_RUN_NAMESPACE);
        let params = PostParams {
            dry_run: true,
            ..Default::default()
        };
        match pods.create(&params, &dry_run_pod(node)).await {
            Ok(_) => false,
            Err(e) => {
                let rejected = e.to_string().contains(MIRROR_POD_REJECTION);
                debug!(node, rejected, error = %e, "node restriction check");
                rejected
            }
        }
    }
}
