//! Workload placement index
//!
//! Links service accounts to the nodes their pods run on, in both
//! directions: per service account, a list of (node, pods); per node, the
//! full names of the service accounts running there.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::Pod;

use crate::model::{full_name, NodePods, UNSCHEDULED};

/// The placement-relevant part of a pod
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Workload<'a> {
    /// Pod namespace
    pub namespace: &'a str,
    /// Pod name
    pub name: &'a str,
    /// Service account the pod runs as
    pub service_account: &'a str,
    /// Node the pod is scheduled on, or [`UNSCHEDULED`]
    pub node: &'a str,
}

impl<'a> Workload<'a> {
    /// Extract a workload from a pod; `None` if the pod has no service
    /// account assigned
    pub fn from_pod(pod: &'a Pod) -> Option<Self> {
        let spec = pod.spec.as_ref()?;
        let service_account = spec
            .service_account_name
            .as_deref()
            .or(spec.service_account.as_deref())
            .filter(|sa| !sa.is_empty())?;

        Some(Self {
            namespace: pod.metadata.namespace.as_deref().unwrap_or_default(),
            name: pod.metadata.name.as_deref().unwrap_or_default(),
            service_account,
            node: spec.node_name.as_deref().unwrap_or(UNSCHEDULED),
        })
    }

    /// Whether the pod has not been scheduled yet
    pub fn is_unscheduled(&self) -> bool {
        self.node == UNSCHEDULED
    }
}

/// Bidirectional service account <-> node association
#[derive(Debug, Default)]
pub struct PlacementIndex {
    by_service_account: HashMap<(String, String), Vec<NodePods>>,
    by_node: HashMap<String, Vec<String>>,
}

impl PlacementIndex {
    /// Index every workload in order
    pub fn build<'a>(workloads: impl IntoIterator<Item = Workload<'a>>) -> Self {
        let mut index = Self::default();
        for workload in workloads {
            index.record(&workload);
        }
        index
    }

    /// Record one workload.
    ///
    /// The pod joins its node's record on the service account, created on
    /// first sight. The service account's full name is appended to the
    /// node's list once per (node, service account) pair. Unscheduled pods
    /// only land in the service account's unscheduled bucket.
    pub fn record(&mut self, workload: &Workload<'_>) {
        let key = (
            workload.namespace.to_string(),
            workload.service_account.to_string(),
        );
        let placements = self.by_service_account.entry(key).or_default();

        if let Some(existing) = placements.iter_mut().find(|p| p.name == workload.node) {
            existing.pods.push(workload.name.to_string());
            return;
        }

        placements.push(NodePods {
            name: workload.node.to_string(),
            pods: vec![workload.name.to_string()],
        });

        if !workload.is_unscheduled() {
            self.by_node
                .entry(workload.node.to_string())
                .or_default()
                .push(full_name(workload.namespace, workload.service_account));
        }
    }

    /// Remove and return the placements of a service account
    pub fn take_placements(&mut self, namespace: &str, name: &str) -> Vec<NodePods> {
        self.by_service_account
            .remove(&(namespace.to_string(), name.to_string()))
            .unwrap_or_default()
    }

    /// Remove and return the service accounts running on a node
    pub fn take_service_accounts_on(&mut self, node: &str) -> Vec<String> {
        self.by_node.remove(node).unwrap_or_default()
    }
}
