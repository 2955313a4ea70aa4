//! Collect command - build the permission graph and print it

use tracing::info;

use super::{collect_graph, CollectArgs, OutputArgs};
use crate::Result;

pub async fn run(collect: &CollectArgs, output: &OutputArgs) -> Result<()> {
    let graph = collect_graph(collect).await?;
    info!(
        service_accounts = graph.service_accounts.len(),
        nodes = graph.nodes.len(),
        users = graph.users.len(),
        groups = graph.groups.len(),
        roles = graph.roles.len(),
        "collected permission graph"
    );
    output.emit(&graph)
}
