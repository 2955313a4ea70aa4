//! Expand command - print each identity's permissions with rules inlined

use std::path::PathBuf;

use clap::Args;
use rbac_lens_graph::{expand, IdentitySelector};

use super::{load_graph, CollectArgs, OutputArgs};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// Graph previously written by `collect` (collects from the cluster if
    /// not specified)
    pub graph_file: Option<PathBuf>,

    /// Only show this identity: sa=<namespace>:<name>, node=<name>,
    /// user=<name> or group=<name>
    #[arg(long, short = 'z')]
    pub zoom: Option<IdentitySelector>,
}

pub async fn run(args: ExpandArgs, collect: &CollectArgs, output: &OutputArgs) -> Result<()> {
    let graph = load_graph(args.graph_file.as_deref(), collect).await?;
    let expanded = expand(&graph);

    let Some(selector) = args.zoom else {
        return output.emit(&expanded);
    };
    let identity = expanded
        .find(&selector)
        .ok_or_else(|| Error::validation(format!("cannot find zoomed identity {}", selector)))?;
    output.emit(&identity)
}
