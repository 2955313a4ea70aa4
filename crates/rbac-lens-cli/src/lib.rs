//! rbac-lens CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

use commands::{CollectArgs, OutputArgs};

/// rbac-lens - Kubernetes RBAC permission auditing
#[derive(Parser, Debug)]
#[command(name = "rbac-lens")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level regardless of RUST_LOG
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub collect: CollectArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect RBAC objects and print the permission graph
    Collect,
    /// Print the permissions of every identity, with role rules inlined
    Expand(commands::expand::ExpandArgs),
    /// Evaluate the permissions of every identity against policies
    Eval(commands::eval::EvalArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Collect => commands::collect::run(&self.collect, &self.output).await,
            Commands::Expand(args) => commands::expand::run(args, &self.collect, &self.output).await,
            Commands::Eval(args) => commands::eval::run(args, &self.collect, &self.output).await,
        }
    }
}
