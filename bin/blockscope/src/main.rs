//! # Blockscope
//!
//! Blockscope follows the channels of a ledger peer and publishes every block, transaction and
//! write to a document index. `blockscope` is a binary crate for a command line application for
//! running the agent.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod start;
use start::Start;

mod dashboards;
use dashboards::Dashboards;

mod block_hash;
use block_hash::BlockHash;

mod common;

#[derive(Debug, Parser)]
#[clap(about, version)]
struct Cli {
    #[clap(subcommand)]
    command: Subcommands,
}

#[derive(Debug, Subcommand)]
enum Subcommands {
    /// Run the agent until interrupted.
    Start(Start),
    /// Create index patterns and render dashboards for the configured peer.
    Dashboards(Dashboards),
    /// Compute the header hash of a block from its header fields.
    BlockHash(BlockHash),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,blockscope=debug,blockscope_core=debug");
    }
    env_logger::init();

    match cli.command {
        Subcommands::Start(cmd) => cmd.run().await,
        Subcommands::Dashboards(cmd) => cmd.run().await,
        Subcommands::BlockHash(cmd) => cmd.run(),
    }
}
