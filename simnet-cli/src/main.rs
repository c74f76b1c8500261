//! Simnet: offline management of simulated Bitcoin / Lightning / Taproot
//! Assets networks.
//!
//! # Usage
//!
//! ```text
//! simnet network list [--json]
//! simnet network create <name> [--bitcoin N] [--lightning N] [--tap N] [--description TEXT]
//! simnet network show <id> [--json]
//! simnet network rename <id> <name> [--description TEXT]
//! simnet network delete <id>
//! simnet network auto-mine <id> off|30s|1m|5m|10m
//! simnet node add <network> <implementation> [--version V] [--image ID] [--attach-to NODE]
//! simnet node remove <network> <name>
//! simnet images [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{images::ImagesArgs, network::NetworkCommand, node::NodeCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "simnet",
    version,
    about = "Design simulated Bitcoin, Lightning and Taproot Assets networks",
    long_about = None,
)]
struct Cli {
    /// Log engine activity at debug level. `RUST_LOG` takes precedence.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, inspect and delete networks.
    Network {
        #[command(subcommand)]
        command: NetworkCommand,
    },

    /// Add or remove nodes in a network.
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// List node implementations and registered custom images.
    Images(ImagesArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    simnet_engine::init_tracing(cli.verbose);
    match cli.command {
        Commands::Network { command } => commands::network::run(command),
        Commands::Node { command } => commands::node::run(command),
        Commands::Images(args) => args.run(),
    }
}
