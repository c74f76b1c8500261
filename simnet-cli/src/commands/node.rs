//! `simnet node add` and `simnet node remove`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use simnet_core::{Implementation, NetworkId};
use simnet_engine::NodeSpec;

use super::{block_on, home, load_images, offline_orchestrator};

#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Add a node to a network.
    Add(AddArgs),

    /// Remove a node. Refused while other nodes depend on it.
    Remove { network: NetworkId, name: String },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub network: NetworkId,

    /// bitcoind | btcd | LND | c-lightning | eclair | litd | tapd
    pub implementation: Implementation,

    /// Defaults to the latest known version.
    #[arg(long)]
    pub version: Option<String>,

    /// Id of a custom image from ~/.simnet/images.json.
    #[arg(long = "image")]
    pub custom_image: Option<String>,

    /// Bitcoin backend for a lightning node, or lightning peer for an asset
    /// node.
    #[arg(long)]
    pub attach_to: Option<String>,
}

pub fn run(command: NodeCommand) -> Result<()> {
    let home = home()?;
    match command {
        NodeCommand::Add(args) => {
            let images = load_images(&home)?;
            let network = args.network;
            let spec = NodeSpec {
                implementation: args.implementation,
                version: args.version,
                custom_image: args.custom_image,
                attach_to: args.attach_to,
            };
            let node = block_on(async {
                offline_orchestrator(&home)
                    .await?
                    .add_node(network, spec, &images)
                    .await
                    .with_context(|| format!("failed to add node to network {network}"))
            })??;
            match node.backend_name() {
                Some(backend) => println!(
                    "✓ Added {} node '{}' on '{}'",
                    node.common().implementation.display_name(),
                    node.name(),
                    backend
                ),
                None => println!(
                    "✓ Added {} node '{}'",
                    node.common().implementation.display_name(),
                    node.name()
                ),
            }
        }
        NodeCommand::Remove { network, name } => {
            block_on(async {
                offline_orchestrator(&home)
                    .await?
                    .remove_node(network, &name)
                    .await
                    .with_context(|| format!("failed to remove '{name}' from network {network}"))
            })??;
            println!("✓ Removed '{name}' from network {network}");
        }
    }
    Ok(())
}
