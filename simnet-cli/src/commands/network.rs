//! `simnet network ...`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use simnet_core::{networks, AutoMineMode, Network, NetworkId, NodeKind, Status};
use simnet_engine::NodeCounts;

use super::{block_on, home, load_images, offline_orchestrator};

#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// List all networks.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create a network of bitcoind, LND and tapd nodes.
    Create(CreateArgs),

    /// Show the nodes of a network.
    Show {
        id: NetworkId,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rename a network.
    Rename {
        id: NetworkId,
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a network and its working directory.
    Delete { id: NetworkId },

    /// Set the automatic mining interval: off, 30s, 1m, 5m or 10m.
    AutoMine { id: NetworkId, mode: AutoMineMode },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub name: String,

    #[arg(long, default_value_t = 1)]
    pub bitcoin: usize,

    #[arg(long, default_value_t = 2)]
    pub lightning: usize,

    #[arg(long, default_value_t = 0)]
    pub tap: usize,

    #[arg(long, default_value = "")]
    pub description: String,
}

pub fn run(command: NetworkCommand) -> Result<()> {
    let home = home()?;
    match command {
        NetworkCommand::List { json } => {
            let nets = block_on(async {
                let orchestrator = offline_orchestrator(&home).await?;
                Ok::<_, anyhow::Error>(orchestrator.store().networks())
            })??;
            if json {
                println!("{}", serde_json::to_string_pretty(&nets)?);
                return Ok(());
            }
            print_networks(&nets);
        }
        NetworkCommand::Create(args) => {
            let images = load_images(&home)?;
            let counts = NodeCounts {
                bitcoin: args.bitcoin,
                lightning: args.lightning,
                tap: args.tap,
            };
            let net = block_on(async {
                offline_orchestrator(&home)
                    .await?
                    .create_network(&args.name, &args.description, counts, &images)
                    .await
                    .with_context(|| format!("failed to create network '{}'", args.name))
            })??;
            println!(
                "✓ Created network {} '{}' with {} nodes",
                net.id,
                net.name,
                net.node_names().count()
            );
        }
        NetworkCommand::Show { id, json } => {
            let net = block_on(async {
                let orchestrator = offline_orchestrator(&home).await?;
                orchestrator.store().network(id).context("network lookup failed")
            })??;
            if json {
                println!("{}", serde_json::to_string_pretty(&net)?);
                return Ok(());
            }
            print_network(&net);
        }
        NetworkCommand::Rename {
            id,
            name,
            description,
        } => {
            block_on(async {
                offline_orchestrator(&home)
                    .await?
                    .rename_network(id, &name, description.as_deref())
                    .await
                    .with_context(|| format!("failed to rename network {id}"))
            })??;
            println!("✓ Renamed network {id} to '{name}'");
        }
        NetworkCommand::Delete { id } => {
            let removed = block_on(async {
                offline_orchestrator(&home)
                    .await?
                    .delete_network(id)
                    .await
                    .with_context(|| format!("failed to delete network {id}"))
            })??;
            networks::remove_network_dir_at(&home, id)
                .with_context(|| format!("network {id} deleted but its directory remains"))?;
            println!("✓ Deleted network {} '{}'", removed.id, removed.name);
        }
        NetworkCommand::AutoMine { id, mode } => {
            block_on(async {
                offline_orchestrator(&home)
                    .await?
                    .set_auto_mine(id, mode)
                    .await
                    .with_context(|| format!("failed to set auto-mine on network {id}"))
            })??;
            println!("✓ Auto-mine for network {id} set to {mode}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct NetworkRow {
    #[tabled(rename = "ID")]
    id: NetworkId,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "NODES")]
    nodes: usize,
    #[tabled(rename = "AUTO-MINE")]
    auto_mine: String,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "IMPLEMENTATION")]
    implementation: String,
    #[tabled(rename = "VERSION")]
    version: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "BACKEND")]
    backend: String,
}

fn print_networks(nets: &[Network]) {
    if nets.is_empty() {
        println!("No networks.");
        println!("Run: simnet network create <name>");
        return;
    }
    let rows: Vec<NetworkRow> = nets
        .iter()
        .map(|n| NetworkRow {
            id: n.id,
            name: n.name.clone(),
            status: status_label(n.status),
            nodes: n.node_names().count(),
            auto_mine: n.auto_mine_mode.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn print_network(net: &Network) {
    println!("{} {}", format!("#{}", net.id).bold(), net.name.bold());
    if !net.description.is_empty() {
        println!("{}", net.description);
    }
    println!("Status: {}  Auto-mine: {}", status_label(net.status), net.auto_mine_mode);

    let rows: Vec<NodeRow> = NodeKind::TIERS
        .into_iter()
        .flat_map(|kind| net.tier(kind))
        .map(|node| NodeRow {
            name: node.name().to_string(),
            kind: node.kind().to_string(),
            implementation: node.common().implementation.display_name().to_string(),
            version: node.common().version.clone(),
            status: status_label(node.status()),
            backend: node.backend_name().unwrap_or("-").to_string(),
        })
        .collect();
    if rows.is_empty() {
        println!("No nodes.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: Status) -> String {
    let label = status.to_string();
    match status {
        Status::Started => label.green().to_string(),
        Status::Starting | Status::Stopping => label.yellow().to_string(),
        Status::Error => label.red().bold().to_string(),
        Status::Stopped => label.bright_black().to_string(),
    }
}
