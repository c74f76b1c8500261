//! `simnet images`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use simnet_core::{Implementation, NodeImages, Platform};

use super::{home, load_images};

#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct ImageRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "VERSION")]
    version: String,
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "SUPPORTED")]
    supported: bool,
}

impl ImagesArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let images = load_images(&home)?;
        let rows = build_rows(&images, Platform::current());

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        if images.custom.is_empty() {
            println!(
                "{}",
                format!("No custom images. Register them in ~/.simnet/{}", super::IMAGES_FILE)
                    .bright_black()
            );
        }
        Ok(())
    }
}

fn build_rows(images: &NodeImages, platform: Platform) -> Vec<ImageRow> {
    let managed = Implementation::ALL.into_iter().map(|imp| {
        let version = imp.latest_version();
        ImageRow {
            id: imp.id().to_string(),
            name: imp.display_name().to_string(),
            kind: imp.kind().to_string(),
            version: version.to_string(),
            image: imp.default_image(version),
            supported: imp.supports(platform),
        }
    });
    let custom = images.custom.iter().map(|c| ImageRow {
        id: c.id.clone(),
        name: c.name.clone(),
        kind: c.implementation.kind().to_string(),
        version: "custom".to_string(),
        image: c.docker_image.clone(),
        supported: c.is_supported_on(platform),
    });
    managed.chain(custom).collect()
}
