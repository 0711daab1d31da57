//! Beacon node binary

use anyhow::Context;
use aura_beacon::cli::{BeaconApp, CatalogAction, Cli, Commands};
use aura_beacon::config::BeaconConfig;
use aura_beacon::providers::{
    BandPricing, MemoryInventory, MemoryOrderGateway, TracingSink,
};
use aura_beacon::transaction::MemoryStore;
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            remote,
            catalog,
        } => {
            let mut config = match config {
                Some(path) => BeaconConfig::load(&path)
                    .with_context(|| format!("loading config from {}", path.display()))?,
                None => BeaconConfig::default(),
            };
            if let Some(remote) = remote {
                config.connector.remote_addr = remote;
            }

            let items: Vec<aura_beacon::providers::CatalogItem> = match catalog {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading catalog {}", path.display()))?;
                    let items: Vec<aura_beacon::providers::CatalogItem> =
                        serde_json::from_str(&raw).context("parsing catalog")?;
                    tracing::info!(items = items.len(), "catalog loaded");
                    items
                }
                None => {
                    tracing::warn!("no catalog given, every inquiry will be declined");
                    Vec::new()
                }
            };

            let app = BeaconApp::new(
                config.clone(),
                Arc::new(MemoryInventory::new(items.clone())),
                Arc::new(BandPricing::new(config.pricing.floor_percent)?),
                Arc::new(MemoryOrderGateway::from_catalog(&items)),
                Arc::new(MemoryStore::new()),
                Arc::new(TracingSink),
            )?;

            tracing::info!(remote = %config.connector.remote_addr, "beacon starting");

            tokio::select! {
                result = app.run() => {
                    result.context("beacon stopped")?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                }
            }
        }

        Commands::Catalog { action } => match action {
            CatalogAction::Check { path } => {
                let inventory = MemoryInventory::load(&path)
                    .with_context(|| format!("loading catalog from {}", path.display()))?;
                println!("catalog ok: {} items", inventory.item_count());
            }
            CatalogAction::List { path } => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let items: Vec<aura_beacon::providers::CatalogItem> =
                    serde_json::from_str(&raw).context("parsing catalog")?;
                for item in items {
                    println!(
                        "{}  {}  stock={}  price={}",
                        item.sku, item.title, item.available, item.list_price
                    );
                }
            }
        },
    }

    Ok(())
}
