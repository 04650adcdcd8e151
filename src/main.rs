// parts-search: query supplier catalogs and print merged product records as JSON.
//
// Logs go to stderr (RUST_LOG, default parts_search=info); stdout carries only JSON.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use parts_search::{
    BrowserManager, ChromiumTabs, ExtractorSet, MemoryTabs, PageAgent, ProductRecord,
    SearchOrchestrator, SupplierId, TabPlatform, TabRegistry, Timings, load_yaml_config,
    merge_responses, sort_by_price,
};

#[derive(Debug, Parser)]
#[command(name = "parts-search")]
#[command(about = "Search supplier catalogs for spare parts")]
struct Cli {
    /// Supplier to query (repeatable); all configured suppliers when omitted
    #[arg(short, long = "supplier")]
    suppliers: Vec<SupplierId>,

    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve `<supplier>.html` snapshots from this directory instead of a browser
    #[arg(long)]
    replay_dir: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Search terms
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Output {
    products: Vec<ProductRecord>,
    errors: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parts_search=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_yaml_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let timings = Timings::from_config(&config.timing)?;
    let catalog = Arc::new(config.suppliers);
    let agent = PageAgent::new(Arc::new(ExtractorSet::from_catalog(&catalog)?));

    let mut chromium = None;
    let platform: Arc<dyn TabPlatform> = match &cli.replay_dir {
        Some(dir) => {
            let tabs = MemoryTabs::new(catalog.as_ref().clone(), agent);
            let served = tabs
                .serve_dir(dir)
                .with_context(|| format!("Failed to read snapshots from {}", dir.display()))?;
            tracing::info!("Replaying {} supplier snapshots from {}", served, dir.display());
            Arc::new(tabs)
        }
        None => {
            let manager = Arc::new(BrowserManager::new(config.browser.clone()));
            let tabs = Arc::new(ChromiumTabs::new(manager, catalog.clone(), agent));
            chromium = Some(tabs.clone());
            tabs
        }
    };

    let orchestrator = SearchOrchestrator::new(platform, Arc::new(TabRegistry::new()), catalog.clone(), timings);

    let suppliers: Vec<SupplierId> = if cli.suppliers.is_empty() {
        catalog.ids().collect()
    } else {
        cli.suppliers
    };
    let query = cli.query.join(" ");

    // one supplier at a time; each search already waits seconds for its page
    let mut responses = Vec::with_capacity(suppliers.len());
    for supplier in suppliers {
        responses.push(orchestrator.search(supplier, &query).await);
    }

    let (mut products, errors) = merge_responses(responses);
    sort_by_price(&mut products);
    let output = Output { products, errors };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");

    if let Some(tabs) = chromium {
        tabs.shutdown().await?;
    }
    Ok(())
}
