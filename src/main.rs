use std::sync::Arc;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use msigflow::aggregate::{self, FlowGraph, MultiNetworkSummary, TimelineEntry};
use msigflow::config::Config;
use msigflow::pipeline::{AccountPipeline, DiscoveredAccount};

/// Full one-shot report for a single account, printed as JSON.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountReport {
    address: String,
    discovered: Vec<DiscoveredAccount>,
    timeline: Vec<TimelineEntry>,
    flow_graphs: std::collections::HashMap<String, FlowGraph>,
    summary: MultiNetworkSummary,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=info for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        eprintln!("Usage: msigflow serve [config.toml]");
        eprintln!("       msigflow <account-address> [config.toml]");
        std::process::exit(2);
    };

    let config = match args.next() {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let pipeline = Arc::new(AccountPipeline::new(&config)?);

    if command == "serve" {
        tracing::info!("msigflow API starting");
        msigflow::api::serve(pipeline, &config.api.host, config.api.port).await?;
        return Ok(());
    }

    let address = command;
    tracing::info!(%address, "Running one-shot account pipeline");

    let discovered = pipeline.discover_accounts(&address).await;
    if discovered.is_empty() {
        tracing::warn!(%address, "Account not found on any supported network");
    }

    let bundles = pipeline.fetch_all_bundles(&address, &discovered).await;
    tracing::info!(networks = bundles.len(), "Fetched network bundles");

    let flow_graphs = bundles
        .iter()
        .map(|(id, bundle)| {
            (
                id.to_string(),
                aggregate::build_flow_graph(bundle, &address),
            )
        })
        .collect();

    let report = AccountReport {
        timeline: aggregate::build_timeline(&bundles),
        summary: aggregate::build_multi_network_summary(&bundles, &address),
        flow_graphs,
        discovered,
        address,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
