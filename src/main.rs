//! Balance change reconciler binary
//!
//! Walks a window of blocks and writes one JSON array of balance change
//! events for native and ERC20 transfers.

use anyhow::{Context, Result};
use balance_reconciler::config::Config;
use balance_reconciler::pacing::Pacer;
use balance_reconciler::reconciler::BlockReconciler;
use balance_reconciler::rpc::RpcClient;
use balance_reconciler::sink::JsonArrayWriter;
use balance_reconciler::watcher::{self, Watcher};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    config.validate()?;

    info!("Starting balance change reconciler");
    info!("RPC URL: {}", config.rpc_url);

    let rpc = RpcClient::new(config.rpc_url.clone());
    let reconciler = BlockReconciler::new(rpc, config.reconcile_options());
    let pacer = Pacer::new(config.pacing_policy()?);
    let mut window = Watcher::new(reconciler, pacer, config.blocks, config.start_block);

    let (output, mut writer) = match &config.output {
        Some(path) => {
            let writer = JsonArrayWriter::create(path)
                .with_context(|| format!("Failed to open output {:?}", path))?;
            (path.clone(), writer)
        }
        None => JsonArrayWriter::create_in(&config.output_dir)
            .with_context(|| format!("Failed to create output in {:?}", config.output_dir))?,
    };
    info!("Output: {:?}", output);

    let result = tokio::select! {
        result = window.run(&mut writer) => result.map(Some),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, closing output");
            Ok(None)
        }
    };

    if let Err(e) = &result {
        error!("Reconciliation stopped: {:#}", e);
    }
    let records = writer.records();
    watcher::finish(writer, &result)
        .with_context(|| format!("Failed to close output {:?}", output))?;

    if let Some(summary) = result? {
        info!(
            "Wrote {} events for blocks {}..{} ({} skipped)",
            summary.events,
            summary.first_block,
            summary.first_block + summary.blocks_attempted,
            summary.skipped_blocks.len()
        );
    }
    info!("Closed {:?} with {} records", output, records);
    Ok(())
}
