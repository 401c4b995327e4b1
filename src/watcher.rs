//! Block window driver
//!
//! Walks `block_count` consecutive heights starting at a fixed block or the
//! current chain head, reconciling one block completely before fetching the
//! next. Blocks the node cannot return are reported and skipped, so a window
//! of N means N heights attempted.

use crate::pacing::Pacer;
use crate::reconciler::BlockReconciler;
use crate::rpc::{BlockTag, ChainClient};
use crate::sink::{EventSink, JsonArrayWriter};
use crate::types::Block;
use anyhow::{Context, Result};
use serde_json::json;
use std::io::{self, Write};
use tracing::{info, warn};

/// Totals for a window run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSummary {
    pub first_block: u64,
    pub blocks_attempted: u64,
    pub blocks_processed: u64,
    pub skipped_blocks: Vec<u64>,
    pub events: usize,
    pub degraded_lookups: usize,
}

/// Drives a [`BlockReconciler`] over a window of blocks.
pub struct Watcher<C> {
    reconciler: BlockReconciler<C>,
    pacer: Pacer,
    block_count: u64,
    start_block: Option<u64>,
}

impl<C: ChainClient> Watcher<C> {
    /// Create a new watcher. `start_block = None` starts at the chain head.
    pub fn new(
        reconciler: BlockReconciler<C>,
        pacer: Pacer,
        block_count: u64,
        start_block: Option<u64>,
    ) -> Self {
        Self {
            reconciler,
            pacer,
            block_count,
            start_block,
        }
    }

    pub fn reconciler(&self) -> &BlockReconciler<C> {
        &self.reconciler
    }

    /// Resolve the first height of the window.
    ///
    /// When starting from the head, the head block itself is returned so it
    /// is not fetched twice.
    async fn resolve_start(&self) -> Result<(u64, Option<Block>)> {
        if let Some(start) = self.start_block {
            return Ok((start, None));
        }
        let head = self
            .reconciler
            .client()
            .get_block(BlockTag::Latest)
            .await
            .context("Failed to get latest block")?
            .context("Node returned no latest block")?;
        Ok((head.number, Some(head)))
    }

    async fn fetch_block(&self, height: u64) -> Option<Block> {
        match self.reconciler.client().get_block(BlockTag::Number(height)).await {
            Ok(Some(block)) => Some(block),
            Ok(None) => {
                warn!("Error reading block {}: empty result", height);
                None
            }
            Err(e) => {
                warn!("Error reading block {}: {:#}", height, e);
                None
            }
        }
    }

    /// Process the window, writing every event to `sink`.
    ///
    /// Stops at the first reconciliation or sink error.
    pub async fn run<S>(&mut self, sink: &mut S) -> Result<WindowSummary>
    where
        S: EventSink + ?Sized,
    {
        let (first_block, mut prefetched) = self.resolve_start().await?;
        info!(
            "Processing {} blocks starting at {}",
            self.block_count, first_block
        );

        let mut summary = WindowSummary {
            first_block,
            ..WindowSummary::default()
        };

        for index in 0..self.block_count {
            let height = first_block + index;
            self.pacer.before_block(index).await;
            summary.blocks_attempted += 1;

            let block = match prefetched.take() {
                Some(block) => Some(block),
                None => self.fetch_block(height).await,
            };
            let Some(block) = block else {
                summary.skipped_blocks.push(height);
                continue;
            };

            let block_summary = self
                .reconciler
                .reconcile_block(&block, sink)
                .await
                .with_context(|| format!("Failed to reconcile block {}", height))?;

            summary.blocks_processed += 1;
            summary.events += block_summary.events;
            summary.degraded_lookups += block_summary.degraded_lookups;
        }

        info!(
            "Window complete: {}/{} blocks processed, {} events, {} degraded lookups",
            summary.blocks_processed, summary.blocks_attempted, summary.events, summary.degraded_lookups
        );
        Ok(summary)
    }
}

/// Close the output document.
///
/// A fatal error is recorded as a final `{"error": ...}` element first.
pub fn finish<W: Write, T>(mut writer: JsonArrayWriter<W>, result: &Result<T>) -> io::Result<W> {
    if let Err(e) = result {
        writer.append(&json!({ "error": format!("{:#}", e) }))?;
    }
    writer.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::PacingPolicy;
    use crate::reconciler::ReconcileOptions;
    use crate::records::BalanceChangeEvent;
    use crate::test_utils::*;
    use serde_json::Value;

    fn watcher(chain: MockChain, count: u64, start: Option<u64>) -> Watcher<MockChain> {
        Watcher::new(
            BlockReconciler::new(chain, ReconcileOptions::default()),
            Pacer::new(PacingPolicy::None),
            count,
            start,
        )
    }

    fn transfer_block(number: u64, n: u8) -> Block {
        block(number, vec![native_tx(n, addr(0xa), addr(0xb), ether(1))])
    }

    #[tokio::test]
    async fn test_window_starts_at_head() {
        let chain = MockChain::new()
            .with_block(transfer_block(49, 1))
            .with_block(transfer_block(50, 2));
        // head is 50; 51 and 52 are not available yet
        let mut watcher = watcher(chain, 3, None);
        let mut events: Vec<BalanceChangeEvent> = Vec::new();

        let summary = watcher.run(&mut events).await.unwrap();
        assert_eq!(summary.first_block, 50);
        assert_eq!(summary.blocks_attempted, 3);
        assert_eq!(summary.blocks_processed, 1);
        assert_eq!(summary.skipped_blocks, vec![51, 52]);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.sequence_number == 50));
    }

    #[tokio::test]
    async fn test_window_from_start_block() {
        let chain = MockChain::new()
            .with_block(transfer_block(10, 1))
            .with_block(transfer_block(12, 2))
            .with_block(transfer_block(13, 3));
        let mut watcher = watcher(chain, 3, Some(10));
        let mut events: Vec<BalanceChangeEvent> = Vec::new();

        let summary = watcher.run(&mut events).await.unwrap();
        assert_eq!(summary.blocks_processed, 2);
        assert_eq!(summary.skipped_blocks, vec![11]);
        assert_eq!(summary.events, 4);
        let heights: Vec<u64> = events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(heights, vec![10, 10, 12, 12]);
        // native transfers never touch token metadata
        assert!(watcher.reconciler().cache().is_empty());
    }

    #[tokio::test]
    async fn test_no_head_is_fatal() {
        let mut watcher = watcher(MockChain::new(), 1, None);
        let mut events: Vec<BalanceChangeEvent> = Vec::new();
        assert!(watcher.run(&mut events).await.is_err());
    }

    #[tokio::test]
    async fn test_fatal_error_closes_document_with_error_record() {
        let good = transfer_block(20, 1);
        // token transfer without a receipt
        let bad = block(21, vec![token_tx(2, addr(0xa), addr(0x10))]);
        let chain = MockChain::new().with_block(good).with_block(bad);
        let mut watcher = watcher(chain, 2, Some(20));

        let mut writer = JsonArrayWriter::open(Vec::new()).unwrap();
        let result = watcher.run(&mut writer).await;
        assert!(result.is_err());

        let bytes = finish(writer, &result).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        let records = doc.as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["sequenceNumber"], 20);
        let message = records[2]["error"].as_str().unwrap();
        assert!(message.contains("Failed to reconcile block 21"));
        assert!(message.contains("no receipt"));
    }

    #[tokio::test]
    async fn test_successful_run_closes_document() {
        let chain = MockChain::new().with_block(transfer_block(5, 1));
        let mut watcher = watcher(chain, 1, Some(5));

        let mut writer = JsonArrayWriter::open(Vec::new()).unwrap();
        let result = watcher.run(&mut writer).await;
        let bytes = finish(writer, &result).unwrap();

        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.as_array().unwrap().len(), 2);
        assert!(doc[0].get("error").is_none());
    }
}
