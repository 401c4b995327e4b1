//! Per-block reconciliation
//!
//! Pre-fetches sender balances for every transaction either processor will
//! handle, then runs the token processor followed by the native processor.
//! The reconciler owns the token metadata cache for the whole run.

use crate::balance::{BalanceFailurePolicy, BalanceResolver, RunningBalances};
use crate::cache::ContractMetadataCache;
use crate::error::ReconcileResult;
use crate::native_transfer::{NativeTransferProcessor, RecipientBalanceStrategy};
use crate::rpc::ChainClient;
use crate::sink::EventSink;
use crate::token_transfer::TokenTransferProcessor;
use crate::types::{Block, Transaction, TransferKind};
use alloy_primitives::Address;
use tracing::info;

/// Settings shared by both processors.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Currency label written on every event
    pub currency: String,
    /// Chain identifier written on every event
    pub chain_id: u32,
    /// Maximum requests in flight per batch
    pub concurrency: usize,
    pub balance_failure: BalanceFailurePolicy,
    pub recipient_strategy: RecipientBalanceStrategy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            currency: "ETH".to_string(),
            chain_id: 2,
            concurrency: 16,
            balance_failure: BalanceFailurePolicy::FailOpen,
            recipient_strategy: RecipientBalanceStrategy::Lookback,
        }
    }
}

/// Counters returned by one processor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorSummary {
    pub transactions: usize,
    pub events: usize,
    pub degraded_lookups: usize,
}

/// What happened to one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub block_number: u64,
    pub token_transactions: usize,
    pub native_transactions: usize,
    pub events: usize,
    pub degraded_lookups: usize,
}

/// Stable sort by sender address; transactions from the same sender keep block order.
pub(crate) fn sorted_by_sender<'t>(txs: &[&'t Transaction]) -> Vec<&'t Transaction> {
    let mut sorted = txs.to_vec();
    sorted.sort_by_key(|tx| tx.from);
    sorted
}

/// Reconciles blocks one at a time against a chain client.
pub struct BlockReconciler<C> {
    client: C,
    cache: ContractMetadataCache,
    resolver: BalanceResolver,
    options: ReconcileOptions,
}

impl<C: ChainClient> BlockReconciler<C> {
    pub fn new(client: C, options: ReconcileOptions) -> Self {
        let resolver = BalanceResolver::new(options.concurrency, options.balance_failure);
        Self {
            client,
            cache: ContractMetadataCache::new(),
            resolver,
            options,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cache(&self) -> &ContractMetadataCache {
        &self.cache
    }

    /// Reconcile every native and token transfer in `block` into `sink`.
    ///
    /// Any error aborts the block; events already emitted stay in the sink.
    pub async fn reconcile_block<S>(&mut self, block: &Block, sink: &mut S) -> ReconcileResult<BlockSummary>
    where
        S: EventSink + ?Sized,
    {
        info!(
            "Reading block {} ({} transactions)",
            block.number,
            block.transactions.len()
        );

        let reconciled: Vec<&Transaction> = block
            .transactions
            .iter()
            .filter(|tx| matches!(tx.kind(), TransferKind::Native | TransferKind::Token))
            .collect();
        let senders: Vec<Address> = sorted_by_sender(&reconciled).iter().map(|tx| tx.from).collect();

        info!("Reading {} sender balances", senders.len());
        let sender_balances = self
            .resolver
            .get_balances(&self.client, &senders, block.number)
            .await?;

        let mut running = RunningBalances::new(
            self.options.recipient_strategy == RecipientBalanceStrategy::Accumulate,
        );
        let token = TokenTransferProcessor::new(&self.client, &self.resolver, &self.options)
            .process(block, &mut self.cache, &sender_balances, &mut running, sink)
            .await?;
        let native = NativeTransferProcessor::new(&self.client, &self.resolver, &self.options)
            .process(block, &sender_balances, &mut running, sink)
            .await?;

        let summary = BlockSummary {
            block_number: block.number,
            token_transactions: token.transactions,
            native_transactions: native.transactions,
            events: token.events + native.events,
            degraded_lookups: sender_balances.degraded_count()
                + token.degraded_lookups
                + native.degraded_lookups,
        };
        info!(
            "Completed block {}: {} ERC20 txs, {} ETH txs, {} events, {} degraded lookups",
            summary.block_number,
            summary.token_transactions,
            summary.native_transactions,
            summary.events,
            summary.degraded_lookups
        );
        Ok(summary)
    }
}
