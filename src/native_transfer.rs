//! Native currency transfer reconciliation
//!
//! Handles transactions with empty input. The sender is charged
//! `value + gasPrice * gasLimit`, the recipient is credited `value`.

use crate::balance::{BalanceBatch, BalanceResolver, RunningBalances};
use crate::error::{ReconcileError, ReconcileResult};
use crate::fee::{calculate_effective_gas_price, calculate_fee, checked_add, checked_sub, to_native_units};
use crate::reconciler::{sorted_by_sender, ProcessorSummary, ReconcileOptions};
use crate::records::EventContext;
use crate::rpc::ChainClient;
use crate::sink::EventSink;
use crate::types::{Block, Transaction, TransferKind};
use alloy_primitives::Address;
use tracing::{info, warn};

/// Where a recipient's previous balance comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecipientBalanceStrategy {
    /// Query the balance at the previous block for every transaction.
    ///
    /// Several transfers to the same account in one block all start from the
    /// same value.
    #[default]
    Lookback,
    /// Seed each account from its snapshot on first touch, then carry the
    /// running balance through later transactions of the same block,
    /// including the cost charged by earlier token transfers.
    Accumulate,
}

/// Reconciles native transfers for one block.
pub struct NativeTransferProcessor<'a, C: ?Sized> {
    client: &'a C,
    resolver: &'a BalanceResolver,
    options: &'a ReconcileOptions,
}

impl<'a, C> NativeTransferProcessor<'a, C>
where
    C: ChainClient + ?Sized,
{
    pub fn new(client: &'a C, resolver: &'a BalanceResolver, options: &'a ReconcileOptions) -> Self {
        Self {
            client,
            resolver,
            options,
        }
    }

    /// Plain value transfers, in block order.
    pub fn select(block: &Block) -> Vec<&Transaction> {
        block
            .transactions
            .iter()
            .filter(|tx| tx.kind() == TransferKind::Native)
            .collect()
    }

    /// Emit sender and recipient events for every native transfer in `block`.
    ///
    /// `senders` must hold a balance for every selected sender at the block height.
    /// `running` carries balances left by earlier transactions of the block.
    pub async fn process<S>(
        &self,
        block: &Block,
        senders: &BalanceBatch,
        running: &mut RunningBalances,
        sink: &mut S,
    ) -> ReconcileResult<ProcessorSummary>
    where
        S: EventSink + ?Sized,
    {
        let selected = Self::select(block);
        let mut summary = ProcessorSummary::default();
        if selected.is_empty() {
            return Ok(summary);
        }

        info!("Processing {} ETH transactions in block {}", selected.len(), block.number);

        let recipients: Vec<Address> = sorted_by_sender(&selected)
            .iter()
            .filter_map(|tx| tx.to)
            .collect();
        let lookback_height = block.number.saturating_sub(1);
        let recipient_balances = self
            .resolver
            .get_balances(self.client, &recipients, lookback_height)
            .await?;
        summary.degraded_lookups += recipient_balances.degraded_count();

        for tx in selected {
            self.process_transaction(block, tx, senders, &recipient_balances, running, sink)?;
            summary.transactions += 1;
            summary.events += if tx.to.is_some() { 2 } else { 1 };
        }

        Ok(summary)
    }

    fn process_transaction<S>(
        &self,
        block: &Block,
        tx: &Transaction,
        senders: &BalanceBatch,
        recipients: &BalanceBatch,
        running: &mut RunningBalances,
        sink: &mut S,
    ) -> ReconcileResult<()>
    where
        S: EventSink + ?Sized,
    {
        info!("Processing ETH transaction {:?}", tx.hash);

        let amount = to_native_units(tx.value)?;
        let gas_price = calculate_effective_gas_price(tx, block)?;
        let transaction_cost = to_native_units(calculate_fee(tx.gas, gas_price))?;
        let signature = tx
            .joined_signature()
            .ok_or(ReconcileError::MissingSignature(tx.hash))?;

        let ctx = EventContext {
            currency: self.options.currency.clone(),
            chain_id: self.options.chain_id,
            block_hash: block.hash,
            block_number: block.number,
            signature,
            transaction_cost,
        };

        let (from_previous, from_degraded) = running.previous(senders.require(tx.from)?)?;
        let from_current = checked_sub(checked_sub(from_previous, transaction_cost)?, amount)?;
        running.record(tx.from, from_current, from_degraded);
        sink.emit(&ctx.event(tx.from, from_previous, from_current, Vec::new(), from_degraded))?;

        match tx.to {
            Some(to) => {
                let (to_previous, to_degraded) = running.previous(recipients.require(to)?)?;
                let to_current = checked_add(to_previous, amount)?;
                running.record(to, to_current, to_degraded);
                sink.emit(&ctx.event(to, to_previous, to_current, Vec::new(), to_degraded))?;
            }
            None => warn!("ETH transaction {:?} has no recipient", tx.hash),
        }

        info!("ETH transaction {:?} is processed", tx.hash);
        Ok(())
    }
}
