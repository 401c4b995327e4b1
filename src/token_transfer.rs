//! ERC20 transfer reconciliation
//!
//! Handles transactions calling `transfer(address,uint256)`. Each 3-topic log
//! in the receipt becomes a token change for the sender, and, when tokens
//! actually move to another account, a separate event for the recipient.
//! Native balances are only charged the transaction cost; the token amount is
//! never netted against them.

use crate::balance::{BalanceBatch, BalanceResolver, RunningBalances};
use crate::cache::ContractMetadataCache;
use crate::error::{ReconcileError, ReconcileResult};
use crate::fee::{calculate_effective_gas_price, calculate_fee, checked_sub, scale_units, to_native_units};
use crate::reconciler::{sorted_by_sender, ProcessorSummary, ReconcileOptions};
use crate::records::{EventContext, TokenChange};
use crate::rpc::ChainClient;
use crate::sink::EventSink;
use crate::types::{pad_hex_string, Block, Log, Receipt, Transaction, TransferKind};
use alloy_primitives::{Address, B256, U256};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};

/// Parsed `Transfer(from, to, value)` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl TransferLog {
    /// Parse a qualifying log. Returns `Ok(None)` for logs without exactly 3 topics.
    pub fn parse(tx: B256, log: &Log) -> ReconcileResult<Option<Self>> {
        if !log.is_transfer_shaped() {
            return Ok(None);
        }
        let malformed = |reason: String| ReconcileError::MalformedLog {
            tx,
            contract: log.address,
            reason,
        };

        let from = parse_address_from_topic(&log.topics[1]).map_err(malformed)?;
        let to = parse_address_from_topic(&log.topics[2]).map_err(malformed)?;
        let value = U256::try_from_be_slice(&log.data)
            .ok_or_else(|| malformed(format!("{}-byte data does not fit uint256", log.data.len())))?;

        Ok(Some(Self {
            contract: log.address,
            from,
            to,
            value,
        }))
    }
}

/// Parse an indexed address topic.
///
/// Leading zero bytes are stripped and the rest left-padded back to 20 bytes,
/// so the zero address (mints, burns) survives. Anything wider than 20
/// significant bytes is rejected.
fn parse_address_from_topic(topic: &str) -> Result<Address, String> {
    let s = topic.strip_prefix("0x").unwrap_or(topic);
    let bytes = hex::decode(pad_hex_string(s)).map_err(|e| format!("invalid hex in topic: {}", e))?;
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let significant = &bytes[first..];
    if significant.len() > 20 {
        return Err(format!("topic {} is not an address", topic));
    }
    let mut out = [0u8; 20];
    out[20 - significant.len()..].copy_from_slice(significant);
    Ok(Address::from(out))
}

/// Reconciles token transfers for one block.
pub struct TokenTransferProcessor<'a, C: ?Sized> {
    client: &'a C,
    resolver: &'a BalanceResolver,
    options: &'a ReconcileOptions,
}

impl<'a, C> TokenTransferProcessor<'a, C>
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

    /// Candidate token transfers, in block order.
    pub fn select(block: &Block) -> Vec<&Transaction> {
        block
            .transactions
            .iter()
            .filter(|tx| tx.kind() == TransferKind::Token)
            .collect()
    }

    /// Emit events for every token transfer in `block`.
    ///
    /// `senders` must hold a balance for every selected sender at the block height.
    /// Sender balances left after each charge are recorded in `running`.
    pub async fn process<S>(
        &self,
        block: &Block,
        cache: &mut ContractMetadataCache,
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

        info!("Processing {} ERC20 transactions in block {}", selected.len(), block.number);
        let receipts = self.fetch_receipts(&sorted_by_sender(&selected)).await?;

        for tx in selected {
            let receipt = receipts
                .get(&tx.hash)
                .ok_or(ReconcileError::ReceiptMissing(tx.hash))?;
            self.process_transaction(block, tx, receipt, cache, senders, running, sink, &mut summary)
                .await?;
            summary.transactions += 1;
        }

        Ok(summary)
    }

    /// Fetch receipts for `txs` concurrently, keyed by transaction hash.
    async fn fetch_receipts(&self, txs: &[&Transaction]) -> ReconcileResult<HashMap<B256, Receipt>> {
        info!("Reading {} ERC20 receipts", txs.len());
        let client = self.client;

        let results: Vec<ReconcileResult<Receipt>> = stream::iter(txs.iter().map(|tx| tx.hash))
            .map(|hash| async move {
                match client.get_transaction_receipt(hash).await {
                    Ok(Some(receipt)) => Ok(receipt),
                    Ok(None) => Err(ReconcileError::ReceiptMissing(hash)),
                    Err(e) => Err(ReconcileError::ReceiptFetch {
                        tx: hash,
                        source: e.into(),
                    }),
                }
            })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut receipts = HashMap::with_capacity(results.len());
        for receipt in results {
            let receipt = receipt?;
            receipts.insert(receipt.transaction_hash, receipt);
        }
        Ok(receipts)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_transaction<S>(
        &self,
        block: &Block,
        tx: &Transaction,
        receipt: &Receipt,
        cache: &mut ContractMetadataCache,
        senders: &BalanceBatch,
        running: &mut RunningBalances,
        sink: &mut S,
        summary: &mut ProcessorSummary,
    ) -> ReconcileResult<()>
    where
        S: EventSink + ?Sized,
    {
        info!("Processing ERC20 transaction {:?}", tx.hash);

        let gas_price = match receipt.effective_gas_price {
            Some(price) => price,
            None => calculate_effective_gas_price(tx, block)?,
        };
        let transaction_cost = to_native_units(calculate_fee(receipt.gas_used, gas_price))?;
        let signature = tx
            .joined_signature()
            .ok_or(ReconcileError::MissingSignature(tx.hash))?;

        let mut sender_changes = Vec::new();
        let mut recipients: Vec<(Address, TokenChange)> = Vec::new();

        for (index, log) in receipt.logs.iter().enumerate() {
            let Some(transfer) = TransferLog::parse(tx.hash, log)? else {
                debug!("Skipping log {} of {:?} ({} topics)", index, tx.hash, log.topics.len());
                continue;
            };
            debug!("Processing ERC20 transaction log {} of {:?}", index, tx.hash);

            let meta = cache.get_metadata(self.client, transfer.contract).await;
            let amount = scale_units(transfer.value, meta.require_decimals()?)?;

            sender_changes.push(TokenChange {
                symbol: meta.symbol.clone(),
                mint: transfer.contract,
                pre_amount: amount,
                post_amount: Decimal::ZERO,
            });

            if transfer.from != transfer.to {
                recipients.push((
                    transfer.to,
                    TokenChange {
                        symbol: meta.symbol,
                        mint: transfer.contract,
                        pre_amount: Decimal::ZERO,
                        post_amount: amount,
                    },
                ));
            }
        }

        let recipient_accounts: Vec<Address> = recipients.iter().map(|(a, _)| *a).collect();
        let recipient_balances = self
            .resolver
            .get_balances(self.client, &recipient_accounts, block.number)
            .await?;
        summary.degraded_lookups += recipient_balances.degraded_count();

        let ctx = EventContext {
            currency: self.options.currency.clone(),
            chain_id: self.options.chain_id,
            block_hash: block.hash,
            block_number: block.number,
            signature,
            transaction_cost,
        };

        let (previous, degraded) = running.previous(senders.require(tx.from)?)?;
        let current = checked_sub(previous, transaction_cost)?;
        running.record(tx.from, current, degraded);
        sink.emit(&ctx.event(tx.from, previous, current, sender_changes, degraded))?;
        summary.events += 1;

        // Recipient native balances are reported unchanged.
        for (lookup, (account, change)) in recipient_balances.iter().zip(recipients) {
            let (balance, degraded) = running.previous(lookup)?;
            sink.emit(&ctx.event(account, balance, balance, vec![change], degraded))?;
            summary.events += 1;
        }

        info!("ERC20 transaction {:?} is finished", tx.hash);
        Ok(())
    }
}
