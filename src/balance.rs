//! Bulk balance lookups
//!
//! Fetches native balances for a list of accounts at one block height with a
//! bounded number of requests in flight. A failed lookup does not fail the
//! batch: it is tagged as degraded and reads as zero, unless the resolver is
//! configured to abort instead.

use crate::error::{ReconcileError, ReconcileResult};
use crate::fee::to_native_units;
use crate::rpc::ChainClient;
use alloy_primitives::{Address, U256};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

/// What to do when a single balance lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceFailurePolicy {
    /// Substitute zero, tag the lookup as degraded and continue.
    #[default]
    FailOpen,
    /// Abort the block.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceOutcome {
    Fetched(U256),
    /// The lookup failed; the balance reads as zero.
    Degraded { reason: String },
}

/// Balance of one account at one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceLookup {
    pub account: Address,
    pub height: u64,
    pub outcome: BalanceOutcome,
}

impl BalanceLookup {
    /// Raw balance in wei (zero when degraded).
    pub fn value(&self) -> U256 {
        match self.outcome {
            BalanceOutcome::Fetched(v) => v,
            BalanceOutcome::Degraded { .. } => U256::ZERO,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, BalanceOutcome::Degraded { .. })
    }
}

/// Lookups in the order the accounts were requested.
#[derive(Debug, Clone, Default)]
pub struct BalanceBatch {
    lookups: Vec<BalanceLookup>,
}

impl BalanceBatch {
    pub fn new(lookups: Vec<BalanceLookup>) -> Self {
        Self { lookups }
    }

    /// First lookup for `account`.
    pub fn get(&self, account: Address) -> Option<&BalanceLookup> {
        self.lookups.iter().find(|l| l.account == account)
    }

    /// Like [`get`](Self::get), but a missing account is an error.
    pub fn require(&self, account: Address) -> ReconcileResult<&BalanceLookup> {
        self.get(account)
            .ok_or(ReconcileError::MissingSnapshot(account))
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BalanceLookup> {
        self.lookups.iter()
    }

    pub fn degraded_count(&self) -> usize {
        self.lookups.iter().filter(|l| l.is_degraded()).count()
    }
}

/// Native balances carried from one transaction to the next within a block.
///
/// Shared by the token and native processors. When disabled nothing is
/// recorded and every read falls through to the snapshot.
#[derive(Debug, Default)]
pub struct RunningBalances {
    enabled: bool,
    entries: HashMap<Address, (Decimal, bool)>,
}

impl RunningBalances {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: HashMap::new(),
        }
    }

    /// Balance before the next transaction touching `lookup.account`, with its degraded marker.
    pub fn previous(&self, lookup: &BalanceLookup) -> ReconcileResult<(Decimal, bool)> {
        match self.entries.get(&lookup.account) {
            Some(running) => Ok(*running),
            None => Ok((to_native_units(lookup.value())?, lookup.is_degraded())),
        }
    }

    /// Store the balance left by the current transaction.
    pub fn record(&mut self, account: Address, balance: Decimal, degraded: bool) {
        if self.enabled {
            self.entries.insert(account, (balance, degraded));
        }
    }
}

/// Fetches balances in bounded concurrent batches.
#[derive(Debug, Clone)]
pub struct BalanceResolver {
    concurrency: usize,
    policy: BalanceFailurePolicy,
}

impl BalanceResolver {
    pub fn new(concurrency: usize, policy: BalanceFailurePolicy) -> Self {
        Self {
            concurrency: concurrency.max(1),
            policy,
        }
    }

    /// Fetch the balance of every account in `accounts` at `height`.
    ///
    /// Accounts may repeat; each entry gets its own request and the result
    /// keeps the input order. Never fails under [`BalanceFailurePolicy::FailOpen`].
    pub async fn get_balances<C>(
        &self,
        client: &C,
        accounts: &[Address],
        height: u64,
    ) -> ReconcileResult<BalanceBatch>
    where
        C: ChainClient + ?Sized,
    {
        debug!("Reading {} balances at block {}", accounts.len(), height);

        let lookups: Vec<BalanceLookup> = stream::iter(accounts.iter().copied())
            .map(|account| async move {
                let outcome = match client.get_balance(account, height).await {
                    Ok(value) => BalanceOutcome::Fetched(value),
                    Err(e) => {
                        warn!(
                            "Balance lookup for {:?} at block {} failed, using zero: {:#}",
                            account, height, e
                        );
                        BalanceOutcome::Degraded {
                            reason: format!("{:#}", e),
                        }
                    }
                };
                BalanceLookup {
                    account,
                    height,
                    outcome,
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        if self.policy == BalanceFailurePolicy::Abort {
            if let Some(failed) = lookups.iter().find(|l| l.is_degraded()) {
                let reason = match &failed.outcome {
                    BalanceOutcome::Degraded { reason } => reason.clone(),
                    BalanceOutcome::Fetched(_) => String::new(),
                };
                return Err(ReconcileError::BalanceFetch {
                    account: failed.account,
                    height,
                    source: reason.into(),
                });
            }
        }

        Ok(BalanceBatch::new(lookups))
    }
}
