//! Reconciliation error taxonomy
//!
//! Every failure below the block-window driver is one of these. Only balance
//! lookups recover locally (see [`crate::balance`]); everything else aborts the
//! block and bubbles up to the driver.

use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Boxed transport error carried as a source.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch receipt for tx {tx:?}")]
    ReceiptFetch {
        tx: B256,
        #[source]
        source: TransportError,
    },

    #[error("node returned no receipt for tx {0:?}")]
    ReceiptMissing(B256),

    #[error("failed to fetch balance of {account:?} at block {height}")]
    BalanceFetch {
        account: Address,
        height: u64,
        #[source]
        source: TransportError,
    },

    #[error("no balance snapshot for {0:?} in the pre-fetched batch")]
    MissingSnapshot(Address),

    #[error("token contract {0:?} did not report decimals")]
    MissingDecimals(Address),

    #[error("malformed transfer log from {contract:?} in tx {tx:?}: {reason}")]
    MalformedLog {
        tx: B256,
        contract: Address,
        reason: String,
    },

    #[error("tx {0:?} has no signature components")]
    MissingSignature(B256),

    #[error("tx {0:?} carries no usable gas price")]
    MissingGasPrice(B256),

    #[error("amount {0} does not fit a decimal")]
    AmountOverflow(String),

    #[error("failed to write event")]
    Sink(#[from] std::io::Error),
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
