//! Balance reconciler - per-account balance changes for a window of blocks
//!
//! This library walks Ethereum blocks through a JSON-RPC node and turns
//! native value transfers and ERC20 `transfer` calls into balance change
//! events: previous and current native balance, transaction cost, token
//! amount moved, and the transaction signature.

pub mod abi;
pub mod balance;
pub mod cache;
pub mod config;
pub mod error;
pub mod fee;
pub mod native_transfer;
pub mod pacing;
pub mod reconciler;
pub mod records;
pub mod rpc;
pub mod sink;
pub mod token_transfer;
pub mod types;
pub mod watcher;

#[cfg(test)]
mod test_utils;

// Re-export the main types for convenience
pub use error::{ReconcileError, ReconcileResult};
pub use reconciler::{BlockReconciler, BlockSummary, ReconcileOptions};
pub use records::{BalanceChangeEvent, TokenChange};
pub use rpc::{ChainClient, RpcClient};
pub use sink::{EventSink, JsonArrayWriter};
pub use watcher::{Watcher, WindowSummary};
