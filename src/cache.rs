//! Token metadata cache
//!
//! In-memory cache to avoid repeated RPC calls for the name, symbol and
//! decimals of a token contract.
//!
//! Strategy:
//! - The first request for a contract issues the three view calls concurrently
//! - A view that reverts or returns undecodable data is cached as absent
//! - Entries live for the whole run (token metadata does not change)

use crate::abi::{decode_string, decode_u8, DECIMALS_SELECTOR, NAME_SELECTOR, SYMBOL_SELECTOR};
use crate::error::{ReconcileError, ReconcileResult};
use crate::rpc::{BlockTag, ChainClient};
use alloy_primitives::Address;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Name, symbol and precision reported by a token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractMetadata {
    pub address: Address,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

impl ContractMetadata {
    /// Decimal precision, required to scale transfer amounts.
    pub fn require_decimals(&self) -> ReconcileResult<u8> {
        self.decimals
            .ok_or(ReconcileError::MissingDecimals(self.address))
    }
}

/// Run-scoped metadata store, keyed by contract address.
#[derive(Debug, Default)]
pub struct ContractMetadataCache {
    entries: HashMap<Address, ContractMetadata>,
}

impl ContractMetadataCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return the cached metadata for `contract`, if any.
    pub fn get(&self, contract: Address) -> Option<&ContractMetadata> {
        self.entries.get(&contract)
    }

    /// Number of contracts resolved so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve metadata for `contract`, fetching it on first use.
    pub async fn get_metadata<C>(&mut self, client: &C, contract: Address) -> ContractMetadata
    where
        C: ChainClient + ?Sized,
    {
        if let Some(meta) = self.entries.get(&contract) {
            debug!("Reading contract metadata from cache {:?}", contract);
            return meta.clone();
        }

        info!("Reading contract metadata from RPC {:?}", contract);
        let meta = fetch_metadata(client, contract).await;
        self.entries.insert(contract, meta.clone());
        meta
    }
}

async fn fetch_metadata<C>(client: &C, contract: Address) -> ContractMetadata
where
    C: ChainClient + ?Sized,
{
    let (name, symbol, decimals) = futures::join!(
        client.call(contract, &NAME_SELECTOR, BlockTag::Latest),
        client.call(contract, &SYMBOL_SELECTOR, BlockTag::Latest),
        client.call(contract, &DECIMALS_SELECTOR, BlockTag::Latest),
    );

    ContractMetadata {
        address: contract,
        name: view_or_absent(contract, "name", name, decode_string),
        symbol: view_or_absent(contract, "symbol", symbol, decode_string),
        decimals: view_or_absent(contract, "decimals", decimals, decode_u8),
    }
}

fn view_or_absent<T>(
    contract: Address,
    view: &str,
    result: anyhow::Result<Vec<u8>>,
    decode: fn(&[u8]) -> Option<T>,
) -> Option<T> {
    match result {
        Ok(data) => {
            let decoded = decode(&data);
            if decoded.is_none() {
                warn!("{}() on {:?} returned undecodable data", view, contract);
            }
            decoded
        }
        Err(e) => {
            warn!("{}() on {:?} failed: {:#}", view, contract, e);
            None
        }
    }
}
