//! JSON-RPC client for Ethereum nodes
//!
//! Provides a typed interface to Ethereum JSON-RPC endpoints.
//! Handles hex string parsing and error handling.
//!
//! The reconciler only talks to the node through [`ChainClient`], so tests can
//! substitute an in-memory chain.

use crate::types::{parse_hex_u256, Block, Receipt};
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;

/// Block selector for `eth_getBlockByNumber` and `eth_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Number(n) => write!(f, "0x{:x}", n),
        }
    }
}

/// Read-only view of the chain used by the reconciler.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Full block with transactions, or `None` when the node has no such block.
    async fn get_block(&self, tag: BlockTag) -> Result<Option<Block>>;

    /// Receipt for a transaction, or `None` when the node does not know it.
    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>>;

    /// Native balance of `address` at block `height`.
    async fn get_balance(&self, address: Address, height: u64) -> Result<U256>;

    /// Execute a read-only call against `to` and return the raw return data.
    async fn call(&self, to: Address, data: &[u8], tag: BlockTag) -> Result<Vec<u8>>;
}

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Make a JSON-RPC call.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let request = build_request(method, params);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        extract_result(json)
    }
}

/// Build a JSON-RPC 2.0 request envelope.
fn build_request(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params
    })
}

/// Pull `result` out of a response envelope, surfacing RPC errors.
fn extract_result(json: Value) -> Result<Value> {
    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        anyhow::bail!("RPC error: {}", message);
    }

    json.get("result")
        .cloned()
        .context("RPC response missing 'result' field")
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn get_block(&self, tag: BlockTag) -> Result<Option<Block>> {
        let params = json!([tag.to_string(), true]);
        let result = self.request("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .with_context(|| format!("Failed to deserialize block {}", tag))
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        let params = json!([format!("0x{:x}", tx_hash)]);
        let result = self.request("eth_getTransactionReceipt", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .context("Failed to deserialize receipt")
    }

    async fn get_balance(&self, address: Address, height: u64) -> Result<U256> {
        let params = json!([format!("0x{:x}", address), BlockTag::Number(height).to_string()]);
        let result = self.request("eth_getBalance", params).await?;

        let raw = result
            .as_str()
            .context("Balance response is not a string")?;
        tracing::debug!("RPC get_balance({:?}, {}) returned raw: {}", address, height, raw);

        parse_hex_u256(raw)
            .map_err(anyhow::Error::msg)
            .context("Failed to decode balance hex")
    }

    async fn call(&self, to: Address, data: &[u8], tag: BlockTag) -> Result<Vec<u8>> {
        let params = json!([
            {
                "to": format!("0x{:x}", to),
                "data": format!("0x{}", hex::encode(data)),
            },
            tag.to_string()
        ]);
        let result = self.request("eth_call", params).await?;

        let raw = result.as_str().context("eth_call response is not a string")?;
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        hex::decode(crate::types::pad_hex_string(raw)).context("Failed to decode eth_call hex")
    }
}
