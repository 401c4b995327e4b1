//! Ethereum JSON-RPC types
//!
//! Type definitions for blocks, transactions, receipts and logs
//! returned from Ethereum JSON-RPC endpoints, plus the input classification
//! used to route transactions to the native or token processor.

use alloy_primitives::{Address, B256, U256};
use hex_value::FromHexDigits;
use serde::Deserialize;

/// 4-byte selector of `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Number of topics carried by an ERC20 `Transfer(address,address,uint256)` log.
pub const TRANSFER_LOG_TOPICS: usize = 3;

/// Block as returned by `eth_getBlockByNumber(.., true)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(with = "hex_value")]
    pub number: u64,

    /// Block hash (hex string in JSON)
    #[serde(with = "hex_value")]
    pub hash: B256,

    /// Base fee per gas (EIP-1559, absent before London)
    #[serde(default, with = "hex_value::opt")]
    pub base_fee_per_gas: Option<U256>,

    /// Full transaction objects, in block order
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Full transaction object embedded in a block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction hash (hex string in JSON)
    #[serde(with = "hex_value")]
    pub hash: B256,

    /// Sender address (hex string in JSON)
    #[serde(with = "hex_value")]
    pub from: Address,

    /// Recipient address (null for contract creation)
    #[serde(default, with = "hex_value::opt")]
    pub to: Option<Address>,

    /// Wei moved to `to` (hex quantity)
    #[serde(with = "hex_value")]
    pub value: U256,

    /// Gas price in wei (legacy transactions, hex quantity)
    #[serde(default, with = "hex_value::opt")]
    pub gas_price: Option<U256>,

    /// Max fee per gas (EIP-1559, hex quantity)
    #[serde(default, with = "hex_value::opt")]
    pub max_fee_per_gas: Option<U256>,

    /// Max priority fee per gas (EIP-1559, hex quantity)
    #[serde(default, with = "hex_value::opt")]
    pub max_priority_fee_per_gas: Option<U256>,

    /// Gas limit (hex quantity)
    #[serde(with = "hex_value")]
    pub gas: U256,

    /// Call data (hex string in JSON, "0x" for plain value transfers)
    #[serde(with = "hex_value")]
    pub input: Vec<u8>,

    /// Signature `r` component (hex quantity)
    #[serde(default, with = "hex_value::opt")]
    pub r: Option<U256>,

    /// Signature `s` component (hex quantity)
    #[serde(default, with = "hex_value::opt")]
    pub s: Option<U256>,

    /// 27/28, EIP-155 encoded, or a bare y-parity for typed transactions
    #[serde(default, with = "hex_value::opt")]
    pub v: Option<u64>,
}

/// How a transaction is handled by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Empty input: plain value transfer.
    Native,
    /// Input starts with the `transfer(address,uint256)` selector.
    Token,
    /// Anything else; not reconciled.
    Other,
}

impl Transaction {
    /// Check if this is a legacy transaction (has gasPrice, no maxFeePerGas).
    pub fn is_legacy(&self) -> bool {
        self.gas_price.is_some() && self.max_fee_per_gas.is_none()
    }

    /// Check if this is an EIP-1559 transaction (has maxFeePerGas).
    pub fn is_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some()
    }

    /// Classify the transaction by its input payload.
    pub fn kind(&self) -> TransferKind {
        if self.input.is_empty() {
            TransferKind::Native
        } else if self.input.starts_with(&TRANSFER_SELECTOR) {
            TransferKind::Token
        } else {
            TransferKind::Other
        }
    }

    /// Join the signature components into the 65-byte `r || s || v` form.
    ///
    /// `v` is normalised to 27/28 regardless of whether the node reported a
    /// legacy, EIP-155 or typed-transaction value. Returns `None` when any
    /// component is missing.
    pub fn joined_signature(&self) -> Option<String> {
        let (r, s, v) = (self.r?, self.s?, self.v?);
        let recovery = if v <= 1 { v } else { 1 - (v % 2) };

        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&r.to_be_bytes::<32>());
        bytes.extend_from_slice(&s.to_be_bytes::<32>());
        bytes.push(27 + recovery as u8);
        Some(format!("0x{}", hex::encode(bytes)))
    }
}

/// Log entry emitted by a contract during transaction execution.
#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the log (hex string in JSON)
    #[serde(with = "hex_value")]
    pub address: Address,

    /// Indexed topics, kept as strings (topic0 = event signature)
    #[serde(default)]
    pub topics: Vec<String>,

    /// Non-indexed event data (hex string in JSON)
    #[serde(with = "hex_value")]
    pub data: Vec<u8>,
}

impl Log {
    /// A qualifying transfer log carries exactly (signature, from, to).
    pub fn is_transfer_shaped(&self) -> bool {
        self.topics.len() == TRANSFER_LOG_TOPICS
    }
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Hash of the transaction this receipt belongs to (hex string in JSON)
    #[serde(with = "hex_value")]
    pub transaction_hash: B256,

    /// Gas used (hex quantity)
    #[serde(with = "hex_value")]
    pub gas_used: U256,

    /// Effective gas price (omitted by some nodes for pre-London blocks)
    #[serde(default, with = "hex_value::opt")]
    pub effective_gas_price: Option<U256>,

    /// Logs emitted during execution (empty for reverted transactions)
    #[serde(default)]
    pub logs: Vec<Log>,
}

/// Left-pad odd-length hex digits to a whole number of bytes.
pub(crate) fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse a quantity such as `0x1bc16d674ec80000` into a U256.
pub(crate) fn parse_hex_u256(s: &str) -> Result<U256, String> {
    U256::from_hex_digits(s.strip_prefix("0x").unwrap_or(s))
}

fn decode_fixed<const N: usize>(digits: &str, what: &str) -> Result<[u8; N], String> {
    let bytes = hex::decode(pad_hex_string(digits)).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("Expected {} bytes for {}, got {}", N, what, b.len()))
}

impl FromHexDigits for u64 {
    fn from_hex_digits(digits: &str) -> Result<Self, String> {
        u64::from_str_radix(digits, 16).map_err(|e| e.to_string())
    }
}

impl FromHexDigits for U256 {
    fn from_hex_digits(digits: &str) -> Result<Self, String> {
        if digits.is_empty() {
            return Ok(U256::ZERO);
        }
        let bytes = hex::decode(pad_hex_string(digits)).map_err(|e| e.to_string())?;
        U256::try_from_be_slice(&bytes).ok_or_else(|| format!("quantity wider than 256 bits: 0x{}", digits))
    }
}

impl FromHexDigits for B256 {
    fn from_hex_digits(digits: &str) -> Result<Self, String> {
        decode_fixed::<32>(digits, "hash").map(B256::from)
    }
}

impl FromHexDigits for Address {
    fn from_hex_digits(digits: &str) -> Result<Self, String> {
        decode_fixed::<20>(digits, "address").map(Address::from)
    }
}

impl FromHexDigits for Vec<u8> {
    fn from_hex_digits(digits: &str) -> Result<Self, String> {
        hex::decode(pad_hex_string(digits)).map_err(|e| e.to_string())
    }
}

/// `#[serde(with = "hex_value")]` for hex-encoded RPC fields.
mod hex_value {
    use serde::{Deserialize, Deserializer};

    /// Values the node encodes as `0x`-prefixed hex strings.
    pub trait FromHexDigits: Sized {
        /// Parse digits with the `0x` prefix already removed.
        fn from_hex_digits(digits: &str) -> Result<Self, String>;
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromHexDigits,
    {
        let s = String::deserialize(deserializer)?;
        T::from_hex_digits(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }

    /// Nullable fields. `null` and a bare `0x` both read as `None`.
    pub mod opt {
        use super::FromHexDigits;
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
        where
            D: Deserializer<'de>,
            T: FromHexDigits,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => {
                    let digits = s.strip_prefix("0x").unwrap_or(&s);
                    if digits.is_empty() {
                        return Ok(None);
                    }
                    T::from_hex_digits(digits).map(Some).map_err(serde::de::Error::custom)
                }
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx_json(input: &str) -> serde_json::Value {
        json!({
            "hash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "from": "0xa7d9ddbe1f17865597fbd27ec712455208b6b76d",
            "to": "0xf02c1c8e6114b1dbe8937a39260b5b0a374432bb",
            "value": "0xf3dbb76162000",
            "gasPrice": "0x4a817c800",
            "gas": "0x5208",
            "input": input,
            "r": "0x1",
            "s": "0x2",
            "v": "0x25"
        })
    }

    #[test]
    fn test_deserialize_transaction() {
        let tx: Transaction = serde_json::from_value(tx_json("0x")).unwrap();
        assert_eq!(tx.value, U256::from(0xf3dbb76162000u64));
        assert_eq!(tx.gas, U256::from(21000u64));
        assert_eq!(tx.gas_price, Some(U256::from(20_000_000_000u64)));
        assert_eq!(tx.v, Some(0x25));
        assert!(tx.max_fee_per_gas.is_none());
        assert!(tx.is_legacy());
    }

    #[test]
    fn test_classify_transactions() {
        let native: Transaction = serde_json::from_value(tx_json("0x")).unwrap();
        assert_eq!(native.kind(), TransferKind::Native);

        let token: Transaction = serde_json::from_value(tx_json(
            "0xa9059cbb000000000000000000000000f02c1c8e6114b1dbe8937a39260b5b0a374432bb",
        ))
        .unwrap();
        assert_eq!(token.kind(), TransferKind::Token);

        // approve(address,uint256)
        let other: Transaction = serde_json::from_value(tx_json("0x095ea7b3")).unwrap();
        assert_eq!(other.kind(), TransferKind::Other);
    }

    #[test]
    fn test_joined_signature_normalises_v() {
        let mut tx: Transaction = serde_json::from_value(tx_json("0x")).unwrap();

        // EIP-155 v = 37 on mainnet => recovery 0 => 0x1b
        let sig = tx.joined_signature().unwrap();
        assert_eq!(sig.len(), 2 + 130);
        assert!(sig.ends_with("1b"));
        assert!(sig.starts_with(&format!("0x{}01", "00".repeat(31))));

        // typed transaction y-parity 1 => 0x1c
        tx.v = Some(1);
        assert!(tx.joined_signature().unwrap().ends_with("1c"));

        // legacy 28 => 0x1c
        tx.v = Some(28);
        assert!(tx.joined_signature().unwrap().ends_with("1c"));

        tx.r = None;
        assert!(tx.joined_signature().is_none());
    }

    #[test]
    fn test_deserialize_receipt_without_effective_price() {
        let receipt: Receipt = serde_json::from_value(json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "gasUsed": "0xb411",
            "logs": [{
                "address": "0xdac17f958d2ee523a2206206994597c13d831ec7",
                "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
                "data": "0x"
            }]
        }))
        .unwrap();
        assert_eq!(receipt.gas_used, U256::from(0xb411u64));
        assert!(receipt.effective_gas_price.is_none());
        assert!(!receipt.logs[0].is_transfer_shaped());
        assert!(receipt.logs[0].data.is_empty());
    }

    #[test]
    fn test_parse_odd_length_quantity() {
        assert_eq!(parse_hex_u256("0x1").unwrap(), U256::from(1u64));
        assert_eq!(parse_hex_u256("0x").unwrap(), U256::ZERO);
        assert!(parse_hex_u256(&format!("0x1{}", "0".repeat(64))).is_err());
    }
}
