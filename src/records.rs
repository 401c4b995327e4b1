//! Balance change records
//!
//! These structs are the only output of the reconciler. Field names follow the
//! camelCase layout consumers of the event stream expect; decimal amounts are
//! written as JSON numbers carrying every digit of the decimal value.

use alloy_primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// Token side of a balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenChange {
    /// Token symbol (null when the contract does not report one)
    pub symbol: Option<String>,
    /// Token contract address
    #[serde(serialize_with = "serialize_address")]
    pub mint: Address,
    #[serde(serialize_with = "serialize_decimal")]
    pub pre_amount: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub post_amount: Decimal,
}

/// One account's balance change caused by one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChangeEvent {
    pub currency_string: String,
    #[serde(serialize_with = "serialize_address")]
    pub account_address: Address,
    /// Chain identifier
    pub account_address_blockchain: u32,
    #[serde(serialize_with = "serialize_decimal")]
    pub current_native_balance: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub previous_native_balance: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub transaction_cost: Decimal,
    #[serde(serialize_with = "serialize_b256")]
    pub block_hash: B256,
    /// Block number
    pub sequence_number: u64,
    /// Joined transaction signature
    pub change_signature: String,
    pub token_changes: Vec<TokenChange>,
    /// Set when a balance used for this event came from a failed lookup.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Fields shared by every event of one transaction.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub currency: String,
    pub chain_id: u32,
    pub block_hash: B256,
    pub block_number: u64,
    pub signature: String,
    pub transaction_cost: Decimal,
}

impl EventContext {
    /// Build an event for `account`.
    pub fn event(
        &self,
        account: Address,
        previous: Decimal,
        current: Decimal,
        token_changes: Vec<TokenChange>,
        degraded: bool,
    ) -> BalanceChangeEvent {
        BalanceChangeEvent {
            currency_string: self.currency.clone(),
            account_address: account,
            account_address_blockchain: self.chain_id,
            current_native_balance: current,
            previous_native_balance: previous,
            transaction_cost: self.transaction_cost,
            block_hash: self.block_hash,
            sequence_number: self.block_number,
            change_signature: self.signature.clone(),
            token_changes,
            degraded,
        }
    }
}

fn serialize_address<S: Serializer>(addr: &Address, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{:x}", addr))
}

/// Exact JSON number, without trailing zeros.
fn serialize_decimal<S: Serializer>(value: &Decimal, s: S) -> Result<S::Ok, S::Error> {
    rust_decimal::serde::arbitrary_precision::serialize(&value.normalize(), s)
}

fn serialize_b256<S: Serializer>(hash: &B256, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{:x}", hash))
}
