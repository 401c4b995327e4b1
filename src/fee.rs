//! Gas fee calculation and unit scaling
//!
//! Handles the effective gas price of legacy and EIP-1559 transactions, the
//! cost charged to a sender, and the conversion of raw integer amounts into
//! decimal values (wei into ether, token base units into token amounts).

use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{Block, Transaction};
use alloy_primitives::U256;
use rust_decimal::Decimal;

/// Decimal places of the native currency (wei per ether).
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest fractional scale a `Decimal` can hold.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Calculate the gas price a transaction pays per unit of gas.
///
/// Priority order:
/// 1. Use `gas_price` when the node reports it (legacy, and most nodes for typed txs)
/// 2. Calculate for EIP-1559: `min(max_fee, base_fee + max_priority_fee)`
pub fn calculate_effective_gas_price(tx: &Transaction, block: &Block) -> ReconcileResult<U256> {
    if let Some(gas_price) = tx.gas_price {
        return Ok(gas_price);
    }

    if tx.is_eip1559() {
        let base_fee = block
            .base_fee_per_gas
            .ok_or(ReconcileError::MissingGasPrice(tx.hash))?;
        let max_fee = tx
            .max_fee_per_gas
            .ok_or(ReconcileError::MissingGasPrice(tx.hash))?;
        let max_priority_fee = tx.max_priority_fee_per_gas.unwrap_or(U256::ZERO);

        let calculated = base_fee.saturating_add(max_priority_fee);
        return Ok(if calculated > max_fee { max_fee } else { calculated });
    }

    Err(ReconcileError::MissingGasPrice(tx.hash))
}

/// Calculate the total fee for a gas amount.
///
/// Fee = gas * gas_price
pub fn calculate_fee(gas: U256, gas_price: U256) -> U256 {
    gas.saturating_mul(gas_price)
}

/// Convert wei into native currency units.
pub fn to_native_units(wei: U256) -> ReconcileResult<Decimal> {
    scale_units(wei, NATIVE_DECIMALS)
}

/// Scale a raw integer amount by `decimals` places.
///
/// A `Decimal` holds a 96-bit mantissa with at most 28 fractional digits.
/// Amounts that need more are truncated toward zero one digit at a time;
/// an integer part that alone exceeds 96 bits is an error.
pub fn scale_units(raw: U256, decimals: u8) -> ReconcileResult<Decimal> {
    let max_mantissa = U256::from((1u128 << 96) - 1);
    let ten = U256::from(10u64);

    let mut value = raw;
    let mut scale = u32::from(decimals);
    while scale > MAX_DECIMAL_SCALE || value > max_mantissa {
        if scale == 0 {
            return Err(ReconcileError::AmountOverflow(raw.to_string()));
        }
        value /= ten;
        scale -= 1;
    }

    let mantissa =
        u128::try_from(value).map_err(|_| ReconcileError::AmountOverflow(raw.to_string()))?;
    Decimal::try_from_i128_with_scale(mantissa as i128, scale)
        .map(|d| d.normalize())
        .map_err(|_| ReconcileError::AmountOverflow(raw.to_string()))
}

/// `a - b`, failing instead of panicking on overflow.
pub fn checked_sub(a: Decimal, b: Decimal) -> ReconcileResult<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| ReconcileError::AmountOverflow(format!("{} - {}", a, b)))
}

/// `a + b`, failing instead of panicking on overflow.
pub fn checked_add(a: Decimal, b: Decimal) -> ReconcileResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| ReconcileError::AmountOverflow(format!("{} + {}", a, b)))
}
