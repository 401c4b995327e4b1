//! Minimal ABI support for the token metadata views
//!
//! Only the three zero-argument views `name()`, `symbol()` and `decimals()`
//! are called, so their selectors are fixed and return data is decoded by hand.

use alloy_primitives::U256;

/// `name()`
pub const NAME_SELECTOR: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];
/// `symbol()`
pub const SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
/// `decimals()`
pub const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

const WORD: usize = 32;

fn word_to_usize(word: &[u8]) -> Option<usize> {
    let value = U256::try_from_be_slice(word)?;
    usize::try_from(value).ok()
}

/// Decode an ABI-encoded dynamic `string` return value.
///
/// Returns `None` if the data is not a well-formed string encoding.
pub fn decode_string(data: &[u8]) -> Option<String> {
    let offset = word_to_usize(data.get(..WORD)?)?;
    let len_end = offset.checked_add(WORD)?;
    let len = word_to_usize(data.get(offset..len_end)?)?;
    let bytes = data.get(len_end..len_end.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Decode an ABI-encoded `uint8` return value.
pub fn decode_u8(data: &[u8]) -> Option<u8> {
    let value = U256::try_from_be_slice(data.get(..WORD)?)?;
    u8::try_from(value).ok()
}

#[cfg(test)]
pub(crate) fn encode_string(s: &str) -> Vec<u8> {
    let mut out = vec![0u8; WORD];
    out[WORD - 1] = 0x20;
    out.extend_from_slice(&U256::from(s.len()).to_be_bytes::<32>());
    out.extend_from_slice(s.as_bytes());
    let padded = (s.len() + WORD - 1) / WORD * WORD;
    out.resize(2 * WORD + padded, 0);
    out
}

#[cfg(test)]
pub(crate) fn encode_u8(v: u8) -> Vec<u8> {
    let mut out = vec![0u8; WORD];
    out[WORD - 1] = v;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_usdt_symbol() {
        let data = hex::decode(concat!(
            "0000000000000000000000000000000000000000000000000000000000000020",
            "0000000000000000000000000000000000000000000000000000000000000004",
            "5553445400000000000000000000000000000000000000000000000000000000"
        ))
        .unwrap();
        assert_eq!(decode_string(&data).as_deref(), Some("USDT"));
        assert_eq!(decode_string(&encode_string("Tether USD")).as_deref(), Some("Tether USD"));
    }

    #[test]
    fn test_decode_string_rejects_truncated_data() {
        assert_eq!(decode_string(&[]), None);
        let mut data = encode_string("USDT");
        data.truncate(WORD + 8);
        assert_eq!(decode_string(&data), None);
        // bytes32-style symbol (MKR) is not a dynamic string
        let mkr = hex::decode("4d4b520000000000000000000000000000000000000000000000000000000000").unwrap();
        assert_eq!(decode_string(&mkr), None);
    }

    #[test]
    fn test_decode_decimals() {
        assert_eq!(decode_u8(&encode_u8(6)), Some(6));
        assert_eq!(decode_u8(&encode_u8(18)), Some(18));
        let mut too_big = vec![0u8; WORD];
        too_big[WORD - 2] = 1;
        assert_eq!(decode_u8(&too_big), None);
        assert_eq!(decode_u8(&[0u8; 4]), None);
    }
}
