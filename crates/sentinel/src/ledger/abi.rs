//! Minimal ABI encoding for the two checker-contract calls.

use crate::error::{LedgerError, LedgerResult};

/// `isEligible(address)`
pub const IS_ELIGIBLE_SELECTOR: &str = "66e305fd";

/// `listEntities()`
pub const LIST_ENTITIES_SELECTOR: &str = "86ded63f";

const WORD_HEX: usize = 64;

/// Left-pad a 20-byte address into a 32-byte word (no `0x`).
pub fn address_word(address: &str) -> String {
    let hex = address.trim_start_matches("0x");
    format!("{hex:0>WORD_HEX$}")
}

/// Calldata for `isEligible(address)`.
pub fn encode_is_eligible(address: &str) -> String {
    format!("0x{IS_ELIGIBLE_SELECTOR}{}", address_word(address))
}

/// Calldata for `listEntities()`.
pub fn encode_list_entities() -> String {
    format!("0x{LIST_ENTITIES_SELECTOR}")
}

/// Indexed-topic form of an address.
pub fn address_topic(address: &str) -> String {
    format!("0x{}", address_word(address))
}

/// Format a unit as a JSON-RPC block tag.
pub fn block_tag(unit: u64) -> String {
    format!("0x{unit:x}")
}

/// Parse a `0x`-prefixed quantity such as a block number.
pub fn parse_quantity(value: &str) -> LedgerResult<u64> {
    let hex = value
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::fatal(format!("quantity '{value}' lacks 0x prefix")))?;
    u64::from_str_radix(hex, 16)
        .map_err(|e| LedgerError::fatal(format!("invalid quantity '{value}': {e}")))
}

fn decode_bytes(data: &str) -> LedgerResult<Vec<u8>> {
    let hex = data.trim_start_matches("0x");
    hex::decode(hex).map_err(|e| LedgerError::fatal(format!("invalid hex return data: {e}")))
}

fn word(bytes: &[u8], index: usize) -> LedgerResult<&[u8]> {
    bytes.get(index * 32..(index + 1) * 32).ok_or_else(|| {
        LedgerError::fatal(format!(
            "return data too short: need word {index}, have {} bytes",
            bytes.len()
        ))
    })
}

fn word_as_usize(word: &[u8]) -> LedgerResult<usize> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(LedgerError::fatal("ABI offset or length out of range"));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(buf))
        .map_err(|_| LedgerError::fatal("ABI offset or length out of range"))
}

/// Decode a single `bool` return value.
pub fn decode_bool(data: &str) -> LedgerResult<bool> {
    let bytes = decode_bytes(data)?;
    let word = word(&bytes, 0)?;
    match word_as_usize(word)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(LedgerError::fatal(format!("invalid bool word {other}"))),
    }
}

/// Decode an `address[]` return value into lowercase `0x` addresses.
pub fn decode_address_array(data: &str) -> LedgerResult<Vec<String>> {
    let bytes = decode_bytes(data)?;
    let offset = word_as_usize(word(&bytes, 0)?)?;
    if offset % 32 != 0 {
        return Err(LedgerError::fatal(format!("unaligned array offset {offset}")));
    }
    let head = offset / 32;
    let len = word_as_usize(word(&bytes, head)?)?;

    (0..len)
        .map(|i| {
            let item = word(&bytes, head + 1 + i)?;
            Ok(format!("0x{}", hex::encode(&item[12..])))
        })
        .collect()
}
