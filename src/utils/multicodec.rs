// src/utils/multicodec.rs
//! Multicodec tagging: an unsigned LEB128 varint code followed by the payload.
//!
//! Used to tag compressed public keys inside `did:key` strings.

/// bitmask for 7 least significant bits
const LSB_7: u8 = u8::MAX / 2;
/// bitmask for most significant bit
const MSB: u8 = !LSB_7;

/// Longest varint that still fits in 63 bits.
pub const MAX_LEN_UVARINT63: usize = 9;

/// Multicodec code for a compressed P-256 public key.
pub const P256_PUB: u64 = 0x1200;
/// Multicodec code for a compressed secp256k1 public key.
pub const SECP256K1_PUB: u64 = 0xe7;

#[inline]
const fn msb_is_1(val: u8) -> bool {
    val & MSB == MSB
}

/// Prefixes `bytes` with the varint encoding of `code`.
pub fn encode(code: u64, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_LEN_UVARINT63 + bytes.len());
    encode_varint(code, &mut out);
    out.extend_from_slice(bytes);
    out
}

/// Splits a multicodec-tagged buffer into its code and payload.
pub fn parse(tagged: &[u8]) -> Result<(u64, &[u8]), DecodeError> {
    let (code, n) = decode_varint(tagged)?;
    Ok((code, &tagged[n..]))
}

pub(crate) fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value > LSB_7 as u64 {
        out.push((value as u8 & LSB_7) | MSB);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Returns the decoded value and how many bytes it occupied.
pub(crate) fn decode_varint(encoded: &[u8]) -> Result<(u64, usize), DecodeError> {
    if encoded.is_empty() {
        return Err(DecodeError::MissingBytes);
    }

    let mut result: u64 = 0;
    for (idx, &byte) in encoded.iter().enumerate() {
        if idx >= MAX_LEN_UVARINT63 {
            return Err(DecodeError::WouldOverflow);
        }
        result |= ((byte & LSB_7) as u64) << (7 * idx);
        if !msb_is_1(byte) {
            return Ok((result, idx + 1));
        }
    }
    // Every byte had its continuation bit set.
    Err(DecodeError::MissingBytes)
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum DecodeError {
    #[error("expected more bytes than what were provided")]
    MissingBytes,
    #[error("the decoded number is too large to fit into 63 bits")]
    WouldOverflow,
}
