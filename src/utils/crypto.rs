// src/utils/crypto.rs
//! Hashing and content addressing for did:plc.
//!
//! Uses SHA-256 for all digests, wrapped into CIDv1 content identifiers.

use crate::utils::serialization::EncodingError;
use cid::multihash::Multihash;
use cid::Cid;
use multibase::Base;
use sha2::{Digest, Sha256};

/// Method prefix of every identifier this crate derives.
pub const DID_PLC_PREFIX: &str = "did:plc:";
/// Number of base32 characters kept after the prefix.
pub const DID_PLC_ID_LEN: usize = 24;

/// Multicodec code for raw binary.
const RAW_CODEC: u64 = 0x55;
/// Multicodec code for DAG-CBOR.
const DAG_CBOR_CODEC: u64 = 0x71;
/// Multihash code for sha2-256.
const SHA2_256: u64 = 0x12;

/// Computes a SHA-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn sha256_cid(codec: u64, data: &[u8]) -> Result<Cid, EncodingError> {
    let digest = hash_data(data);
    let mh = Multihash::<64>::wrap(SHA2_256, &digest)
        .map_err(|e| EncodingError::Cid(e.to_string()))?;
    Ok(Cid::new_v1(codec, mh))
}

/// Derives a `did:plc` identifier from the canonical bytes of a signed operation.
///
/// The digest is wrapped as a raw-codec CIDv1, base32 encoded (lowercase, no
/// padding) and truncated to 24 characters.
///
/// # Note
/// The identifier commits to one specific signed operation, not to the
/// document alone: the same document signed by another rotation key, or by a
/// signer using random nonces, yields a different DID.
pub fn derive_did(signed_bytes: &[u8]) -> Result<String, EncodingError> {
    let cid = sha256_cid(RAW_CODEC, signed_bytes)?;
    let encoded = multibase::encode(Base::Base32Lower, cid.to_bytes());
    // drop the multibase prefix character
    let id: String = encoded.chars().skip(1).take(DID_PLC_ID_LEN).collect();
    Ok(format!("{DID_PLC_PREFIX}{id}"))
}

/// Content address of a signed operation, as a directory reports it in `cid`.
pub fn operation_cid(signed_bytes: &[u8]) -> Result<String, EncodingError> {
    Ok(sha256_cid(DAG_CBOR_CODEC, signed_bytes)?.to_string())
}

/// Checks that `did` has the shape `did:plc:` followed by 24 base32 characters.
pub fn is_did_plc(did: &str) -> bool {
    match did.strip_prefix(DID_PLC_PREFIX) {
        Some(id) => {
            id.len() == DID_PLC_ID_LEN
                && id.bytes().all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
        }
        None => false,
    }
}
