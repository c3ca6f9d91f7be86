// src/utils/mod.rs
pub mod crypto;        // Hashing, CIDs and DID derivation
pub mod multicodec;    // Unsigned varints and multicodec prefixes
pub mod serialization; // Canonical DAG-CBOR / DAG-JSON encoding
