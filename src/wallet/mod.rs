// src/wallet/mod.rs
pub mod key_management; // P-256 / secp256k1 keys and did:key
pub mod signer;         // Rotation-key signing of operations
