// src/wallet/key_management.rs
//! Key handles and the `did:key` encoding used for rotation keys and
//! verification methods.
//!
//! Two curves are supported, P-256 (via `p256`) and secp256k1 (via `k256`).
//! A [`KeyHandle`] is either public-only, as decoded from a `did:key` string,
//! or carries a private key. Only the latter can sign, and that is decided by
//! the variant rather than by a runtime null check.

use crate::utils::multicodec::{self, DecodeError, P256_PUB, SECP256K1_PUB};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every `did:key` string.
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Elliptic curves a key handle may live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    P256,
    Secp256k1,
}

impl Curve {
    pub fn multicodec(&self) -> u64 {
        match self {
            Curve::P256 => P256_PUB,
            Curve::Secp256k1 => SECP256K1_PUB,
        }
    }

    fn from_multicodec(code: u64) -> Result<Self, KeyError> {
        match code {
            P256_PUB => Ok(Curve::P256),
            SECP256K1_PUB => Ok(Curve::Secp256k1),
            other => Err(KeyError::UnsupportedCodec(other)),
        }
    }
}

impl FromStr for Curve {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p256" | "p-256" | "es256" => Ok(Curve::P256),
            "secp256k1" | "k256" | "es256k" => Ok(Curve::Secp256k1),
            other => Err(KeyError::UnknownCurve(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid did:key: {0}")]
    InvalidDid(String),

    #[error("multicodec not supported; code: {0:#x}")]
    UnsupportedCodec(u64),

    #[error("unknown curve: {0}")]
    UnknownCurve(String),

    #[error("invalid key material: {0}")]
    InvalidKeyBytes(String),

    #[error("failed to sign; private key not available")]
    PrivateKeyUnavailable,

    #[error("failed to sign: {0}")]
    Signing(String),

    #[error(transparent)]
    Multibase(#[from] bs58::decode::Error),

    #[error(transparent)]
    Multicodec(#[from] DecodeError),
}

/// A public key on one of the supported curves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    Secp256k1(k256::ecdsa::VerifyingKey),
}

impl PublicKey {
    pub fn curve(&self) -> Curve {
        match self {
            PublicKey::P256(_) => Curve::P256,
            PublicKey::Secp256k1(_) => Curve::Secp256k1,
        }
    }

    /// SEC1 compressed point (33 bytes).
    pub fn to_compressed(&self) -> Vec<u8> {
        match self {
            PublicKey::P256(key) => key.to_encoded_point(true).as_bytes().to_vec(),
            PublicKey::Secp256k1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    fn from_compressed(curve: Curve, bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 33 {
            return Err(KeyError::InvalidKeyBytes(format!(
                "expected 33 byte compressed point, got {}",
                bytes.len()
            )));
        }
        let invalid = |e: p256::ecdsa::Error| KeyError::InvalidKeyBytes(e.to_string());
        Ok(match curve {
            Curve::P256 => {
                PublicKey::P256(p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes).map_err(invalid)?)
            }
            Curve::Secp256k1 => PublicKey::Secp256k1(
                k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes).map_err(invalid)?,
            ),
        })
    }

    /// Encodes this key as `did:key:z<base58btc(multicodec || point)>`.
    pub fn to_did_string(&self) -> String {
        let tagged = multicodec::encode(self.curve().multicodec(), &self.to_compressed());
        format!(
            "{DID_KEY_PREFIX}z{}",
            bs58::encode(tagged)
                .with_alphabet(bs58::Alphabet::BITCOIN)
                .into_string()
        )
    }

    /// Decodes a `did:key` string.
    pub fn from_did_string(did: &str) -> Result<Self, KeyError> {
        let multibase_part = did
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| KeyError::InvalidDid(format!("{did}; method must be key")))?;
        // did:key only uses base58-btc, identified in multibase by 'z'
        let encoded = multibase_part
            .strip_prefix('z')
            .ok_or_else(|| KeyError::InvalidDid(format!("{did}; must start with z")))?;
        if encoded.is_empty() {
            return Err(KeyError::InvalidDid(format!("{did}; must not be empty")));
        }

        let decoded = bs58::decode(encoded)
            .with_alphabet(bs58::Alphabet::BITCOIN)
            .into_vec()?;
        let (code, point) = multicodec::parse(&decoded)?;
        Self::from_compressed(Curve::from_multicodec(code)?, point)
    }

    /// Verifies a signature over a 32-byte digest.
    ///
    /// Accepts both DER and compact (`r || s`) encodings.
    pub fn verify(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        match self {
            PublicKey::P256(key) => {
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p256::ecdsa::Signature::from_slice(signature));
                match sig {
                    Ok(sig) => key.verify_prehash(digest, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            PublicKey::Secp256k1(key) => {
                let sig = k256::ecdsa::Signature::from_slice(signature)
                    .or_else(|_| k256::ecdsa::Signature::from_der(signature));
                match sig {
                    Ok(sig) => key.verify_prehash(digest, &sig).is_ok(),
                    Err(_) => false,
                }
            }
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_did_string())
    }
}

/// A private key on one of the supported curves.
#[derive(Clone)]
pub enum SigningKey {
    P256(p256::ecdsa::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
}

impl SigningKey {
    /// Generates a fresh key using the OS random number generator.
    pub fn generate(curve: Curve) -> Self {
        match curve {
            Curve::P256 => SigningKey::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            Curve::Secp256k1 => {
                SigningKey::Secp256k1(k256::ecdsa::SigningKey::random(&mut OsRng))
            }
        }
    }

    /// Loads a 32-byte big-endian scalar.
    pub fn from_bytes(curve: Curve, bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 32 {
            return Err(KeyError::InvalidKeyBytes(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let invalid = |e: p256::ecdsa::Error| KeyError::InvalidKeyBytes(e.to_string());
        Ok(match curve {
            Curve::P256 => SigningKey::P256(p256::ecdsa::SigningKey::from_slice(bytes).map_err(invalid)?),
            Curve::Secp256k1 => {
                SigningKey::Secp256k1(k256::ecdsa::SigningKey::from_slice(bytes).map_err(invalid)?)
            }
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SigningKey::P256(key) => key.to_bytes().to_vec(),
            SigningKey::Secp256k1(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            SigningKey::P256(key) => PublicKey::P256(*key.verifying_key()),
            SigningKey::Secp256k1(key) => PublicKey::Secp256k1(*key.verifying_key()),
        }
    }

    /// Signs a 32-byte digest.
    ///
    /// # Returns
    /// - P-256: ASN.1 DER encoded ECDSA signature
    /// - secp256k1: 64-byte compact signature (R || S) with low S
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
        match self {
            SigningKey::P256(key) => {
                let sig: p256::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            SigningKey::Secp256k1(key) => {
                let sig: k256::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                let sig = sig.normalize_s().unwrap_or(sig);
                Ok(sig.to_vec())
            }
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the secret scalar
        f.debug_struct("SigningKey")
            .field("public", &self.public_key().to_did_string())
            .finish_non_exhaustive()
    }
}

/// A key used by a did:plc identity.
///
/// `PublicOnly` handles come from documents fetched from a directory; they can
/// verify but never sign. `WithPrivate` handles are supplied by the caller.
#[derive(Debug, Clone)]
pub enum KeyHandle {
    PublicOnly(PublicKey),
    WithPrivate(SigningKey),
}

impl KeyHandle {
    /// Generates a new signing-capable handle.
    pub fn generate(curve: Curve) -> Self {
        KeyHandle::WithPrivate(SigningKey::generate(curve))
    }

    pub fn from_private_bytes(curve: Curve, bytes: &[u8]) -> Result<Self, KeyError> {
        SigningKey::from_bytes(curve, bytes).map(KeyHandle::WithPrivate)
    }

    /// Decodes a `did:key` string into a public-only handle.
    pub fn from_did_string(did: &str) -> Result<Self, KeyError> {
        PublicKey::from_did_string(did).map(KeyHandle::PublicOnly)
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyHandle::PublicOnly(key) => key.clone(),
            KeyHandle::WithPrivate(key) => key.public_key(),
        }
    }

    pub fn curve(&self) -> Curve {
        self.public_key().curve()
    }

    pub fn to_did_string(&self) -> String {
        self.public_key().to_did_string()
    }

    pub fn can_sign(&self) -> bool {
        matches!(self, KeyHandle::WithPrivate(_))
    }

    /// Signs a 32-byte digest. Fails for public-only handles.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
        match self {
            KeyHandle::WithPrivate(key) => key.sign(digest),
            KeyHandle::PublicOnly(_) => Err(KeyError::PrivateKeyUnavailable),
        }
    }

    pub fn verify(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        self.public_key().verify(digest, signature)
    }
}

impl From<SigningKey> for KeyHandle {
    fn from(key: SigningKey) -> Self {
        KeyHandle::WithPrivate(key)
    }
}

impl From<PublicKey> for KeyHandle {
    fn from(key: PublicKey) -> Self {
        KeyHandle::PublicOnly(key)
    }
}
