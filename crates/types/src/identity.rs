//! Account identities and addresses.
//!
//! An [`Identity`] is a keyed account able to authorize transfers. Identities
//! are derived deterministically from a seed phrase and an index, so the same
//! `(seed, index)` always yields the same key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// blake3 derive-key context for account keys.
const KEY_DERIVATION_CONTEXT: &str = "loadgen 2024-06 account signing key";

/// Routable identifier of an account: its ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    /// Size of an address in bytes.
    pub const BYTES: usize = 32;

    /// Create an address from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature made by the identity behind this address.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify(message, &Signature::from_bytes(signature)).is_ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps logs readable.
        write!(f, "Address(0x{}..)", hex::encode(&self.0[..6]))
    }
}

/// Errors from parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let array: [u8; 32] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| AddressParseError::InvalidLength {
                    expected: Self::BYTES,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A keyed account capable of authorizing transfers.
///
/// Immutable once derived. Not `Clone`: the account pool owns identities and
/// hands out `Arc<Identity>` references.
pub struct Identity {
    signing_key: SigningKey,
    address: Address,
    label: String,
}

impl Identity {
    /// Derive the identity for `index` under `seed`.
    ///
    /// Pure function of its inputs.
    pub fn derive(seed: &str, index: u64) -> Self {
        let label = format!("{seed}/{index}");
        Self::from_label(label)
    }

    /// Derive a standalone identity from a phrase such as `//Alice`.
    pub fn from_phrase(phrase: &str) -> Self {
        Self::from_label(phrase.to_string())
    }

    fn from_label(label: String) -> Self {
        let secret = blake3::derive_key(KEY_DERIVATION_CONTEXT, label.as_bytes());
        let signing_key = SigningKey::from_bytes(&secret);
        let address = Address(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
            label,
        }
    }

    /// The routable address of this identity.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Human-readable derivation label (`seed/index` or the phrase).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sign an arbitrary message.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("label", &self.label)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
