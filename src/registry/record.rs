//! Client Record and Identity Types
//!
//! A `ClientRecord` exists once per enrolled identity and is never removed.
//! Unknown identities read back as `ClientRecord::default()`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of every fingerprint stored in the registry
pub const FINGERPRINT_LEN: usize = 32;

/// Opaque caller identifier, assigned by the authentication layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An identity that has been authenticated by the transport.
///
/// Every operation takes the caller explicitly. Only code that has checked a
/// credential should construct one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    identity: Identity,
}

impl Caller {
    pub fn authenticated(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// Errors from parsing a hex-encoded fingerprint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintParseError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

macro_rules! fingerprint_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; FINGERPRINT_LEN]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, FingerprintParseError> {
                let array: [u8; FINGERPRINT_LEN] = bytes
                    .try_into()
                    .map_err(|_| FingerprintParseError::InvalidLength(bytes.len()))?;
                Ok(Self(array))
            }
        }

        impl FromStr for $name {
            type Err = FingerprintParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
                let bytes = hex::decode(trimmed)
                    .map_err(|e| FingerprintParseError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fingerprint_type!(
    /// SHA-256 hash of a hardware-bound public key. Unique across the registry.
    HardwareKeyFingerprint
);

fingerprint_type!(
    /// Hash of the approved training code, fixed at initialization
    CodeFingerprint
);

impl HardwareKeyFingerprint {
    /// Fingerprint a raw hardware public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        Self(digest.into())
    }
}

/// Registry entry for one enrolled client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub identity: Identity,
    pub hardware_key_fingerprint: HardwareKeyFingerprint,

    /// Copied from configuration at enrollment, never changed afterwards
    pub approved_code_fingerprint: CodeFingerprint,

    /// Always within [0, 100]
    pub reputation: u8,

    pub enrolled_at: DateTime<Utc>,

    /// Maintained by the round-tracking subsystem, not by the registry
    pub total_rounds_participated: u64,
    pub successful_rounds: u64,

    pub active: bool,
}
