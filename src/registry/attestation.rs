//! Hardware Attestation Verification
//!
//! The registry only requires that an attestation is present. Actual proof
//! checking is delegated to an `AttestationVerifier`, chosen at startup.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::registry::{HardwareKeyFingerprint, Identity};

/// Length of an Ed25519 attestation signature
pub const ED25519_ATTESTATION_LEN: usize = 64;

/// Pluggable attestation check, run after the presence check
pub trait AttestationVerifier: Send + Sync {
    /// Returns a human-readable reason on rejection
    fn verify(
        &self,
        identity: &Identity,
        fingerprint: &HardwareKeyFingerprint,
        attestation: &[u8],
    ) -> Result<(), String>;

    fn name(&self) -> &'static str;
}

/// Accepts any non-empty attestation
#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceOnly;

impl AttestationVerifier for PresenceOnly {
    fn verify(
        &self,
        _identity: &Identity,
        _fingerprint: &HardwareKeyFingerprint,
        attestation: &[u8],
    ) -> Result<(), String> {
        if attestation.is_empty() {
            return Err("attestation payload is empty".to_string());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "presence-only"
    }
}

/// Attestation signed by a hardware vendor root key.
///
/// The payload must be an Ed25519 signature over `identity || fingerprint`.
#[derive(Debug, Clone)]
pub struct Ed25519Attestation {
    root_key: VerifyingKey,
}

impl Ed25519Attestation {
    pub fn new(root_key: VerifyingKey) -> Self {
        Self { root_key }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> anyhow::Result<Self> {
        let root_key = VerifyingKey::from_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid attestation root key: {}", e))?;
        Ok(Self { root_key })
    }

    /// Bytes the vendor signs for a given enrollment
    pub fn signing_payload(identity: &Identity, fingerprint: &HardwareKeyFingerprint) -> Vec<u8> {
        let mut payload = Vec::with_capacity(identity.as_bytes().len() + 32);
        payload.extend_from_slice(identity.as_bytes());
        payload.extend_from_slice(fingerprint.as_bytes());
        payload
    }
}

impl AttestationVerifier for Ed25519Attestation {
    fn verify(
        &self,
        identity: &Identity,
        fingerprint: &HardwareKeyFingerprint,
        attestation: &[u8],
    ) -> Result<(), String> {
        let signature_bytes: [u8; ED25519_ATTESTATION_LEN] = attestation.try_into().map_err(|_| {
            format!(
                "expected {} byte signature, got {} bytes",
                ED25519_ATTESTATION_LEN,
                attestation.len()
            )
        })?;
        let signature = Signature::from_bytes(&signature_bytes);

        let payload = Self::signing_payload(identity, fingerprint);
        self.root_key
            .verify(&payload, &signature)
            .map_err(|_| "signature does not match attestation root key".to_string())
    }

    fn name(&self) -> &'static str {
        "ed25519"
    }
}
