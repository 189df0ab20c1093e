//! Identity Enrollment
//!
//! Admits a caller once, binding its hardware key for the lifetime of the
//! registry. Checks run in a fixed order: identity novelty, key novelty,
//! then attestation.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::registry::{
    AttestationVerifier, Caller, ClientRecord, CodeFingerprint, HardwareKeyFingerprint,
    PresenceOnly, RegistryError, RegistryEvent, RegistryResult, Transaction,
};
use crate::reputation::INITIAL_SCORE;

pub struct IdentityRegistry {
    approved_code_fingerprint: CodeFingerprint,
    verifier: Arc<dyn AttestationVerifier>,
}

impl IdentityRegistry {
    pub fn new(approved_code_fingerprint: CodeFingerprint) -> Self {
        Self {
            approved_code_fingerprint,
            verifier: Arc::new(PresenceOnly),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn AttestationVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn approved_code_fingerprint(&self) -> &CodeFingerprint {
        &self.approved_code_fingerprint
    }

    pub fn verifier_name(&self) -> &'static str {
        self.verifier.name()
    }

    /// Stage a new record for `caller`. Nothing is retained of the attestation.
    pub(crate) fn enroll(
        &self,
        tx: &mut Transaction<'_>,
        caller: &Caller,
        hardware_key_fingerprint: HardwareKeyFingerprint,
        attestation: &[u8],
    ) -> RegistryResult<ClientRecord> {
        let identity = caller.identity();

        if tx.record(identity).is_some() {
            debug!(identity = %identity, "Enrollment rejected: already registered");
            return Err(RegistryError::AlreadyRegistered(identity.clone()));
        }

        if tx.is_key_used(&hardware_key_fingerprint) {
            warn!(
                identity = %identity,
                hardware_key = %hardware_key_fingerprint,
                "Enrollment rejected: hardware key reuse"
            );
            return Err(RegistryError::KeyReuse(hardware_key_fingerprint));
        }

        if attestation.is_empty() {
            return Err(RegistryError::InvalidAttestation(
                "attestation payload is empty".to_string(),
            ));
        }

        self.verifier
            .verify(identity, &hardware_key_fingerprint, attestation)
            .map_err(|reason| {
                warn!(
                    identity = %identity,
                    verifier = self.verifier.name(),
                    reason = %reason,
                    "Enrollment rejected: attestation failed"
                );
                RegistryError::InvalidAttestation(reason)
            })?;

        let record = ClientRecord {
            identity: identity.clone(),
            hardware_key_fingerprint,
            approved_code_fingerprint: self.approved_code_fingerprint,
            reputation: INITIAL_SCORE,
            enrolled_at: Utc::now(),
            total_rounds_participated: 0,
            successful_rounds: 0,
            active: true,
        };

        tx.put_record(record.clone());
        tx.bind_key(hardware_key_fingerprint);
        tx.emit(RegistryEvent::Registered {
            identity: identity.clone(),
            hardware_key_fingerprint,
        });

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Identity, RegistryStore};

    fn caller(id: &str) -> Caller {
        Caller::authenticated(Identity::new(id))
    }

    fn key(byte: u8) -> HardwareKeyFingerprint {
        HardwareKeyFingerprint::from_bytes([byte; 32])
    }

    struct RejectAll;

    impl AttestationVerifier for RejectAll {
        fn verify(
            &self,
            _identity: &Identity,
            _fingerprint: &HardwareKeyFingerprint,
            _attestation: &[u8],
        ) -> Result<(), String> {
            Err("untrusted vendor".to_string())
        }

        fn name(&self) -> &'static str {
            "reject-all"
        }
    }

    #[tokio::test]
    async fn test_enroll_creates_initial_record() {
        let code = CodeFingerprint::from_bytes([9; 32]);
        let registry = IdentityRegistry::new(code);
        let store = RegistryStore::default();

        let (record, events) = store
            .transact(|tx| registry.enroll(tx, &caller("client_1"), key(1), b"quote"))
            .await
            .unwrap();

        assert_eq!(record.reputation, 100);
        assert!(record.active);
        assert_eq!(record.approved_code_fingerprint, code);
        assert_eq!(record.total_rounds_participated, 0);
        assert_eq!(record.successful_rounds, 0);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event,
            RegistryEvent::Registered {
                identity: Identity::new("client_1"),
                hardware_key_fingerprint: key(1),
            }
        );
    }

    #[tokio::test]
    async fn test_identity_check_precedes_key_check() {
        let registry = IdentityRegistry::new(CodeFingerprint::default());
        let store = RegistryStore::default();

        store
            .transact(|tx| registry.enroll(tx, &caller("client_1"), key(1), b"quote"))
            .await
            .unwrap();

        // Same identity, same key, empty attestation: the identity check wins
        let err = store
            .transact(|tx| registry.enroll(tx, &caller("client_1"), key(1), b""))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered(Identity::new("client_1")));
    }

    #[tokio::test]
    async fn test_key_check_precedes_attestation_check() {
        let registry = IdentityRegistry::new(CodeFingerprint::default());
        let store = RegistryStore::default();

        store
            .transact(|tx| registry.enroll(tx, &caller("client_1"), key(1), b"quote"))
            .await
            .unwrap();

        let err = store
            .transact(|tx| registry.enroll(tx, &caller("client_2"), key(1), b""))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::KeyReuse(key(1)));
    }

    #[tokio::test]
    async fn test_verifier_rejection_is_invalid_attestation() {
        let registry = IdentityRegistry::new(CodeFingerprint::default())
            .with_verifier(Arc::new(RejectAll));
        let store = RegistryStore::default();

        let err = store
            .transact(|tx| registry.enroll(tx, &caller("client_1"), key(1), b"quote"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidAttestation("untrusted vendor".to_string())
        );

        store
            .read(|state| {
                assert!(state.record(&Identity::new("client_1")).is_none());
                assert!(!state.is_key_used(&key(1)));
            })
            .await;
    }
}
