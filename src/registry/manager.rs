//! Trust Registry - Main Orchestrator
//!
//! Owns the store and wires enrollment, reputation, eligibility and the
//! administrative authority around it. All mutations go through
//! `RegistryStore::transact`, so each one is atomic and totally ordered.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::registry::{
    AttestationVerifier, Caller, ClientRecord, CodeFingerprint, DEFAULT_JOURNAL_CAPACITY,
    EventSink, HardwareKeyFingerprint, Identity, IdentityRegistry, RegistryResult, RegistryStore,
    SequencedEvent,
};
use crate::reputation::{
    AdministrativeAuthority, EligibilityPolicy, ReputationAdjustment, ReputationEngine,
    ReputationThresholds,
};

/// Parameters fixed when the registry is built
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub approved_code_fingerprint: CodeFingerprint,
    pub admin_principal: Identity,
    pub thresholds: ReputationThresholds,
    pub journal_capacity: usize,
}

impl RegistrySettings {
    pub fn new(approved_code_fingerprint: CodeFingerprint, admin_principal: Identity) -> Self {
        Self {
            approved_code_fingerprint,
            admin_principal,
            thresholds: ReputationThresholds::default(),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

/// Outcome of a committed enrollment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub record: ClientRecord,
    pub events: Vec<SequencedEvent>,
}

/// Outcome of a committed reputation change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentReceipt {
    pub adjustment: ReputationAdjustment,
    pub events: Vec<SequencedEvent>,
}

/// Registry-wide counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub enrolled_clients: usize,
    pub active_clients: usize,
    pub eligible_clients: usize,
    pub used_hardware_keys: usize,
    pub last_sequence: u64,
}

/// Entry point for every registry read and write.
///
/// The store and its staging transactions stay private to the crate, so
/// records can only change through `enroll` and `adjust_reputation`:
///
/// ```compile_fail
/// use silica_trust_registry::registry::Transaction;
/// ```
///
/// ```compile_fail
/// use silica_trust_registry::registry::RegistryStore;
/// ```
pub struct TrustRegistry {
    store: RegistryStore,
    identity: IdentityRegistry,
    reputation: ReputationEngine,
    eligibility: EligibilityPolicy,
}

impl TrustRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        info!(
            admin = %settings.admin_principal,
            min_reputation = settings.thresholds.min_reputation,
            approved_code = %settings.approved_code_fingerprint,
            "Trust registry initialized"
        );

        Self {
            store: RegistryStore::new(settings.journal_capacity),
            identity: IdentityRegistry::new(settings.approved_code_fingerprint),
            reputation: ReputationEngine::new(
                AdministrativeAuthority::new(settings.admin_principal),
                settings.thresholds,
            ),
            eligibility: EligibilityPolicy::new(settings.thresholds),
        }
    }

    pub fn with_attestation_verifier(mut self, verifier: Arc<dyn AttestationVerifier>) -> Self {
        self.identity = self.identity.with_verifier(verifier);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.store.add_sink(sink);
        self
    }

    /// Enroll `caller` with its hardware key and attestation
    pub async fn enroll(
        &self,
        caller: &Caller,
        hardware_key_fingerprint: HardwareKeyFingerprint,
        attestation: &[u8],
    ) -> RegistryResult<Enrollment> {
        let (record, events) = self
            .store
            .transact(|tx| self.identity.enroll(tx, caller, hardware_key_fingerprint, attestation))
            .await?;

        info!(
            identity = %record.identity,
            hardware_key = %record.hardware_key_fingerprint,
            "Client enrolled"
        );

        Ok(Enrollment { record, events })
    }

    /// Add `delta` to the target's reputation. Only the admin principal may call this.
    pub async fn adjust_reputation(
        &self,
        caller: &Caller,
        target: &Identity,
        delta: i64,
    ) -> RegistryResult<AdjustmentReceipt> {
        let (adjustment, events) = self
            .store
            .transact(|tx| self.reputation.adjust(tx, caller, target, delta))
            .await?;

        Ok(AdjustmentReceipt { adjustment, events })
    }

    /// Full record, or the default record if the identity never enrolled
    pub async fn get_client(&self, identity: &Identity) -> ClientRecord {
        self.find_client(identity).await.unwrap_or_default()
    }

    pub async fn find_client(&self, identity: &Identity) -> Option<ClientRecord> {
        self.store.read(|state| state.record(identity).cloned()).await
    }

    pub async fn is_eligible(&self, identity: &Identity) -> bool {
        self.store
            .read(|state| match state.record(identity) {
                Some(record) => self.eligibility.is_eligible(record),
                None => self.eligibility.is_eligible(&ClientRecord::default()),
            })
            .await
    }

    pub async fn is_key_used(&self, fingerprint: &HardwareKeyFingerprint) -> bool {
        self.store.read(|state| state.is_key_used(fingerprint)).await
    }

    /// Journal entries with a sequence number greater than `after`
    pub async fn events_since(&self, after: u64, limit: usize) -> Vec<SequencedEvent> {
        self.store
            .read(|state| {
                state
                    .journal()
                    .iter()
                    .filter(|e| e.sequence > after)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Most recent journal entries, newest first
    pub async fn recent_events(&self, count: usize) -> Vec<SequencedEvent> {
        self.store
            .read(|state| state.journal().iter().rev().take(count).cloned().collect())
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.store.subscribe()
    }

    pub async fn stats(&self) -> RegistryStats {
        self.store
            .read(|state| {
                let mut stats = RegistryStats {
                    enrolled_clients: 0,
                    active_clients: 0,
                    eligible_clients: 0,
                    used_hardware_keys: state.used_key_count(),
                    last_sequence: state.sequence(),
                };
                for record in state.records() {
                    stats.enrolled_clients += 1;
                    if record.active {
                        stats.active_clients += 1;
                    }
                    if self.eligibility.is_eligible(record) {
                        stats.eligible_clients += 1;
                    }
                }
                stats
            })
            .await
    }

    pub fn admin_principal(&self) -> &Identity {
        self.reputation.authority().principal()
    }

    pub fn thresholds(&self) -> &ReputationThresholds {
        self.reputation.thresholds()
    }

    pub fn approved_code_fingerprint(&self) -> &CodeFingerprint {
        self.identity.approved_code_fingerprint()
    }

    pub fn attestation_verifier(&self) -> &'static str {
        self.identity.verifier_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryError, RegistryEvent};

    fn settings() -> RegistrySettings {
        RegistrySettings::new(CodeFingerprint::from_bytes([0xc0; 32]), Identity::new("admin"))
    }

    fn caller(id: &str) -> Caller {
        Caller::authenticated(Identity::new(id))
    }

    fn key(byte: u8) -> HardwareKeyFingerprint {
        HardwareKeyFingerprint::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn test_enroll_then_read() {
        let registry = TrustRegistry::new(settings());

        let enrollment = registry.enroll(&caller("client_1"), key(1), b"quote").await.unwrap();
        assert_eq!(enrollment.events.len(), 1);
        assert_eq!(enrollment.events[0].sequence, 1);
        assert!(matches!(enrollment.events[0].event, RegistryEvent::Registered { .. }));

        let record = registry.get_client(&Identity::new("client_1")).await;
        assert_eq!(record, enrollment.record);
        assert!(registry.is_eligible(&Identity::new("client_1")).await);
        assert!(registry.is_key_used(&key(1)).await);
    }

    #[tokio::test]
    async fn test_unknown_identity_reads_default() {
        let registry = TrustRegistry::new(settings());

        assert_eq!(
            registry.get_client(&Identity::new("nobody")).await,
            ClientRecord::default()
        );
        assert!(registry.find_client(&Identity::new("nobody")).await.is_none());
        assert!(!registry.is_eligible(&Identity::new("nobody")).await);
    }

    #[tokio::test]
    async fn test_stats_and_journal() {
        let registry = TrustRegistry::new(settings());
        registry.enroll(&caller("client_1"), key(1), b"q").await.unwrap();
        registry.enroll(&caller("client_2"), key(2), b"q").await.unwrap();
        registry
            .adjust_reputation(&caller("admin"), &Identity::new("client_2"), -60)
            .await
            .unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.enrolled_clients, 2);
        assert_eq!(stats.active_clients, 1);
        assert_eq!(stats.eligible_clients, 1);
        assert_eq!(stats.used_hardware_keys, 2);
        assert_eq!(stats.last_sequence, 4);

        let since = registry.events_since(2, 10).await;
        let kinds: Vec<_> = since.iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["reputation_changed", "deactivated"]);

        let recent = registry.recent_events(1).await;
        assert_eq!(recent[0].sequence, 4);
    }

    #[tokio::test]
    async fn test_rejection_publishes_nothing() {
        let registry = TrustRegistry::new(settings());
        let mut rx = registry.subscribe();

        let err = registry
            .adjust_reputation(&caller("client_1"), &Identity::new("client_1"), 5)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NotAuthorized(Identity::new("client_1")));
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.stats().await.last_sequence, 0);
    }
}
