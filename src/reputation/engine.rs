//! Reputation Engine
//!
//! Privileged score mutation. The caller is authorized before anything else
//! is looked at; the target must be an active client. A score that falls
//! below the minimum deactivates the client in the same transaction, and
//! deactivation is permanent.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::registry::{
    Caller, Identity, LOW_REPUTATION_REASON, RegistryError, RegistryEvent, RegistryResult,
    Transaction,
};
use crate::reputation::{AdministrativeAuthority, ReputationThresholds, clamp_score};

/// Result of a successful adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationAdjustment {
    pub previous_score: u8,
    pub new_score: u8,
    pub deactivated: bool,
}

pub struct ReputationEngine {
    authority: AdministrativeAuthority,
    thresholds: ReputationThresholds,
}

impl ReputationEngine {
    pub fn new(authority: AdministrativeAuthority, thresholds: ReputationThresholds) -> Self {
        Self {
            authority,
            thresholds,
        }
    }

    pub fn authority(&self) -> &AdministrativeAuthority {
        &self.authority
    }

    pub fn thresholds(&self) -> &ReputationThresholds {
        &self.thresholds
    }

    /// Stage a reputation change for `target`
    pub(crate) fn adjust(
        &self,
        tx: &mut Transaction<'_>,
        caller: &Caller,
        target: &Identity,
        delta: i64,
    ) -> RegistryResult<ReputationAdjustment> {
        self.authority.authorize(caller)?;

        let mut record = match tx.record(target) {
            Some(record) if record.active => record.clone(),
            _ => {
                debug!(target = %target, "Adjustment rejected: client not active");
                return Err(RegistryError::ClientNotActive(target.clone()));
            }
        };

        let previous_score = record.reputation;
        let new_score = clamp_score(previous_score, delta);
        let deactivated = self.thresholds.is_below_minimum(new_score);

        record.reputation = new_score;
        tx.emit(RegistryEvent::ReputationChanged {
            identity: target.clone(),
            new_score,
        });

        if deactivated {
            record.active = false;
            tx.emit(RegistryEvent::Deactivated {
                identity: target.clone(),
                reason: LOW_REPUTATION_REASON.to_string(),
            });
            warn!(
                target = %target,
                new_score,
                min_reputation = self.thresholds.min_reputation,
                "Client deactivated for low reputation"
            );
        } else {
            info!(
                target = %target,
                delta,
                previous_score,
                new_score,
                "Adjusted client reputation"
            );
        }

        tx.put_record(record);

        Ok(ReputationAdjustment {
            previous_score,
            new_score,
            deactivated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        ClientRecord, HardwareKeyFingerprint, RegistryState, RegistryStore, SequencedEvent,
    };

    fn admin() -> Caller {
        Caller::authenticated(Identity::new("admin"))
    }

    fn engine() -> ReputationEngine {
        ReputationEngine::new(
            AdministrativeAuthority::new(Identity::new("admin")),
            ReputationThresholds::default(),
        )
    }

    async fn store_with_client(id: &str, reputation: u8) -> RegistryStore {
        let store = RegistryStore::default();
        store
            .transact(|tx| {
                tx.put_record(ClientRecord {
                    identity: Identity::new(id),
                    hardware_key_fingerprint: HardwareKeyFingerprint::from_bytes([1; 32]),
                    reputation,
                    active: true,
                    ..Default::default()
                });
                Ok(())
            })
            .await
            .unwrap();
        store
    }

    async fn adjust(
        store: &RegistryStore,
        caller: &Caller,
        target: &str,
        delta: i64,
    ) -> RegistryResult<(ReputationAdjustment, Vec<SequencedEvent>)> {
        let engine = engine();
        store
            .transact(|tx| engine.adjust(tx, caller, &Identity::new(target), delta))
            .await
    }

    fn snapshot(state: &RegistryState, id: &str) -> ClientRecord {
        state.record(&Identity::new(id)).cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_decrease_stays_active() {
        let store = store_with_client("client_1", 100).await;

        let (outcome, events) = adjust(&store, &admin(), "client_1", -20).await.unwrap();
        assert_eq!(outcome.new_score, 80);
        assert!(!outcome.deactivated);
        assert_eq!(events.len(), 1);

        let record = store.read(|s| snapshot(s, "client_1")).await;
        assert_eq!(record.reputation, 80);
        assert!(record.active);
    }

    #[tokio::test]
    async fn test_crossing_threshold_deactivates() {
        let store = store_with_client("client_1", 100).await;

        let (outcome, events) = adjust(&store, &admin(), "client_1", -51).await.unwrap();
        assert_eq!(outcome.new_score, 49);
        assert!(outcome.deactivated);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].event,
            RegistryEvent::Deactivated {
                identity: Identity::new("client_1"),
                reason: "Low reputation".to_string(),
            }
        );

        let record = store.read(|s| snapshot(s, "client_1")).await;
        assert_eq!(record.reputation, 49);
        assert!(!record.active);
    }

    #[tokio::test]
    async fn test_landing_on_threshold_stays_active() {
        let store = store_with_client("client_1", 100).await;

        let (outcome, _) = adjust(&store, &admin(), "client_1", -50).await.unwrap();
        assert_eq!(outcome.new_score, 50);
        assert!(!outcome.deactivated);
    }

    #[tokio::test]
    async fn test_authorization_checked_before_target() {
        let store = RegistryStore::default();
        let intruder = Caller::authenticated(Identity::new("client_9"));

        // Target does not exist, but authorization fails first
        let err = adjust(&store, &intruder, "ghost", -10).await.unwrap_err();
        assert_eq!(err, RegistryError::NotAuthorized(Identity::new("client_9")));
    }

    #[tokio::test]
    async fn test_deactivated_client_rejected() {
        let store = store_with_client("client_1", 100).await;
        adjust(&store, &admin(), "client_1", -150).await.unwrap();

        let err = adjust(&store, &admin(), "client_1", 1000).await.unwrap_err();
        assert_eq!(err, RegistryError::ClientNotActive(Identity::new("client_1")));

        let record = store.read(|s| snapshot(s, "client_1")).await;
        assert_eq!(record.reputation, 0);
        assert!(!record.active);
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let store = store_with_client("client_1", 100).await;
        let engine = ReputationEngine::new(
            AdministrativeAuthority::new(Identity::new("admin")),
            ReputationThresholds::new(90),
        );

        let (outcome, _) = store
            .transact(|tx| engine.adjust(tx, &admin(), &Identity::new("client_1"), -11))
            .await
            .unwrap();
        assert_eq!(outcome.new_score, 89);
        assert!(outcome.deactivated);
    }
}
