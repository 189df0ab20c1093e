//! Registry Events
//!
//! Every committed mutation produces one or more events. Events are stamped
//! with a global sequence number inside the commit, so the journal order is
//! the order in which state changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{HardwareKeyFingerprint, Identity};

/// Reason attached to threshold-triggered deactivation
pub const LOW_REPUTATION_REASON: &str = "Low reputation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    Registered {
        identity: Identity,
        hardware_key_fingerprint: HardwareKeyFingerprint,
    },
    ReputationChanged {
        identity: Identity,
        new_score: u8,
    },
    Deactivated {
        identity: Identity,
        reason: String,
    },
}

impl RegistryEvent {
    /// Identity the event is about
    pub fn identity(&self) -> &Identity {
        match self {
            RegistryEvent::Registered { identity, .. }
            | RegistryEvent::ReputationChanged { identity, .. }
            | RegistryEvent::Deactivated { identity, .. } => identity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::Registered { .. } => "registered",
            RegistryEvent::ReputationChanged { .. } => "reputation_changed",
            RegistryEvent::Deactivated { .. } => "deactivated",
        }
    }
}

/// A committed event with its position in the global order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RegistryEvent,
}

/// Observer notified of committed events, in commit order.
///
/// Called while the store's write lock is held; implementations must not
/// block or call back into the registry.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &SequencedEvent);
}

/// Sink that writes each event to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &SequencedEvent) {
        match &event.event {
            RegistryEvent::Registered {
                identity,
                hardware_key_fingerprint,
            } => tracing::info!(
                sequence = event.sequence,
                identity = %identity,
                hardware_key = %hardware_key_fingerprint,
                "EVENT: client registered"
            ),
            RegistryEvent::ReputationChanged {
                identity,
                new_score,
            } => tracing::info!(
                sequence = event.sequence,
                identity = %identity,
                new_score = *new_score,
                "EVENT: reputation changed"
            ),
            RegistryEvent::Deactivated { identity, reason } => tracing::warn!(
                sequence = event.sequence,
                identity = %identity,
                reason = %reason,
                "EVENT: client deactivated"
            ),
        }
    }
}
