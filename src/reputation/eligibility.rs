//! Participation eligibility.

use crate::registry::ClientRecord;
use crate::reputation::ReputationThresholds;

/// Read-only eligibility check: active and at or above the minimum score
#[derive(Debug, Clone, Copy)]
pub struct EligibilityPolicy {
    thresholds: ReputationThresholds,
}

impl EligibilityPolicy {
    pub fn new(thresholds: ReputationThresholds) -> Self {
        Self { thresholds }
    }

    /// Pass `&ClientRecord::default()` for identities with no record
    pub fn is_eligible(&self, record: &ClientRecord) -> bool {
        record.active && record.reputation >= self.thresholds.min_reputation
    }
}
