//! Reputation Score Bounds and Thresholds
//!
//! Scores live in [0, 100]. New clients start at the top of the range.
//! Adjustments saturate at the bounds instead of failing.

use serde::{Deserialize, Serialize};

pub const MIN_SCORE: u8 = 0;
pub const MAX_SCORE: u8 = 100;

/// Score assigned at enrollment
pub const INITIAL_SCORE: u8 = MAX_SCORE;

/// Default eligibility and deactivation threshold
pub const DEFAULT_MIN_REPUTATION: u8 = 50;

/// Apply `delta` to `current`, saturating at the score bounds
pub fn clamp_score(current: u8, delta: i64) -> u8 {
    let raw = i64::from(current).saturating_add(delta);
    raw.clamp(i64::from(MIN_SCORE), i64::from(MAX_SCORE)) as u8
}

/// Thresholds fixed at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationThresholds {
    /// Clients below this score are deactivated and ineligible
    pub min_reputation: u8,
}

impl ReputationThresholds {
    pub fn new(min_reputation: u8) -> Self {
        Self { min_reputation }
    }

    pub fn is_below_minimum(&self, score: u8) -> bool {
        score < self.min_reputation
    }
}

impl Default for ReputationThresholds {
    fn default() -> Self {
        Self {
            min_reputation: DEFAULT_MIN_REPUTATION,
        }
    }
}
