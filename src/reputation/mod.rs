//! Reputation and Eligibility
//!
//! Scores are adjusted only by the administrative authority and are read by
//! the eligibility policy.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────┐     ┌──────────────────┐
//! │ AdministrativeAuthority │────►│ ReputationEngine │──── writes ───┐
//! │ (single principal)      │     │ (clamp, deactivate)              │
//! └─────────────────────────┘     └──────────────────┘               ▼
//!                                                            ┌───────────────┐
//!                                 ┌───────────────────┐      │ ClientRecord  │
//!                                 │ EligibilityPolicy │◄──── │ (store)       │
//!                                 │ (read-only)       │      └───────────────┘
//!                                 └───────────────────┘
//! ```
//!
//! ## Score Model
//!
//! - New clients start at 100
//! - Each adjustment adds a signed delta and saturates at 0 and 100
//! - Falling below `min_reputation` (default 50) deactivates the client
//! - Deactivated clients are never reactivated

mod authority;
mod eligibility;
mod engine;
mod score;

pub use authority::AdministrativeAuthority;
pub use eligibility::EligibilityPolicy;
pub use engine::{ReputationAdjustment, ReputationEngine};
pub use score::{
    DEFAULT_MIN_REPUTATION, INITIAL_SCORE, MAX_SCORE, MIN_SCORE, ReputationThresholds,
    clamp_score,
};
