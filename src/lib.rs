//! Silica Trust Registry
//!
//! Permissioned registry of attested compute clients. Each client enrolls
//! once with a unique hardware key, carries a reputation score in `[0, 100]`
//! and stays eligible for work rounds while active and above the minimum.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Server entrypoint
//! ├── config.rs       - Configuration management
//! ├── registry/       - Client identity registry
//! │   ├── record.rs      - Identities, fingerprints, client records
//! │   ├── store.rs       - Transactional state and event journal
//! │   ├── events.rs      - Registry events and sinks
//! │   ├── attestation.rs - Pluggable attestation verification
//! │   ├── enrollment.rs  - Enrollment rules
//! │   ├── error.rs       - Rejection reasons
//! │   └── manager.rs     - TrustRegistry orchestrator
//! ├── reputation/     - Reputation and eligibility
//! │   ├── score.rs       - Score bounds and thresholds
//! │   ├── authority.rs   - Administrative principal check
//! │   ├── engine.rs      - Reputation adjustment and deactivation
//! │   └── eligibility.rs - Eligibility predicate
//! └── api/            - HTTP API endpoints
//!     ├── registry.rs    - Registry routes
//!     └── middleware.rs  - Authentication, rate limiting, headers
//! ```

pub mod api;
pub mod config;
pub mod registry;
pub mod reputation;

// Re-export main types for convenience
pub use config::RegistryServiceConfig;
pub use registry::{
    AdjustmentReceipt, AttestationVerifier, Caller, ClientRecord, CodeFingerprint,
    Ed25519Attestation, Enrollment, EventSink, HardwareKeyFingerprint, Identity, PresenceOnly,
    RegistryError, RegistryEvent, RegistryResult, RegistrySettings, RegistryStats,
    SequencedEvent, TracingSink, TrustRegistry,
};

// Re-export reputation types
pub use reputation::{
    DEFAULT_MIN_REPUTATION, INITIAL_SCORE, ReputationAdjustment, ReputationThresholds,
};

// Re-export API types
pub use api::{RegistryApiState, SecurityMiddlewareConfig, SecurityState, build_app};
