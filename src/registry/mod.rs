//! Client Identity Registry
//!
//! Enrollment of attested clients and the shared state every other
//! component reads and writes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ IdentityRegistry │────►│  RegistryStore   │◄────│ ReputationEngine│
//! │ (enroll)         │     │ records + keys + │     │ (adjust)        │
//! └──────────────────┘     │ event journal    │     └─────────────────┘
//!          │               └──────────────────┘
//!          ▼                        │
//! ┌──────────────────────┐          ▼
//! │ AttestationVerifier  │   ┌──────────────┐
//! │ (pluggable)          │   │ EventSink(s) │
//! └──────────────────────┘   └──────────────┘
//! ```
//!
//! ## Invariants
//!
//! - One record per identity, never deleted
//! - A hardware key fingerprint binds at most once, ever
//! - Mutations are all-or-nothing across records, keys and journal

mod attestation;
mod enrollment;
mod error;
mod events;
mod manager;
mod record;
mod store;

pub use attestation::{
    AttestationVerifier, ED25519_ATTESTATION_LEN, Ed25519Attestation, PresenceOnly,
};
pub use enrollment::IdentityRegistry;
pub use error::{RegistryError, RegistryResult};
pub use events::{EventSink, LOW_REPUTATION_REASON, RegistryEvent, SequencedEvent, TracingSink};
pub use manager::{AdjustmentReceipt, Enrollment, RegistrySettings, RegistryStats, TrustRegistry};
pub use record::{
    Caller, ClientRecord, CodeFingerprint, FINGERPRINT_LEN, FingerprintParseError,
    HardwareKeyFingerprint, Identity,
};
pub use store::DEFAULT_JOURNAL_CAPACITY;
pub(crate) use store::{RegistryState, RegistryStore, Transaction};
