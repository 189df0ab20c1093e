//! Registry rejection signals.
//!
//! Every variant aborts the whole call. A rejected call leaves the store
//! exactly as it was.

use thiserror::Error;

use crate::registry::{HardwareKeyFingerprint, Identity};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The caller already has a record.
    #[error("identity {0} is already registered")]
    AlreadyRegistered(Identity),

    /// The hardware key was bound to some identity before.
    #[error("hardware key {0} has already been used")]
    KeyReuse(HardwareKeyFingerprint),

    /// Attestation payload missing or rejected by the verifier.
    #[error("invalid attestation: {0}")]
    InvalidAttestation(String),

    /// Caller is not the administrative authority.
    #[error("caller {0} is not authorized to adjust reputation")]
    NotAuthorized(Identity),

    /// Target was never enrolled or has been deactivated.
    #[error("client {0} is not active")]
    ClientNotActive(Identity),
}

impl RegistryError {
    /// Stable machine-readable code, used by the HTTP layer
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::AlreadyRegistered(_) => "already_registered",
            RegistryError::KeyReuse(_) => "key_reuse",
            RegistryError::InvalidAttestation(_) => "invalid_attestation",
            RegistryError::NotAuthorized(_) => "not_authorized",
            RegistryError::ClientNotActive(_) => "client_not_active",
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = RegistryError::AlreadyRegistered(Identity::new("client_1"));
        assert_eq!(err.to_string(), "identity client_1 is already registered");

        let err = RegistryError::KeyReuse(HardwareKeyFingerprint::from_bytes([0xaa; 32]));
        assert_eq!(
            err.to_string(),
            format!("hardware key {} has already been used", "aa".repeat(32))
        );

        let err = RegistryError::InvalidAttestation("empty payload".into());
        assert_eq!(err.to_string(), "invalid attestation: empty payload");

        let err = RegistryError::ClientNotActive(Identity::new("ghost"));
        assert_eq!(err.to_string(), "client ghost is not active");
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            RegistryError::AlreadyRegistered(Identity::new("a")),
            RegistryError::KeyReuse(HardwareKeyFingerprint::default()),
            RegistryError::InvalidAttestation(String::new()),
            RegistryError::NotAuthorized(Identity::new("a")),
            RegistryError::ClientNotActive(Identity::new("a")),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RegistryError>();
    }
}
