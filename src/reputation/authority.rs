//! Administrative Authority
//!
//! The single principal allowed to adjust reputation. Fixed when the
//! registry is built; there is no way to change it afterwards.

use tracing::warn;

use crate::registry::{Caller, Identity, RegistryError, RegistryResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdministrativeAuthority {
    principal: Identity,
}

impl AdministrativeAuthority {
    pub fn new(principal: Identity) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Identity {
        &self.principal
    }

    /// Fails with `NotAuthorized` unless `caller` is the principal
    pub fn authorize(&self, caller: &Caller) -> RegistryResult<()> {
        if caller.identity() == &self.principal {
            return Ok(());
        }

        warn!(caller = %caller.identity(), "Unauthorized reputation adjustment attempt");
        Err(RegistryError::NotAuthorized(caller.identity().clone()))
    }
}
