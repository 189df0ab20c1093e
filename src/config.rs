use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use tracing::info;

use crate::registry::{
    CodeFingerprint, DEFAULT_JOURNAL_CAPACITY, Ed25519Attestation, Identity, RegistrySettings,
};
use crate::reputation::{DEFAULT_MIN_REPUTATION, MAX_SCORE, ReputationThresholds};

/// Minimum length of an API key bound to a caller identity
pub const MIN_API_KEY_LEN: usize = 16;

/// Configuration for the trust registry service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryServiceConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Registry parameters, fixed for the lifetime of the process
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Enable API authentication
    pub enable_auth: bool,
    /// Rate limit per minute per IP
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// API key -> caller identity bindings. The key authenticates, the
    /// operator-assigned identity is what the registry sees.
    #[serde(skip_serializing)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
    /// Mask credentials and addresses in logs
    pub sanitize_logs: bool,
    /// Enable request/response logging
    pub log_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Hex-encoded fingerprint of the approved training code
    pub approved_code_fingerprint: String,
    /// Identity of the administrative authority
    pub admin_identity: String,
    /// Clients below this score are deactivated
    pub min_reputation: u8,
    /// Hex-encoded Ed25519 key of the attestation root; presence-only check when unset
    pub attestation_root_key: Option<String>,
    /// Number of events retained in the journal
    pub event_log_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            approved_code_fingerprint: String::new(), // Must be set via environment
            admin_identity: String::new(),            // Must be set via environment
            min_reputation: DEFAULT_MIN_REPUTATION,
            attestation_root_key: None,
            event_log_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Convert to RegistrySettings for use by TrustRegistry
    pub fn to_settings(&self) -> Result<RegistrySettings> {
        let approved_code_fingerprint: CodeFingerprint = self
            .approved_code_fingerprint
            .parse()
            .context("Invalid approved code fingerprint")?;

        Ok(RegistrySettings {
            approved_code_fingerprint,
            admin_principal: Identity::new(self.admin_identity.clone()),
            thresholds: ReputationThresholds::new(self.min_reputation),
            journal_capacity: self.event_log_capacity,
        })
    }

    /// Build the Ed25519 attestation verifier, if a root key is configured
    pub fn attestation_verifier(&self) -> Result<Option<Ed25519Attestation>> {
        let Some(ref key_hex) = self.attestation_root_key else {
            return Ok(None);
        };

        let bytes = hex::decode(key_hex.trim()).context("Attestation root key is not valid hex")?;
        let key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Attestation root key must be 32 bytes"))?;

        Ed25519Attestation::from_bytes(&key).map(Some)
    }
}

impl Default for RegistryServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8780,
            },
            security: SecurityConfig {
                enable_auth: true,
                rate_limit_per_minute: 60,
                max_request_size: 1024 * 1024, // 1MB
                api_keys: HashMap::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false, // Disabled by default for security
            },
            registry: RegistryConfig::default(),
        }
    }
}

impl RegistryServiceConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("CHERT_REGISTRY_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = env::var("CHERT_REGISTRY_PORT") {
            config.server.port = port.parse().context("Invalid CHERT_REGISTRY_PORT value")?;
        }

        // Security configuration
        if let Ok(enable_auth) = env::var("CHERT_REGISTRY_ENABLE_AUTH") {
            config.security.enable_auth = enable_auth
                .parse()
                .context("Invalid CHERT_REGISTRY_ENABLE_AUTH value")?;
        }

        if let Ok(rate_limit) = env::var("CHERT_REGISTRY_RATE_LIMIT_PER_MINUTE") {
            config.security.rate_limit_per_minute = rate_limit
                .parse()
                .context("Invalid CHERT_REGISTRY_RATE_LIMIT_PER_MINUTE value")?;
        }

        if let Ok(bindings) = env::var("CHERT_REGISTRY_API_KEYS") {
            config.security.api_keys = parse_api_key_bindings(&bindings)?;
        }

        // Logging configuration
        if let Ok(log_level) = env::var("CHERT_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Ok(sanitize_logs) = env::var("CHERT_SANITIZE_LOGS") {
            config.logging.sanitize_logs = sanitize_logs
                .parse()
                .context("Invalid CHERT_SANITIZE_LOGS value")?;
        }

        if let Ok(log_requests) = env::var("CHERT_LOG_REQUESTS") {
            config.logging.log_requests = log_requests
                .parse()
                .context("Invalid CHERT_LOG_REQUESTS value")?;
        }

        // Registry configuration
        config.registry.approved_code_fingerprint = env::var("CHERT_REGISTRY_APPROVED_CODE_HASH")
            .context("CHERT_REGISTRY_APPROVED_CODE_HASH environment variable is required")?;

        config.registry.admin_identity = env::var("CHERT_REGISTRY_ADMIN_IDENTITY")
            .context("CHERT_REGISTRY_ADMIN_IDENTITY environment variable is required")?;

        if let Ok(min) = env::var("CHERT_REGISTRY_MIN_REPUTATION") {
            config.registry.min_reputation = min
                .parse()
                .context("Invalid CHERT_REGISTRY_MIN_REPUTATION value")?;
        }

        if let Ok(key) = env::var("CHERT_REGISTRY_ATTESTATION_ROOT_KEY") {
            config.registry.attestation_root_key = Some(key);
        }

        if let Ok(capacity) = env::var("CHERT_REGISTRY_EVENT_LOG_CAPACITY") {
            config.registry.event_log_capacity = capacity
                .parse()
                .context("Invalid CHERT_REGISTRY_EVENT_LOG_CAPACITY value")?;
        }

        config.validate()?;

        info!(
            "Loaded {} API key binding(s) for authentication",
            config.security.api_keys.len()
        );

        Ok(config)
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.registry.admin_identity.trim().is_empty() {
            return Err(anyhow::anyhow!("Admin identity cannot be empty"));
        }

        if self.registry.min_reputation > MAX_SCORE {
            return Err(anyhow::anyhow!(
                "Minimum reputation {} is outside the score range 0..={}",
                self.registry.min_reputation,
                MAX_SCORE
            ));
        }

        if self.registry.event_log_capacity == 0 {
            return Err(anyhow::anyhow!("Event log capacity must be non-zero"));
        }

        self.registry.to_settings()?;
        self.registry.attestation_verifier()?;

        if self.security.enable_auth && self.security.api_keys.is_empty() {
            return Err(anyhow::anyhow!(
                "Authentication is enabled but no API keys are bound (set CHERT_REGISTRY_API_KEYS)"
            ));
        }

        let mut bound_identities = HashSet::new();
        for (key, identity) in &self.security.api_keys {
            if key.len() < MIN_API_KEY_LEN {
                return Err(anyhow::anyhow!(
                    "API key for {} is too short (minimum {} characters)",
                    identity,
                    MIN_API_KEY_LEN
                ));
            }

            if !key.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(anyhow::anyhow!(
                    "API key for {} contains invalid characters (only alphanumeric allowed)",
                    identity
                ));
            }

            if identity.trim().is_empty() {
                return Err(anyhow::anyhow!("API key bound to an empty identity"));
            }

            if !bound_identities.insert(identity.as_str()) {
                return Err(anyhow::anyhow!(
                    "Identity {} is bound to more than one API key",
                    identity
                ));
            }
        }

        Ok(())
    }
}

/// Parse `key=identity,key=identity` bindings
pub fn parse_api_key_bindings(raw: &str) -> Result<HashMap<String, String>> {
    let mut bindings = HashMap::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (key, identity) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("API key binding must be key=identity"))?;
        let (key, identity) = (key.trim(), identity.trim());

        if bindings.values().any(|bound| bound == identity) {
            return Err(anyhow::anyhow!(
                "Identity {} is bound to more than one API key",
                identity
            ));
        }

        if bindings.insert(key.to_string(), identity.to_string()).is_some() {
            return Err(anyhow::anyhow!("API key bound more than once"));
        }
    }

    Ok(bindings)
}
