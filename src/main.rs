use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use silica_trust_registry::{
    RegistryServiceConfig, TracingSink, TrustRegistry,
    api::{
        RegistryApiState, SecurityMiddlewareConfig, SecurityState, build_app, sanitize_for_log,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all security requirements
    let config = RegistryServiceConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check environment variables and security settings.");
        e
    })?;

    init_secure_logging(&config)?;

    info!("Starting Silica Trust Registry");
    info!(
        "Security settings: Auth enabled: {}, Rate limit: {}/min",
        config.security.enable_auth, config.security.rate_limit_per_minute
    );

    let mut registry = TrustRegistry::new(config.registry.to_settings()?)
        .with_event_sink(Arc::new(TracingSink));

    match config.registry.attestation_verifier()? {
        Some(verifier) => {
            info!("Ed25519 attestation verification enabled");
            registry = registry.with_attestation_verifier(Arc::new(verifier));
        }
        None => warn!("Attestation verification limited to presence checks"),
    }

    let registry = Arc::new(registry);
    info!(
        admin = %registry.admin_principal(),
        min_reputation = registry.thresholds().min_reputation,
        verifier = registry.attestation_verifier(),
        "Registry ready"
    );

    for (key, identity) in &config.security.api_keys {
        let shown = if config.logging.sanitize_logs {
            sanitize_for_log(key)
        } else {
            key.clone()
        };
        info!("API key {} bound to {}", shown, identity);
    }

    let security_config = SecurityMiddlewareConfig {
        enable_auth: config.security.enable_auth,
        rate_limit_per_minute: config.security.rate_limit_per_minute,
        max_request_size: config.security.max_request_size,
        sanitize_logs: config.logging.sanitize_logs,
        ..SecurityMiddlewareConfig::default()
    }
    .with_api_key_bindings(&config.security.api_keys);
    let security_state = SecurityState::new(security_config);

    // Periodically drop stale rate limiter windows
    let limiter = security_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });

    let app = build_app(RegistryApiState { registry }, security_state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Trust registry listening on {}", bind_addr);
    info!(
        "Security middleware: Auth={}, Rate limit={}/min, Max body={}KB",
        config.security.enable_auth,
        config.security.rate_limit_per_minute,
        config.security.max_request_size / 1024
    );

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Initialize logging at the configured level
fn init_secure_logging(config: &RegistryServiceConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Secure logging initialized with data sanitization enabled");
    }

    Ok(())
}
