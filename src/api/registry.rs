//! Registry API Endpoints
//!
//! HTTP adapter over `TrustRegistry`. The caller identity always comes from
//! the authentication layer, never from the request body.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::registry::{
    Caller, ClientRecord, HardwareKeyFingerprint, Identity, RegistryError, RegistryStats,
    SequencedEvent, TrustRegistry,
};
use crate::reputation::ReputationAdjustment;

/// Upper bound on events returned per request
pub const MAX_EVENTS_PER_PAGE: usize = 500;

/// API state for registry endpoints
#[derive(Clone)]
pub struct RegistryApiState {
    pub registry: Arc<TrustRegistry>,
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error: a registry rejection or malformed input
#[derive(Debug)]
pub enum ApiError {
    Registry(RegistryError),
    BadRequest(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::Registry(err) => {
                let status = match err {
                    RegistryError::AlreadyRegistered(_) | RegistryError::KeyReuse(_) => {
                        StatusCode::CONFLICT
                    }
                    RegistryError::InvalidAttestation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    RegistryError::NotAuthorized(_) => StatusCode::FORBIDDEN,
                    RegistryError::ClientNotActive(_) => StatusCode::NOT_FOUND,
                };
                (status, err.code().to_string(), err.to_string())
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "bad_request".to_string(), message)
            }
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

// Request / response types

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollRequest {
    /// Hex-encoded 32-byte hash of the hardware public key
    pub hardware_key_fingerprint: String,
    /// Hex-encoded attestation payload
    pub attestation: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub client: ClientRecord,
    pub events: Vec<SequencedEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustReputationRequest {
    pub delta: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustReputationResponse {
    pub identity: Identity,
    pub adjustment: ReputationAdjustment,
    pub events: Vec<SequencedEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityResponse {
    pub identity: Identity,
    pub eligible: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<SequencedEvent>,
    pub next_since: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: RegistryStats,
    pub min_reputation: u8,
    pub attestation_verifier: String,
}

// Endpoints

/// POST /enroll - Enroll the authenticated caller
pub async fn enroll(
    State(state): State<RegistryApiState>,
    caller: Caller,
    Json(payload): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<EnrollResponse>), ApiError> {
    let fingerprint: HardwareKeyFingerprint = payload
        .hardware_key_fingerprint
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid hardware_key_fingerprint: {}", e)))?;
    let attestation = hex::decode(payload.attestation.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid attestation encoding: {}", e)))?;

    let enrollment = state
        .registry
        .enroll(&caller, fingerprint, &attestation)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(EnrollResponse {
            client: enrollment.record,
            events: enrollment.events,
        }),
    ))
}

/// POST /clients/{identity}/reputation - Adjust reputation (admin only)
pub async fn adjust_reputation(
    State(state): State<RegistryApiState>,
    caller: Caller,
    Path(identity): Path<String>,
    Json(payload): Json<AdjustReputationRequest>,
) -> Result<Json<AdjustReputationResponse>, ApiError> {
    let identity = Identity::new(identity);
    let receipt = state
        .registry
        .adjust_reputation(&caller, &identity, payload.delta)
        .await?;

    Ok(Json(AdjustReputationResponse {
        identity,
        adjustment: receipt.adjustment,
        events: receipt.events,
    }))
}

/// GET /clients/{identity} - Client record (zeroed if unknown)
pub async fn get_client(
    State(state): State<RegistryApiState>,
    Path(identity): Path<String>,
) -> Json<ClientRecord> {
    Json(state.registry.get_client(&Identity::new(identity)).await)
}

/// GET /clients/{identity}/eligibility
pub async fn get_eligibility(
    State(state): State<RegistryApiState>,
    Path(identity): Path<String>,
) -> Json<EligibilityResponse> {
    let identity = Identity::new(identity);
    let eligible = state.registry.is_eligible(&identity).await;
    Json(EligibilityResponse { identity, eligible })
}

/// GET /events?since=N&limit=M - Journal entries after sequence N
pub async fn get_events(
    State(state): State<RegistryApiState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let limit = query
        .limit
        .unwrap_or(MAX_EVENTS_PER_PAGE)
        .min(MAX_EVENTS_PER_PAGE);
    let events = state.registry.events_since(query.since, limit).await;
    let next_since = events.last().map(|e| e.sequence).unwrap_or(query.since);

    debug!(since = query.since, returned = events.len(), "Served registry events");
    Json(EventsResponse { events, next_since })
}

/// GET /stats - Registry-wide counters
pub async fn get_stats(State(state): State<RegistryApiState>) -> Json<StatsResponse> {
    let stats = state.registry.stats().await;
    Json(StatsResponse {
        stats,
        min_reputation: state.registry.thresholds().min_reputation,
        attestation_verifier: state.registry.attestation_verifier().to_string(),
    })
}

/// Create the registry API router
pub fn create_router(state: RegistryApiState) -> Router {
    Router::new()
        .route("/enroll", post(enroll))
        .route("/clients/{identity}", get(get_client))
        .route("/clients/{identity}/eligibility", get(get_eligibility))
        .route("/clients/{identity}/reputation", post(adjust_reputation))
        .route("/events", get(get_events))
        .route("/stats", get(get_stats))
        .with_state(state)
}
