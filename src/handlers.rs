use crate::config::Config;
use crate::enrichment::EnrichmentOrchestrator;
use crate::errors::AppError;
use crate::models::{CompanyIdentifier, EnrichedCompanyRecord};
use crate::rate_limit::{client_ip, RateLimitBucket, RateLimiters};
use crate::sanitize::{clean_text, validate_and_sanitize};
use crate::valuation_models::{ValuationRecordFields, ValuationResult};
use crate::valuation_service::ValuationService;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Source fan-out, merge and cache.
    pub enrichment: Arc<EnrichmentOrchestrator>,
    /// AI and deterministic valuation with persistence.
    pub valuation: Arc<ValuationService>,
    /// Per-IP quotas for the enrichment and valuation buckets.
    pub rate_limiters: Arc<RateLimiters>,
}

impl AppState {
    fn check_rate_limit(
        &self,
        headers: &HeaderMap,
        peer: Option<ConnectInfo<SocketAddr>>,
        bucket: RateLimitBucket,
    ) -> Result<(), AppError> {
        let ip = client_ip(headers, peer.map(|ConnectInfo(addr)| addr));
        if self.rate_limiters.check(ip, bucket).success {
            Ok(())
        } else {
            Err(AppError::RateLimited)
        }
    }
}

/// Response of `POST /api/v1/valuation`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResponse {
    pub result: ValuationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
}

/// Body of `POST /api/v1/valuation/draft`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub org_number: Option<String>,
    pub industry: Option<String>,
}

/// Health check endpoint.
///
/// Returns the service status and version.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "company-valuation-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/enrichment
///
/// Builds (or serves from cache) the merged company profile used to pre-fill
/// the valuation form.
///
/// # Returns
///
/// * `Result<Json<EnrichedCompanyRecord>, AppError>` - `{autoFill, rawData}`, a
///   400 without an org number or website, or a 429 when the caller is over quota.
pub async fn enrich_company(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<CompanyIdentifier>, JsonRejection>,
) -> Result<Json<EnrichedCompanyRecord>, AppError> {
    state.check_rate_limit(&headers, peer, RateLimitBucket::Enrichment)?;
    let Json(identifier) = body?;
    tracing::info!(
        "POST /enrichment - org: {:?}, website: {:?}",
        identifier.org_number,
        identifier.website_url
    );

    let record = state.enrichment.enrich(&identifier).await?;
    Ok(Json(record))
}

/// POST /api/v1/valuation
///
/// Rate limit, sanitise, then value. Every failure after sanitising degrades
/// to a deterministic result; only a failing fallback yields a 500.
pub async fn create_valuation(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ValuationResponse>, AppError> {
    state.check_rate_limit(&headers, peer, RateLimitBucket::Valuation)?;
    let Json(raw) = body?;

    let outcome = validate_and_sanitize(&raw);
    if !outcome.valid {
        tracing::info!("Valuation request rejected: {:?}", outcome.errors);
    }
    let input = outcome.into_result()?;
    tracing::info!(
        "POST /valuation - {} ({})",
        input.company_name,
        input.industry
    );

    let outcome = state.valuation.value_with_fallback(input, raw).await?;
    tracing::info!(
        "Valuation done: {} NOK via {}",
        outcome.result.valuation_range.most_likely.round(),
        outcome.result.method
    );

    Ok(Json(ValuationResponse {
        result: outcome.result,
        record_id: outcome.record_id,
    }))
}

/// POST /api/v1/valuation/draft
///
/// Records that a user started the flow so the final result can be attached
/// to the same row.
pub async fn save_valuation_draft(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DraftRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = body?;
    let text = |v: Option<String>| {
        v.map(|s| clean_text(&s, 320))
            .filter(|s| !s.is_empty())
    };

    let record = state
        .valuation
        .save_draft(ValuationRecordFields {
            email: text(request.email).map(|e| e.to_lowercase()),
            company_name: text(request.company_name),
            org_number: text(request.org_number),
            industry: text(request.industry),
            ..Default::default()
        })
        .await?;

    tracing::info!("Draft {} saved", record.id);
    Ok(Json(json!({ "recordId": record.id })))
}

/// Routes that sit behind the global flood protection in `main`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/enrichment", post(enrich_company))
        .route("/api/v1/valuation", post(create_valuation))
        .route("/api/v1/valuation/draft", post(save_valuation_draft))
}

/// Full router without middleware; used by tests.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(api_routes())
        .with_state(state)
}
