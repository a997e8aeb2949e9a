/// Valuation workflow:
/// 1. Look up cached enrichment for the company (never fetches)
/// 2. Ask the generator for a valuation and run it through the repair gate
/// 3. Fall back to the deterministic calculator on any failure
/// 4. Persist the result into the caller's draft (best effort)
///
/// `value_with_fallback` wraps the whole pipeline so that even a panic ends
/// in a minimal deterministic valuation rather than a bare 500.
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

use crate::ai_valuation::{build_prompt, extract_json, validate_and_repair, SYSTEM_PROMPT};
use crate::enrichment::EnrichmentOrchestrator;
use crate::errors::AppError;
use crate::industry::Industry;
use crate::llm_client::TextGenerator;
use crate::models::{CompanyIdentifier, EnrichedCompanyRecord};
use crate::sanitize::parse_amount;
use crate::valuation::calculate;
use crate::valuation_models::{
    RevenueBucket, ValuationBands, ValuationInput, ValuationRecord, ValuationRecordFields,
    ValuationResult,
};
use crate::valuation_store::{upsert, ValuationStore};

/// Company name used when nothing usable came with the request.
const FALLBACK_COMPANY_NAME: &str = "Unknown company";

#[derive(Debug, Clone, PartialEq)]
pub struct ValuationOutcome {
    pub result: ValuationResult,
    /// Set when the result was persisted.
    pub record_id: Option<Uuid>,
}

pub struct ValuationService {
    generator: Option<Arc<dyn TextGenerator>>,
    store: Arc<dyn ValuationStore>,
    enrichment: Option<Arc<EnrichmentOrchestrator>>,
    bands: ValuationBands,
}

impl ValuationService {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        store: Arc<dyn ValuationStore>,
        enrichment: Option<Arc<EnrichmentOrchestrator>>,
        bands: ValuationBands,
    ) -> Self {
        Self {
            generator,
            store,
            enrichment,
            bands,
        }
    }

    pub async fn run(&self, mut input: ValuationInput) -> Result<ValuationOutcome, AppError> {
        let enrichment = self.insight(&input).await;
        if let Some(ref record) = enrichment {
            if input.annual_reports.is_empty() && !record.annual_filings().is_empty() {
                tracing::debug!(
                    "Using {} cached filings for {}",
                    record.annual_filings().len(),
                    input.company_name
                );
                input.annual_reports = record.annual_filings().to_vec();
            }
        }

        let result = match self.ai_valuation(&input, enrichment.as_ref()).await {
            Some(result) => {
                tracing::info!("AI valuation accepted for {}", input.company_name);
                result
            }
            None => {
                tracing::info!("Deterministic valuation for {}", input.company_name);
                calculate(&input, &self.bands)
            }
        };

        let record_id = self.persist(&input, &result, enrichment.as_ref()).await;
        Ok(ValuationOutcome { result, record_id })
    }

    /// Runs the pipeline in its own task. Errors and panics fall through to an
    /// emergency deterministic valuation; only if that panics too is an error
    /// returned.
    pub async fn value_with_fallback(
        self: &Arc<Self>,
        sanitized: ValuationInput,
        raw: Value,
    ) -> Result<ValuationOutcome, AppError> {
        let service = Arc::clone(self);
        let input = sanitized.clone();
        let failure = match tokio::spawn(async move { service.run(input).await }).await {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => join_error.to_string(),
        };

        tracing::error!("Valuation pipeline failed, using emergency fallback: {}", failure);
        let bands = self.bands;
        catch_unwind(AssertUnwindSafe(|| {
            emergency_valuation(Some(&sanitized), &raw, &bands)
        }))
        .map(|result| ValuationOutcome {
            result,
            record_id: None,
        })
        .map_err(|_| AppError::InternalError(format!("Valuation failed: {}", failure)))
    }

    /// Creates a draft for the caller, or refreshes their latest one.
    pub async fn save_draft(
        &self,
        fields: ValuationRecordFields,
    ) -> Result<ValuationRecord, AppError> {
        if fields.email.is_none() && fields.company_name.is_none() {
            return Err(AppError::BadRequest(
                "email or companyName is required".to_string(),
            ));
        }
        upsert(
            self.store.as_ref(),
            &ValuationRecordFields {
                range: None,
                ..fields
            },
        )
        .await
    }

    async fn insight(&self, input: &ValuationInput) -> Option<EnrichedCompanyRecord> {
        let orchestrator = self.enrichment.as_ref()?;
        let identifier = CompanyIdentifier {
            org_number: input.org_number.clone(),
            website_url: input.website.clone(),
            company_name: Some(input.company_name.clone()),
            industry: Some(input.industry.key().to_string()),
        };
        orchestrator.cached(&identifier).await
    }

    async fn ai_valuation(
        &self,
        input: &ValuationInput,
        enrichment: Option<&EnrichedCompanyRecord>,
    ) -> Option<ValuationResult> {
        let generator = self.generator.as_ref()?;
        let prompt = build_prompt(input, enrichment);

        let text = match generator.generate(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("AI valuation unavailable: {}", e);
                return None;
            }
        };

        let Some(raw) = extract_json(&text) else {
            tracing::warn!("AI valuation contained no JSON object");
            return None;
        };

        let result = validate_and_repair(&raw, input, &self.bands);
        if result.is_none() {
            tracing::warn!("AI valuation rejected by the repair gate");
        }
        result
    }

    async fn persist(
        &self,
        input: &ValuationInput,
        result: &ValuationResult,
        enrichment: Option<&EnrichedCompanyRecord>,
    ) -> Option<Uuid> {
        let fields = ValuationRecordFields {
            email: input.email.clone(),
            company_name: Some(input.company_name.clone()),
            org_number: input.org_number.clone(),
            industry: Some(input.industry.key().to_string()),
            range: Some(result.valuation_range),
            method: Some(result.method.clone()),
            input: serde_json::to_value(input).ok(),
            result: serde_json::to_value(result).ok(),
            enrichment: enrichment.and_then(|e| e.encode().ok()),
        };

        match upsert(self.store.as_ref(), &fields).await {
            Ok(record) => Some(record.id),
            Err(e) => {
                tracing::error!(
                    "Failed to persist valuation for {}: {}",
                    input.company_name,
                    e
                );
                None
            }
        }
    }
}

/// Last-resort valuation from the sanitised input, else whatever the raw body
/// offers, else defaults.
pub fn emergency_valuation(
    sanitized: Option<&ValuationInput>,
    raw: &Value,
    bands: &ValuationBands,
) -> ValuationResult {
    if let Some(input) = sanitized {
        return calculate(input, bands);
    }

    let company_name = raw
        .get("companyName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_COMPANY_NAME);
    let industry = raw
        .get("industry")
        .and_then(Value::as_str)
        .and_then(Industry::parse)
        .unwrap_or(Industry::Other);

    let mut input = ValuationInput::minimal(company_name, industry);
    if let Some(bucket) = raw
        .get("revenue")
        .or_else(|| raw.get("revenueBucket"))
        .and_then(Value::as_str)
        .and_then(RevenueBucket::parse)
    {
        input.revenue_bucket = Some(bucket);
    }
    input.exact_revenue = raw
        .get("exactRevenue")
        .and_then(parse_amount)
        .filter(|r| r.is_finite() && *r > 0.0);
    input.operating_costs = raw
        .get("operatingCosts")
        .and_then(parse_amount)
        .filter(|c| c.is_finite() && *c >= 0.0);

    calculate(&input, bands)
}
