//! Persistence of valuation records: drafts when the flow starts, upgraded in
//! place once a result exists.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::valuation_models::{ValuationRecord, ValuationRecordFields};

#[async_trait]
pub trait ValuationStore: Send + Sync {
    /// Most recent draft whose email and company name both match,
    /// case-insensitively. A missing identifier only matches drafts that lack
    /// it too. `None` when neither identifier is supplied.
    async fn find_latest_draft(
        &self,
        email: Option<&str>,
        company_name: Option<&str>,
    ) -> Result<Option<ValuationRecord>, AppError>;

    async fn update(
        &self,
        id: Uuid,
        fields: &ValuationRecordFields,
    ) -> Result<ValuationRecord, AppError>;

    async fn create(&self, fields: &ValuationRecordFields) -> Result<ValuationRecord, AppError>;
}

/// Upgrades the latest matching draft, or creates a record when none matches.
pub async fn upsert(
    store: &dyn ValuationStore,
    fields: &ValuationRecordFields,
) -> Result<ValuationRecord, AppError> {
    let draft = store
        .find_latest_draft(fields.email.as_deref(), fields.company_name.as_deref())
        .await?;

    match draft {
        Some(draft) => {
            tracing::info!("Updating valuation draft {}", draft.id);
            store.update(draft.id, fields).await
        }
        None => {
            let record = store.create(fields).await?;
            tracing::info!("Created valuation record {}", record.id);
            Ok(record)
        }
    }
}

fn range_values(fields: &ValuationRecordFields) -> (f64, f64, f64) {
    fields
        .range
        .map(|r| (r.min, r.most_likely, r.max))
        .unwrap_or((0.0, 0.0, 0.0))
}

// ============ Postgres ============

#[derive(Debug, FromRow)]
struct ValuationRow {
    id: Uuid,
    email: Option<String>,
    company_name: Option<String>,
    org_number: Option<String>,
    industry: Option<String>,
    value_min: BigDecimal,
    most_likely: BigDecimal,
    value_max: BigDecimal,
    method: Option<String>,
    input: Option<Value>,
    result: Option<Value>,
    enrichment: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn to_f64(value: &BigDecimal) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

fn to_decimal(value: f64) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(&format!("{:.2}", value))
        .map_err(|e| AppError::InternalError(format!("Invalid amount {}: {}", value, e)))
}

impl From<ValuationRow> for ValuationRecord {
    fn from(row: ValuationRow) -> Self {
        ValuationRecord {
            id: row.id,
            email: row.email,
            company_name: row.company_name,
            org_number: row.org_number,
            industry: row.industry,
            value_min: to_f64(&row.value_min),
            most_likely: to_f64(&row.most_likely),
            value_max: to_f64(&row.value_max),
            method: row.method,
            input: row.input,
            result: row.result,
            enrichment: row.enrichment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const RETURNING: &str = "RETURNING id, email, company_name, org_number, industry, value_min, \
    most_likely, value_max, method, input, result, enrichment, created_at, updated_at";

pub struct PgValuationStore {
    pool: PgPool,
}

impl PgValuationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ValuationStore for PgValuationStore {
    async fn find_latest_draft(
        &self,
        email: Option<&str>,
        company_name: Option<&str>,
    ) -> Result<Option<ValuationRecord>, AppError> {
        if email.is_none() && company_name.is_none() {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, ValuationRow>(
            r#"
            SELECT id, email, company_name, org_number, industry, value_min, most_likely,
                   value_max, method, input, result, enrichment, created_at, updated_at
            FROM valuations
            WHERE most_likely = 0
              AND lower(email) IS NOT DISTINCT FROM lower($1::text)
              AND lower(company_name) IS NOT DISTINCT FROM lower($2::text)
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(company_name)
        .fetch_optional(&self.pool)
        .await
        .context("looking up valuation draft")?;

        Ok(row.map(ValuationRecord::from))
    }

    async fn update(
        &self,
        id: Uuid,
        fields: &ValuationRecordFields,
    ) -> Result<ValuationRecord, AppError> {
        let (min, most_likely, max) = range_values(fields);

        let row = sqlx::query_as::<_, ValuationRow>(&format!(
            r#"
            UPDATE valuations
            SET email = COALESCE($2, email),
                company_name = COALESCE($3, company_name),
                org_number = COALESCE($4, org_number),
                industry = COALESCE($5, industry),
                value_min = $6,
                most_likely = $7,
                value_max = $8,
                method = COALESCE($9, method),
                input = COALESCE($10, input),
                result = COALESCE($11, result),
                enrichment = COALESCE($12, enrichment),
                updated_at = now()
            WHERE id = $1
            {}
            "#,
            RETURNING
        ))
        .bind(id)
        .bind(&fields.email)
        .bind(&fields.company_name)
        .bind(&fields.org_number)
        .bind(&fields.industry)
        .bind(to_decimal(min)?)
        .bind(to_decimal(most_likely)?)
        .bind(to_decimal(max)?)
        .bind(&fields.method)
        .bind(&fields.input)
        .bind(&fields.result)
        .bind(&fields.enrichment)
        .fetch_one(&self.pool)
        .await
        .context("updating valuation record")?;

        Ok(row.into())
    }

    async fn create(&self, fields: &ValuationRecordFields) -> Result<ValuationRecord, AppError> {
        let (min, most_likely, max) = range_values(fields);

        let row = sqlx::query_as::<_, ValuationRow>(&format!(
            r#"
            INSERT INTO valuations (
                id, email, company_name, org_number, industry, value_min, most_likely,
                value_max, method, input, result, enrichment, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now(), now())
            {}
            "#,
            RETURNING
        ))
        .bind(Uuid::new_v4())
        .bind(&fields.email)
        .bind(&fields.company_name)
        .bind(&fields.org_number)
        .bind(&fields.industry)
        .bind(to_decimal(min)?)
        .bind(to_decimal(most_likely)?)
        .bind(to_decimal(max)?)
        .bind(&fields.method)
        .bind(&fields.input)
        .bind(&fields.result)
        .bind(&fields.enrichment)
        .fetch_one(&self.pool)
        .await
        .context("creating valuation record")?;

        Ok(row.into())
    }
}

// ============ In-memory ============

fn matches(candidate: Option<&str>, wanted: Option<&str>) -> bool {
    match (candidate, wanted) {
        (None, None) => true,
        (Some(c), Some(w)) => c.eq_ignore_ascii_case(w),
        _ => false,
    }
}

/// Vector-backed store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryValuationStore {
    records: RwLock<Vec<ValuationRecord>>,
}

impl MemoryValuationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ValuationRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl ValuationStore for MemoryValuationStore {
    async fn find_latest_draft(
        &self,
        email: Option<&str>,
        company_name: Option<&str>,
    ) -> Result<Option<ValuationRecord>, AppError> {
        if email.is_none() && company_name.is_none() {
            return Ok(None);
        }
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.is_draft())
            .filter(|r| matches(r.email.as_deref(), email))
            .filter(|r| matches(r.company_name.as_deref(), company_name))
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        fields: &ValuationRecordFields,
    ) -> Result<ValuationRecord, AppError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::InternalError(format!("Valuation {} not found", id)))?;

        let (min, most_likely, max) = range_values(fields);
        record.email = fields.email.clone().or(record.email.take());
        record.company_name = fields.company_name.clone().or(record.company_name.take());
        record.org_number = fields.org_number.clone().or(record.org_number.take());
        record.industry = fields.industry.clone().or(record.industry.take());
        record.value_min = min;
        record.most_likely = most_likely;
        record.value_max = max;
        record.method = fields.method.clone().or(record.method.take());
        record.input = fields.input.clone().or(record.input.take());
        record.result = fields.result.clone().or(record.result.take());
        record.enrichment = fields.enrichment.clone().or(record.enrichment.take());
        record.updated_at = Utc::now();

        Ok(record.clone())
    }

    async fn create(&self, fields: &ValuationRecordFields) -> Result<ValuationRecord, AppError> {
        let (min, most_likely, max) = range_values(fields);
        let now = Utc::now();
        let record = ValuationRecord {
            id: Uuid::new_v4(),
            email: fields.email.clone(),
            company_name: fields.company_name.clone(),
            org_number: fields.org_number.clone(),
            industry: fields.industry.clone(),
            value_min: min,
            most_likely,
            value_max: max,
            method: fields.method.clone(),
            input: fields.input.clone(),
            result: fields.result.clone(),
            enrichment: fields.enrichment.clone(),
            created_at: now,
            updated_at: now,
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation_models::ValuationRange;

    fn draft(email: &str, company: &str) -> ValuationRecordFields {
        ValuationRecordFields {
            email: Some(email.into()),
            company_name: Some(company.into()),
            ..Default::default()
        }
    }

    fn completed(email: &str, company: &str) -> ValuationRecordFields {
        ValuationRecordFields {
            range: Some(ValuationRange {
                min: 70.0,
                most_likely: 100.0,
                max: 140.0,
            }),
            method: Some("deterministic_multi_method".into()),
            ..draft(email, company)
        }
    }

    #[tokio::test]
    async fn test_upsert_upgrades_matching_draft() {
        let store = MemoryValuationStore::new();
        let created = store.create(&draft("a@b.no", "Acme AS")).await.unwrap();
        assert!(created.is_draft());

        let upgraded = upsert(&store, &completed("A@B.no", "acme as")).await.unwrap();
        assert_eq!(upgraded.id, created.id);
        assert_eq!(upgraded.most_likely, 100.0);
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_creates_when_no_draft_matches() {
        let store = MemoryValuationStore::new();
        store.create(&draft("a@b.no", "Acme AS")).await.unwrap();

        upsert(&store, &completed("c@d.no", "Other AS")).await.unwrap();
        assert_eq!(store.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_completed_records_are_not_drafts() {
        let store = MemoryValuationStore::new();
        upsert(&store, &completed("a@b.no", "Acme AS")).await.unwrap();
        upsert(&store, &completed("a@b.no", "Acme AS")).await.unwrap();
        assert_eq!(store.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_anonymous_valuation_never_claims_someone_elses_draft() {
        let store = MemoryValuationStore::new();
        let alice = store.create(&draft("alice@acme.no", "Acme AS")).await.unwrap();

        let anonymous = ValuationRecordFields {
            email: None,
            ..completed("unused@acme.no", "Acme AS")
        };
        let record = upsert(&store, &anonymous).await.unwrap();

        assert_ne!(record.id, alice.id);
        assert!(record.email.is_none());
        let records = store.all().await;
        assert_eq!(records.len(), 2);
        let untouched = records.iter().find(|r| r.id == alice.id).unwrap();
        assert!(untouched.is_draft());
        assert_eq!(untouched.email.as_deref(), Some("alice@acme.no"));
    }

    #[tokio::test]
    async fn test_anonymous_draft_is_upgraded_by_anonymous_valuation() {
        let store = MemoryValuationStore::new();
        let created = store
            .create(&ValuationRecordFields {
                company_name: Some("Acme AS".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let anonymous = ValuationRecordFields {
            email: None,
            ..completed("unused@acme.no", "ACME AS")
        };
        let record = upsert(&store, &anonymous).await.unwrap();

        assert_eq!(record.id, created.id);
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_identifiers_never_match() {
        let store = MemoryValuationStore::new();
        store.create(&ValuationRecordFields::default()).await.unwrap();
        assert!(store.find_latest_draft(None, None).await.unwrap().is_none());
    }
}
