use chrono::Utc;
use std::env;
use uuid::Uuid;

use company_valuation_api::db::Database;
use company_valuation_api::enrichment_cache::{EnrichmentCache, PgEnrichmentCache};
use company_valuation_api::models::{AutoFillField, CacheEntry, EnrichedCompanyRecord};
use company_valuation_api::valuation_models::{ValuationRange, ValuationRecordFields};
use company_valuation_api::valuation_store::{upsert, PgValuationStore, ValuationStore};

async fn connect() -> anyhow::Result<Database> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.ensure_schema().await?;
    Ok(db)
}

/// Integration smoke test for the Postgres enrichment cache.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn enrichment_cache_round_trip_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let cache = PgEnrichmentCache::new(db.pool.clone());

    // Unique key to avoid conflicts on repeated runs.
    let key = format!("web:smoke-{}.test", Uuid::new_v4().simple());
    let mut record = EnrichedCompanyRecord::default();
    record
        .auto_fill
        .insert(AutoFillField::CompanyName, serde_json::json!("Smoke Test AS"));
    let entry = CacheEntry::new(key.clone(), record, Utc::now());

    cache
        .create(&entry)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    // Second write for the same key is an upsert, not a conflict.
    cache
        .create(&entry)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let found = cache
        .find_valid(&key)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("cache entry not found"))?;
    assert_eq!(found.enriched_data, entry.enriched_data);

    db.close().await;
    Ok(())
}

/// Integration smoke test for draft upgrade in the Postgres valuation store.
#[tokio::test]
#[ignore]
async fn valuation_draft_upgrade_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let store = PgValuationStore::new(db.pool.clone());

    let email = format!("smoke-{}@example.no", Uuid::new_v4().simple());
    let draft = store
        .create(&ValuationRecordFields {
            email: Some(email.clone()),
            company_name: Some("Smoke Test AS".into()),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(draft.is_draft());

    let upgraded = upsert(
        &store,
        &ValuationRecordFields {
            email: Some(email.to_uppercase()),
            company_name: Some("smoke test as".into()),
            range: Some(ValuationRange {
                min: 700_000.0,
                most_likely: 1_000_000.0,
                max: 1_400_000.0,
            }),
            method: Some("deterministic_multi_method".into()),
            ..Default::default()
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    assert_eq!(upgraded.id, draft.id);
    assert_eq!(upgraded.most_likely, 1_000_000.0);

    db.close().await;
    Ok(())
}
