//! Stores for enriched company profiles, keyed by `org:` / `web:` cache keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;

use crate::cache_validator::SealedCacheEntry;
use crate::errors::{AppError, ResultExt};
use crate::models::{CacheEntry, EnrichedCompanyRecord, CACHE_TTL_DAYS};

#[async_trait]
pub trait EnrichmentCache: Send + Sync {
    /// Entry for `key` whose `expires_at` has not passed.
    async fn find_valid(&self, key: &str) -> Result<Option<CacheEntry>, AppError>;

    /// Writes the entry, replacing any previous one for the same key.
    async fn create(&self, entry: &CacheEntry) -> Result<(), AppError>;
}

// ============ Postgres ============

pub struct PgEnrichmentCache {
    pool: PgPool,
}

impl PgEnrichmentCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes expired rows, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM company_enrichment_cache WHERE expires_at < now()")
            .execute(&self.pool)
            .await
            .context("purging expired enrichment cache rows")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EnrichmentCache for PgEnrichmentCache {
    async fn find_valid(&self, key: &str) -> Result<Option<CacheEntry>, AppError> {
        let row = sqlx::query_as::<_, (String, Value, i32, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT cache_key, enriched_data, scraped_page_count, created_at, expires_at
            FROM company_enrichment_cache
            WHERE cache_key = $1 AND expires_at >= now()
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("reading enrichment cache")?;

        let Some((key, data, scraped_page_count, created_at, expires_at)) = row else {
            return Ok(None);
        };
        let enriched_data = EnrichedCompanyRecord::decode(data)?;

        Ok(Some(CacheEntry {
            key,
            enriched_data,
            scraped_page_count,
            created_at,
            expires_at,
        }))
    }

    async fn create(&self, entry: &CacheEntry) -> Result<(), AppError> {
        let data = entry.enriched_data.encode()?;

        sqlx::query(
            r#"
            INSERT INTO company_enrichment_cache
                (cache_key, enriched_data, scraped_page_count, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cache_key) DO UPDATE
            SET enriched_data = EXCLUDED.enriched_data,
                scraped_page_count = EXCLUDED.scraped_page_count,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&entry.key)
        .bind(&data)
        .bind(entry.scraped_page_count)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .context("writing enrichment cache")?;

        tracing::debug!("Cached enrichment under {}", entry.key);
        Ok(())
    }
}

// ============ In-memory ============

/// Process-local cache used when no database is configured, and in tests.
#[derive(Clone)]
pub struct MemoryEnrichmentCache {
    entries: Cache<String, SealedCacheEntry>,
}

impl Default for MemoryEnrichmentCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl MemoryEnrichmentCache {
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .time_to_live(Duration::from_secs(CACHE_TTL_DAYS as u64 * 86_400))
            .max_capacity(max_capacity)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl EnrichmentCache for MemoryEnrichmentCache {
    async fn find_valid(&self, key: &str) -> Result<Option<CacheEntry>, AppError> {
        let Some(sealed) = self.entries.get(key).await else {
            return Ok(None);
        };
        match sealed.open() {
            Some(entry) if entry.is_valid_at(Utc::now()) => Ok(Some(entry)),
            Some(_) => {
                tracing::debug!("Cache entry {} expired", key);
                Ok(None)
            }
            None => {
                self.entries.invalidate(key).await;
                Ok(None)
            }
        }
    }

    async fn create(&self, entry: &CacheEntry) -> Result<(), AppError> {
        let sealed = SealedCacheEntry::seal(entry)?;
        self.entries.insert(entry.key.clone(), sealed).await;
        Ok(())
    }
}
