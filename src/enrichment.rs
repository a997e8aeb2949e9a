/// Company enrichment workflow:
/// 1. Look up a valid cached profile by `org:` / `web:` key
/// 2. Otherwise fan out to every applicable source and let all of them settle
/// 3. Merge by source priority, derive fields, backfill industry defaults
/// 4. Cache the merged profile for 30 days (best effort)
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::enrichment_cache::EnrichmentCache;
use crate::errors::AppError;
use crate::merge::merge;
use crate::models::{CacheEntry, CompanyIdentifier, EnrichedCompanyRecord};
use crate::sources::{fetch_all, SourceAdapter};

pub struct EnrichmentOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    cache: Arc<dyn EnrichmentCache>,
    source_timeout: Duration,
}

impl EnrichmentOrchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        cache: Arc<dyn EnrichmentCache>,
        source_timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            cache,
            source_timeout,
        }
    }

    /// Builds the best available profile. Only a missing cache key is an error;
    /// source and cache failures degrade the result instead.
    pub async fn enrich(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<EnrichedCompanyRecord, AppError> {
        let key = identifier.cache_key().ok_or_else(|| {
            AppError::BadRequest("orgNumber or website is required".to_string())
        })?;

        if let Some(entry) = self.lookup(&key).await {
            tracing::info!("Enrichment cache hit for {}", key);
            return Ok(entry.enriched_data);
        }

        tracing::info!("Enrichment cache miss for {}, querying sources", key);
        let results = fetch_all(&self.adapters, identifier, self.source_timeout).await;
        let answered = results.iter().filter(|(_, r)| r.is_some()).count();

        let now = Utc::now();
        let record = merge(identifier, &results, now.date_naive());
        tracing::info!(
            "Enriched {}: {} of {} sources answered, {} fields",
            key,
            answered,
            results.len(),
            record.auto_fill.len()
        );

        let entry = CacheEntry::new(key, record, now);
        if let Err(e) = self.cache.create(&entry).await {
            tracing::warn!("Failed to cache enrichment for {}: {}", entry.key, e);
        }

        Ok(entry.enriched_data)
    }

    /// Cache-only lookup; never contacts a source.
    pub async fn cached(&self, identifier: &CompanyIdentifier) -> Option<EnrichedCompanyRecord> {
        let key = identifier.cache_key()?;
        self.lookup(&key).await.map(|entry| entry.enriched_data)
    }

    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.cache.find_valid(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Enrichment cache read failed for {}: {}", key, e);
                None
            }
        }
    }
}
