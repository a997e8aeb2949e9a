/// Tests for the enrichment workflow
/// Drives the orchestrator with in-test adapters and the in-memory cache
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use company_valuation_api::enrichment::EnrichmentOrchestrator;
use company_valuation_api::enrichment_cache::{EnrichmentCache, MemoryEnrichmentCache};
use company_valuation_api::errors::{AppError, SourceError};
use company_valuation_api::models::*;
use company_valuation_api::sources::SourceAdapter;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

enum Behaviour {
    Answer(SourceRecord),
    Fail(SourceError),
    Hang,
    Panic,
}

struct Scripted {
    kind: SourceKind,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(kind: SourceKind, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for Scripted {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn applies(&self, _identifier: &CompanyIdentifier) -> bool {
        true
    }

    async fn fetch(
        &self,
        _identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Answer(record) => Ok(Some(record.clone())),
            Behaviour::Fail(e) => Err(e.clone()),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(None)
            }
            Behaviour::Panic => panic!("parser hit unexpected markup"),
        }
    }
}

fn registry() -> SourceRecord {
    SourceRecord::Registry(RegistryRecord {
        name: Some("ACME AS".into()),
        org_number: Some("923609016".into()),
        industry_code: Some("62.010".into()),
        employees: Some(12),
        ..Default::default()
    })
}

fn website() -> SourceRecord {
    SourceRecord::Website(WebsiteRecord {
        description: Some("We build software for Norwegian logistics firms.".into()),
        emails: vec!["post@acme.no".into()],
        pages_scraped: 3,
        ..Default::default()
    })
}

fn identifier() -> CompanyIdentifier {
    CompanyIdentifier {
        org_number: Some("923 609 016".into()),
        website_url: Some("acme.no".into()),
        ..Default::default()
    }
}

fn orchestrator(
    adapters: Vec<Arc<Scripted>>,
    cache: MemoryEnrichmentCache,
) -> EnrichmentOrchestrator {
    let adapters = adapters
        .into_iter()
        .map(|a| a as Arc<dyn SourceAdapter>)
        .collect();
    EnrichmentOrchestrator::new(adapters, Arc::new(cache), Duration::from_millis(200))
}

#[cfg(test)]
mod partial_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_and_hanging_sources_do_not_fail_enrichment() {
        let adapters = vec![
            Scripted::new(SourceKind::Registry, Behaviour::Answer(registry())),
            Scripted::new(SourceKind::Credit, Behaviour::Fail(SourceError::Blocked(403))),
            Scripted::new(SourceKind::Reviews, Behaviour::Hang),
            Scripted::new(SourceKind::Website, Behaviour::Answer(website())),
        ];
        let service = orchestrator(adapters, MemoryEnrichmentCache::default());

        let record = service.enrich(&identifier()).await.unwrap();

        assert_eq!(record.auto_fill[&AutoFillField::CompanyName], json!("ACME AS"));
        assert_eq!(record.auto_fill[&AutoFillField::Email], json!("post@acme.no"));
        assert_eq!(record.auto_fill[&AutoFillField::Industry], json!("tech"));
        assert_eq!(record.raw_data["credit"], None);
        assert_eq!(record.raw_data["reviews"], None);
        assert!(record.raw_data["registry"].is_some());
    }

    #[tokio::test]
    async fn test_panicking_source_does_not_fail_enrichment() {
        let adapters = vec![
            Scripted::new(SourceKind::Registry, Behaviour::Answer(registry())),
            Scripted::new(SourceKind::Website, Behaviour::Panic),
        ];
        let service = orchestrator(adapters, MemoryEnrichmentCache::default());

        let record = service.enrich(&identifier()).await.unwrap();

        assert_eq!(record.auto_fill[&AutoFillField::CompanyName], json!("ACME AS"));
        assert!(record.raw_data["registry"].is_some());
        assert_eq!(record.raw_data["website"], None);
    }

    #[tokio::test]
    async fn test_all_sources_failing_still_yields_defaults() {
        let adapters = vec![
            Scripted::new(SourceKind::Registry, Behaviour::Fail(SourceError::Timeout)),
            Scripted::new(
                SourceKind::Website,
                Behaviour::Fail(SourceError::Transport("dns".into())),
            ),
        ];
        let service = orchestrator(adapters, MemoryEnrichmentCache::default());

        let record = service.enrich(&identifier()).await.unwrap();

        assert_eq!(record.auto_fill[&AutoFillField::Industry], json!("other"));
        for field in AutoFillField::QUALITATIVE {
            assert!(record.auto_fill.contains_key(&field), "missing {:?}", field);
        }
    }

    #[tokio::test]
    async fn test_missing_identifiers_is_bad_request() {
        let service = orchestrator(Vec::new(), MemoryEnrichmentCache::default());
        let result = service
            .enrich(&CompanyIdentifier {
                company_name: Some("Acme AS".into()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}

#[cfg(test)]
mod cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let registry_adapter = Scripted::new(SourceKind::Registry, Behaviour::Answer(registry()));
        let service = orchestrator(
            vec![registry_adapter.clone()],
            MemoryEnrichmentCache::default(),
        );

        let first = service.enrich(&identifier()).await.unwrap();
        let second = service.enrich(&identifier()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(registry_adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_ignored() {
        let cache = MemoryEnrichmentCache::default();
        let mut stale_record = EnrichedCompanyRecord::default();
        stale_record
            .auto_fill
            .insert(AutoFillField::CompanyName, json!("OLD NAME AS"));
        let mut stale = CacheEntry::new(
            "org:923609016".into(),
            stale_record,
            Utc::now() - ChronoDuration::days(40),
        );
        stale.expires_at = Utc::now() - ChronoDuration::days(10);
        cache.create(&stale).await.unwrap();

        let registry_adapter = Scripted::new(SourceKind::Registry, Behaviour::Answer(registry()));
        let website_adapter = Scripted::new(SourceKind::Website, Behaviour::Answer(website()));
        let service = orchestrator(
            vec![registry_adapter.clone(), website_adapter.clone()],
            cache.clone(),
        );

        let record = service.enrich(&identifier()).await.unwrap();

        assert_eq!(registry_adapter.calls(), 1);
        assert_eq!(website_adapter.calls(), 1);
        assert_eq!(record.auto_fill[&AutoFillField::CompanyName], json!("ACME AS"));

        let refreshed = cache.find_valid("org:923609016").await.unwrap().unwrap();
        assert!(refreshed.expires_at > Utc::now());
        assert_eq!(refreshed.scraped_page_count, 3);
    }

    #[tokio::test]
    async fn test_cached_lookup_never_fetches() {
        let registry_adapter = Scripted::new(SourceKind::Registry, Behaviour::Answer(registry()));
        let service = orchestrator(
            vec![registry_adapter.clone()],
            MemoryEnrichmentCache::default(),
        );

        assert!(service.cached(&identifier()).await.is_none());
        assert_eq!(registry_adapter.calls(), 0);

        service.enrich(&identifier()).await.unwrap();
        assert!(service.cached(&identifier()).await.is_some());
        assert_eq!(registry_adapter.calls(), 1);
    }
}

#[cfg(test)]
mod priority_tests {
    use super::*;
    use company_valuation_api::merge::merge;
    use chrono::NaiveDate;

    #[test]
    fn test_merge_ignores_settle_order() {
        let secondary = SourceRecord::SecondaryRegistry(SecondaryRegistryRecord {
            name: Some("Acme".into()),
            description: Some("Listed description".into()),
            ..Default::default()
        });
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let forward = vec![
            (SourceKind::Registry, Some(registry())),
            (SourceKind::SecondaryRegistry, Some(secondary.clone())),
            (SourceKind::Website, Some(website())),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let a = merge(&identifier(), &forward, today);
        let b = merge(&identifier(), &backward, today);

        assert_eq!(a, b);
        assert_eq!(a.auto_fill[&AutoFillField::CompanyName], json!("ACME AS"));
        assert_eq!(
            a.auto_fill[&AutoFillField::Description],
            json!("Listed description")
        );
    }
}
