//! Source adapter contract and the all-settled fan-out over adapters.

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::errors::SourceError;
use crate::extraction::{ExtractionStrategy, GenerativeStrategy, RegexStrategy};
use crate::llm_client::TextGenerator;
use crate::models::{CompanyIdentifier, SourceKind, SourceRecord};
use crate::registry_sources::{
    AnnualReportsAdapter, CreditAdapter, RegistryAdapter, SecondaryRegistryAdapter,
};
use crate::web_sources::{
    GenerativeExtractionAdapter, ProfessionalNetworkAdapter, ReviewsAdapter, WebsiteAdapter,
};

const USER_AGENT: &str = concat!("company-valuation-api/", env!("CARGO_PKG_VERSION"));

/// One external source of company facts.
///
/// `fetch` returns `Ok(None)` when the source has nothing on the company.
/// Errors are ordinary outcomes; the orchestrator never propagates them.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Whether the identifier carries what this source needs.
    fn applies(&self, identifier: &CompanyIdentifier) -> bool;

    async fn fetch(&self, identifier: &CompanyIdentifier)
        -> Result<Option<SourceRecord>, SourceError>;
}

/// Runs one adapter under its own deadline. Every failure, panics included,
/// settles to `None`.
pub async fn fetch_settled(
    adapter: &dyn SourceAdapter,
    identifier: &CompanyIdentifier,
    timeout: Duration,
) -> Option<SourceRecord> {
    let kind = adapter.kind();
    let guarded = AssertUnwindSafe(adapter.fetch(identifier)).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(Ok(Some(record)))) => {
            tracing::debug!("Source {} returned data", kind.as_str());
            Some(record)
        }
        Ok(Ok(Ok(None))) => {
            tracing::debug!("Source {} had nothing on the company", kind.as_str());
            None
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!("Source {} failed: {}", kind.as_str(), e);
            None
        }
        Ok(Err(_)) => {
            tracing::warn!("Source {} panicked while fetching", kind.as_str());
            None
        }
        Err(_) => {
            tracing::warn!("Source {} {}", kind.as_str(), SourceError::Timeout);
            None
        }
    }
}

/// Fans out to every applicable adapter concurrently and waits for all of them.
pub async fn fetch_all(
    adapters: &[Arc<dyn SourceAdapter>],
    identifier: &CompanyIdentifier,
    timeout: Duration,
) -> Vec<(SourceKind, Option<SourceRecord>)> {
    let applicable: Vec<&Arc<dyn SourceAdapter>> =
        adapters.iter().filter(|a| a.applies(identifier)).collect();

    tracing::info!(
        "Fetching from {} of {} sources",
        applicable.len(),
        adapters.len()
    );

    let futures = applicable.iter().map(|adapter| async move {
        let record = fetch_settled(adapter.as_ref(), identifier, timeout).await;
        (adapter.kind(), record)
    });

    join_all(futures).await
}

/// The fixed production adapter set, highest priority first.
pub fn default_adapters(
    config: &Config,
    generator: Option<Arc<dyn TextGenerator>>,
) -> Result<Vec<Arc<dyn SourceAdapter>>, SourceError> {
    let http = build_http_client(Duration::from_secs(config.source_timeout_secs))?;

    let mut strategies: Vec<Box<dyn ExtractionStrategy>> = Vec::new();
    if let Some(generator) = generator {
        strategies.push(Box::new(GenerativeStrategy::new(generator)));
    }
    strategies.push(Box::new(RegexStrategy));

    Ok(vec![
        Arc::new(RegistryAdapter::new(http.clone(), &config.brreg_base_url)),
        Arc::new(AnnualReportsAdapter::new(http.clone(), &config.brreg_base_url)),
        Arc::new(CreditAdapter::new(
            http.clone(),
            config.credit_api_url.clone(),
            config.credit_api_key.clone(),
        )),
        Arc::new(SecondaryRegistryAdapter::new(
            http.clone(),
            &config.secondary_registry_url,
        )),
        Arc::new(ProfessionalNetworkAdapter::new(
            http.clone(),
            &config.professional_network_url,
        )),
        Arc::new(ReviewsAdapter::new(http.clone(), &config.reviews_base_url)),
        Arc::new(WebsiteAdapter::new(
            http.clone(),
            Duration::from_secs(config.source_timeout_secs),
        )),
        Arc::new(GenerativeExtractionAdapter::new(http, strategies)),
    ])
}

/// Shared HTTP client for all adapters.
pub fn build_http_client(timeout: Duration) -> Result<Client, SourceError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SourceError::Transport(format!("Failed to build HTTP client: {}", e)))
}

/// GET returning the body, `None` on 404, `Blocked` on any other non-success.
pub async fn get_text(
    client: &Client,
    url: &str,
    bearer: Option<&str>,
) -> Result<Option<String>, SourceError> {
    let mut request = client.get(url);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;

    match response.status() {
        StatusCode::NOT_FOUND => Ok(None),
        status if !status.is_success() => Err(SourceError::Blocked(status.as_u16())),
        _ => Ok(Some(response.text().await?)),
    }
}

/// GET decoding a JSON body, with the same status handling as [`get_text`].
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    bearer: Option<&str>,
) -> Result<Option<T>, SourceError> {
    match get_text(client, url, bearer).await? {
        Some(body) => serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| SourceError::Parse(e.to_string())),
        None => Ok(None),
    }
}
