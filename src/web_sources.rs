//! HTML sources: the professional network profile, the review site, the
//! company website and generative extraction over the homepage.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use futures::future::join_all;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Node, Selector};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::errors::SourceError;
use crate::extraction::{
    find_emails, find_employee_count, find_founded_year, find_org_number, find_phones, run_chain,
    ExtractionStrategy, PageText,
};
use crate::models::{
    CompanyIdentifier, GenerativeExtractionRecord, ProfessionalNetworkRecord, ReviewsRecord,
    SourceKind, SourceRecord, WebsiteRecord,
};
use crate::registry_sources::{number_like, type_is};
use crate::sources::{get_text, SourceAdapter};

/// Extra pages the website adapter follows beyond the homepage.
pub const MAX_ABOUT_PAGES: usize = 2;

const ABOUT_HINTS: [&str; 6] = ["about", "om-oss", "om_oss", "/om", "hvem-er-vi", "company"];

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Every JSON-LD object on the page, with arrays and `@graph` flattened.
pub fn json_ld_objects(html: &str) -> Vec<Value> {
    let Some(scripts) = selector(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut objects = Vec::new();
    for script in document.select(&scripts) {
        let text: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
            flatten_json_ld(value, &mut objects);
        }
    }
    objects
}

fn flatten_json_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_json_ld(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

/// Title, meta description and visible body text of a page.
pub fn parse_page(html: &str) -> PageText {
    let document = Html::parse_document(html);

    let title = selector("title").and_then(|sel| {
        document
            .select(&sel)
            .next()
            .map(|t| collapse_whitespace(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    });
    let meta_description = meta_content(&document, r#"meta[name="description"]"#)
        .or_else(|| meta_content(&document, r#"meta[property="og:description"]"#));

    let mut body = String::new();
    if let Some(root) = selector("body").and_then(|sel| document.select(&sel).next()) {
        for node in root.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
                .map_or(false, |name| matches!(name.as_str(), "script" | "style" | "noscript"));
            if !hidden {
                body.push_str(text);
                body.push(' ');
            }
        }
    }

    PageText {
        title,
        meta_description,
        body: collapse_whitespace(&body),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Same-host links that look like "about us" pages, homepage excluded.
pub fn about_links(html: &str, base: &Url) -> Vec<Url> {
    let Some(anchors) = selector("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut links: Vec<Url> = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let lower = href.to_lowercase();
        if !ABOUT_HINTS.iter().any(|hint| lower.contains(hint)) {
            continue;
        }
        let Ok(mut url) = base.join(href) else {
            continue;
        };
        url.set_fragment(None);
        if url.host_str() != base.host_str() || url.path() == base.path() || links.contains(&url) {
            continue;
        }
        links.push(url);
        if links.len() >= MAX_ABOUT_PAGES {
            break;
        }
    }
    links
}

// ============ Professional network ============

/// Company page slug derived from the website host or, failing that, the name.
pub fn profile_slug(identifier: &CompanyIdentifier) -> Option<String> {
    if let Some(host) = identifier.website_host() {
        let label = host.split('.').next().unwrap_or_default();
        if !label.is_empty() {
            return Some(label.to_string());
        }
    }
    let name = identifier.company_name()?.to_lowercase();
    let name = name
        .trim_end_matches(" asa")
        .trim_end_matches(" as")
        .trim_end_matches(" ans")
        .trim_end_matches(" da");
    let slug = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    (!slug.is_empty()).then_some(slug)
}

fn count_before(text: &str, words: &str) -> Option<f64> {
    let re = Regex::new(&format!(r"(?i)(\d[\d\s,.]*?)\s*(?:{})\b", words)).ok()?;
    let caps = re.captures(text)?;
    let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Reads follower and headcount figures from the profile's `og:description`.
pub fn parse_professional_network(html: &str, url: &str) -> Option<ProfessionalNetworkRecord> {
    let document = Html::parse_document(html);
    let description = meta_content(&document, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="description"]"#))?;

    Some(ProfessionalNetworkRecord {
        profile_url: Some(url.to_string()),
        followers: count_before(&description, "followers|følgere").map(|n| n as u64),
        employees: count_before(&description, "employees|ansatte").map(|n| n as u32),
        description: Some(description),
    })
}

/// Profile page on the professional network. Succeeds rarely; usually blocked.
pub struct ProfessionalNetworkAdapter {
    client: Client,
    base_url: String,
}

impl ProfessionalNetworkAdapter {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for ProfessionalNetworkAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::ProfessionalNetwork
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        profile_slug(identifier).is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let Some(slug) = profile_slug(identifier) else {
            return Ok(None);
        };
        let url = format!("{}/company/{}", self.base_url, slug);

        let Some(html) = get_text(&self.client, &url, None).await? else {
            return Ok(None);
        };
        Ok(parse_professional_network(&html, &url).map(SourceRecord::ProfessionalNetwork))
    }
}

// ============ Reviews ============

/// Reads an `AggregateRating`, standalone or nested in the business entity.
pub fn parse_reviews(html: &str, url: &str) -> Option<ReviewsRecord> {
    let rating = json_ld_objects(html).into_iter().find_map(|obj| {
        if type_is(&obj, "AggregateRating") {
            Some(obj)
        } else {
            obj.get("aggregateRating").cloned()
        }
    })?;

    let record = ReviewsRecord {
        profile_url: Some(url.to_string()),
        rating: rating.get("ratingValue").and_then(number_like),
        review_count: rating
            .get("reviewCount")
            .or_else(|| rating.get("ratingCount"))
            .and_then(number_like)
            .map(|n| n as u32),
    };
    (record.rating.is_some() || record.review_count.is_some()).then_some(record)
}

pub struct ReviewsAdapter {
    client: Client,
    base_url: String,
}

impl ReviewsAdapter {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for ReviewsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Reviews
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        identifier.website_host().is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let Some(host) = identifier.website_host() else {
            return Ok(None);
        };
        let url = format!("{}/review/{}", self.base_url, host);

        let Some(html) = get_text(&self.client, &url, None).await? else {
            return Ok(None);
        };
        Ok(parse_reviews(&html, &url).map(SourceRecord::Reviews))
    }
}

// ============ Company website ============

/// Facts found across the fetched website pages.
pub fn website_record(pages: &[PageText], current_year: i32) -> WebsiteRecord {
    let text = pages
        .iter()
        .map(|p| p.body.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    WebsiteRecord {
        description: pages.first().and_then(PageText::summary),
        emails: find_emails(&text),
        phones: find_phones(&text),
        org_number: find_org_number(&text),
        founded_year: find_founded_year(&text, current_year),
        employees: find_employee_count(&text),
        pages_scraped: pages.len() as u32,
    }
}

/// Share of the source budget the website adapter may spend before it stops
/// waiting on about pages and returns what it has.
const ABOUT_BUDGET_SHARE: f64 = 0.8;

/// Homepage plus up to two "about" pages, read with regular expressions.
pub struct WebsiteAdapter {
    client: Client,
    budget: Duration,
}

impl WebsiteAdapter {
    /// `budget` is the deadline the caller enforces on the whole fetch.
    pub fn new(client: Client, budget: Duration) -> Self {
        Self { client, budget }
    }
}

#[async_trait]
impl SourceAdapter for WebsiteAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Website
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        identifier.website().is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let deadline = Instant::now() + self.budget.mul_f64(ABOUT_BUDGET_SHARE);
        let Some(home) = identifier.website() else {
            return Ok(None);
        };
        let Some(html) = get_text(&self.client, home.as_str(), None).await? else {
            return Ok(None);
        };

        let mut pages = vec![parse_page(&html)];
        let links = about_links(&html, &home);
        let fetches = links.iter().map(|link| async move {
            let outcome =
                tokio::time::timeout_at(deadline, get_text(&self.client, link.as_str(), None))
                    .await;
            (link, outcome)
        });
        for (link, outcome) in join_all(fetches).await {
            match outcome {
                Ok(Ok(Some(about))) => pages.push(parse_page(&about)),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::debug!("Skipping {}: {}", link, e),
                Err(_) => tracing::debug!("Skipping {}: out of time", link),
            }
        }

        Ok(Some(SourceRecord::Website(website_record(
            &pages,
            Utc::now().year(),
        ))))
    }
}

// ============ Generative extraction ============

/// Homepage text run through the extraction strategy chain.
pub struct GenerativeExtractionAdapter {
    client: Client,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl GenerativeExtractionAdapter {
    pub fn new(client: Client, strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { client, strategies }
    }
}

#[async_trait]
impl SourceAdapter for GenerativeExtractionAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::GenerativeExtraction
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        !self.strategies.is_empty() && identifier.website().is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let Some(home) = identifier.website() else {
            return Ok(None);
        };
        let Some(html) = get_text(&self.client, home.as_str(), None).await? else {
            return Ok(None);
        };
        let page = parse_page(&html);

        let record: Option<GenerativeExtractionRecord> =
            run_chain(&self.strategies, &page, Utc::now().year()).await;
        Ok(record.map(SourceRecord::GenerativeExtraction))
    }
}
