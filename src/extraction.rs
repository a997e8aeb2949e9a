//! Fact extraction from website text: regex helpers plus an ordered chain of
//! strategies (generative first, regex second).

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use crate::ai_valuation::extract_json;
use crate::llm_client::TextGenerator;
use crate::models::GenerativeExtractionRecord;

/// Characters of page text sent to the generator.
const MAX_PROMPT_TEXT: usize = 6_000;
const MAX_DESCRIPTION: usize = 300;
const MAX_CONTACTS: usize = 5;
const OLDEST_PLAUSIBLE_YEAR: i32 = 1800;

/// Readable content of one fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub body: String,
}

impl PageText {
    /// Meta description, else the opening of the body text.
    pub fn summary(&self) -> Option<String> {
        if let Some(meta) = self.meta_description.as_deref().map(str::trim) {
            if !meta.is_empty() {
                return Some(truncate(meta, MAX_DESCRIPTION));
            }
        }
        let body = self.body.trim();
        (body.len() >= 40).then(|| truncate(body, MAX_DESCRIPTION))
    }
}

/// Cuts at a char boundary, preferring the last sentence end.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(". ") {
        Some(end) if end > max_chars / 2 => cut[..=end].to_string(),
        _ => cut.trim_end().to_string(),
    }
}

// ============ Regex helpers ============

fn pattern(cell: &'static OnceLock<Option<Regex>>, source: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(source).ok()).as_ref()
}

macro_rules! static_regex {
    ($name:ident, $source:expr) => {
        fn $name() -> Option<&'static Regex> {
            static CELL: OnceLock<Option<Regex>> = OnceLock::new();
            pattern(&CELL, $source)
        }
    };
}

static_regex!(email_re, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}");
static_regex!(
    phone_re,
    r"(?:\+47[\s-]?)?\b(?:\d{3}[\s-]?\d{2}[\s-]?\d{3}|\d{2}[\s-]?\d{2}[\s-]?\d{2}[\s-]?\d{2})\b"
);
static_regex!(
    org_number_re,
    r"(?i)\b(?:org(?:anisasjons)?\.?\s*(?:nr|nummer|no)\.?|organization number|org\.? number)\s*:?\s*(?:NO\s*)?(\d{3}\s?\d{3}\s?\d{3})\b"
);
static_regex!(
    founded_re,
    r"(?i)\b(?:etablert|grunnlagt|stiftet|founded|established|since|siden)\s+(?:i\s+|in\s+)?((?:18|19|20)\d{2})\b"
);
static_regex!(
    employees_re,
    r"(?i)\b(\d{1,3}(?:[\s,.]\d{3})*|\d+)\+?\s+(?:ansatte|medarbeidere|employees|staff|people)\b"
);
static_regex!(
    products_re,
    r"(?i)\b(?:vi tilbyr|vi leverer|våre produkter er|we offer|we provide|our products include|our services include)\s+([^.!?\n]{3,200})"
);
static_regex!(
    customers_re,
    r"(?i)\b(?:for|til|we help|vi hjelper)\s+((?:[\p{L}-]+\s+){0,5}(?:bedrifter|virksomheter|privatpersoner|kunder|companies|businesses|consumers|customers|enterprises))\b"
);

/// Distinct e-mail addresses, skipping asset names such as `logo@2x.png`.
pub fn find_emails(text: &str) -> Vec<String> {
    let Some(re) = email_re() else {
        return Vec::new();
    };
    let mut found: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let email = m.as_str().trim_end_matches('.').to_lowercase();
        let asset = [".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"]
            .iter()
            .any(|ext| email.ends_with(ext));
        if !asset && !email.ends_with("example.com") && !found.contains(&email) {
            found.push(email);
        }
        if found.len() >= MAX_CONTACTS {
            break;
        }
    }
    found
}

/// Norwegian eight-digit numbers, normalised to `+47 XX XX XX XX`.
pub fn find_phones(text: &str) -> Vec<String> {
    let Some(re) = phone_re() else {
        return Vec::new();
    };
    let mut found: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
        let local = digits.strip_prefix("47").filter(|d| d.len() == 8).unwrap_or(digits.as_str());
        if local.len() != 8 || !matches!(local.as_bytes()[0], b'2'..=b'9') {
            continue;
        }
        let formatted = format!(
            "+47 {} {} {} {}",
            &local[0..2],
            &local[2..4],
            &local[4..6],
            &local[6..8]
        );
        if !found.contains(&formatted) {
            found.push(formatted);
        }
        if found.len() >= MAX_CONTACTS {
            break;
        }
    }
    found
}

pub fn find_org_number(text: &str) -> Option<String> {
    let caps = org_number_re()?.captures(text)?;
    Some(caps[1].chars().filter(char::is_ascii_digit).collect())
}

/// Founding year mentioned in prose, bounded by `current_year`.
pub fn find_founded_year(text: &str, current_year: i32) -> Option<i32> {
    founded_re()?
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .find(|y| (OLDEST_PLAUSIBLE_YEAR..=current_year).contains(y))
}

/// Largest headcount mentioned, e.g. "over 40 ansatte".
pub fn find_employee_count(text: &str) -> Option<u32> {
    employees_re()?
        .captures_iter(text)
        .filter_map(|c| {
            c[1].chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse::<u32>()
                .ok()
        })
        .filter(|n| (1..=100_000).contains(n))
        .max()
}

fn find_products(text: &str) -> Vec<String> {
    let Some(caps) = products_re().and_then(|re| re.captures(text)) else {
        return Vec::new();
    };
    caps[1]
        .split([',', ';'])
        .flat_map(|part| part.split(" og ").flat_map(|p| p.split(" and ")))
        .map(|p| p.trim().trim_matches('"').to_string())
        .filter(|p| p.len() >= 3)
        .take(8)
        .collect()
}

fn find_target_customers(text: &str) -> Option<String> {
    let caps = customers_re()?.captures(text)?;
    Some(caps[1].trim().to_string())
}

// ============ Strategies ============

/// One way of turning page text into structured facts.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the strategy could not produce anything useful.
    async fn extract(&self, page: &PageText, current_year: i32)
        -> Option<GenerativeExtractionRecord>;
}

/// Tries each strategy in order; the first useful record wins.
pub async fn run_chain(
    strategies: &[Box<dyn ExtractionStrategy>],
    page: &PageText,
    current_year: i32,
) -> Option<GenerativeExtractionRecord> {
    for strategy in strategies {
        match strategy.extract(page, current_year).await {
            Some(record) if has_content(&record) => {
                tracing::debug!("Extraction strategy {} succeeded", strategy.name());
                return Some(record);
            }
            _ => tracing::debug!("Extraction strategy {} produced nothing", strategy.name()),
        }
    }
    None
}

fn has_content(record: &GenerativeExtractionRecord) -> bool {
    record.description.is_some()
        || !record.products.is_empty()
        || record.target_customers.is_some()
        || record.employees.is_some()
        || record.founded_year.is_some()
}

/// Pattern matching over the page text. Never fails, may find nothing.
pub struct RegexStrategy;

#[async_trait]
impl ExtractionStrategy for RegexStrategy {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn extract(
        &self,
        page: &PageText,
        current_year: i32,
    ) -> Option<GenerativeExtractionRecord> {
        Some(GenerativeExtractionRecord {
            strategy: self.name().to_string(),
            description: page.summary(),
            products: find_products(&page.body),
            target_customers: find_target_customers(&page.body),
            employees: find_employee_count(&page.body),
            founded_year: find_founded_year(&page.body, current_year),
        })
    }
}

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract company facts from website text. \
Answer with one JSON object and nothing else. Use null for anything the text does not state.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedFacts {
    description: Option<String>,
    #[serde(default)]
    products: Vec<String>,
    target_customers: Option<String>,
    employees: Option<u32>,
    founded_year: Option<i32>,
}

/// Asks the text generator to read the page.
pub struct GenerativeStrategy {
    generator: Arc<dyn TextGenerator>,
}

impl GenerativeStrategy {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn prompt(page: &PageText) -> String {
        format!(
            "Title: {}\nMeta description: {}\n\nPage text:\n{}\n\n\
             Return JSON with keys: description (max two sentences), products (array of \
             strings), targetCustomers (string), employees (integer), foundedYear (integer).",
            page.title.as_deref().unwrap_or("-"),
            page.meta_description.as_deref().unwrap_or("-"),
            truncate(&page.body, MAX_PROMPT_TEXT),
        )
    }
}

#[async_trait]
impl ExtractionStrategy for GenerativeStrategy {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn extract(
        &self,
        page: &PageText,
        current_year: i32,
    ) -> Option<GenerativeExtractionRecord> {
        let text = match self
            .generator
            .generate(EXTRACTION_SYSTEM_PROMPT, &Self::prompt(page))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Generative extraction failed: {}", e);
                return None;
            }
        };
        let facts: GeneratedFacts = serde_json::from_value(extract_json(&text)?).ok()?;

        Some(GenerativeExtractionRecord {
            strategy: self.name().to_string(),
            description: facts
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            products: facts
                .products
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            target_customers: facts
                .target_customers
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            employees: facts.employees.filter(|n| *n > 0),
            founded_year: facts
                .founded_year
                .filter(|y| (OLDEST_PLAUSIBLE_YEAR..=current_year).contains(y)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    const ABOUT: &str = "Acme AS ble etablert i 2009 og har i dag 42 ansatte. \
        Vi tilbyr regnskap, lønn og rådgivning. Vi hjelper små og mellomstore bedrifter. \
        Kontakt post@acme.no eller ring 22 33 44 55. Org.nr. 923 609 016. logo@2x.png";

    #[test]
    fn test_regex_helpers() {
        assert_eq!(find_emails(ABOUT), vec!["post@acme.no".to_string()]);
        assert_eq!(find_phones(ABOUT), vec!["+47 22 33 44 55".to_string()]);
        assert_eq!(find_org_number(ABOUT).as_deref(), Some("923609016"));
        assert_eq!(find_founded_year(ABOUT, 2026), Some(2009));
        assert_eq!(find_employee_count(ABOUT), Some(42));
    }

    #[test]
    fn test_future_founding_year_is_ignored() {
        assert_eq!(find_founded_year("Founded in 2031", 2026), None);
    }

    #[test]
    fn test_truncate_prefers_sentence_end() {
        let text = "First sentence here. Second sentence is quite a bit longer than that.";
        assert_eq!(truncate(text, 40), "First sentence here.");
        assert_eq!(truncate("short", 40), "short");
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, AppError> {
            Err(AppError::ExternalApiError("connection reset".into()))
        }
    }

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, AppError> {
            Ok(self.0.to_string())
        }
    }

    fn page() -> PageText {
        PageText {
            title: Some("Acme".into()),
            meta_description: Some("Accounting for small businesses".into()),
            body: ABOUT.to_string(),
        }
    }

    #[tokio::test]
    async fn test_chain_falls_back_to_regex() {
        let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
            Box::new(GenerativeStrategy::new(Arc::new(Failing))),
            Box::new(RegexStrategy),
        ];
        let record = run_chain(&strategies, &page(), 2026).await.unwrap();
        assert_eq!(record.strategy, "regex");
        assert_eq!(record.employees, Some(42));
        assert_eq!(record.founded_year, Some(2009));
        assert!(record.products.contains(&"regnskap".to_string()));
        assert_eq!(
            record.target_customers.as_deref(),
            Some("små og mellomstore bedrifter")
        );
    }

    #[tokio::test]
    async fn test_generative_strategy_wins_when_it_answers() {
        let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
            Box::new(GenerativeStrategy::new(Arc::new(Canned(
                "Sure! {\"description\":\"Accounting firm\",\"products\":[\"Bookkeeping\"],\"employees\":40,\"foundedYear\":2009}",
            )))),
            Box::new(RegexStrategy),
        ];
        let record = run_chain(&strategies, &page(), 2026).await.unwrap();
        assert_eq!(record.strategy, "generative");
        assert_eq!(record.description.as_deref(), Some("Accounting firm"));
        assert_eq!(record.employees, Some(40));
    }
}
