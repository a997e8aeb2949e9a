use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Validity window of a cached enrichment.
pub const CACHE_TTL_DAYS: i64 = 30;

// ============ Identity ============

/// Sparse, user-supplied handle on a company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyIdentifier {
    pub org_number: Option<String>,
    #[serde(alias = "website")]
    pub website_url: Option<String>,
    pub company_name: Option<String>,
    pub industry: Option<String>,
}

impl CompanyIdentifier {
    /// Nine-digit organisation number with separators removed.
    pub fn normalized_org_number(&self) -> Option<String> {
        let digits: String = self
            .org_number
            .as_deref()?
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        (digits.len() == 9).then_some(digits)
    }

    /// Full homepage URL, with `https://` added when the user left it out.
    pub fn website(&self) -> Option<url::Url> {
        let raw = self.website_url.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        url::Url::parse(&with_scheme)
            .ok()
            .filter(|u| u.host_str().map_or(false, |h| h.contains('.')))
    }

    /// Lowercased host without a leading `www.`.
    pub fn website_host(&self) -> Option<String> {
        let url = self.website()?;
        let host = url.host_str()?.to_lowercase();
        Some(host.trim_start_matches("www.").to_string())
    }

    pub fn company_name(&self) -> Option<&str> {
        self.company_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// `org:<digits>` when an org number is present, else `web:<host>`.
    pub fn cache_key(&self) -> Option<String> {
        if let Some(org) = self.normalized_org_number() {
            return Some(format!("org:{}", org));
        }
        self.website_host().map(|host| format!("web:{}", host))
    }
}

// ============ Sources ============

/// The fixed set of sources, declared from highest to lowest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Registry,
    AnnualReports,
    Credit,
    SecondaryRegistry,
    ProfessionalNetwork,
    Reviews,
    Website,
    GenerativeExtraction,
}

impl SourceKind {
    pub const ALL: [SourceKind; 8] = [
        SourceKind::Registry,
        SourceKind::AnnualReports,
        SourceKind::Credit,
        SourceKind::SecondaryRegistry,
        SourceKind::ProfessionalNetwork,
        SourceKind::Reviews,
        SourceKind::Website,
        SourceKind::GenerativeExtraction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Registry => "registry",
            SourceKind::AnnualReports => "annual_reports",
            SourceKind::Credit => "credit",
            SourceKind::SecondaryRegistry => "secondary_registry",
            SourceKind::ProfessionalNetwork => "professional_network",
            SourceKind::Reviews => "reviews",
            SourceKind::Website => "website",
            SourceKind::GenerativeExtraction => "generative_extraction",
        }
    }

    /// Lower number = higher priority. Industry defaults sit below every source.
    pub fn priority(&self) -> u8 {
        *self as u8
    }
}

/// Company as the official registry knows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    pub name: Option<String>,
    pub org_number: Option<String>,
    pub org_form: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub founded_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub industry_code: Option<String>,
    pub industry_description: Option<String>,
    pub employees: Option<u32>,
    pub website: Option<String>,
    pub bankrupt: Option<bool>,
    pub under_liquidation: Option<bool>,
}

/// One filed set of annual accounts. Amounts in NOK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualFiling {
    pub year: i32,
    pub revenue: Option<f64>,
    pub operating_result: Option<f64>,
    pub net_result: Option<f64>,
    pub total_assets: Option<f64>,
    pub equity: Option<f64>,
    pub total_debt: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualReportsRecord {
    pub filings: Vec<AnnualFiling>,
}

impl AnnualReportsRecord {
    /// Filing with the highest year.
    pub fn latest(&self) -> Option<&AnnualFiling> {
        self.filings.iter().max_by_key(|f| f.year)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRecord {
    pub rating: Option<String>,
    pub score: Option<f64>,
    pub credit_limit: Option<f64>,
    pub payment_remarks: Option<u32>,
    pub employees: Option<u32>,
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryRegistryRecord {
    pub name: Option<String>,
    pub employees: Option<u32>,
    pub founded_year: Option<i32>,
    pub address: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalNetworkRecord {
    pub profile_url: Option<String>,
    pub followers: Option<u64>,
    pub employees: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsRecord {
    pub profile_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteRecord {
    pub description: Option<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub org_number: Option<String>,
    pub founded_year: Option<i32>,
    pub employees: Option<u32>,
    pub pages_scraped: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerativeExtractionRecord {
    /// Name of the extraction strategy that produced this record.
    pub strategy: String,
    pub description: Option<String>,
    pub products: Vec<String>,
    pub target_customers: Option<String>,
    pub employees: Option<u32>,
    pub founded_year: Option<i32>,
}

/// One source's view of a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceRecord {
    Registry(RegistryRecord),
    AnnualReports(AnnualReportsRecord),
    Credit(CreditRecord),
    SecondaryRegistry(SecondaryRegistryRecord),
    ProfessionalNetwork(ProfessionalNetworkRecord),
    Reviews(ReviewsRecord),
    Website(WebsiteRecord),
    GenerativeExtraction(GenerativeExtractionRecord),
}

impl SourceRecord {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRecord::Registry(_) => SourceKind::Registry,
            SourceRecord::AnnualReports(_) => SourceKind::AnnualReports,
            SourceRecord::Credit(_) => SourceKind::Credit,
            SourceRecord::SecondaryRegistry(_) => SourceKind::SecondaryRegistry,
            SourceRecord::ProfessionalNetwork(_) => SourceKind::ProfessionalNetwork,
            SourceRecord::Reviews(_) => SourceKind::Reviews,
            SourceRecord::Website(_) => SourceKind::Website,
            SourceRecord::GenerativeExtraction(_) => SourceKind::GenerativeExtraction,
        }
    }

    /// Number of web pages fetched to build this record.
    pub fn pages_scraped(&self) -> u32 {
        match self {
            SourceRecord::Website(w) => w.pages_scraped,
            SourceRecord::SecondaryRegistry(_)
            | SourceRecord::ProfessionalNetwork(_)
            | SourceRecord::Reviews(_)
            | SourceRecord::GenerativeExtraction(_) => 1,
            _ => 0,
        }
    }
}

// ============ Enriched record ============

/// Keys of the merged `autoFill` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoFillField {
    CompanyName,
    OrgNumber,
    OrgForm,
    Address,
    PostalCode,
    City,
    RegistrationDate,
    FoundedYear,
    IndustryCode,
    IndustryDescription,
    Industry,
    Employees,
    EmployeeBucket,
    CompanyAge,
    Website,
    Email,
    Phone,
    Description,
    Products,
    TargetCustomers,
    LatestRevenue,
    LatestOperatingResult,
    RevenueBucket,
    RevenueTrend,
    TotalDebt,
    Equity,
    CreditRating,
    CreditScore,
    PaymentRemarks,
    ReviewScore,
    ReviewCount,
    Followers,
    CustomerBase,
    CompetitiveAdvantage,
    GrowthPotential,
    KeyRisks,
}

impl AutoFillField {
    /// Fields the official registry owns outright.
    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            AutoFillField::CompanyName
                | AutoFillField::Address
                | AutoFillField::PostalCode
                | AutoFillField::City
        )
    }

    pub const QUALITATIVE: [AutoFillField; 5] = [
        AutoFillField::Description,
        AutoFillField::CustomerBase,
        AutoFillField::CompetitiveAdvantage,
        AutoFillField::GrowthPotential,
        AutoFillField::KeyRisks,
    ];
}

/// True for values worth putting in `autoFill`.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(n) => n.as_f64().map_or(false, f64::is_finite),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) => true,
    }
}

/// Merged, best-effort profile of a company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedCompanyRecord {
    pub auto_fill: BTreeMap<AutoFillField, Value>,
    /// Every attempted source by name; `None` when it produced nothing.
    pub raw_data: BTreeMap<String, Option<SourceRecord>>,
}

impl EnrichedCompanyRecord {
    /// Serialised form stored at the persistence edge.
    pub fn encode(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn decode(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn get_str(&self, field: AutoFillField) -> Option<&str> {
        self.auto_fill.get(&field).and_then(Value::as_str)
    }

    pub fn get_f64(&self, field: AutoFillField) -> Option<f64> {
        self.auto_fill.get(&field).and_then(Value::as_f64)
    }

    pub fn source(&self, kind: SourceKind) -> Option<&SourceRecord> {
        self.raw_data.get(kind.as_str()).and_then(Option::as_ref)
    }

    /// Filed annual accounts, if the filings source answered.
    pub fn annual_filings(&self) -> &[AnnualFiling] {
        match self.source(SourceKind::AnnualReports) {
            Some(SourceRecord::AnnualReports(r)) => &r.filings,
            _ => &[],
        }
    }

    pub fn scraped_page_count(&self) -> u32 {
        self.raw_data
            .values()
            .flatten()
            .map(SourceRecord::pages_scraped)
            .sum()
    }
}

// ============ Cache ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub enriched_data: EnrichedCompanyRecord,
    pub scraped_page_count: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: String, enriched_data: EnrichedCompanyRecord, now: DateTime<Utc>) -> Self {
        let scraped_page_count = enriched_data.scraped_page_count() as i32;
        Self {
            key,
            enriched_data,
            scraped_page_count,
            created_at: now,
            expires_at: now + Duration::days(CACHE_TTL_DAYS),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at >= now
    }
}
