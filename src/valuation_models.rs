use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::industry::Industry;
use crate::models::AnnualFiling;

pub const METHOD_DETERMINISTIC: &str = "deterministic_multi_method";
pub const METHOD_AI: &str = "ai_assisted";

// ============ Buckets ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeBucket {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2-5")]
    TwoToFive,
    #[serde(rename = "6-10")]
    SixToTen,
    #[serde(rename = "11-25")]
    ElevenToTwentyFive,
    #[serde(rename = "25+")]
    OverTwentyFive,
}

impl EmployeeBucket {
    pub const ALL: [EmployeeBucket; 6] = [
        EmployeeBucket::Zero,
        EmployeeBucket::One,
        EmployeeBucket::TwoToFive,
        EmployeeBucket::SixToTen,
        EmployeeBucket::ElevenToTwentyFive,
        EmployeeBucket::OverTwentyFive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeBucket::Zero => "0",
            EmployeeBucket::One => "1",
            EmployeeBucket::TwoToFive => "2-5",
            EmployeeBucket::SixToTen => "6-10",
            EmployeeBucket::ElevenToTwentyFive => "11-25",
            EmployeeBucket::OverTwentyFive => "25+",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == raw.trim())
    }

    pub fn from_count(count: u32) -> Self {
        match count {
            0 => EmployeeBucket::Zero,
            1 => EmployeeBucket::One,
            2..=5 => EmployeeBucket::TwoToFive,
            6..=10 => EmployeeBucket::SixToTen,
            11..=25 => EmployeeBucket::ElevenToTwentyFive,
            _ => EmployeeBucket::OverTwentyFive,
        }
    }

    /// Owner-operated, no staff beyond the owner.
    pub fn is_solo(&self) -> bool {
        matches!(self, EmployeeBucket::Zero | EmployeeBucket::One)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevenueBucket {
    #[serde(rename = "0-1M")]
    UnderOne,
    #[serde(rename = "1-5M")]
    OneToFive,
    #[serde(rename = "5-10M")]
    FiveToTen,
    #[serde(rename = "10-50M")]
    TenToFifty,
    #[serde(rename = "50M+")]
    OverFifty,
}

impl RevenueBucket {
    pub const ALL: [RevenueBucket; 5] = [
        RevenueBucket::UnderOne,
        RevenueBucket::OneToFive,
        RevenueBucket::FiveToTen,
        RevenueBucket::TenToFifty,
        RevenueBucket::OverFifty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueBucket::UnderOne => "0-1M",
            RevenueBucket::OneToFive => "1-5M",
            RevenueBucket::FiveToTen => "5-10M",
            RevenueBucket::TenToFifty => "10-50M",
            RevenueBucket::OverFifty => "50M+",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(raw))
    }

    /// Representative revenue in NOK.
    pub fn midpoint(&self) -> f64 {
        match self {
            RevenueBucket::UnderOne => 500_000.0,
            RevenueBucket::OneToFive => 3_000_000.0,
            RevenueBucket::FiveToTen => 7_500_000.0,
            RevenueBucket::TenToFifty => 30_000_000.0,
            RevenueBucket::OverFifty => 75_000_000.0,
        }
    }

    pub fn from_amount(revenue: f64) -> Self {
        match revenue {
            r if r < 1_000_000.0 => RevenueBucket::UnderOne,
            r if r < 5_000_000.0 => RevenueBucket::OneToFive,
            r if r < 10_000_000.0 => RevenueBucket::FiveToTen,
            r if r < 50_000_000.0 => RevenueBucket::TenToFifty,
            _ => RevenueBucket::OverFifty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginBucket {
    #[serde(rename = "negative")]
    Negative,
    #[serde(rename = "0-5")]
    UnderFive,
    #[serde(rename = "5-10")]
    FiveToTen,
    #[serde(rename = "10-20")]
    TenToTwenty,
    #[serde(rename = "20+")]
    OverTwenty,
}

impl MarginBucket {
    pub const ALL: [MarginBucket; 5] = [
        MarginBucket::Negative,
        MarginBucket::UnderFive,
        MarginBucket::FiveToTen,
        MarginBucket::TenToTwenty,
        MarginBucket::OverTwenty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarginBucket::Negative => "negative",
            MarginBucket::UnderFive => "0-5",
            MarginBucket::FiveToTen => "5-10",
            MarginBucket::TenToTwenty => "10-20",
            MarginBucket::OverTwenty => "20+",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_end_matches('%');
        Self::ALL.into_iter().find(|b| b.as_str() == raw)
    }

    pub fn midpoint(&self) -> f64 {
        match self {
            MarginBucket::Negative => -0.05,
            MarginBucket::UnderFive => 0.025,
            MarginBucket::FiveToTen => 0.075,
            MarginBucket::TenToTwenty => 0.15,
            MarginBucket::OverTwenty => 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueTrend {
    Declining,
    Stable,
    ModerateGrowth,
    StrongGrowth,
}

impl RevenueTrend {
    pub const ALL: [RevenueTrend; 4] = [
        RevenueTrend::Declining,
        RevenueTrend::Stable,
        RevenueTrend::ModerateGrowth,
        RevenueTrend::StrongGrowth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueTrend::Declining => "declining",
            RevenueTrend::Stable => "stable",
            RevenueTrend::ModerateGrowth => "moderate_growth",
            RevenueTrend::StrongGrowth => "strong_growth",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    /// Buckets an average yearly growth given in percent.
    pub fn from_growth_percent(growth: f64) -> Self {
        match growth {
            g if g > 15.0 => RevenueTrend::StrongGrowth,
            g if g > 3.0 => RevenueTrend::ModerateGrowth,
            g if g < -3.0 => RevenueTrend::Declining,
            _ => RevenueTrend::Stable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyAge {
    #[serde(rename = "0-1")]
    UnderOne,
    #[serde(rename = "1-2")]
    OneToTwo,
    #[serde(rename = "2-5")]
    TwoToFive,
    #[serde(rename = "5-10")]
    FiveToTen,
    #[serde(rename = "10+")]
    OverTen,
}

impl CompanyAge {
    pub const ALL: [CompanyAge; 5] = [
        CompanyAge::UnderOne,
        CompanyAge::OneToTwo,
        CompanyAge::TwoToFive,
        CompanyAge::FiveToTen,
        CompanyAge::OverTen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyAge::UnderOne => "0-1",
            CompanyAge::OneToTwo => "1-2",
            CompanyAge::TwoToFive => "2-5",
            CompanyAge::FiveToTen => "5-10",
            CompanyAge::OverTen => "10+",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == raw.trim())
    }

    pub fn from_years(years: f64) -> Self {
        match years {
            y if y < 1.0 => CompanyAge::UnderOne,
            y if y < 2.0 => CompanyAge::OneToTwo,
            y if y < 5.0 => CompanyAge::TwoToFive,
            y if y < 10.0 => CompanyAge::FiveToTen,
            _ => CompanyAge::OverTen,
        }
    }

    pub fn is_young(&self) -> bool {
        matches!(self, CompanyAge::UnderOne | CompanyAge::OneToTwo)
    }
}

// ============ Input ============

/// Sanitised valuation request. Money in NOK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationInput {
    pub company_name: String,
    pub email: Option<String>,
    pub org_number: Option<String>,
    pub website: Option<String>,
    pub industry: Industry,
    pub employees: Option<EmployeeBucket>,
    pub revenue_bucket: Option<RevenueBucket>,
    pub exact_revenue: Option<f64>,
    pub operating_costs: Option<f64>,
    pub profit_margin: Option<MarginBucket>,
    pub revenue_trend: Option<RevenueTrend>,
    pub company_age: Option<CompanyAge>,
    pub total_debt: Option<f64>,
    pub cash: Option<f64>,
    pub accounts_receivable: Option<f64>,
    pub inventory: Option<f64>,
    pub accounts_payable: Option<f64>,
    pub description: Option<String>,
    pub customer_base: Option<String>,
    pub competitive_advantage: Option<String>,
    pub growth_potential: Option<String>,
    pub key_risks: Option<String>,
    #[serde(default)]
    pub annual_reports: Vec<AnnualFiling>,
}

impl ValuationInput {
    /// Bare input the last-resort fallback can always compute from.
    pub fn minimal(company_name: impl Into<String>, industry: Industry) -> Self {
        Self {
            company_name: company_name.into(),
            email: None,
            org_number: None,
            website: None,
            industry,
            employees: None,
            revenue_bucket: Some(RevenueBucket::OneToFive),
            exact_revenue: None,
            operating_costs: None,
            profit_margin: None,
            revenue_trend: None,
            company_age: None,
            total_debt: None,
            cash: None,
            accounts_receivable: None,
            inventory: None,
            accounts_payable: None,
            description: None,
            customer_base: None,
            competitive_advantage: None,
            growth_potential: None,
            key_risks: None,
            annual_reports: Vec::new(),
        }
    }

    /// Exact revenue when given, else the bucket midpoint.
    pub fn revenue(&self) -> f64 {
        self.exact_revenue
            .or_else(|| self.revenue_bucket.map(|b| b.midpoint()))
            .unwrap_or(0.0)
    }

    pub fn is_solo(&self) -> bool {
        self.employees.map_or(false, |e| e.is_solo())
    }
}

// ============ Result ============

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationRange {
    pub min: f64,
    pub most_likely: f64,
    pub max: f64,
}

impl ValuationRange {
    pub fn spread(&self) -> f64 {
        if self.min > 0.0 {
            self.max / self.min
        } else {
            f64::INFINITY
        }
    }

    /// `min <= most_likely <= max` and `max/min <= max_spread`.
    pub fn is_consistent(&self, max_spread: f64) -> bool {
        self.min > 0.0
            && self.min <= self.most_likely
            && self.most_likely <= self.max
            && self.spread() <= max_spread + 1e-9
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwotAnalysis {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

impl SwotAnalysis {
    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty()
            && self.weaknesses.is_empty()
            && self.opportunities.is_empty()
            && self.risks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetric {
    pub label: String,
    pub value: String,
}

impl KeyMetric {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverageLevel {
    NetCash,
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtAnalysis {
    pub total_debt: f64,
    pub cash: f64,
    pub net_debt: f64,
    #[serde(rename = "debtToEBITDA")]
    pub debt_to_ebitda: Option<f64>,
    pub enterprise_value: f64,
    pub equity_value: f64,
    pub leverage: LeverageLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingCapitalStatus {
    Overcapitalized,
    Adequate,
    Undercapitalized,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingCapitalAnalysis {
    pub receivables: f64,
    pub inventory: f64,
    pub payables: f64,
    pub net_working_capital: f64,
    pub ratio_to_revenue: Option<f64>,
    pub expected_ratio: f64,
    pub status: WorkingCapitalStatus,
    /// Amount above (positive) or below (negative) the industry-normal level.
    pub deviation_from_expected: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearGrowth {
    pub year: i32,
    /// Percent growth versus the previous filed year.
    pub growth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalTrends {
    pub years: Vec<i32>,
    pub yearly_growth: Vec<YearGrowth>,
    pub average_growth: f64,
    pub last_year_growth: f64,
    pub volatility: f64,
    pub recent_trend: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResult {
    pub valuation_range: ValuationRange,
    pub method: String,
    pub methodology: String,
    pub analysis: SwotAnalysis,
    pub recommendations: Vec<String>,
    pub key_metrics: Vec<KeyMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_analysis: Option<DebtAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_capital: Option<WorkingCapitalAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_trends: Option<HistoricalTrends>,
}

// ============ Tunables ============

/// Hard ceiling on `max / min` for any result, whatever the configuration.
pub const SPREAD_CEILING: f64 = 2.5;

/// Product constants for range shaping. Configurable, never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationBands {
    /// Deterministic range low end as a share of the blended value.
    pub range_low: f64,
    /// Deterministic range high end as a share of the blended value.
    pub range_high: f64,
    /// Largest accepted `max / min` for any result.
    pub max_spread: f64,
    /// Low end used when an over-wide AI range is recentered.
    pub recenter_low: f64,
    /// High end used when an over-wide AI range is recentered.
    pub recenter_high: f64,
    /// Floor for the blended value, in NOK.
    pub minimum_value: f64,
}

impl Default for ValuationBands {
    fn default() -> Self {
        Self {
            range_low: 0.7,
            range_high: 1.4,
            max_spread: 2.5,
            recenter_low: 0.7,
            recenter_high: 1.75,
            minimum_value: 50_000.0,
        }
    }
}

impl ValuationBands {
    /// Spread cap actually enforced: the configured one, never above the ceiling.
    pub fn spread_cap(&self) -> f64 {
        self.max_spread.min(SPREAD_CEILING)
    }

    /// Multipliers applied to most-likely when an over-wide range is recentered.
    /// A configured pair that would itself break the cap is replaced by the
    /// widest band around most-likely that respects it.
    pub fn recenter_band(&self) -> (f64, f64) {
        let cap = self.spread_cap();
        let (low, high) = (self.recenter_low, self.recenter_high);
        if low > 0.0 && low <= 1.0 && high >= 1.0 && high / low <= cap {
            (low, high)
        } else {
            let half = cap.sqrt();
            (1.0 / half, half)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_spread > 1.0 && self.max_spread <= SPREAD_CEILING) {
            return Err(format!(
                "max spread must be above 1 and at most {}",
                SPREAD_CEILING
            ));
        }
        if self.range_low <= 0.0
            || self.range_low >= 1.0
            || self.range_high <= 1.0
            || self.range_high / self.range_low > self.max_spread
        {
            return Err(
                "range bounds must satisfy 0 < low < 1 < high and high/low <= max spread".into(),
            );
        }
        if self.recenter_low <= 0.0
            || self.recenter_low > 1.0
            || self.recenter_high < 1.0
            || self.recenter_high / self.recenter_low > self.max_spread
        {
            return Err(
                "recenter bounds must satisfy 0 < low <= 1 <= high and high/low <= max spread"
                    .into(),
            );
        }
        if self.minimum_value <= 0.0 {
            return Err("minimum value must be positive".into());
        }
        Ok(())
    }
}

// ============ Persistence ============

/// Row of the `valuations` table. A draft has `most_likely == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationRecord {
    pub id: Uuid,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub org_number: Option<String>,
    pub industry: Option<String>,
    pub value_min: f64,
    pub most_likely: f64,
    pub value_max: f64,
    pub method: Option<String>,
    pub input: Option<Value>,
    pub result: Option<Value>,
    pub enrichment: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ValuationRecord {
    pub fn is_draft(&self) -> bool {
        self.most_likely == 0.0
    }
}

/// Column values for creating or upgrading a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuationRecordFields {
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub org_number: Option<String>,
    pub industry: Option<String>,
    /// `None` writes a draft.
    pub range: Option<ValuationRange>,
    pub method: Option<String>,
    pub input: Option<Value>,
    pub result: Option<Value>,
    pub enrichment: Option<Value>,
}
