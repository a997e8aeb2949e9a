//! Boundary validation for valuation requests. Everything past this point
//! works with typed, NOK-denominated values.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::errors::{AppError, FieldError};
use crate::industry::Industry;
use crate::models::AnnualFiling;
use crate::valuation_models::{
    CompanyAge, EmployeeBucket, MarginBucket, RevenueBucket, RevenueTrend, ValuationInput,
};

pub const MAX_COMPANY_NAME_CHARS: usize = 200;
pub const MAX_TEXT_CHARS: usize = 2_000;
pub const MAX_AMOUNT: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeOutcome {
    pub valid: bool,
    pub errors: Vec<FieldError>,
    pub sanitized: Option<ValuationInput>,
}

impl SanitizeOutcome {
    pub fn into_result(self) -> Result<ValuationInput, AppError> {
        match self.sanitized {
            Some(input) if self.valid => Ok(input),
            _ => Err(AppError::Validation(self.errors)),
        }
    }
}

fn email_re() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").ok()
    })
    .as_ref()
}

fn thousands_re() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"^-?\d{1,3}(?:[.,]\d{3})+$").ok())
        .as_ref()
}

/// Trims, drops control characters (newlines and tabs survive) and caps length.
pub fn clean_text(raw: &str, max_chars: usize) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Reads `45000000`, `"45 000 000"`, `"45,000,000"` or `"4,5"`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let compact: String = s
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '_' && *c != '\u{a0}')
                .collect();
            let compact = compact
                .trim_end_matches("NOK")
                .trim_end_matches("kr")
                .to_string();
            if compact.is_empty() {
                return None;
            }
            let normalized = if thousands_re().map_or(false, |re| re.is_match(&compact)) {
                compact.replace([',', '.'], "")
            } else {
                compact.replace(',', ".")
            };
            normalized.parse().ok()
        }
        _ => None,
    }
}

fn unit_factor(raw: Option<&str>) -> Option<f64> {
    match raw.map(|u| u.trim().to_uppercase()) {
        None => Some(1.0),
        Some(unit) => match unit.as_str() {
            "" | "NOK" => Some(1.0),
            "TNOK" => Some(1_000.0),
            "MNOK" => Some(1_000_000.0),
            _ => None,
        },
    }
}

struct Reader<'a> {
    body: &'a Map<String, Value>,
    errors: Vec<FieldError>,
    factor: f64,
}

impl<'a> Reader<'a> {
    /// First present, non-null, non-blank value among `keys`.
    fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|k| self.body.get(*k))
            .find(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn text(&mut self, field: &str, max_chars: usize) -> Option<String> {
        match self.get(&[field])? {
            Value::String(s) => Some(clean_text(s, max_chars)).filter(|s| !s.is_empty()),
            _ => {
                self.fail(field, "must be a string");
                None
            }
        }
    }

    fn bucket<T>(&mut self, keys: &[&str], parse: fn(&str) -> Option<T>) -> Option<T> {
        let value = self.get(keys)?;
        let parsed = value.as_str().and_then(parse);
        if parsed.is_none() {
            self.fail(keys[0], format!("unknown value {}", value));
        }
        parsed
    }

    fn amount(&mut self, field: &str) -> Option<f64> {
        let value = self.get(&[field])?;
        let Some(amount) = parse_amount(value) else {
            self.fail(field, "must be a number");
            return None;
        };
        let amount = amount * self.factor;
        if !amount.is_finite() || amount < 0.0 {
            self.fail(field, "must be a non-negative amount");
            return None;
        }
        if amount > MAX_AMOUNT {
            self.fail(field, "is unrealistically large");
            return None;
        }
        Some(amount)
    }

    fn filings(&mut self) -> Vec<AnnualFiling> {
        let Some(value) = self.get(&["annualReports"]) else {
            return Vec::new();
        };
        let Some(items) = value.as_array() else {
            self.fail("annualReports", "must be a list");
            return Vec::new();
        };
        let factor = self.factor;
        let scale = |v: Option<f64>| v.filter(|x| x.is_finite()).map(|x| x * factor);

        items
            .iter()
            .filter_map(|item| serde_json::from_value::<AnnualFiling>(item.clone()).ok())
            .filter(|f| (1900..=2100).contains(&f.year))
            .map(|f| AnnualFiling {
                year: f.year,
                revenue: scale(f.revenue),
                operating_result: scale(f.operating_result),
                net_result: scale(f.net_result),
                total_assets: scale(f.total_assets),
                equity: scale(f.equity),
                total_debt: scale(f.total_debt),
            })
            .collect()
    }
}

/// Validates a raw valuation body, collecting every field error at once.
pub fn validate_and_sanitize(raw: &Value) -> SanitizeOutcome {
    let Some(body) = raw.as_object() else {
        return SanitizeOutcome {
            valid: false,
            errors: vec![FieldError::new("body", "must be a JSON object")],
            sanitized: None,
        };
    };

    let mut reader = Reader {
        body,
        errors: Vec::new(),
        factor: 1.0,
    };

    let unit = reader.get(&["currencyUnit"]).and_then(Value::as_str);
    match unit_factor(unit) {
        Some(factor) => reader.factor = factor,
        None => reader.fail("currencyUnit", "must be NOK, TNOK or MNOK"),
    }

    let company_name = match reader.get(&["companyName"]).and_then(Value::as_str) {
        Some(name) => {
            let name = clean_text(name, usize::MAX);
            if name.chars().count() > MAX_COMPANY_NAME_CHARS {
                reader.fail("companyName", "must be at most 200 characters");
            }
            Some(name).filter(|n| !n.is_empty())
        }
        None => None,
    };
    if company_name.is_none() {
        reader.fail("companyName", "is required");
    }

    let email = reader.text("email", 320).map(|e| e.to_lowercase());
    if let Some(ref email) = email {
        if !email_re().map_or(false, |re| re.is_match(email)) {
            reader.fail("email", "is not a valid email address");
        }
    }

    let org_number = match reader.text("orgNumber", 32) {
        Some(raw) => {
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.len() != 9 {
                reader.fail("orgNumber", "must have 9 digits");
            }
            Some(digits)
        }
        None => None,
    };
    let website = reader.text("website", 500);

    let industry = match reader.get(&["industry"]) {
        Some(value) => {
            let parsed = value.as_str().and_then(Industry::parse);
            if parsed.is_none() {
                reader.fail("industry", format!("unknown industry {}", value));
            }
            parsed
        }
        None => {
            reader.fail("industry", "is required");
            None
        }
    };

    let employees = reader.bucket(&["employees"], EmployeeBucket::parse);
    let revenue_bucket = reader.bucket(&["revenueBucket", "revenue"], RevenueBucket::parse);
    let profit_margin = reader.bucket(&["profitMargin"], MarginBucket::parse);
    let revenue_trend = reader.bucket(&["revenueTrend", "revenue3Years"], RevenueTrend::parse);
    let company_age = reader.bucket(&["companyAge"], CompanyAge::parse);

    let exact_revenue = reader.amount("exactRevenue");
    if exact_revenue.is_none() && revenue_bucket.is_none() {
        reader.fail("exactRevenue", "exactRevenue or revenueBucket is required");
    }
    let operating_costs = reader.amount("operatingCosts");
    let total_debt = reader.amount("totalDebt");
    let cash = reader.amount("cash");
    let accounts_receivable = reader.amount("accountsReceivable");
    let inventory = reader.amount("inventory");
    let accounts_payable = reader.amount("accountsPayable");

    let description = reader.text("description", MAX_TEXT_CHARS);
    let customer_base = reader.text("customerBase", MAX_TEXT_CHARS);
    let competitive_advantage = reader.text("competitiveAdvantage", MAX_TEXT_CHARS);
    let growth_potential = reader.text("growthPotential", MAX_TEXT_CHARS);
    let key_risks = reader.text("keyRisks", MAX_TEXT_CHARS);
    let annual_reports = reader.filings();

    if !reader.errors.is_empty() {
        return SanitizeOutcome {
            valid: false,
            errors: reader.errors,
            sanitized: None,
        };
    }

    let (Some(company_name), Some(industry)) = (company_name, industry) else {
        return SanitizeOutcome {
            valid: false,
            errors: vec![FieldError::new("body", "incomplete request")],
            sanitized: None,
        };
    };

    SanitizeOutcome {
        valid: true,
        errors: Vec::new(),
        sanitized: Some(ValuationInput {
            company_name,
            email,
            org_number,
            website,
            industry,
            employees,
            revenue_bucket,
            exact_revenue,
            operating_costs,
            profit_margin,
            revenue_trend,
            company_age,
            total_debt,
            cash,
            accounts_receivable,
            inventory,
            accounts_payable,
            description,
            customer_base,
            competitive_advantage,
            growth_potential,
            key_risks,
            annual_reports,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(outcome: &SanitizeOutcome) -> Vec<&str> {
        outcome.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_accepts_minimal_request() {
        let outcome = validate_and_sanitize(&json!({
            "companyName": "  Acme AS ",
            "industry": "Tech",
            "revenue": "1-5M"
        }));
        assert!(outcome.valid);
        let input = outcome.sanitized.unwrap();
        assert_eq!(input.company_name, "Acme AS");
        assert_eq!(input.industry, Industry::Tech);
        assert_eq!(input.revenue_bucket, Some(RevenueBucket::OneToFive));
    }

    #[test]
    fn test_reports_every_bad_field() {
        let outcome = validate_and_sanitize(&json!({
            "email": "not-an-email",
            "industry": "spaceships",
            "employees": "lots",
            "cash": -5
        }));
        assert!(!outcome.valid);
        let failed = fields(&outcome);
        for field in ["companyName", "email", "industry", "employees", "exactRevenue", "cash"] {
            assert!(failed.contains(&field), "missing error for {}", field);
        }
    }

    #[test]
    fn test_money_strings_and_units() {
        let outcome = validate_and_sanitize(&json!({
            "companyName": "Acme AS",
            "industry": "consulting",
            "exactRevenue": "45 000",
            "operatingCosts": "38,5",
            "currencyUnit": "TNOK"
        }));
        let input = outcome.sanitized.unwrap();
        assert_eq!(input.exact_revenue, Some(45_000_000.0));
        assert_eq!(input.operating_costs, Some(38_500.0));
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(parse_amount(&json!("45,000,000")), Some(45_000_000.0));
        assert_eq!(parse_amount(&json!("3.200.000")), Some(3_200_000.0));
        assert_eq!(parse_amount(&json!("1 200 000 kr")), Some(1_200_000.0));
        assert_eq!(parse_amount(&json!("abc")), None);
    }

    #[test]
    fn test_accepts_three_year_trend_alias() {
        let outcome = validate_and_sanitize(&json!({
            "companyName": "Acme AS",
            "industry": "tech",
            "exactRevenue": 45000000,
            "revenue3Years": "strong_growth"
        }));
        assert_eq!(
            outcome.sanitized.unwrap().revenue_trend,
            Some(RevenueTrend::StrongGrowth)
        );
    }

    #[test]
    fn test_free_text_is_cleaned_and_capped() {
        let long = "a".repeat(5_000);
        let outcome = validate_and_sanitize(&json!({
            "companyName": "Acme\u{0007} AS",
            "industry": "retail",
            "exactRevenue": 1000000,
            "description": long,
            "keyRisks": "  one key customer\u{0000} "
        }));
        let input = outcome.sanitized.unwrap();
        assert_eq!(input.company_name, "Acme AS");
        assert_eq!(input.description.unwrap().len(), MAX_TEXT_CHARS);
        assert_eq!(input.key_risks.as_deref(), Some("one key customer"));
    }

    #[test]
    fn test_rejects_oversized_amounts_and_bad_unit() {
        let outcome = validate_and_sanitize(&json!({
            "companyName": "Acme AS",
            "industry": "tech",
            "exactRevenue": 2e12,
            "currencyUnit": "USD"
        }));
        let failed = fields(&outcome);
        assert!(failed.contains(&"exactRevenue"));
        assert!(failed.contains(&"currencyUnit"));
    }

    #[test]
    fn test_non_object_body() {
        let outcome = validate_and_sanitize(&json!([1, 2, 3]));
        assert!(!outcome.valid);
        assert!(outcome.into_result().is_err());
    }
}
