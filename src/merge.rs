//! Priority merge of source records into one [`EnrichedCompanyRecord`].
//!
//! Each field keeps the value from the highest-priority source that reported
//! it, so the outcome does not depend on the order sources settled in.

use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::analytics;
use crate::industry::Industry;
use crate::models::{
    is_present, AutoFillField, CompanyIdentifier, EnrichedCompanyRecord, SourceKind, SourceRecord,
};
use crate::valuation_models::{CompanyAge, EmployeeBucket, RevenueBucket, RevenueTrend};

const DAYS_PER_YEAR: f64 = 365.25;

/// Field values one record contributes, before priority is applied.
pub fn candidates(record: &SourceRecord) -> Vec<(AutoFillField, Value)> {
    use AutoFillField as F;
    let mut out: Vec<(AutoFillField, Value)> = Vec::new();
    let mut put = |field: AutoFillField, value: Value| out.push((field, value));

    match record {
        SourceRecord::Registry(r) => {
            put(F::CompanyName, json!(r.name));
            put(F::OrgNumber, json!(r.org_number));
            put(F::OrgForm, json!(r.org_form));
            put(F::Address, json!(r.address));
            put(F::PostalCode, json!(r.postal_code));
            put(F::City, json!(r.city));
            put(F::RegistrationDate, json!(r.registration_date.map(|d| d.to_string())));
            put(
                F::FoundedYear,
                json!(r.founded_date.or(r.registration_date).map(|d| d.year())),
            );
            put(F::IndustryCode, json!(r.industry_code));
            put(F::IndustryDescription, json!(r.industry_description));
            put(F::Employees, json!(r.employees));
            put(F::Website, json!(r.website));
        }
        SourceRecord::AnnualReports(r) => {
            if let Some(latest) = r.latest() {
                put(F::LatestRevenue, json!(latest.revenue));
                put(F::LatestOperatingResult, json!(latest.operating_result));
                put(F::TotalDebt, json!(latest.total_debt));
                put(F::Equity, json!(latest.equity));
            }
        }
        SourceRecord::Credit(r) => {
            put(F::CreditRating, json!(r.rating));
            put(F::CreditScore, json!(r.score));
            put(F::PaymentRemarks, json!(r.payment_remarks));
            put(F::Employees, json!(r.employees));
            put(F::LatestRevenue, json!(r.revenue));
        }
        SourceRecord::SecondaryRegistry(r) => {
            put(F::CompanyName, json!(r.name));
            put(F::Employees, json!(r.employees));
            put(F::FoundedYear, json!(r.founded_year));
            put(F::Address, json!(r.address));
            put(F::Description, json!(r.description));
        }
        SourceRecord::ProfessionalNetwork(r) => {
            put(F::Followers, json!(r.followers));
            put(F::Employees, json!(r.employees));
            put(F::Description, json!(r.description));
        }
        SourceRecord::Reviews(r) => {
            put(F::ReviewScore, json!(r.rating));
            put(F::ReviewCount, json!(r.review_count));
        }
        SourceRecord::Website(r) => {
            put(F::Description, json!(r.description));
            put(F::Email, json!(r.emails.first()));
            put(F::Phone, json!(r.phones.first()));
            put(F::OrgNumber, json!(r.org_number));
            put(F::FoundedYear, json!(r.founded_year));
            put(F::Employees, json!(r.employees));
        }
        SourceRecord::GenerativeExtraction(r) => {
            put(F::Description, json!(r.description));
            put(F::Products, json!(r.products));
            put(F::TargetCustomers, json!(r.target_customers));
            put(F::Employees, json!(r.employees));
            put(F::FoundedYear, json!(r.founded_year));
        }
    }

    out.retain(|(_, value)| is_present(value));
    out
}

/// Merges settled source results. `today` anchors the company-age bucket.
pub fn merge(
    identifier: &CompanyIdentifier,
    results: &[(SourceKind, Option<SourceRecord>)],
    today: NaiveDate,
) -> EnrichedCompanyRecord {
    let mut chosen: BTreeMap<AutoFillField, (SourceKind, Value)> = BTreeMap::new();
    let mut raw_data = BTreeMap::new();
    let mut largest_headcount: Option<u64> = None;

    for (kind, record) in results {
        raw_data.insert(kind.as_str().to_string(), record.clone());
        let Some(record) = record else {
            continue;
        };

        for (field, value) in candidates(record) {
            if field == AutoFillField::Employees {
                if let Some(n) = value.as_u64() {
                    largest_headcount = Some(largest_headcount.map_or(n, |m| m.max(n)));
                }
            }
            let wins = match chosen.get(&field) {
                None => true,
                Some((holder, _)) => {
                    kind.priority() < holder.priority()
                        || (field.is_identity() && *kind == SourceKind::Registry)
                }
            };
            if wins {
                chosen.insert(field, (*kind, value));
            }
        }
    }

    let mut auto_fill: BTreeMap<AutoFillField, Value> =
        chosen.into_iter().map(|(f, (_, v))| (f, v)).collect();

    // A lower-priority source reporting more staff is read as recent growth.
    if let Some(largest) = largest_headcount {
        auto_fill.insert(AutoFillField::Employees, json!(largest));
        auto_fill.insert(
            AutoFillField::EmployeeBucket,
            json!(EmployeeBucket::from_count(largest.min(u32::MAX as u64) as u32).as_str()),
        );
    }

    if let Some(age) = company_age(&auto_fill, today) {
        auto_fill.insert(AutoFillField::CompanyAge, json!(age.as_str()));
    }

    let mut record = EnrichedCompanyRecord {
        auto_fill,
        raw_data,
    };
    derive_financials(&mut record);

    let industry = resolve_industry(identifier, &record);
    record
        .auto_fill
        .insert(AutoFillField::Industry, json!(industry.key()));
    backfill_defaults(&mut record, industry);
    record
}

fn company_age(auto_fill: &BTreeMap<AutoFillField, Value>, today: NaiveDate) -> Option<CompanyAge> {
    let registered = auto_fill
        .get(&AutoFillField::RegistrationDate)
        .and_then(Value::as_str)
        .and_then(|d| d.parse::<NaiveDate>().ok());
    if let Some(date) = registered {
        let years = (today - date).num_days() as f64 / DAYS_PER_YEAR;
        return Some(CompanyAge::from_years(years.max(0.0)));
    }
    let founded = auto_fill
        .get(&AutoFillField::FoundedYear)
        .and_then(Value::as_i64)?;
    Some(CompanyAge::from_years((today.year() as i64 - founded).max(0) as f64))
}

fn derive_financials(record: &mut EnrichedCompanyRecord) {
    if let Some(revenue) = record.get_f64(AutoFillField::LatestRevenue) {
        record.auto_fill.insert(
            AutoFillField::RevenueBucket,
            json!(RevenueBucket::from_amount(revenue).as_str()),
        );
    }
    if let Some(trends) = analytics::historical_trends(record.annual_filings()) {
        record.auto_fill.insert(
            AutoFillField::RevenueTrend,
            json!(RevenueTrend::from_growth_percent(trends.average_growth).as_str()),
        );
    }
}

/// Industry from the identifier, else from the registry's NACE code.
pub fn resolve_industry(identifier: &CompanyIdentifier, record: &EnrichedCompanyRecord) -> Industry {
    identifier
        .industry
        .as_deref()
        .and_then(Industry::parse)
        .or_else(|| {
            record
                .get_str(AutoFillField::IndustryCode)
                .map(Industry::from_nace)
        })
        .unwrap_or(Industry::Other)
}

/// Fills unset qualitative fields from the industry table.
pub fn backfill_defaults(record: &mut EnrichedCompanyRecord, industry: Industry) {
    let defaults = industry.defaults();
    for field in AutoFillField::QUALITATIVE {
        let text = match field {
            AutoFillField::Description => defaults.description,
            AutoFillField::CustomerBase => defaults.customer_base,
            AutoFillField::CompetitiveAdvantage => defaults.competitive_advantage,
            AutoFillField::GrowthPotential => defaults.growth_potential,
            AutoFillField::KeyRisks => defaults.key_risks,
            _ => continue,
        };
        record.auto_fill.entry(field).or_insert_with(|| json!(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnnualFiling, AnnualReportsRecord, RegistryRecord, SecondaryRegistryRecord, WebsiteRecord,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn identifier() -> CompanyIdentifier {
        CompanyIdentifier {
            org_number: Some("923 609 016".into()),
            ..Default::default()
        }
    }

    fn registry() -> SourceRecord {
        SourceRecord::Registry(RegistryRecord {
            name: Some("ACME AS".into()),
            address: Some("Storgata 1".into()),
            registration_date: NaiveDate::from_ymd_opt(2015, 3, 2),
            industry_code: Some("62.010".into()),
            employees: Some(8),
            ..Default::default()
        })
    }

    fn secondary() -> SourceRecord {
        SourceRecord::SecondaryRegistry(SecondaryRegistryRecord {
            name: Some("Acme".into()),
            address: Some("Other street 9".into()),
            employees: Some(12),
            description: Some("Software house".into()),
            ..Default::default()
        })
    }

    fn website() -> SourceRecord {
        SourceRecord::Website(WebsiteRecord {
            description: Some("We write software".into()),
            emails: vec!["post@acme.no".into()],
            employees: Some(3),
            pages_scraped: 3,
            ..Default::default()
        })
    }

    #[test]
    fn test_merge_is_order_independent() {
        let forward = vec![
            (SourceKind::Registry, Some(registry())),
            (SourceKind::SecondaryRegistry, Some(secondary())),
            (SourceKind::Website, Some(website())),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        assert_eq!(
            merge(&identifier(), &forward, today()),
            merge(&identifier(), &backward, today())
        );
    }

    #[test]
    fn test_higher_priority_wins_and_registry_owns_identity() {
        let results = vec![
            (SourceKind::Website, Some(website())),
            (SourceKind::SecondaryRegistry, Some(secondary())),
            (SourceKind::Registry, Some(registry())),
        ];
        let record = merge(&identifier(), &results, today());

        assert_eq!(record.get_str(AutoFillField::CompanyName), Some("ACME AS"));
        assert_eq!(record.get_str(AutoFillField::Address), Some("Storgata 1"));
        assert_eq!(record.get_str(AutoFillField::Description), Some("Software house"));
        assert_eq!(record.get_str(AutoFillField::Email), Some("post@acme.no"));
        assert_eq!(record.get_str(AutoFillField::Industry), Some("tech"));
        assert_eq!(record.get_str(AutoFillField::CompanyAge), Some("10+"));
        assert_eq!(record.scraped_page_count(), 4);
    }

    #[test]
    fn test_largest_headcount_wins() {
        let results = vec![
            (SourceKind::Registry, Some(registry())),
            (SourceKind::SecondaryRegistry, Some(secondary())),
        ];
        let record = merge(&identifier(), &results, today());
        assert_eq!(record.get_f64(AutoFillField::Employees), Some(12.0));
        assert_eq!(record.get_str(AutoFillField::EmployeeBucket), Some("11-25"));
    }

    #[test]
    fn test_all_failed_still_has_defaults() {
        let results = vec![
            (SourceKind::Registry, None),
            (SourceKind::AnnualReports, None),
        ];
        let record = merge(&identifier(), &results, today());

        assert_eq!(record.raw_data.len(), 2);
        assert!(record.raw_data.values().all(Option::is_none));
        assert_eq!(record.get_str(AutoFillField::Industry), Some("other"));
        for field in AutoFillField::QUALITATIVE {
            assert!(record.auto_fill.contains_key(&field));
        }
    }

    #[test]
    fn test_financials_derived_from_filings() {
        let filings = SourceRecord::AnnualReports(AnnualReportsRecord {
            filings: vec![
                AnnualFiling { year: 2023, revenue: Some(38_000_000.0), ..Default::default() },
                AnnualFiling { year: 2024, revenue: Some(45_000_000.0), ..Default::default() },
            ],
        });
        let id = CompanyIdentifier {
            org_number: Some("923609016".into()),
            industry: Some("consulting".into()),
            ..Default::default()
        };
        let record = merge(&id, &[(SourceKind::AnnualReports, Some(filings))], today());

        assert_eq!(record.get_f64(AutoFillField::LatestRevenue), Some(45_000_000.0));
        assert_eq!(record.get_str(AutoFillField::RevenueBucket), Some("10-50M"));
        assert_eq!(record.get_str(AutoFillField::RevenueTrend), Some("strong_growth"));
        assert_eq!(record.get_str(AutoFillField::Industry), Some("consulting"));
    }

    #[test]
    fn test_empty_values_are_not_candidates() {
        let record = SourceRecord::Website(WebsiteRecord {
            description: Some("   ".into()),
            ..Default::default()
        });
        assert!(candidates(&record).is_empty());
    }
}
