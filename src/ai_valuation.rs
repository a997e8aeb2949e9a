//! Prompting for an AI-assisted valuation and the gate that turns whatever
//! comes back into a consistent [`ValuationResult`].

use serde_json::Value;
use std::fmt::Write as _;

use crate::analytics;
use crate::models::{AutoFillField, EnrichedCompanyRecord};
use crate::registry_sources::number_like;
use crate::valuation::{self, format_nok};
use crate::valuation_models::{
    DebtAnalysis, HistoricalTrends, KeyMetric, SwotAnalysis, ValuationBands, ValuationInput,
    ValuationRange, ValuationResult, WorkingCapitalAnalysis, METHOD_AI,
};

/// Figures below this are taken to be millions.
pub const MNOK_THRESHOLD: f64 = 10_000.0;

pub const SYSTEM_PROMPT: &str = "You are an experienced M&A adviser valuing small and \
medium-sized Norwegian companies. Respond with exactly one JSON object and no other text.";

const RESPONSE_SHAPE: &str = r#"{
  "valuationRange": { "min": <NOK>, "mostLikely": <NOK>, "max": <NOK> },
  "unit": "NOK",
  "methodology": "<how the figures were derived>",
  "analysis": { "strengths": [], "weaknesses": [], "opportunities": [], "risks": [] },
  "recommendations": [],
  "keyMetrics": [ { "label": "", "value": "" } ]
}"#;

/// Builds the valuation prompt from the sanitised input and any cached enrichment.
pub fn build_prompt(input: &ValuationInput, enrichment: Option<&EnrichedCompanyRecord>) -> String {
    let estimates = valuation::point_estimates(input);
    let mut p = String::new();

    let _ = writeln!(p, "Company: {}", input.company_name);
    let _ = writeln!(p, "Industry: {}", input.industry);
    if let Some(employees) = input.employees {
        let _ = writeln!(p, "Employees: {}", employees.as_str());
    }
    match input.exact_revenue {
        Some(revenue) => {
            let _ = writeln!(p, "Revenue: {}", format_nok(revenue));
        }
        None => {
            if let Some(bucket) = input.revenue_bucket {
                let _ = writeln!(p, "Revenue range: {} NOK", bucket.as_str());
            }
        }
    }
    if let Some(costs) = input.operating_costs {
        let _ = writeln!(p, "Operating costs: {}", format_nok(costs));
    }
    let _ = writeln!(
        p,
        "EBITDA: {} ({}, margin {:.1}%)",
        format_nok(estimates.ebitda.value),
        if estimates.ebitda.exact { "exact" } else { "estimated" },
        estimates.ebitda.margin * 100.0
    );
    if let Some(trend) = valuation::effective_trend(input) {
        let _ = writeln!(p, "Revenue trend (3 years): {}", trend.as_str());
    }
    if let Some(age) = input.company_age {
        let _ = writeln!(p, "Company age: {} years", age.as_str());
    }
    for (label, value) in [
        ("Total debt", input.total_debt),
        ("Cash", input.cash),
        ("Accounts receivable", input.accounts_receivable),
        ("Inventory", input.inventory),
        ("Accounts payable", input.accounts_payable),
    ] {
        if let Some(v) = value {
            let _ = writeln!(p, "{}: {}", label, format_nok(v));
        }
    }
    for (label, value) in [
        ("Description", &input.description),
        ("Customer base", &input.customer_base),
        ("Competitive advantage", &input.competitive_advantage),
        ("Growth potential", &input.growth_potential),
        ("Key risks", &input.key_risks),
    ] {
        if let Some(v) = value {
            let _ = writeln!(p, "{}: {}", label, v);
        }
    }

    let highlights = enrichment_highlights(input, enrichment, estimates.ebitda.value);
    if !highlights.is_empty() {
        let _ = writeln!(p, "\nPublic data:");
        for line in highlights {
            let _ = writeln!(p, "- {}", line);
        }
    }

    let _ = writeln!(p, "\nMultiple guidance:");
    let _ = writeln!(
        p,
        "- {} base EV/EBITDA multiple {:.1}x",
        input.industry, estimates.base_multiple
    );
    for (reason, adj) in &estimates.multiple_adjustments {
        let _ = writeln!(p, "- adjust {:+.0}% for {}", adj * 100.0, reason);
    }
    let _ = writeln!(
        p,
        "- revenue multiple {:.2}x, required return {:.1}%",
        estimates.revenue_multiple,
        estimates.required_return * 100.0
    );

    let _ = writeln!(
        p,
        "\nGive a valuation range in whole NOK where max is at most 2.5 times min. \
         Answer in this JSON shape:\n{}",
        RESPONSE_SHAPE
    );
    p
}

fn enrichment_highlights(
    input: &ValuationInput,
    enrichment: Option<&EnrichedCompanyRecord>,
    ebitda: f64,
) -> Vec<String> {
    let mut lines = Vec::new();

    let mut filings: Vec<_> = input.annual_reports.iter().collect();
    filings.sort_by_key(|f| std::cmp::Reverse(f.year));
    for filing in filings.into_iter().take(3) {
        let mut line = format!("Filed accounts {}:", filing.year);
        if let Some(revenue) = filing.revenue {
            let _ = write!(line, " revenue {}", format_nok(revenue));
        }
        if let Some(op) = filing.operating_result {
            let _ = write!(line, ", operating result {}", format_nok(op));
        }
        lines.push(line);
    }

    if let Some(record) = enrichment {
        if let Some(rating) = record.get_str(AutoFillField::CreditRating) {
            lines.push(format!("Credit rating: {}", rating));
        }
        if let Some(score) = record.get_f64(AutoFillField::ReviewScore) {
            let count = record.get_f64(AutoFillField::ReviewCount).unwrap_or(0.0);
            lines.push(format!("Customer reviews: {:.1} from {:.0} reviews", score, count));
        }
    }

    if let Some(trends) = analytics::historical_trends(&input.annual_reports) {
        lines.push(format!(
            "Average growth {:.1}%, last year {:.1}%, volatility {:.1} pp",
            trends.average_growth, trends.last_year_growth, trends.volatility
        ));
    }
    if let Some(debt) = analytics::debt_analysis_for(input, ebitda, 0.0) {
        match debt.debt_to_ebitda {
            Some(ratio) => lines.push(format!(
                "Net debt {}, debt/EBITDA {:.1}x",
                format_nok(debt.net_debt),
                ratio
            )),
            None => lines.push(format!("Net debt {}", format_nok(debt.net_debt))),
        }
    }
    if let Some(wc) = analytics::working_capital_for(input) {
        if let Some(ratio) = wc.ratio_to_revenue {
            lines.push(format!(
                "Working capital {:.1}% of revenue (industry norm {:.1}%)",
                ratio * 100.0,
                wc.expected_ratio * 100.0
            ));
        }
    }
    lines
}

/// First balanced `{...}` in the text, parsed. Braces inside strings are ignored.
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

fn unit_factor(raw: &Value, range: &Value, largest: f64) -> f64 {
    let unit = raw
        .get("unit")
        .or_else(|| range.get("unit"))
        .and_then(Value::as_str)
        .map(|u| u.trim().to_uppercase());
    match unit.as_deref() {
        Some("MNOK") => 1_000_000.0,
        Some("TNOK") => 1_000.0,
        Some("NOK") if largest >= MNOK_THRESHOLD => 1.0,
        _ if largest < MNOK_THRESHOLD => 1_000_000.0,
        _ => 1.0,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Object(o) => o
                        .get("title")
                        .or_else(|| o.get("text"))
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn key_metrics(value: Option<&Value>) -> Vec<KeyMetric> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let label = item.get("label")?.as_str()?.trim();
                    let value = match item.get("value")? {
                        Value::String(s) => s.trim().to_string(),
                        Value::Null => return None,
                        other => other.to_string(),
                    };
                    (!label.is_empty() && !value.is_empty()).then(|| KeyMetric::new(label, value))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn optional<T: serde::de::DeserializeOwned>(raw: &Value, key: &str) -> Option<T> {
    raw.get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

/// Repairs a generated valuation. `None` means unusable; the caller falls back
/// to the deterministic calculator.
pub fn validate_and_repair(
    raw: &Value,
    input: &ValuationInput,
    bands: &ValuationBands,
) -> Option<ValuationResult> {
    let range = raw.get("valuationRange")?;
    let mut min = range.get("min").and_then(number_like_signed)?;
    let mut max = range.get("max").and_then(number_like_signed)?;

    if min > max {
        std::mem::swap(&mut min, &mut max);
    }

    let mut most_likely = range
        .get("mostLikely")
        .and_then(number_like_signed)
        .filter(|ml| (min..=max).contains(ml))
        .unwrap_or((min + max) / 2.0);
    if most_likely <= 0.0 {
        return None;
    }

    if min <= 0.0 || max / min > bands.spread_cap() {
        tracing::warn!(
            "Generated range {}..{} rejected, recentering on {}",
            min,
            max,
            most_likely
        );
        let (low, high) = bands.recenter_band();
        min = most_likely * low;
        max = most_likely * high;
    }

    let factor = unit_factor(raw, range, max);
    min *= factor;
    most_likely *= factor;
    max *= factor;

    let reference = valuation::calculate(input, bands);

    let analysis = optional::<SwotAnalysis>(raw, "analysis")
        .filter(|a| !a.is_empty())
        .unwrap_or(reference.analysis);
    let recommendations = Some(string_list(raw.get("recommendations")))
        .filter(|r| !r.is_empty())
        .unwrap_or(reference.recommendations);
    let key_metrics = Some(key_metrics(raw.get("keyMetrics")))
        .filter(|m| !m.is_empty())
        .unwrap_or(reference.key_metrics);
    let methodology = raw
        .get("methodology")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or(reference.methodology);

    let mut result = ValuationResult {
        valuation_range: ValuationRange {
            min,
            most_likely,
            max,
        },
        method: METHOD_AI.to_string(),
        methodology,
        analysis,
        recommendations,
        key_metrics,
        debt_analysis: optional::<DebtAnalysis>(raw, "debtAnalysis"),
        working_capital: optional::<WorkingCapitalAnalysis>(raw, "workingCapital"),
        historical_trends: optional::<HistoricalTrends>(raw, "historicalTrends"),
    };
    analytics::fill_missing(&mut result, input, valuation::resolve_ebitda(input).value);
    Some(result)
}

fn number_like_signed(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) if s.trim_start().starts_with('-') => {
            number_like(&Value::String(s.trim_start()[1..].to_string())).map(|n| -n)
        }
        other => number_like(other),
    }
}
