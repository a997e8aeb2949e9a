//! Deterministic multi-method valuation. No I/O, no randomness: the same
//! input always yields the same result.

use crate::analytics;
use crate::valuation_models::{
    KeyMetric, RevenueTrend, SwotAnalysis, ValuationBands, ValuationInput, ValuationRange,
    ValuationResult, METHOD_DETERMINISTIC,
};

/// Share of EBITDA treated as sustainable owner earnings after tax effects.
pub const CAPITALIZATION_EARNINGS_SHARE: f64 = 0.88;
pub const BASE_REQUIRED_RETURN: f64 = 0.15;
pub const MAX_REQUIRED_RETURN: f64 = 0.25;

const SOLO_MULTIPLE_ADJ: f64 = -0.25;
const DECLINE_MULTIPLE_ADJ: f64 = -0.20;
const STRONG_GROWTH_MULTIPLE_ADJ: f64 = 0.15;

const SOLO_RETURN_PREMIUM: f64 = 0.03;
const DECLINE_RETURN_PREMIUM: f64 = 0.03;
const YOUNG_RETURN_PREMIUM: f64 = 0.02;
const LOSS_RETURN_PREMIUM: f64 = 0.05;

const HIGH_MARGIN: f64 = 0.20;
const LOW_MARGIN: f64 = 0.05;
const REVENUE_MULTIPLE_SWING: f64 = 0.30;

const WEIGHT_EBITDA: f64 = 0.5;
const WEIGHT_CAPITALIZED: f64 = 0.3;
const WEIGHT_REVENUE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EbitdaEstimate {
    pub value: f64,
    pub revenue: f64,
    pub margin: f64,
    /// True when computed from exact revenue and operating costs.
    pub exact: bool,
}

/// Exact EBITDA when revenue and costs are known, else bucket midpoint × margin.
pub fn resolve_ebitda(input: &ValuationInput) -> EbitdaEstimate {
    if let (Some(revenue), Some(costs)) = (input.exact_revenue, input.operating_costs) {
        let value = revenue - costs;
        return EbitdaEstimate {
            value,
            revenue,
            margin: if revenue > 0.0 { value / revenue } else { 0.0 },
            exact: true,
        };
    }

    let revenue = input.revenue();
    let margin = input
        .profit_margin
        .map(|m| m.midpoint())
        .unwrap_or_else(|| input.industry.typical_margin());
    EbitdaEstimate {
        value: revenue * margin,
        revenue,
        margin,
        exact: false,
    }
}

/// The user's trend, or one derived from filed accounts.
pub fn effective_trend(input: &ValuationInput) -> Option<RevenueTrend> {
    input.revenue_trend.or_else(|| {
        analytics::historical_trends(&input.annual_reports)
            .map(|t| RevenueTrend::from_growth_percent(t.average_growth))
    })
}

/// The three independent point estimates and how they were derived.
#[derive(Debug, Clone, PartialEq)]
pub struct PointEstimates {
    pub ebitda: EbitdaEstimate,
    pub base_multiple: f64,
    pub multiple_adjustments: Vec<(&'static str, f64)>,
    pub adjusted_multiple: f64,
    pub ebitda_multiple_value: f64,
    pub required_return: f64,
    pub capitalized_value: f64,
    pub revenue_multiple: f64,
    pub revenue_multiple_value: f64,
}

pub fn point_estimates(input: &ValuationInput) -> PointEstimates {
    let ebitda = resolve_ebitda(input);
    let trend = effective_trend(input);
    let declining = trend == Some(RevenueTrend::Declining);
    let young = input.company_age.map_or(false, |a| a.is_young());

    let base_multiple = input.industry.ebitda_multiple();
    let mut multiple_adjustments = Vec::new();
    if input.is_solo() {
        multiple_adjustments.push(("solo operation", SOLO_MULTIPLE_ADJ));
    }
    if declining {
        multiple_adjustments.push(("declining revenue", DECLINE_MULTIPLE_ADJ));
    }
    if trend == Some(RevenueTrend::StrongGrowth) {
        multiple_adjustments.push(("strong growth", STRONG_GROWTH_MULTIPLE_ADJ));
    }
    let adjusted_multiple = multiple_adjustments
        .iter()
        .fold(base_multiple, |m, (_, adj)| m * (1.0 + adj));

    let mut required_return = BASE_REQUIRED_RETURN;
    if input.is_solo() {
        required_return += SOLO_RETURN_PREMIUM;
    }
    if declining {
        required_return += DECLINE_RETURN_PREMIUM;
    }
    if young {
        required_return += YOUNG_RETURN_PREMIUM;
    }
    if ebitda.margin < 0.0 {
        required_return += LOSS_RETURN_PREMIUM;
    }
    let required_return = required_return.min(MAX_REQUIRED_RETURN);

    let mut revenue_multiple = input.industry.revenue_multiple();
    if ebitda.margin > HIGH_MARGIN {
        revenue_multiple *= 1.0 + REVENUE_MULTIPLE_SWING;
    } else if ebitda.margin < LOW_MARGIN {
        revenue_multiple *= 1.0 - REVENUE_MULTIPLE_SWING;
    }

    PointEstimates {
        ebitda_multiple_value: ebitda.value * adjusted_multiple,
        capitalized_value: ebitda.value * CAPITALIZATION_EARNINGS_SHARE / required_return,
        revenue_multiple_value: ebitda.revenue * revenue_multiple,
        ebitda,
        base_multiple,
        multiple_adjustments,
        adjusted_multiple,
        required_return,
        revenue_multiple,
    }
}

/// Weighted blend; loss-makers are valued on revenue alone.
pub fn blend(estimates: &PointEstimates) -> f64 {
    if estimates.ebitda.margin <= 0.0 {
        estimates.revenue_multiple_value
    } else {
        WEIGHT_EBITDA * estimates.ebitda_multiple_value
            + WEIGHT_CAPITALIZED * estimates.capitalized_value
            + WEIGHT_REVENUE * estimates.revenue_multiple_value
    }
}

pub fn calculate(input: &ValuationInput, bands: &ValuationBands) -> ValuationResult {
    let estimates = point_estimates(input);
    let value = blend(&estimates).max(bands.minimum_value);

    let valuation_range = ValuationRange {
        min: value * bands.range_low,
        most_likely: value,
        max: value * bands.range_high,
    };

    let mut result = ValuationResult {
        valuation_range,
        method: METHOD_DETERMINISTIC.to_string(),
        methodology: methodology(input, &estimates),
        analysis: swot(input, &estimates),
        recommendations: recommendations(input, &estimates),
        key_metrics: key_metrics(&estimates),
        debt_analysis: None,
        working_capital: None,
        historical_trends: None,
    };
    analytics::fill_missing(&mut result, input, estimates.ebitda.value);
    result
}

fn methodology(input: &ValuationInput, e: &PointEstimates) -> String {
    let ebitda_source = if e.ebitda.exact {
        "revenue minus operating costs"
    } else {
        "revenue estimate times margin"
    };
    let adjustments = if e.multiple_adjustments.is_empty() {
        "unadjusted".to_string()
    } else {
        e.multiple_adjustments
            .iter()
            .map(|(reason, adj)| format!("adjusted {:+.0}% for {}", adj * 100.0, reason))
            .collect::<Vec<_>>()
            .join(", ")
    };

    if e.ebitda.margin <= 0.0 {
        return format!(
            "Revenue multiple only ({:.2}x on {}), as earnings-based methods are not meaningful \
             for a company without positive EBITDA ({} from {}).",
            e.revenue_multiple,
            format_nok(e.ebitda.revenue),
            format_nok(e.ebitda.value),
            ebitda_source,
        );
    }

    format!(
        "Blended valuation: 50% EBITDA multiple ({} base multiple {:.1}x {}, {:.2}x applied to \
         EBITDA of {} from {}), 30% capitalised earnings ({:.0}% of EBITDA at a {:.1}% required \
         return), 20% revenue multiple ({:.2}x on {}).",
        input.industry,
        e.base_multiple,
        adjustments,
        e.adjusted_multiple,
        format_nok(e.ebitda.value),
        ebitda_source,
        CAPITALIZATION_EARNINGS_SHARE * 100.0,
        e.required_return * 100.0,
        e.revenue_multiple,
        format_nok(e.ebitda.revenue),
    )
}

fn swot(input: &ValuationInput, e: &PointEstimates) -> SwotAnalysis {
    let mut analysis = SwotAnalysis::default();
    let trend = effective_trend(input);
    let defaults = input.industry.defaults();

    if e.ebitda.margin > HIGH_MARGIN {
        analysis
            .strengths
            .push(format!("High EBITDA margin of {:.1}%", e.ebitda.margin * 100.0));
    } else if e.ebitda.margin <= 0.0 {
        analysis.weaknesses.push("Operating at a loss".to_string());
    } else if e.ebitda.margin < LOW_MARGIN {
        analysis
            .weaknesses
            .push(format!("Thin EBITDA margin of {:.1}%", e.ebitda.margin * 100.0));
    }

    match trend {
        Some(RevenueTrend::StrongGrowth) => {
            analysis.strengths.push("Strong revenue growth".to_string())
        }
        Some(RevenueTrend::ModerateGrowth) => {
            analysis.strengths.push("Steady revenue growth".to_string())
        }
        Some(RevenueTrend::Declining) => analysis.weaknesses.push("Declining revenue".to_string()),
        _ => {}
    }

    if input.is_solo() {
        analysis
            .weaknesses
            .push("Business depends on the owner's personal effort".to_string());
    }
    if input.company_age.map_or(false, |a| a.is_young()) {
        analysis
            .weaknesses
            .push("Short operating history".to_string());
    }
    if let Some(advantage) = input.competitive_advantage.as_deref() {
        analysis.strengths.push(advantage.to_string());
    }
    if analysis.strengths.is_empty() {
        analysis.strengths.push(defaults.competitive_advantage.to_string());
    }

    analysis.opportunities.push(
        input
            .growth_potential
            .clone()
            .unwrap_or_else(|| defaults.growth_potential.to_string()),
    );
    analysis.risks.push(
        input
            .key_risks
            .clone()
            .unwrap_or_else(|| defaults.key_risks.to_string()),
    );
    if input.total_debt.unwrap_or(0.0) > input.cash.unwrap_or(0.0) && e.ebitda.value > 0.0 {
        let ratio = input.total_debt.unwrap_or(0.0) / e.ebitda.value;
        if ratio > 4.0 {
            analysis
                .risks
                .push(format!("High leverage at {:.1}x debt to EBITDA", ratio));
        }
    }
    analysis
}

fn recommendations(input: &ValuationInput, e: &PointEstimates) -> Vec<String> {
    let mut recs = Vec::new();
    if !e.ebitda.exact {
        recs.push(
            "Provide exact revenue and operating costs to replace the margin estimate".to_string(),
        );
    }
    if input.is_solo() {
        recs.push("Document processes and build a team to reduce owner dependency".to_string());
    }
    if effective_trend(input) == Some(RevenueTrend::Declining) {
        recs.push("Stabilise revenue before going to market".to_string());
    }
    if e.ebitda.margin < LOW_MARGIN {
        recs.push("Review pricing and cost base to lift margins".to_string());
    }
    if input.annual_reports.len() < 3 {
        recs.push("Prepare three years of financial statements for buyer due diligence".to_string());
    }
    recs.push("Get the valuation confirmed by an adviser before negotiating".to_string());
    recs
}

fn key_metrics(e: &PointEstimates) -> Vec<KeyMetric> {
    vec![
        KeyMetric::new("EBITDA", format_nok(e.ebitda.value)),
        KeyMetric::new("EBITDA margin", format!("{:.1}%", e.ebitda.margin * 100.0)),
        KeyMetric::new("EBITDA multiple", format!("{:.2}x", e.adjusted_multiple)),
        KeyMetric::new("Required return", format!("{:.1}%", e.required_return * 100.0)),
        KeyMetric::new("Revenue multiple", format!("{:.2}x", e.revenue_multiple)),
    ]
}

/// `NOK 6 200 000` style formatting.
pub fn format_nok(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    if rounded < 0 {
        format!("NOK -{}", grouped)
    } else {
        format!("NOK {}", grouped)
    }
}
