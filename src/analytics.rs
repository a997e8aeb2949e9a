//! Pure financial helpers shared by the deterministic and AI valuation paths.

use crate::industry::Industry;
use crate::models::AnnualFiling;
use crate::valuation_models::{
    DebtAnalysis, HistoricalTrends, LeverageLevel, TrendDirection, ValuationInput,
    ValuationResult, WorkingCapitalAnalysis, WorkingCapitalStatus, YearGrowth,
};

/// Percentage points the latest growth must move away from the baseline
/// before the trend counts as improving or declining.
pub const TREND_THRESHOLD_PP: f64 = 5.0;

/// Tolerance around the industry working-capital ratio.
pub const WORKING_CAPITAL_BAND: f64 = 0.05;

const LOW_LEVERAGE_MAX: f64 = 2.5;
const MODERATE_LEVERAGE_MAX: f64 = 4.0;

/// Year-over-year revenue analysis. Needs at least two filed years with revenue.
pub fn historical_trends(filings: &[AnnualFiling]) -> Option<HistoricalTrends> {
    let mut points: Vec<(i32, f64)> = filings
        .iter()
        .filter_map(|f| f.revenue.filter(|r| r.is_finite()).map(|r| (f.year, r)))
        .collect();
    points.sort_by_key(|(year, _)| *year);
    points.dedup_by_key(|(year, _)| *year);

    if points.len() < 2 {
        return None;
    }

    let yearly_growth: Vec<YearGrowth> = points
        .windows(2)
        .filter(|w| w[0].1 > 0.0)
        .map(|w| YearGrowth {
            year: w[1].0,
            growth: (w[1].1 - w[0].1) / w[0].1 * 100.0,
        })
        .collect();

    let last = yearly_growth.last()?;
    let rates: Vec<f64> = yearly_growth.iter().map(|g| g.growth).collect();
    let average_growth = mean(&rates);
    let volatility = std_dev(&rates, average_growth);

    // Earlier years form the baseline; a single growth figure is compared with flat.
    let baseline = if rates.len() >= 2 {
        mean(&rates[..rates.len() - 1])
    } else {
        0.0
    };
    let delta = last.growth - baseline;
    let recent_trend = if delta > TREND_THRESHOLD_PP {
        TrendDirection::Improving
    } else if delta < -TREND_THRESHOLD_PP {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    Some(HistoricalTrends {
        years: points.iter().map(|(year, _)| *year).collect(),
        last_year_growth: last.growth,
        yearly_growth,
        average_growth,
        volatility,
        recent_trend,
    })
}

/// Net debt and the bridge from enterprise value to equity value.
pub fn debt_analysis(total_debt: f64, cash: f64, ebitda: f64, enterprise_value: f64) -> DebtAnalysis {
    let net_debt = total_debt - cash;
    let debt_to_ebitda = (ebitda > 0.0).then(|| total_debt / ebitda);

    let leverage = if net_debt <= 0.0 {
        LeverageLevel::NetCash
    } else {
        match debt_to_ebitda {
            Some(ratio) if ratio <= LOW_LEVERAGE_MAX => LeverageLevel::Low,
            Some(ratio) if ratio <= MODERATE_LEVERAGE_MAX => LeverageLevel::Moderate,
            _ => LeverageLevel::High,
        }
    };

    DebtAnalysis {
        total_debt,
        cash,
        net_debt,
        debt_to_ebitda,
        enterprise_value,
        equity_value: enterprise_value - net_debt,
        leverage,
    }
}

/// Receivables + inventory − payables, judged against the industry norm.
pub fn working_capital(
    receivables: f64,
    inventory: f64,
    payables: f64,
    revenue: f64,
    industry: Industry,
) -> WorkingCapitalAnalysis {
    let net_working_capital = receivables + inventory - payables;
    let expected_ratio = industry.expected_working_capital_ratio();
    let ratio_to_revenue = (revenue > 0.0).then(|| net_working_capital / revenue);

    let status = match ratio_to_revenue {
        Some(r) if r > expected_ratio + WORKING_CAPITAL_BAND => WorkingCapitalStatus::Overcapitalized,
        Some(r) if r < expected_ratio - WORKING_CAPITAL_BAND => WorkingCapitalStatus::Undercapitalized,
        Some(_) => WorkingCapitalStatus::Adequate,
        None => WorkingCapitalStatus::Unknown,
    };

    WorkingCapitalAnalysis {
        receivables,
        inventory,
        payables,
        net_working_capital,
        ratio_to_revenue,
        expected_ratio,
        status,
        deviation_from_expected: ratio_to_revenue.map(|r| (r - expected_ratio) * revenue),
    }
}

fn non_zero(value: Option<f64>) -> bool {
    value.map_or(false, |v| v != 0.0)
}

/// Debt analysis when the balance-sheet inputs are present and non-zero.
pub fn debt_analysis_for(input: &ValuationInput, ebitda: f64, enterprise_value: f64) -> Option<DebtAnalysis> {
    if !non_zero(input.total_debt) && !non_zero(input.cash) {
        return None;
    }
    Some(debt_analysis(
        input.total_debt.unwrap_or(0.0),
        input.cash.unwrap_or(0.0),
        ebitda,
        enterprise_value,
    ))
}

pub fn working_capital_for(input: &ValuationInput) -> Option<WorkingCapitalAnalysis> {
    if !non_zero(input.accounts_receivable) && !non_zero(input.inventory) && !non_zero(input.accounts_payable) {
        return None;
    }
    Some(working_capital(
        input.accounts_receivable.unwrap_or(0.0),
        input.inventory.unwrap_or(0.0),
        input.accounts_payable.unwrap_or(0.0),
        input.revenue(),
        input.industry,
    ))
}

/// Computes whichever sub-analyses the result is missing.
pub fn fill_missing(result: &mut ValuationResult, input: &ValuationInput, ebitda: f64) {
    if result.debt_analysis.is_none() {
        result.debt_analysis =
            debt_analysis_for(input, ebitda, result.valuation_range.most_likely);
    }
    if result.working_capital.is_none() {
        result.working_capital = working_capital_for(input);
    }
    if result.historical_trends.is_none() {
        result.historical_trends = historical_trends(&input.annual_reports);
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filing(year: i32, revenue: f64) -> AnnualFiling {
        AnnualFiling {
            year,
            revenue: Some(revenue),
            ..Default::default()
        }
    }

    #[test]
    fn test_two_years_of_growth_is_improving() {
        let trends =
            historical_trends(&[filing(2024, 45_000_000.0), filing(2023, 38_000_000.0)]).unwrap();
        assert!((trends.last_year_growth - 18.42).abs() < 0.01);
        assert_eq!(trends.recent_trend, TrendDirection::Improving);
        assert_eq!(trends.years, vec![2023, 2024]);
        assert_eq!(trends.volatility, 0.0);
    }

    #[test]
    fn test_slowdown_against_history_is_declining() {
        let trends = historical_trends(&[
            filing(2021, 10.0),
            filing(2022, 13.0),
            filing(2023, 16.9),
            filing(2024, 17.0),
        ])
        .unwrap();
        assert_eq!(trends.recent_trend, TrendDirection::Declining);
        assert!(trends.volatility > 0.0);
    }

    #[test]
    fn test_single_year_has_no_trend() {
        assert!(historical_trends(&[filing(2024, 1.0)]).is_none());
        assert!(historical_trends(&[]).is_none());
    }

    #[test]
    fn test_net_cash_adds_to_equity() {
        let debt = debt_analysis(2_000_000.0, 3_200_000.0, 1_000_000.0, 10_000_000.0);
        assert_eq!(debt.net_debt, -1_200_000.0);
        assert_eq!(debt.equity_value, 11_200_000.0);
        assert_eq!(debt.leverage, LeverageLevel::NetCash);
        assert_eq!(debt.debt_to_ebitda, Some(2.0));
    }

    #[test]
    fn test_no_debt_ratio_for_loss_makers() {
        let debt = debt_analysis(5.0, 0.0, -1.0, 100.0);
        assert_eq!(debt.debt_to_ebitda, None);
        assert_eq!(debt.leverage, LeverageLevel::High);
    }

    #[test]
    fn test_working_capital_status() {
        let wc = working_capital(3_000_000.0, 1_000_000.0, 500_000.0, 10_000_000.0, Industry::Tech);
        assert_eq!(wc.net_working_capital, 3_500_000.0);
        assert_eq!(wc.status, WorkingCapitalStatus::Overcapitalized);

        let wc = working_capital(1_000_000.0, 0.0, 0.0, 10_000_000.0, Industry::Tech);
        assert_eq!(wc.status, WorkingCapitalStatus::Adequate);

        let wc = working_capital(0.0, 0.0, 1_000_000.0, 10_000_000.0, Industry::Tech);
        assert_eq!(wc.status, WorkingCapitalStatus::Undercapitalized);

        let wc = working_capital(1.0, 0.0, 0.0, 0.0, Industry::Tech);
        assert_eq!(wc.status, WorkingCapitalStatus::Unknown);
    }
}
