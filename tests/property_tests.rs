/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use chrono::NaiveDate;
use company_valuation_api::ai_valuation::{extract_json, validate_and_repair};
use company_valuation_api::industry::Industry;
use company_valuation_api::merge::merge;
use company_valuation_api::models::*;
use company_valuation_api::sanitize::{parse_amount, validate_and_sanitize};
use company_valuation_api::valuation::calculate;
use company_valuation_api::valuation_models::*;
use proptest::prelude::*;
use serde_json::json;

fn industry() -> impl Strategy<Value = Industry> {
    prop::sample::select(Industry::ALL.to_vec())
}

fn input() -> impl Strategy<Value = ValuationInput> {
    (
        industry(),
        0.0f64..500_000_000.0,
        0.0f64..1.5,
        prop::option::of(prop::sample::select(EmployeeBucket::ALL.to_vec())),
        prop::option::of(prop::sample::select(RevenueTrend::ALL.to_vec())),
        prop::option::of(prop::sample::select(CompanyAge::ALL.to_vec())),
    )
        .prop_map(|(industry, revenue, cost_ratio, employees, trend, age)| {
            let mut input = ValuationInput::minimal("Property AS", industry);
            input.exact_revenue = Some(revenue);
            input.operating_costs = Some(revenue * cost_ratio);
            input.employees = employees;
            input.revenue_trend = trend;
            input.company_age = age;
            input
        })
}

// Property: deterministic results are always positive, ordered and bounded
proptest! {
    #[test]
    fn deterministic_range_is_sound(input in input()) {
        let bands = ValuationBands::default();
        let range = calculate(&input, &bands).valuation_range;

        prop_assert!(range.min > 0.0);
        prop_assert!(range.min <= range.most_likely && range.most_likely <= range.max);
        prop_assert!(range.spread() <= bands.max_spread);
        prop_assert!(range.most_likely >= bands.minimum_value);
    }

    #[test]
    fn deterministic_is_pure(input in input()) {
        let bands = ValuationBands::default();
        prop_assert_eq!(calculate(&input, &bands), calculate(&input, &bands));
    }
}

// Property: the repair gate never lets an unsound range through
proptest! {
    #[test]
    fn gate_output_is_consistent(
        min in -1e9f64..1e10,
        max in -1e9f64..1e10,
        most_likely in prop::option::of(-1e9f64..1e10),
    ) {
        let bands = ValuationBands::default();
        let input = ValuationInput::minimal("Gate AS", Industry::Tech);
        let raw = json!({
            "valuationRange": { "min": min, "mostLikely": most_likely, "max": max }
        });

        if let Some(result) = validate_and_repair(&raw, &input, &bands) {
            prop_assert!(result.valuation_range.is_consistent(bands.max_spread));
        }
    }

    #[test]
    fn gate_honours_configured_spread(
        max_spread in 1.2f64..4.0,
        min in 1.0f64..1e9,
        ratio in 1.0f64..20.0,
    ) {
        let bands = ValuationBands { max_spread, ..ValuationBands::default() };
        let input = ValuationInput::minimal("Gate AS", Industry::Tech);
        let raw = json!({ "valuationRange": { "min": min, "max": min * ratio } });

        if let Some(result) = validate_and_repair(&raw, &input, &bands) {
            let range = result.valuation_range;
            prop_assert!(range.is_consistent(bands.spread_cap()));
            prop_assert!(range.spread() <= SPREAD_CEILING + 1e-9);
        }
    }

    #[test]
    fn json_extraction_never_panics(text in "\\PC*") {
        let _ = extract_json(&text);
    }
}

// Property: input handling never panics
proptest! {
    #[test]
    fn amount_parsing_never_panics(raw in "\\PC*") {
        let _ = parse_amount(&json!(raw));
    }

    #[test]
    fn sanitizer_never_panics(
        name in "\\PC*",
        industry in "\\PC*",
        revenue in "\\PC*",
        email in "\\PC*",
    ) {
        let _ = validate_and_sanitize(&json!({
            "companyName": name,
            "industry": industry,
            "exactRevenue": revenue,
            "email": email,
        }));
    }

    #[test]
    fn sanitized_amounts_are_bounded(revenue in any::<f64>()) {
        let outcome = validate_and_sanitize(&json!({
            "companyName": "Bounded AS",
            "industry": "services",
            "exactRevenue": revenue,
        }));
        if let Some(input) = outcome.sanitized {
            let amount = input.exact_revenue.unwrap();
            prop_assert!(amount.is_finite() && (0.0..=1e12).contains(&amount));
        }
    }
}

// Property: the registry name wins whatever order sources settle in
proptest! {
    #[test]
    fn registry_name_always_wins(order in Just(vec![0usize, 1, 2]).prop_shuffle()) {
        let records = [
            (SourceKind::Registry, SourceRecord::Registry(RegistryRecord {
                name: Some("OFFICIAL AS".into()),
                ..Default::default()
            })),
            (SourceKind::SecondaryRegistry, SourceRecord::SecondaryRegistry(SecondaryRegistryRecord {
                name: Some("Directory Name".into()),
                ..Default::default()
            })),
            (SourceKind::Website, SourceRecord::Website(WebsiteRecord {
                description: Some("From the homepage".into()),
                ..Default::default()
            })),
        ];
        let results: Vec<_> = order
            .iter()
            .map(|&i| (records[i].0, Some(records[i].1.clone())))
            .collect();
        let identifier = CompanyIdentifier {
            org_number: Some("923609016".into()),
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let record = merge(&identifier, &results, today);
        prop_assert_eq!(
            record.auto_fill.get(&AutoFillField::CompanyName),
            Some(&json!("OFFICIAL AS"))
        );
    }
}
