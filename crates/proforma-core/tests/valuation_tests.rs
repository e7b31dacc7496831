use proforma_core::input::ProFormaInput;
use proforma_core::time_value::{irr, npv, payback_period, PAYBACK_NEVER};
use proforma_core::valuation::{
    dcf_value, run_scenarios, run_sensitivity, terminal_value, value_cash_flows, DcfCache,
    ScenarioSettings, SensitivityRequest, TerminalMethod, TerminalValueInput, ValuationRequest,
    ValuationSettings,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

fn sample_input() -> ProFormaInput {
    serde_json::from_value(json!({
        "yearsInBusiness": 2,
        "forecastYears": 3,
        "currentYear": 2024,
        "selfFunding": 25000,
        "revenueGrowthRate": 12,
        "historicalServices": [
            { "year": 1, "services": [{ "name": "Consulting", "historicalRevenue": 200000, "historicalClients": 20, "cost": 60000 }] },
            { "year": 2, "services": [{ "name": "Consulting", "historicalRevenue": 230000, "historicalClients": 23, "cost": 69000 }] }
        ],
        "historicalExpenses": [
            { "year": 1, "expenses": [{ "category": "salaries", "historicalAmount": 90000 }] },
            { "year": 2, "expenses": [{ "category": "salaries", "historicalAmount": 95000 }] }
        ],
        "historicalEquipment": [
            { "year": 1, "equipment": [{ "cost": 10000, "usefulLife": 5 }] }
        ]
    }))
    .unwrap()
}

// ===========================================================================
// Time value primitives
// ===========================================================================

#[test]
fn test_irr_sign_guard() {
    assert_eq!(irr(&[dec!(100), dec!(100), dec!(100)]), None);
    assert_eq!(irr(&[dec!(-100), dec!(-100)]), None);
    assert_eq!(irr(&[]), None);
}

#[test]
fn test_irr_zeroes_npv() {
    let flows = [dec!(-100), dec!(50), dec!(60)];
    let rate = irr(&flows).unwrap();
    let residual = npv(rate, &flows).unwrap();
    assert!(residual.abs() < dec!(0.000001), "NPV at IRR was {residual}");
    // Known root: (1+r) = (50 + sqrt(26500)) / 200
    assert!((rate - dec!(0.0639)).abs() < dec!(0.001), "IRR was {rate}");
}

#[test]
fn test_payback_sentinel_and_interpolation() {
    assert_eq!(payback_period(&[dec!(-100), dec!(10), dec!(10)]), PAYBACK_NEVER);
    assert_eq!(PAYBACK_NEVER, dec!(999));

    let payback = payback_period(&[dec!(-100), dec!(60), dec!(60)]);
    assert!(payback > Decimal::ONE && payback < dec!(2));
    assert!((payback - dec!(1.6667)).abs() < dec!(0.001), "payback was {payback}");
}

#[test]
fn test_npv_leaves_first_flow_undiscounted() {
    let value = npv(dec!(0.10), &[dec!(-100), dec!(110)]).unwrap();
    assert_eq!(value, Decimal::ZERO);
}

// ===========================================================================
// Terminal value and DCF
// ===========================================================================

#[test]
fn test_perpetuity_terminal_value() {
    let tv = terminal_value(
        TerminalMethod::Perpetuity,
        &TerminalValueInput {
            last_fcf: dec!(100),
            discount_rate: dec!(0.10),
            terminal_growth: dec!(0.02),
            ..Default::default()
        },
    )
    .unwrap();
    // 100 * 1.02 / 0.08
    assert_eq!(tv, dec!(1275));
}

#[test]
fn test_terminal_value_methods() {
    let input = TerminalValueInput {
        last_fcf: dec!(100),
        discount_rate: dec!(0.05),
        terminal_growth: dec!(0.05),
        metric_value: dec!(40),
        multiple: dec!(6),
        custom_value: dec!(900),
    };
    assert_eq!(terminal_value(TerminalMethod::Perpetuity, &input).unwrap(), Decimal::ZERO);
    assert_eq!(terminal_value(TerminalMethod::ExitMultiple, &input).unwrap(), dec!(240));
    assert_eq!(terminal_value(TerminalMethod::Liquidation, &input).unwrap(), dec!(900));
    assert_eq!(terminal_value(TerminalMethod::None, &input).unwrap(), Decimal::ZERO);
}

#[test]
fn test_dcf_discounts_every_flow() {
    let value = dcf_value(&[dec!(110), dec!(121)], dec!(0.10), None, None).unwrap();
    assert_eq!(value, dec!(200));

    let with_tv = dcf_value(&[dec!(110)], dec!(0.10), Some(dec!(1210)), Some(2)).unwrap();
    assert_eq!(with_tv, dec!(1100));
}

#[test]
fn test_cached_dcf_matches_direct() {
    let flows = [dec!(80), dec!(90), dec!(100)];
    let mut cache = DcfCache::new();
    for rate in [dec!(0.08), dec!(0.10), dec!(0.08)] {
        assert_eq!(
            cache.dcf_value(&flows, rate, Some(dec!(500)), None).unwrap(),
            dcf_value(&flows, rate, Some(dec!(500)), None).unwrap()
        );
    }
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.misses(), 2);
}

#[test]
fn test_value_cash_flows_summary() {
    let request = ValuationRequest {
        cash_flows: vec![dec!(-1000), dec!(300), dec!(400), dec!(500)],
        settings: ValuationSettings::default(),
        owner_investments: vec![dec!(1000)],
        owner_returns: vec![dec!(600), dec!(700)],
    };
    let out = value_cash_flows(&request).unwrap();
    let summary = out.result;

    assert_eq!(summary.terminal_value, dec!(500) * dec!(1.02) / dec!(0.08));
    assert!(summary.irr.is_some());
    assert!(summary.payback_period > dec!(2) && summary.payback_period < dec!(3));
    assert_eq!(summary.owner_roi, dec!(0.3));
    assert!(out.warnings.is_empty());
}

#[test]
fn test_value_cash_flows_from_json() {
    let request: ValuationRequest = serde_json::from_value(json!({
        "cash_flows": [100, 100],
        "discount_rate": 0.05,
        "terminal_growth": 0.05
    }))
    .unwrap();
    let out = value_cash_flows(&request).unwrap();
    assert_eq!(out.result.terminal_value, Decimal::ZERO);
    assert_eq!(out.result.irr, None);
    assert_eq!(out.warnings.len(), 2);
}

#[test]
fn test_valuation_rejects_rate_near_minus_one_hundred_percent() {
    let flows = vec![dec!(100); 40];
    assert!(dcf_value(&flows, dec!(-0.95), None, None).is_err());

    let request = ValuationRequest {
        cash_flows: flows,
        settings: ValuationSettings {
            discount_rate: dec!(-0.95),
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(value_cash_flows(&request).is_err());
}

#[test]
fn test_valuation_rejects_explosive_rate() {
    let flows = vec![dec!(100); 40];
    assert!(npv(dec!(1000000), &flows).is_err());
    assert!(dcf_value(&flows, dec!(1000000), Some(dec!(1000)), None).is_err());
}

// ===========================================================================
// Sensitivity and scenarios
// ===========================================================================

#[test]
fn test_sensitivity_report_shape() {
    let request: SensitivityRequest = serde_json::from_value(json!({
        "free_cash_flows": [1000, 1100, 1200],
        "discount_rate": 0.10,
        "terminal_growth": 0.02
    }))
    .unwrap();
    let report = run_sensitivity(&request).unwrap().result;

    assert_eq!(report.heatmap.len(), 3);
    assert!(report.heatmap.iter().all(|row| row.values.len() == 3));
    assert_eq!(report.tornado.len(), 3);
    for pair in report.tornado.windows(2) {
        assert!(pair[0].spread() >= pair[1].spread());
    }
    // Higher WACC lowers value at fixed growth.
    let first_column: Vec<Decimal> = report.heatmap.iter().map(|r| r.values[0].dcf).collect();
    assert!(first_column[0] > first_column[2]);
}

#[test]
fn test_scenarios_end_to_end() {
    let out = run_scenarios(&sample_input(), &ScenarioSettings::default()).unwrap();
    let report = out.result;

    assert_eq!(report.forecast.len(), 3);
    assert_eq!(report.forecast[0].year, "2025");
    assert_eq!(report.best_forecast.len(), 3);
    assert!(report.comparison.best.npv > report.comparison.worst.npv);
    assert_eq!(report.sensitivity.tornado_data.len(), 4);
    assert_eq!(report.sensitivity.sensitivity_matrix.len(), 3);

    for year in &report.forecast {
        assert_eq!(year.gross_profit, year.revenue - year.cogs);
    }
}

#[test]
fn test_sensitivity_with_extreme_wacc_is_an_error() {
    let request: SensitivityRequest = serde_json::from_value(json!({
        "free_cash_flows": vec![1000; 40],
        "discount_rate": -0.95,
        "terminal_growth": 0.02,
        "wacc_range": [-0.95, 0.10]
    }))
    .unwrap();
    assert!(run_sensitivity(&request).is_err());
}

#[test]
fn test_scenarios_with_runaway_growth_return_error() {
    let input: ProFormaInput = serde_json::from_value(json!({
        "yearsInBusiness": 1,
        "forecastYears": 30,
        "revenueGrowthRate": 1000,
        "historicalServices": [
            { "year": 1, "services": [{ "name": "Advisory", "historicalRevenue": 100000 }] }
        ],
        "serviceBusinessModel": { "seasonalityFactor": 0, "teamSize": 0 }
    }))
    .unwrap();
    assert!(run_scenarios(&input, &ScenarioSettings::default()).is_err());
}

#[test]
fn test_scenarios_need_statements() {
    assert!(run_scenarios(&ProFormaInput::default(), &ScenarioSettings::default()).is_err());
}
