use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::input::ProFormaInput;
use crate::statements::generator::run_statements;
use crate::statements::{CompanyType, FinancialStatements, Statement, StatementsResult};
use crate::types::{with_metadata, zeros, ComputationOutput, Money, YearSeries};
use crate::valuation::{
    perpetuity_value, sensitivity_heatmap, standard_impacts, tornado_data, DcfCache,
    SensitivityRow, TornadoEntry,
};
use crate::ProFormaResult;
use tracing::warn;

const DEFAULT_CLV: Money = dec!(25000);
const DEFAULT_CAC: Money = dec!(1500);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub years: Vec<String>,
    pub revenue_all_years: YearSeries,
    pub expenses_all_years: YearSeries,
    pub net_income_all_years: YearSeries,
    pub ebitda_all_years: YearSeries,
}

/// Headline figures for the base year plus valuation context.
///
/// Margins, ROE and growth are percentages. `wacc` and `terminal_growth`
/// echo the input percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardKpis {
    pub total_revenue: Money,
    pub total_expenses: Money,
    pub net_income: Money,
    pub profit_margin: Decimal,
    pub ebitda_margin: Decimal,
    pub roe: Decimal,
    pub asset_turnover: Decimal,
    pub current_ratio: Decimal,
    pub debt_to_equity: Decimal,
    pub revenue_growth: Decimal,
    pub client_retention_rate: Decimal,
    pub utilization_rate: Decimal,
    pub clv: Money,
    pub cac: Money,
    pub wacc: Decimal,
    pub terminal_growth: Decimal,
    pub terminal_value: Money,
    pub chart_data: ChartData,
    pub tornado_chart_data: Vec<TornadoEntry>,
    pub sensitivity_heatmap_data: Vec<SensitivityRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    pub statements: StatementsResult,
    /// Absent when validation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_kpis: Option<DashboardKpis>,
}

/// Last historical year, or the first year when that index is out of range.
pub fn base_year_index(input: &ProFormaInput, year_count: usize) -> usize {
    let idx = input.years_in_business as i64 - 1;
    if idx < 0 || idx as usize >= year_count {
        0
    } else {
        idx as usize
    }
}

fn series(statement: &Statement, label: &str, len: usize) -> YearSeries {
    statement
        .values_of(label)
        .map(<[Money]>::to_vec)
        .unwrap_or_else(|| zeros(len))
}

fn at(values: &[Money], idx: usize) -> Money {
    values.get(idx).copied().unwrap_or(Decimal::ZERO)
}

/// `numerator / denominator`, zero unless the denominator is positive and
/// the quotient is representable.
fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator > Decimal::ZERO {
        numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    }
}

fn ratio_percent(numerator: Decimal, denominator: Decimal) -> Decimal {
    ratio(numerator, denominator)
        .checked_mul(dec!(100))
        .unwrap_or(Decimal::ZERO)
}

fn growth_percent(values: &[Money]) -> Decimal {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if values.len() > 1 && !first.is_zero() => last
            .checked_sub(*first)
            .and_then(|d| d.checked_div(*first))
            .and_then(|g| g.checked_mul(dec!(100)))
            .unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// The WACC-driven part of the dashboard.
struct ValuationKpis {
    terminal_value: Money,
    tornado_chart_data: Vec<TornadoEntry>,
    sensitivity_heatmap_data: Vec<SensitivityRow>,
}

impl ValuationKpis {
    fn zero() -> Self {
        Self {
            terminal_value: Decimal::ZERO,
            tornado_chart_data: Vec::new(),
            sensitivity_heatmap_data: Vec::new(),
        }
    }
}

fn valuation_kpis(
    cache: &mut DcfCache,
    final_net_income: Money,
    forecast_fcf: &[Money],
    wacc: Decimal,
    growth: Decimal,
) -> ProFormaResult<ValuationKpis> {
    Ok(ValuationKpis {
        terminal_value: valuation.terminal_value,
        tornado_chart_data: valuation.tornado_chart_data,
        sensitivity_heatmap_data: valuation.sensitivity_heatmap_data,
    }
}

fn or_default(value: Money, default: Money) -> Money {
    if value.is_zero() {
        default
    } else {
        value
    }
}

/// KPIs from finished statements. The tornado and heatmap run over the
/// forecast-year free cash flows.
///
/// When the discount settings cannot value the flows, the terminal value,
/// tornado and heatmap are zeroed and the reason is pushed onto `warnings`.
pub fn dashboard_kpis(
    cache: &mut DcfCache,
    input: &ProFormaInput,
    statements: &FinancialStatements,
    forecast_fcf: &[Money],
    warnings: &mut Vec<String>,
) -> DashboardKpis {
    let income = &statements.income_statement;
    let balance = &statements.balance_sheet;
    let n = income.years.len();

    let revenue = series(income, "TOTAL REVENUE", n);
    let net_income = series(income, "NET INCOME", n);
    let ebitda = series(income, "EBITDA", n);
    let expenses = series(income, "TOTAL OPERATING EXPENSES", n);
    let total_assets = series(balance, "TOTAL ASSETS", n);
    let total_liabilities = series(balance, "TOTAL LIABILITIES", n);
    let total_equity = series(balance, "TOTAL EQUITY", n);
    let current_assets = series(balance, "Total Current Assets", n);
    let current_liabilities = series(balance, "Total Current Liabilities", n);

    let base = base_year_index(input, n);
    let total_revenue = at(&revenue, base);
    let base_net_income = at(&net_income, base);
    let equity = at(&total_equity, base);

    let wacc = input.discount_fraction();
    let growth = input.terminal_growth_fraction();
    let final_net_income = net_income.last().copied().unwrap_or(Decimal::ZERO);

    let valuation = valuation_kpis(cache, final_net_income, forecast_fcf, wacc, growth)
        .unwrap_or_else(|e| {
            warn!(error = %e, discount_rate = %input.discount_rate, "dashboard valuation zeroed");
            warnings.push(format!("Valuation KPIs unavailable: {e}"));
            ValuationKpis::zero()
        });

    let model = &input.service_business_model;

    DashboardKpis {
        total_revenue,
        total_expenses: at(&expenses, base),
        net_income: base_net_income,
        profit_margin: ratio_percent(base_net_income, total_revenue),
        ebitda_margin: ratio_percent(at(&ebitda, base), total_revenue),
        roe: ratio_percent(base_net_income, equity),
        asset_turnover: ratio(total_revenue, at(&total_assets, base)),
        current_ratio: ratio(at(&current_assets, base), at(&current_liabilities, base)),
        debt_to_equity: ratio(at(&total_liabilities, base), equity),
        revenue_growth: growth_percent(&revenue),
        client_retention_rate: model.client_retention_rate,
        utilization_rate: model.utilization_rate,
        clv: or_default(model.customer_lifetime_value, DEFAULT_CLV),
        cac: or_default(model.client_acquisition_cost, DEFAULT_CAC),
        wacc: input.discount_rate,
        terminal_growth: input.terminal_growth,
        terminal_value: valuation.terminal_value,
        chart_data: ChartData {
            years: income.years.clone(),
            revenue_all_years: revenue,
            expenses_all_years: expenses,
            net_income_all_years: net_income,
            ebitda_all_years: ebitda,
        },
        tornado_chart_data: valuation.tornado_chart_data,
        sensitivity_heatmap_data: valuation.sensitivity_heatmap_data,
    }
}

/// Statements followed by dashboard KPIs. A validation failure is reported in
/// `statements` with no KPIs.
pub fn calculate_dashboard(
    company_type: CompanyType,
    input: &ProFormaInput,
) -> ProFormaResult<ComputationOutput<DashboardReport>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let report = match run_statements(company_type, input) {
        Ok((success, pipeline)) => {
            let mut cache = DcfCache::new();
            let forecast_fcf = pipeline
                .cash_flow
                .forecast_free_cash_flow(input.historical_len());
            if forecast_fcf.is_empty() {
                warnings.push("No forecast free cash flows; sensitivity data is empty".to_string());
            }
            let kpis = dashboard_kpis(
                &mut cache,
                input,
                &pipeline.statements(),
                &forecast_fcf,
                &mut warnings,
            );
            DashboardReport {
                statements: StatementsResult::Success(Box::new(success)),
                dashboard_kpis: Some(kpis),
            }
        }
        Err(failure) => {
            warnings.extend(failure.errors.iter().cloned());
            DashboardReport {
                statements: StatementsResult::Invalid(failure),
                dashboard_kpis: None,
            }
        }
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Historical statements with dashboard KPIs",
        &serde_json::json!({
            "company_type": company_type,
            "discount_rate": input.discount_rate.to_string(),
            "terminal_growth": input.terminal_growth.to_string(),
            "base_year_index": input.years_in_business.saturating_sub(1),
        }),
        warnings,
        elapsed,
        report,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::generator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_input() -> ProFormaInput {
        serde_json::from_value(json!({
            "yearsInBusiness": 2,
            "forecastYears": 3,
            "currentYear": 2024,
            "selfFunding": 20000,
            "revenueGrowthRate": 10,
            "historicalServices": [
                { "year": 1, "services": [{ "name": "Advisory", "historicalRevenue": 80000, "historicalClients": 8, "cost": 20000 }] },
                { "year": 2, "services": [{ "name": "Advisory", "historicalRevenue": 100000, "historicalClients": 10, "cost": 25000 }] }
            ],
            "historicalExpenses": [
                { "year": 1, "expenses": [{ "category": "rent", "historicalAmount": 18000 }] },
                { "year": 2, "expenses": [{ "category": "rent", "historicalAmount": 18000 }] }
            ],
            "serviceBusinessModel": { "clientRetentionRate": 90 }
        }))
        .unwrap()
    }

    #[test]
    fn test_base_year_index() {
        let mut input = sample_input();
        assert_eq!(base_year_index(&input, 5), 1);
        input.years_in_business = 0;
        assert_eq!(base_year_index(&input, 5), 0);
        input.years_in_business = 9;
        assert_eq!(base_year_index(&input, 5), 0);
    }

    #[test]
    fn test_kpis_from_base_year() {
        let input = sample_input();
        let out = calculate_dashboard(CompanyType::Service, &input).unwrap();
        let kpis = out.result.dashboard_kpis.unwrap();

        let statements = generator(CompanyType::Service).generate(&input);
        let revenue = statements.income_statement.values_of("TOTAL REVENUE").unwrap();
        assert_eq!(kpis.total_revenue, revenue[1]);
        assert_eq!(kpis.total_revenue, dec!(100000));
        assert_eq!(kpis.profit_margin, kpis.net_income / kpis.total_revenue * dec!(100));
        assert_eq!(kpis.chart_data.years.len(), 5);
        assert_eq!(kpis.client_retention_rate, dec!(90));
        assert_eq!(kpis.clv, DEFAULT_CLV);
        assert_eq!(kpis.cac, DEFAULT_CAC);
        assert_eq!(kpis.wacc, dec!(10));
        assert_eq!(kpis.tornado_chart_data.len(), 3);
        assert_eq!(kpis.sensitivity_heatmap_data.len(), 3);
        assert!(kpis.terminal_value > Decimal::ZERO);
    }

    #[test]
    fn test_ratios_guard_denominators() {
        assert_eq!(ratio(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(ratio(dec!(5), dec!(-2)), Decimal::ZERO);
        assert_eq!(growth_percent(&[dec!(0), dec!(10)]), Decimal::ZERO);
        assert_eq!(growth_percent(&[dec!(100), dec!(150)]), dec!(50));
        assert_eq!(growth_percent(&[dec!(100)]), Decimal::ZERO);
    }

    #[test]
    fn test_terminal_value_needs_spread() {
        let mut input = sample_input();
        input.discount_rate = dec!(2);
        input.terminal_growth = dec!(2);
        let out = calculate_dashboard(CompanyType::Service, &input).unwrap();
        assert_eq!(out.result.dashboard_kpis.unwrap().terminal_value, Decimal::ZERO);
    }

    #[test]
    fn test_invalid_wacc_zeroes_valuation_kpis() {
        let mut input = sample_input();
        input.discount_rate = dec!(-150);
        let out = calculate_dashboard(CompanyType::Service, &input).unwrap();
        let kpis = out.result.dashboard_kpis.unwrap();

        assert!(out.result.statements.is_success());
        assert_eq!(kpis.total_revenue, dec!(100000));
        assert_eq!(kpis.terminal_value, Decimal::ZERO);
        assert!(kpis.tornado_chart_data.is_empty());
        assert!(kpis.sensitivity_heatmap_data.is_empty());
        assert!(out
            .warnings
            .iter()
            .any(|w| w.starts_with("Valuation KPIs unavailable")));
    }

    #[test]
    fn test_validation_failure_has_no_kpis() {
        let out = calculate_dashboard(CompanyType::Service, &ProFormaInput::default()).unwrap();
        assert!(out.result.dashboard_kpis.is_none());
        assert!(!out.result.statements.is_success());
        assert_eq!(out.warnings, vec!["Historical services data is required"]);
    }
}
