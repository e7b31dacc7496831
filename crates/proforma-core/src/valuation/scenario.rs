//! Best/base/worst scenarios and driver sensitivity over forecast years.
//!
//! Adjustments are percentage points: `revenueGrowth: 10` grows each year's
//! revenue 10% over the prior adjusted year, `operatingMargin: 5` lifts the
//! operating margin five points.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::DcfCache;
use super::dcf::perpetuity_value;
use super::sensitivity::{sensitivity_heatmap, SensitivityRow};
use crate::time_value::{irr, npv, PAYBACK_NEVER};
use crate::types::{percent, safe_divide, Money, Rate};
use crate::ProFormaResult;

#[cfg(feature = "statements")]
use crate::input::ProFormaInput;
#[cfg(feature = "statements")]
use crate::statements::{generator, CompanyType, StatementPipeline};
#[cfg(feature = "statements")]
use crate::types::{with_metadata, ComputationOutput};
#[cfg(feature = "statements")]
use std::time::Instant;

const MARGIN_FLOOR: Rate = dec!(0.05);
const MARGIN_CAP: Rate = dec!(0.95);
const COGS_SHARE: Decimal = dec!(0.6);
const OPEX_SHARE: Decimal = dec!(0.4);
/// Each side of a narrowed sensitivity range spans this share of the original width.
const RANGE_NARROWING: Decimal = dec!(0.3);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One forecast year as seen by the scenario layer.
///
/// `ebit` is operating profit on services (revenue less COGS, operating
/// expenses and depreciation). `other_income` nets other operating items and
/// investment income so that `ebt = ebit + other_income - interest_expense`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastYear {
    pub year: String,
    pub revenue: Money,
    pub cogs: Money,
    pub gross_profit: Money,
    pub operating_expenses: Money,
    pub depreciation: Money,
    pub ebit: Money,
    pub other_income: Money,
    pub interest_expense: Money,
    pub ebt: Money,
    pub tax_rate: Rate,
    pub tax_expense: Money,
    pub net_income: Money,
    pub capex: Money,
    pub change_in_working_capital: Money,
    pub free_cash_flow: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioVariable {
    RevenueGrowth,
    OperatingMargin,
    Capex,
    TaxRate,
}

/// Scenario drivers in percentage points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioAdjustments {
    pub revenue_growth: Decimal,
    pub operating_margin: Decimal,
    pub capex: Decimal,
    pub tax_rate: Decimal,
}

impl ScenarioAdjustments {
    /// Only `variable` set to `value`.
    pub fn single(variable: ScenarioVariable, value: Decimal) -> Self {
        let mut adjustments = Self::default();
        match variable {
            ScenarioVariable::RevenueGrowth => adjustments.revenue_growth = value,
            ScenarioVariable::OperatingMargin => adjustments.operating_margin = value,
            ScenarioVariable::Capex => adjustments.capex = value,
            ScenarioVariable::TaxRate => adjustments.tax_rate = value,
        }
        adjustments
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRange {
    pub low: Decimal,
    pub high: Decimal,
}

impl SensitivityRange {
    /// Same midpoint, each side 30% of the original width.
    fn narrowed(&self) -> Self {
        let mid = (self.low + self.high) / dec!(2);
        let size = (self.high - self.low) * RANGE_NARROWING;
        Self {
            low: mid - size,
            high: mid + size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioKpis {
    pub npv: Money,
    /// None when the IRR is undefined
    pub irr: Option<Rate>,
    pub payback_period: Decimal,
}

impl ScenarioKpis {
    fn zero() -> Self {
        Self {
            npv: Decimal::ZERO,
            irr: None,
            payback_period: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub base: ScenarioKpis,
    pub best: ScenarioKpis,
    pub worst: ScenarioKpis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTornadoEntry {
    pub variable: ScenarioVariable,
    /// Change in NPV versus base, in percent of base NPV
    pub low_impact: Decimal,
    pub high_impact: Decimal,
    pub low_npv: Money,
    pub high_npv: Money,
    pub base_npv: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSensitivity {
    pub tornado_data: Vec<ScenarioTornadoEntry>,
    pub sensitivity_matrix: Vec<SensitivityRow>,
}

/// Best/worst drivers and the ranges swept for the NPV tornado.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioSettings {
    pub best: ScenarioAdjustments,
    pub worst: ScenarioAdjustments,
    pub sensitivity_ranges: BTreeMap<ScenarioVariable, SensitivityRange>,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        let ranges = [
            (ScenarioVariable::RevenueGrowth, dec!(-10), dec!(20)),
            (ScenarioVariable::OperatingMargin, dec!(-5), dec!(5)),
            (ScenarioVariable::Capex, dec!(-20), dec!(20)),
            (ScenarioVariable::TaxRate, dec!(-5), dec!(5)),
        ];
        Self {
            best: ScenarioAdjustments {
                revenue_growth: dec!(10),
                operating_margin: dec!(5),
                capex: dec!(-10),
                tax_rate: dec!(-2),
            },
            worst: ScenarioAdjustments {
                revenue_growth: dec!(-10),
                operating_margin: dec!(-5),
                capex: dec!(20),
                tax_rate: dec!(2),
            },
            sensitivity_ranges: ranges
                .into_iter()
                .map(|(variable, low, high)| (variable, SensitivityRange { low, high }))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario mechanics
// ---------------------------------------------------------------------------

fn adjust_year(
    base: &ForecastYear,
    previous_revenue: Option<Money>,
    adjustments: &ScenarioAdjustments,
) -> ForecastYear {
    let mut year = base.clone();

    if let Some(previous) = previous_revenue {
        year.revenue = (previous * (Decimal::ONE + percent(adjustments.revenue_growth)))
            .max(Decimal::ZERO);
    }

    if year.revenue > Decimal::ZERO {
        let base_costs = base.cogs + base.operating_expenses + base.depreciation;
        let base_margin = if base.revenue > Decimal::ZERO {
            (base.revenue - base_costs) / base.revenue
        } else {
            Decimal::ZERO
        };
        let target_margin = (base_margin + percent(adjustments.operating_margin))
            .clamp(MARGIN_FLOOR, MARGIN_CAP);
        let reduction = base_costs - year.revenue * (Decimal::ONE - target_margin);
        if !reduction.is_zero() {
            year.cogs = (base.cogs - reduction * COGS_SHARE).max(Decimal::ZERO);
            year.operating_expenses = (base.operating_expenses - reduction * OPEX_SHARE).max(Decimal::ZERO);
        }
        year.capex = (year.depreciation * (Decimal::ONE + percent(adjustments.capex))).max(Decimal::ZERO);
    } else {
        year.capex = base.capex * (Decimal::ONE + percent(adjustments.capex));
    }

    year.tax_rate = (base.tax_rate + percent(adjustments.tax_rate)).clamp(Decimal::ZERO, Decimal::ONE);
    year.gross_profit = year.revenue - year.cogs;
    year.ebit = year.gross_profit - year.operating_expenses - year.depreciation;
    year.ebt = year.ebit + year.other_income - year.interest_expense;
    year.tax_expense = (year.ebt * year.tax_rate).max(Decimal::ZERO);
    year.net_income = year.ebt - year.tax_expense;
    year.free_cash_flow =
        year.net_income + year.depreciation - year.capex - year.change_in_working_capital;
    year
}

/// Apply driver adjustments year by year. Revenue compounds from the first
/// forecast year, which keeps its own revenue.
pub fn apply_scenario(
    forecast: &[ForecastYear],
    adjustments: &ScenarioAdjustments,
) -> Vec<ForecastYear> {
    let mut adjusted: Vec<ForecastYear> = Vec::with_capacity(forecast.len());
    for base in forecast {
        let previous = adjusted.last().map(|y| y.revenue);
        adjusted.push(adjust_year(base, previous, adjustments));
    }
    debug!(
        fcf = ?adjusted.iter().map(|y| y.free_cash_flow).collect::<Vec<_>>(),
        "scenario applied"
    );
    adjusted
}

/// Years until cumulative FCF covers the first year's outflow; zero when the
/// first year is not an outflow.
fn investment_payback(fcf: &[Money]) -> Decimal {
    let investment = match fcf.first() {
        Some(first) if *first < Decimal::ZERO => -*first,
        _ => return Decimal::ZERO,
    };
    let mut cumulative = Decimal::ZERO;
    for (i, cf) in fcf.iter().enumerate() {
        cumulative += cf;
        if cumulative >= investment {
            return Decimal::from(i as u64 + 1);
        }
    }
    PAYBACK_NEVER
}

/// NPV (forecast FCF plus perpetuity terminal value, first year at t=0),
/// IRR over the same flows, and payback.
pub fn scenario_kpis(
    forecast: &[ForecastYear],
    discount_rate: Rate,
    terminal_growth: Rate,
) -> ProFormaResult<ScenarioKpis> {
    let fcf: Vec<Money> = forecast.iter().map(|y| y.free_cash_flow).collect();
    let Some(&last) = fcf.last() else {
        return Ok(ScenarioKpis::zero());
    };

    let mut flows = fcf.clone();
    flows.push(perpetuity_value(last, discount_rate, terminal_growth)?);

    Ok(ScenarioKpis {
        npv: npv(discount_rate, &flows)?,
        irr: irr(&flows),
        payback_period: investment_payback(&fcf),
    })
}

/// KPIs for the unadjusted forecast and for the best and worst adjustments.
pub fn scenario_comparison(
    forecast: &[ForecastYear],
    best: &ScenarioAdjustments,
    worst: &ScenarioAdjustments,
    discount_rate: Rate,
    terminal_growth: Rate,
) -> ProFormaResult<ScenarioComparison> {
    Ok(ScenarioComparison {
        base: scenario_kpis(forecast, discount_rate, terminal_growth)?,
        best: scenario_kpis(&apply_scenario(forecast, best), discount_rate, terminal_growth)?,
        worst: scenario_kpis(&apply_scenario(forecast, worst), discount_rate, terminal_growth)?,
    })
}

/// NPV tornado over driver ranges plus the WACC x growth heatmap.
pub fn sensitivity_analysis(
    cache: &mut DcfCache,
    forecast: &[ForecastYear],
    ranges: &BTreeMap<ScenarioVariable, SensitivityRange>,
    discount_rate: Rate,
    terminal_growth: Rate,
) -> ProFormaResult<ScenarioSensitivity> {
    if forecast.is_empty() {
        return Ok(ScenarioSensitivity {
            tornado_data: Vec::new(),
            sensitivity_matrix: Vec::new(),
        });
    }

    let base_npv = scenario_kpis(forecast, discount_rate, terminal_growth)?.npv;
    let impact = |value: Money| safe_divide((value - base_npv) * dec!(100), base_npv);

    let mut tornado_data = Vec::with_capacity(ranges.len());
    for (&variable, range) in ranges {
        let range = range.narrowed();
        let npv_at = |value: Decimal| -> ProFormaResult<Money> {
            let adjusted = apply_scenario(forecast, &ScenarioAdjustments::single(variable, value));
            Ok(scenario_kpis(&adjusted, discount_rate, terminal_growth)?.npv)
        };
        let low_npv = npv_at(range.low)?;
        let high_npv = npv_at(range.high)?;
        tornado_data.push(ScenarioTornadoEntry {
            variable,
            low_impact: impact(low_npv),
            high_impact: impact(high_npv),
            low_npv,
            high_npv,
            base_npv,
        });
    }
    tornado_data.sort_by(|a, b| {
        let spread = |e: &ScenarioTornadoEntry| (e.high_impact - e.low_impact).abs();
        spread(b).cmp(&spread(a))
    });

    let fcf: Vec<Money> = forecast.iter().map(|y| y.free_cash_flow).collect();
    let sensitivity_matrix = sensitivity_heatmap(cache, &fcf, discount_rate, terminal_growth)?;

    Ok(ScenarioSensitivity {
        tornado_data,
        sensitivity_matrix,
    })
}

// ---------------------------------------------------------------------------
// Forecast from statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub forecast: Vec<ForecastYear>,
    pub comparison: ScenarioComparison,
    pub best_forecast: Vec<ForecastYear>,
    pub worst_forecast: Vec<ForecastYear>,
    pub sensitivity: ScenarioSensitivity,
}

/// Forecast-year rows from a completed statement pipeline.
#[cfg(feature = "statements")]
pub fn forecast_from_pipeline(
    input: &ProFormaInput,
    pipeline: &StatementPipeline,
) -> ProFormaResult<Vec<ForecastYear>> {
    let income = pipeline.income.detail()?;
    let cash_flow = pipeline.cash_flow.detail()?;
    let p = &income.projection;
    let s = &income.summary;
    let years = &pipeline.income.statement.years;
    let tax_rate = input.tax_fraction();

    Ok((input.historical_len()..years.len())
        .map(|i| {
            let gross_profit = s.total_revenue[i] - s.total_cogs[i];
            ForecastYear {
                year: years[i].clone(),
                revenue: s.total_revenue[i],
                cogs: s.total_cogs[i],
                gross_profit,
                operating_expenses: s.operating_expenses[i],
                depreciation: s.depreciation[i],
                ebit: gross_profit - s.operating_expenses[i] - s.depreciation[i],
                other_income: p.other_income[i] - p.other_expenses[i] + s.investment_income[i],
                interest_expense: s.interest_expense[i],
                ebt: s.ebt[i],
                tax_rate,
                tax_expense: s.taxes[i],
                net_income: s.net_income[i],
                capex: cash_flow.capital_expenditures[i],
                change_in_working_capital: cash_flow.change_in_working_capital[i],
                free_cash_flow: cash_flow.free_cash_flow[i],
            }
        })
        .collect())
}

/// Statements, then base/best/worst KPIs and driver sensitivity.
#[cfg(feature = "statements")]
pub fn run_scenarios(
    input: &ProFormaInput,
    settings: &ScenarioSettings,
) -> ProFormaResult<ComputationOutput<ScenarioReport>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let pipeline = generator(CompanyType::Service).pipeline(input);
    let forecast = forecast_from_pipeline(input, &pipeline)?;
    if forecast.is_empty() {
        warnings.push("No forecast years; scenario KPIs are zero".to_string());
    }

    let wacc = input.discount_fraction();
    let growth = input.terminal_growth_fraction();
    let mut cache = DcfCache::new();

    let report = ScenarioReport {
        comparison: scenario_comparison(&forecast, &settings.best, &settings.worst, wacc, growth)?,
        best_forecast: apply_scenario(&forecast, &settings.best),
        worst_forecast: apply_scenario(&forecast, &settings.worst),
        sensitivity: sensitivity_analysis(
            &mut cache,
            &forecast,
            &settings.sensitivity_ranges,
            wacc,
            growth,
        )?,
        forecast,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Scenario comparison and driver sensitivity",
        &serde_json::json!({
            "discount_rate": wacc.to_string(),
            "terminal_growth": growth.to_string(),
            "settings": settings,
        }),
        warnings,
        elapsed,
        report,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_year(revenue: Money) -> ForecastYear {
        // 40% COGS, 30% opex, 10 depreciation: operating margin just under 30%.
        let cogs = revenue * dec!(0.4);
        let opex = revenue * dec!(0.3);
        let mut year = ForecastYear {
            year: "2025".into(),
            revenue,
            cogs,
            gross_profit: revenue - cogs,
            operating_expenses: opex,
            depreciation: dec!(10),
            tax_rate: dec!(0.25),
            capex: dec!(10),
            ..Default::default()
        };
        year.ebit = year.gross_profit - opex - year.depreciation;
        year.ebt = year.ebit;
        year.tax_expense = year.ebt * year.tax_rate;
        year.net_income = year.ebt - year.tax_expense;
        year.free_cash_flow = year.net_income;
        year
    }

    fn sample_forecast() -> Vec<ForecastYear> {
        vec![sample_year(dec!(1000)), sample_year(dec!(1100)), sample_year(dec!(1200))]
    }

    #[test]
    fn test_zero_adjustments_flatten_revenue_but_keep_first_year() {
        let adjusted = apply_scenario(&sample_forecast(), &ScenarioAdjustments::default());
        assert_eq!(adjusted[0].revenue, dec!(1000));
        assert_eq!(adjusted[0].free_cash_flow, sample_forecast()[0].free_cash_flow);
        assert_eq!(adjusted[2].revenue, dec!(1000));
    }

    #[test]
    fn test_revenue_growth_compounds() {
        let adj = ScenarioAdjustments::single(ScenarioVariable::RevenueGrowth, dec!(10));
        let adjusted = apply_scenario(&sample_forecast(), &adj);
        assert_eq!(adjusted[1].revenue, dec!(1100));
        assert_eq!(adjusted[2].revenue, dec!(1210));
    }

    #[test]
    fn test_revenue_floor() {
        let adj = ScenarioAdjustments::single(ScenarioVariable::RevenueGrowth, dec!(-150));
        let adjusted = apply_scenario(&sample_forecast(), &adj);
        assert_eq!(adjusted[1].revenue, Decimal::ZERO);
    }

    #[test]
    fn test_margin_adjustment_splits_costs() {
        let adj = ScenarioAdjustments::single(ScenarioVariable::OperatingMargin, dec!(10));
        let year = &apply_scenario(&sample_forecast(), &adj)[0];
        // Base margin 29%, target 39%: costs fall by 100, 60 from COGS and 40 from opex.
        assert_eq!(year.cogs, dec!(340));
        assert_eq!(year.operating_expenses, dec!(260));
        assert_eq!(year.ebit, dec!(390));
    }

    #[test]
    fn test_margin_clamped() {
        let adj = ScenarioAdjustments::single(ScenarioVariable::OperatingMargin, dec!(90));
        let year = &apply_scenario(&sample_forecast(), &adj)[0];
        assert_eq!(year.ebit / year.revenue, dec!(0.95));
    }

    #[test]
    fn test_capex_and_tax() {
        let adj = ScenarioAdjustments {
            capex: dec!(50),
            tax_rate: dec!(100),
            ..Default::default()
        };
        let year = &apply_scenario(&sample_forecast(), &adj)[0];
        assert_eq!(year.capex, dec!(15));
        assert_eq!(year.tax_rate, Decimal::ONE);
        assert_eq!(year.net_income, Decimal::ZERO);
        assert_eq!(year.free_cash_flow, dec!(-5));
    }

    #[test]
    fn test_kpis_and_empty_forecast() {
        let kpis = scenario_kpis(&sample_forecast(), dec!(0.10), dec!(0.02)).unwrap();
        assert!(kpis.npv > Decimal::ZERO);
        assert_eq!(kpis.irr, None);
        assert_eq!(kpis.payback_period, Decimal::ZERO);

        let empty = scenario_kpis(&[], dec!(0.10), dec!(0.02)).unwrap();
        assert_eq!(empty, ScenarioKpis::zero());
    }

    #[test]
    fn test_investment_payback() {
        assert_eq!(investment_payback(&[dec!(-100), dec!(150), dec!(60)]), dec!(3));
        assert_eq!(investment_payback(&[dec!(-100), dec!(10)]), PAYBACK_NEVER);
    }

    #[test]
    fn test_best_beats_worst() {
        let settings = ScenarioSettings::default();
        let cmp = scenario_comparison(
            &sample_forecast(),
            &settings.best,
            &settings.worst,
            dec!(0.10),
            dec!(0.02),
        )
        .unwrap();
        assert!(cmp.best.npv > cmp.worst.npv);
    }

    #[test]
    fn test_sensitivity_tornado_sorted() {
        let mut cache = DcfCache::new();
        let settings = ScenarioSettings::default();
        let result = sensitivity_analysis(
            &mut cache,
            &sample_forecast(),
            &settings.sensitivity_ranges,
            dec!(0.10),
            dec!(0.02),
        )
        .unwrap();
        assert_eq!(result.tornado_data.len(), 4);
        let spreads: Vec<Decimal> = result
            .tornado_data
            .iter()
            .map(|e| (e.high_impact - e.low_impact).abs())
            .collect();
        assert!(spreads.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(result.sensitivity_matrix.len(), 3);
    }

    #[test]
    fn test_narrowed_range() {
        let r = SensitivityRange { low: dec!(-10), high: dec!(20) }.narrowed();
        assert_eq!(r.low, dec!(-4));
        assert_eq!(r.high, dec!(14));
    }
}
