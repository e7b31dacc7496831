use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProFormaError;
use crate::input::{items_for_year, ProFormaInput, YearRecord};
use crate::types::{
    checked_product, compound, normalize_length, percent, safe_divide, zeros, Money, YearSeries,
};
use crate::ProFormaResult;

const CAC_EFFICIENCY_CAP: Decimal = dec!(2);
const DEFAULT_COGS_RATIO: Decimal = dec!(0.5);
/// Largest magnitude any projected line may reach.
pub const MAX_PROJECTED_VALUE: Decimal = dec!(1000000000000000000);

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A series tagged with the service or category it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    pub values: YearSeries,
}

/// Every projected series the statements are assembled from.
///
/// All series have length `years_in_business + forecast_years`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub revenue: YearSeries,
    pub customers: YearSeries,
    pub service_breakdown: Vec<NamedSeries>,
    pub cogs: YearSeries,
    pub operating_expenses: YearSeries,
    pub expense_breakdown: Vec<NamedSeries>,
    pub depreciation: YearSeries,
    pub other_income: YearSeries,
    pub other_expenses: YearSeries,
    pub investment_income: YearSeries,
    pub interest_expense: YearSeries,
    pub owner_drawings: YearSeries,
}

impl Projection {
    fn series(&self) -> [(&'static str, &YearSeries); 10] {
        [
            ("revenue", &self.revenue),
            ("customers", &self.customers),
            ("cogs", &self.cogs),
            ("operatingExpenses", &self.operating_expenses),
            ("depreciation", &self.depreciation),
            ("otherIncome", &self.other_income),
            ("otherExpenses", &self.other_expenses),
            ("investmentIncome", &self.investment_income),
            ("interestExpense", &self.interest_expense),
            ("ownerDrawings", &self.owner_drawings),
        ]
    }

    /// Reject projections too large to carry through the statements.
    pub fn ensure_in_range(&self) -> ProFormaResult<()> {
        for (field, series) in self.series() {
            if series.iter().any(|v| v.abs() > MAX_PROJECTED_VALUE) {
                return Err(out_of_range(field));
            }
        }
        Ok(())
    }
}

fn out_of_range(field: &str) -> ProFormaError {
    ProFormaError::InvalidInput {
        field: field.to_string(),
        reason: "projected values exceed the supported range".into(),
    }
}

#[derive(Debug, Clone)]
pub struct RevenueProjection {
    pub revenue: YearSeries,
    pub customers: YearSeries,
    pub service_breakdown: Vec<NamedSeries>,
}

#[derive(Debug, Clone)]
pub struct ExpenseProjection {
    pub total: YearSeries,
    pub breakdown: Vec<NamedSeries>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn named_entry<'a>(entries: &'a mut Vec<NamedSeries>, name: &str, len: usize) -> &'a mut YearSeries {
    let idx = match entries.iter().position(|e| e.name == name) {
        Some(idx) => idx,
        None => {
            entries.push(NamedSeries {
                name: name.to_string(),
                values: zeros(len),
            });
            entries.len() - 1
        }
    };
    &mut entries[idx].values
}

/// Sum a per-item amount over each historical year, then repeat the last
/// historical value across the forecast.
pub(crate) fn flat_line_from_records<R, F>(records: &[R], input: &ProFormaInput, amount: F) -> YearSeries
where
    R: YearRecord,
    F: Fn(&R::Item) -> Money,
{
    let hist = input.historical_len();
    let mut series = zeros(input.total_years());
    for (idx, slot) in series.iter_mut().enumerate().take(hist) {
        *slot = items_for_year(records, idx).iter().map(&amount).sum();
    }
    if hist > 0 {
        let last = series[hist - 1];
        for slot in series.iter_mut().skip(hist) {
            *slot = last;
        }
    }
    series
}

// ---------------------------------------------------------------------------
// Revenue
// ---------------------------------------------------------------------------

/// Customer-driven revenue projection with seasonality and a team-capacity ceiling.
pub fn project_revenue(input: &ProFormaInput) -> ProFormaResult<RevenueProjection> {
    let hist = input.historical_len();
    let total_years = input.total_years();
    let model = &input.service_business_model;

    let retention = percent(model.client_retention_rate);
    let cac = model.client_acquisition_cost;
    let clv = model.customer_lifetime_value;
    let expansion = percent(model.expansion_revenue_percent);
    let seasonality = percent(model.seasonality_factor);
    let utilization = percent(model.utilization_rate);
    let team_size = model.team_size;
    let team_growth = percent(model.team_growth_rate);
    let customer_growth = input.customer_growth();
    let revenue_growth = input.revenue_growth();

    let mut revenue = Vec::with_capacity(total_years);
    let mut customers = Vec::with_capacity(total_years);
    let mut breakdown: Vec<NamedSeries> = Vec::new();

    for idx in 0..hist {
        let mut year_revenue = Decimal::ZERO;
        let mut year_customers = Decimal::ZERO;
        for service in items_for_year(&input.historical_services, idx) {
            year_revenue += service.historical_revenue;
            year_customers += service.historical_clients;
            named_entry(&mut breakdown, &service.name, total_years)[idx] += service.historical_revenue;
        }
        revenue.push(year_revenue);
        customers.push(year_customers);
    }

    let last_hist_revenue = revenue.last().copied().unwrap_or(Decimal::ZERO);
    let mut base_revenue = last_hist_revenue;
    let mut base_customers = customers.last().copied().unwrap_or(Decimal::ZERO);

    let mul = |a: Decimal, b: Decimal| checked_product(a, b, "revenue");
    let div = |a: Decimal, b: Decimal| a.checked_div(b).ok_or_else(|| out_of_range("revenue"));

    for f in 1..=input.forecast_years {
        let (mut projected, projected_customers) = if base_customers > Decimal::ZERO
            && base_revenue > Decimal::ZERO
        {
            let retained = mul(base_customers, retention)?;
            let new_customers = if cac > Decimal::ZERO && clv > Decimal::ZERO {
                mul(
                    mul(base_customers, customer_growth)?,
                    div(clv, cac)?.min(CAC_EFFICIENCY_CAP),
                )?
            } else {
                mul(base_customers, customer_growth)?
            };
            let per_customer = div(base_revenue, base_customers)?;
            let demand = mul(mul(retained, per_customer)?, Decimal::ONE + expansion)?
                .checked_add(mul(new_customers, per_customer)?)
                .ok_or_else(|| out_of_range("revenue"))?;
            let customers = retained
                .checked_add(new_customers)
                .ok_or_else(|| out_of_range("customers"))?;
            (demand, customers)
        } else {
            (mul(base_revenue, Decimal::ONE + revenue_growth)?, base_customers)
        };

        let parity = Decimal::from(f % 2);
        projected = mul(
            projected,
            Decimal::ONE + seasonality * (dec!(0.5) - parity * dec!(0.5)),
        )?;

        if team_size > Decimal::ZERO && utilization > Decimal::ZERO {
            let capacity = mul(
                mul(compound(team_size, team_growth, f)?, div(base_revenue, team_size)?)?,
                utilization,
            )?;
            if capacity > Decimal::ZERO {
                projected = projected.min(capacity);
            }
        }

        debug!(
            forecast_year = f,
            revenue = %projected,
            customers = %projected_customers,
            "projected revenue"
        );

        revenue.push(projected);
        customers.push(projected_customers);
        base_revenue = projected;
        base_customers = projected_customers;

        if hist > 0 && projected > Decimal::ZERO {
            let year_idx = hist + f as usize - 1;
            for entry in breakdown.iter_mut() {
                let last_share = entry.values[hist - 1];
                if last_share > Decimal::ZERO {
                    entry.values[year_idx] = projected * safe_divide(last_share, last_hist_revenue);
                }
            }
        }
    }

    Ok(RevenueProjection {
        revenue: normalize_length(revenue, total_years),
        customers: normalize_length(customers, total_years),
        service_breakdown: breakdown,
    })
}

// ---------------------------------------------------------------------------
// Costs
// ---------------------------------------------------------------------------

/// Historical direct costs, then forecast COGS at the average historical margin.
pub fn project_cogs(input: &ProFormaInput, revenue: &[Money]) -> YearSeries {
    let hist = input.historical_len();
    let mut cogs: YearSeries = (0..hist)
        .map(|idx| {
            items_for_year(&input.historical_services, idx)
                .iter()
                .map(|s| s.cost)
                .sum()
        })
        .collect();

    let margins: Vec<Decimal> = revenue
        .iter()
        .take(hist)
        .zip(cogs.iter())
        .filter(|(r, _)| **r > Decimal::ZERO)
        .map(|(r, c)| (r - c) / r)
        .collect();

    let cost_ratio = if margins.is_empty() {
        DEFAULT_COGS_RATIO
    } else {
        let avg = margins.iter().sum::<Decimal>() / Decimal::from(margins.len() as u64);
        Decimal::ONE - avg
    };

    for idx in hist..input.total_years() {
        let r = revenue.get(idx).copied().unwrap_or(Decimal::ZERO);
        cogs.push(r * cost_ratio);
    }

    normalize_length(cogs, input.total_years())
}

/// Operating expenses grown from the last historical total, with category shares held.
pub fn project_operating_expenses(input: &ProFormaInput) -> ProFormaResult<ExpenseProjection> {
    let hist = input.historical_len();
    let total_years = input.total_years();
    let growth = input.expense_growth();

    let mut total = Vec::with_capacity(total_years);
    let mut breakdown: Vec<NamedSeries> = Vec::new();

    for idx in 0..hist {
        let mut year_total = Decimal::ZERO;
        for expense in items_for_year(&input.historical_expenses, idx) {
            year_total += expense.historical_amount;
            named_entry(&mut breakdown, &expense.category, total_years)[idx] +=
                expense.historical_amount;
        }
        total.push(year_total);
    }

    let base = total.last().copied().unwrap_or(Decimal::ZERO);
    for offset in 0..input.forecast_years {
        let projected = compound(base, growth, offset + 1)?;
        total.push(projected);

        if hist > 0 {
            let year_idx = hist + offset as usize;
            for entry in breakdown.iter_mut() {
                let last = entry.values[hist - 1];
                if last > Decimal::ZERO {
                    entry.values[year_idx] = projected * safe_divide(last, base);
                }
            }
        }
    }

    Ok(ExpenseProjection {
        total: normalize_length(total, total_years),
        breakdown,
    })
}

// ---------------------------------------------------------------------------
// Flat-lined series
// ---------------------------------------------------------------------------

pub fn project_depreciation(input: &ProFormaInput) -> YearSeries {
    flat_line_from_records(&input.historical_equipment, input, |e| e.annual_depreciation())
}

/// Other operating income and expenses, in that order.
pub fn project_other(input: &ProFormaInput) -> (YearSeries, YearSeries) {
    let income = flat_line_from_records(&input.historical_other, input, |o| {
        if o.is_income {
            o.amount
        } else {
            Decimal::ZERO
        }
    });
    let expenses = flat_line_from_records(&input.historical_other, input, |o| {
        if o.is_income {
            Decimal::ZERO
        } else {
            o.amount
        }
    });
    (income, expenses)
}

pub fn project_investment_income(input: &ProFormaInput) -> YearSeries {
    flat_line_from_records(&input.historical_investments, input, |i| i.annual_income())
}

pub fn project_interest_expense(input: &ProFormaInput) -> YearSeries {
    flat_line_from_records(&input.historical_loans, input, |l| l.annual_interest())
}

pub fn project_owner_drawings(input: &ProFormaInput) -> YearSeries {
    vec![input.owner_drawings.annual_amount(); input.total_years()]
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run every projection for the model horizon.
pub fn project(input: &ProFormaInput) -> ProFormaResult<Projection> {
    if input.total_years() == 0 {
        return Err(ProFormaError::InvalidInput {
            field: "yearsInBusiness".into(),
            reason: "Model horizon must cover at least one year".into(),
        });
    }
    if input.historical_services.is_empty() {
        return Err(ProFormaError::InsufficientData(
            "No historical service records to project from".into(),
        ));
    }

    let revenue = project_revenue(input)?;
    let cogs = project_cogs(input, &revenue.revenue);
    let expenses = project_operating_expenses(input)?;
    let (other_income, other_expenses) = project_other(input);

    let projection = Projection {
        cogs,
        operating_expenses: expenses.total,
        expense_breakdown: expenses.breakdown,
        depreciation: project_depreciation(input),
        other_income,
        other_expenses,
        investment_income: project_investment_income(input),
        interest_expense: project_interest_expense(input),
        owner_drawings: project_owner_drawings(input),
        revenue: revenue.revenue,
        customers: revenue.customers,
        service_breakdown: revenue.service_breakdown,
    };
    projection.ensure_in_range()?;
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_input() -> ProFormaInput {
        serde_json::from_value(json!({
            "yearsInBusiness": 2,
            "forecastYears": 3,
            "revenueGrowthRate": 10,
            "expenseGrowthRate": 10,
            "historicalServices": [
                { "year": 1, "services": [
                    { "name": "Consulting", "historicalRevenue": 80000, "cost": 30000 },
                    { "name": "Training", "historicalRevenue": 20000, "cost": 10000 }
                ]},
                { "year": 2, "services": [
                    { "name": "Consulting", "historicalRevenue": 90000, "cost": 36000 },
                    { "name": "Training", "historicalRevenue": 30000, "cost": 12000 }
                ]}
            ],
            "historicalExpenses": [
                { "year": 1, "expenses": [{ "category": "rent", "historicalAmount": 20000 }] },
                { "year": 2, "expenses": [
                    { "category": "rent", "historicalAmount": 24000 },
                    { "category": "software", "historicalAmount": 6000 }
                ]}
            ],
            "historicalEquipment": [
                { "year": 2, "equipment": [{ "cost": 10000, "usefulLife": 5 }] }
            ],
            "serviceBusinessModel": { "seasonalityFactor": 0, "teamSize": 0 }
        }))
        .unwrap()
    }

    #[test]
    fn test_revenue_falls_back_to_growth_without_customers() {
        let rev = project_revenue(&sample_input()).unwrap();
        assert_eq!(rev.revenue[0], dec!(100000));
        assert_eq!(rev.revenue[1], dec!(120000));
        assert_eq!(rev.revenue[2], dec!(132000.0));
        assert_eq!(rev.revenue[3], dec!(145200.00));
        assert_eq!(rev.revenue.len(), 5);
    }

    #[test]
    fn test_revenue_customer_model() {
        let mut input = sample_input();
        input.customer_growth_rate = dec!(10);
        input.service_business_model.client_retention_rate = dec!(80);
        input.service_business_model.expansion_revenue_percent = dec!(0);
        for year in input.historical_services.iter_mut() {
            for s in year.services.iter_mut() {
                s.historical_clients = dec!(10);
            }
        }
        let rev = project_revenue(&input).unwrap();
        // 20 customers at 6000 each: 16 retained + 2 new
        assert_eq!(rev.customers[2], dec!(18.0));
        assert_eq!(rev.revenue[2], dec!(108000));
    }

    #[test]
    fn test_capacity_ceiling_applies() {
        let mut input = sample_input();
        input.service_business_model.team_size = dec!(10);
        input.service_business_model.team_growth_rate = dec!(0);
        input.service_business_model.utilization_rate = dec!(50);
        let rev = project_revenue(&input).unwrap();
        assert_eq!(rev.revenue[2], dec!(60000));
    }

    #[test]
    fn test_seasonality_on_even_forecast_years() {
        let mut input = sample_input();
        input.service_business_model.seasonality_factor = dec!(20);
        input.revenue_growth_rate = dec!(0);
        let rev = project_revenue(&input).unwrap();
        assert_eq!(rev.revenue[2], dec!(120000));
        assert_eq!(rev.revenue[3], dec!(132000));
    }

    #[test]
    fn test_service_breakdown_pro_rata() {
        let rev = project_revenue(&sample_input()).unwrap();
        let consulting = &rev.service_breakdown[0];
        assert_eq!(consulting.name, "Consulting");
        assert_eq!(consulting.values[2], dec!(99000));
    }

    #[test]
    fn test_cogs_uses_average_margin() {
        let input = sample_input();
        let rev = project_revenue(&input).unwrap();
        let cogs = project_cogs(&input, &rev.revenue);
        // margins 0.60 and 0.60
        assert_eq!(cogs[0], dec!(40000));
        assert_eq!(cogs[2], dec!(52800.00));
    }

    #[test]
    fn test_cogs_default_ratio_without_revenue() {
        let mut input = sample_input();
        input.historical_services.clear();
        let cogs = project_cogs(&input, &[dec!(0), dec!(0), dec!(100), dec!(100), dec!(100)]);
        assert_eq!(cogs[2], dec!(50.0));
    }

    #[test]
    fn test_expense_growth_and_category_shares() {
        let exp = project_operating_expenses(&sample_input()).unwrap();
        assert_eq!(exp.total[1], dec!(30000));
        assert_eq!(exp.total[2], dec!(33000.0));
        let rent = exp.breakdown.iter().find(|e| e.name == "rent").unwrap();
        assert_eq!(rent.values[2], dec!(26400.0));
    }

    #[test]
    fn test_flat_line_depreciation() {
        let dep = project_depreciation(&sample_input());
        assert_eq!(dep, vec![dec!(0), dec!(2000), dec!(2000), dec!(2000), dec!(2000)]);
    }

    #[test]
    fn test_project_requires_services() {
        let mut input = sample_input();
        input.historical_services.clear();
        assert!(project(&input).is_err());
    }

    #[test]
    fn test_runaway_revenue_growth_is_an_error() {
        let mut input = sample_input();
        input.revenue_growth_rate = dec!(1000);
        input.forecast_years = 30;
        let err = project_revenue(&input).unwrap_err();
        assert!(err.to_string().contains("representable range"));
    }

    #[test]
    fn test_runaway_expense_growth_is_an_error() {
        let mut input = sample_input();
        input.expense_growth_rate = dec!(1000);
        input.forecast_years = 30;
        assert!(project_operating_expenses(&input).is_err());
    }

    #[test]
    fn test_projection_beyond_supported_range_is_rejected() {
        let mut input = sample_input();
        input.revenue_growth_rate = dec!(1000);
        input.forecast_years = 16;
        assert!(project_revenue(&input).is_ok());
        let err = project(&input).unwrap_err();
        assert!(err.to_string().contains("supported range"));
    }
}
