use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::input::ProFormaInput;
use crate::types::{percent, safe_divide};

/// Service-business KPIs derived from the business model and raw history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetrics {
    pub client_retention_rate: Decimal,
    pub churn_rate: Decimal,
    pub utilization_rate: Decimal,
    pub team_size: Decimal,
    pub team_growth_rate: Decimal,
    pub seasonality_factor: Decimal,
    pub recurring_revenue_percent: Decimal,
    pub expansion_revenue_percent: Decimal,
    pub avg_project_duration: Decimal,
    pub cac_efficiency: Decimal,
    pub cac_payback_months: Decimal,
    pub revenue_per_employee: Decimal,
    pub avg_revenue_per_customer: Decimal,
    pub customer_concentration_risk: Decimal,
    pub capacity_efficiency: Decimal,
    pub team_productivity_score: Decimal,
    pub business_model_health_score: Decimal,
}

/// Averaged health factors relative to typical service-business baselines.
fn health_score(retention: Decimal, cac_efficiency: Decimal, recurring: Decimal, utilization: Decimal) -> Decimal {
    let factors: Vec<Decimal> = [
        (retention, (retention / dec!(85)).min(dec!(1.2))),
        (cac_efficiency, (cac_efficiency / dec!(3)).min(dec!(1.5))),
        (recurring, (recurring / dec!(60)).min(dec!(1.2))),
        (utilization, (utilization / dec!(75)).min(dec!(1.2))),
    ]
    .into_iter()
    .filter(|(driver, _)| *driver > Decimal::ZERO)
    .map(|(_, factor)| factor)
    .collect();

    if factors.is_empty() {
        dec!(0.5)
    } else {
        factors.iter().sum::<Decimal>() / Decimal::from(factors.len() as u64)
    }
}

pub fn company_metrics(input: &ProFormaInput) -> CompanyMetrics {
    let model = &input.service_business_model;
    let cac = model.client_acquisition_cost;
    let clv = model.customer_lifetime_value;

    let (cac_efficiency, cac_payback_months) = if cac > Decimal::ZERO && clv > Decimal::ZERO {
        (clv / cac, cac / (clv / dec!(12)))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let services = input.historical_services.iter().flat_map(|y| y.services.iter());
    let (total_revenue, total_customers) = services.fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(rev, clients), s| (rev + s.historical_revenue, clients + s.historical_clients),
    );

    let team_size = model.team_size;
    let utilization = model.utilization_rate;
    let (capacity_efficiency, team_productivity_score) =
        if utilization > Decimal::ZERO && team_size > Decimal::ZERO {
            (percent(utilization), percent(utilization * model.team_growth_rate))
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

    CompanyMetrics {
        client_retention_rate: model.client_retention_rate,
        churn_rate: model.churn_rate,
        utilization_rate: utilization,
        team_size,
        team_growth_rate: model.team_growth_rate,
        seasonality_factor: model.seasonality_factor,
        recurring_revenue_percent: model.recurring_revenue_percent,
        expansion_revenue_percent: model.expansion_revenue_percent,
        avg_project_duration: model.avg_project_duration,
        cac_efficiency,
        cac_payback_months,
        revenue_per_employee: safe_divide(total_revenue, team_size.max(Decimal::ZERO)),
        avg_revenue_per_customer: safe_divide(total_revenue, total_customers.max(Decimal::ZERO)),
        customer_concentration_risk: safe_divide(Decimal::ONE, total_customers.max(Decimal::ZERO)),
        capacity_efficiency,
        team_productivity_score,
        business_model_health_score: health_score(
            model.client_retention_rate,
            cac_efficiency,
            model.recurring_revenue_percent,
            utilization,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_input() -> ProFormaInput {
        serde_json::from_value(json!({
            "historicalServices": [
                { "year": 1, "services": [{ "name": "A", "historicalRevenue": 40000, "historicalClients": 10 }] },
                { "year": 2, "services": [{ "name": "A", "historicalRevenue": 60000, "historicalClients": 15 }] }
            ],
            "serviceBusinessModel": {
                "clientAcquisitionCost": 1000,
                "customerLifetimeValue": 6000,
                "teamSize": 5
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_derived_ratios() {
        let m = company_metrics(&sample_input());
        assert_eq!(m.cac_efficiency, dec!(6));
        assert_eq!(m.cac_payback_months, dec!(2));
        assert_eq!(m.revenue_per_employee, dec!(20000));
        assert_eq!(m.avg_revenue_per_customer, dec!(4000));
        assert_eq!(m.customer_concentration_risk, dec!(0.04));
        assert_eq!(m.capacity_efficiency, dec!(0.75));
        assert_eq!(m.team_productivity_score, dec!(15));
    }

    #[test]
    fn test_health_score_caps_factors() {
        let m = company_metrics(&sample_input());
        // 1.0 (retention) + 1.5 (capped cac) + 1.0 (recurring) + 1.0 (utilization)
        assert_eq!(m.business_model_health_score, dec!(1.125));
    }

    #[test]
    fn test_zero_denominators() {
        let mut input = sample_input();
        input.historical_services.clear();
        input.service_business_model.client_acquisition_cost = Decimal::ZERO;
        input.service_business_model.team_size = Decimal::ZERO;
        let m = company_metrics(&input);
        assert_eq!(m.cac_efficiency, Decimal::ZERO);
        assert_eq!(m.revenue_per_employee, Decimal::ZERO);
        assert_eq!(m.customer_concentration_risk, Decimal::ZERO);
        assert_eq!(m.capacity_efficiency, Decimal::ZERO);
    }

    #[test]
    fn test_neutral_health_score_without_drivers() {
        assert_eq!(health_score(dec!(0), dec!(0), dec!(0), dec!(0)), dec!(0.5));
    }
}
