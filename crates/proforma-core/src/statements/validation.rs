use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::input::{record_for_year, ProFormaInput};

const GROWTH_WARNING_THRESHOLD: Decimal = dec!(100);

/// Upfront input checks. Errors block statement generation; warnings do not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate_historical_data(input: &ProFormaInput) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if input.historical_services.is_empty() {
        errors.push("Historical services data is required".to_string());
    } else {
        for idx in 0..input.historical_len() {
            if record_for_year(&input.historical_services, idx).is_none() {
                errors.push(format!("Missing services data for year {}", idx + 1));
            }
        }
    }

    for (idx, group) in input.historical_services.iter().enumerate() {
        let year = if group.year > 0 { group.year as usize } else { idx + 1 };
        for service in &group.services {
            if service.historical_revenue < Decimal::ZERO {
                errors.push(format!(
                    "Revenue cannot be negative in year {year}, service {}",
                    service.name
                ));
            }
            if service.cost < Decimal::ZERO {
                errors.push(format!(
                    "Cost cannot be negative in year {year}, service {}",
                    service.name
                ));
            }
        }
    }

    if input.revenue_growth_rate > GROWTH_WARNING_THRESHOLD {
        warnings.push("Revenue growth rate seems unusually high".to_string());
    }
    if input.expense_growth_rate > GROWTH_WARNING_THRESHOLD {
        warnings.push("Expense growth rate seems unusually high".to_string());
    }

    if !errors.is_empty() {
        warn!(errors = ?errors, "historical data failed validation");
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}
