use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{percent, Money, Rate};

// ---------------------------------------------------------------------------
// Lenient scalar parsing
// ---------------------------------------------------------------------------

/// Numeric fields arrive as JSON numbers, numeric strings, "" or null.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseScalar {
    Number(serde_json::Number),
    Bool(bool),
    Text(String),
}

fn parse_number(n: &serde_json::Number) -> Option<Decimal> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<LooseScalar> = Option::deserialize(deserializer)?;
    let value = match raw {
        None => None,
        Some(LooseScalar::Number(n)) => parse_number(&n),
        Some(LooseScalar::Bool(b)) => Some(if b { Decimal::ONE } else { Decimal::ZERO }),
        Some(LooseScalar::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                let value = Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .map_err(|_| {
                        serde::de::Error::custom(format!("'{trimmed}' is not a number"))
                    })?;
                Some(value)
            }
        }
    };
    Ok(value)
}

fn optional_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_decimal(deserializer)?.map(|d| d.trunc().max(Decimal::ZERO).to_u32().unwrap_or(0)))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<LooseScalar> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(LooseScalar::Bool(b)) => b,
        Some(LooseScalar::Number(n)) => parse_number(&n).is_some_and(|d| !d.is_zero()),
        Some(LooseScalar::Text(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        None => false,
    })
}

/// Generates a `default` function and a lenient deserializer that falls
/// back to the same value for "", null or a missing key.
macro_rules! decimal_default {
    ($default_fn:ident, $lenient_fn:ident, $value:expr) => {
        fn $default_fn() -> Decimal {
            $value
        }

        fn $lenient_fn<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
        where
            D: Deserializer<'de>,
        {
            Ok(optional_decimal(deserializer)?.unwrap_or($value))
        }
    };
}

macro_rules! count_default {
    ($default_fn:ident, $lenient_fn:ident, $value:expr) => {
        fn $default_fn() -> u32 {
            $value
        }

        fn $lenient_fn<'de, D>(deserializer: D) -> Result<u32, D::Error>
        where
            D: Deserializer<'de>,
        {
            Ok(optional_count(deserializer)?.unwrap_or($value))
        }
    };
}

decimal_default!(zero, lenient_zero, Decimal::ZERO);
decimal_default!(tax_default, lenient_tax, dec!(25));
decimal_default!(discount_default, lenient_discount, dec!(10));
decimal_default!(terminal_default, lenient_terminal, dec!(2));
decimal_default!(retention_default, lenient_retention, dec!(85));
decimal_default!(churn_default, lenient_churn, dec!(15));
decimal_default!(recurring_default, lenient_recurring, dec!(60));
decimal_default!(expansion_default, lenient_expansion, dec!(25));
decimal_default!(seasonality_default, lenient_seasonality, dec!(20));
decimal_default!(utilization_default, lenient_utilization, dec!(75));
decimal_default!(team_size_default, lenient_team_size, dec!(10));
decimal_default!(team_growth_default, lenient_team_growth, dec!(20));
decimal_default!(duration_default, lenient_duration, dec!(90));
decimal_default!(useful_life_default, lenient_useful_life, dec!(5));
decimal_default!(receivables_default, lenient_receivables, dec!(0.10));
decimal_default!(payables_default, lenient_payables, dec!(0.20));
decimal_default!(prepaid_default, lenient_prepaid, dec!(0.05));
decimal_default!(accrued_default, lenient_accrued, dec!(0.10));
decimal_default!(taxes_payable_default, lenient_taxes_payable, dec!(0.50));

count_default!(years_default, lenient_years, 3);
count_default!(forecast_default, lenient_forecast, 5);
count_default!(record_year_default, lenient_record_year, 0);

fn other_category() -> String {
    "Other".to_string()
}

fn unknown_service() -> String {
    "Unknown Service".to_string()
}

fn optional_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_decimal(deserializer)?.and_then(|d| d.trunc().to_i32()))
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Historical records plus forward assumptions for one service business.
///
/// Percentages are whole numbers (25 = 25%); the accessor methods return
/// them as fractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProFormaInput {
    #[serde(default = "years_default", deserialize_with = "lenient_years")]
    pub years_in_business: u32,
    #[serde(default = "forecast_default", deserialize_with = "lenient_forecast")]
    pub forecast_years: u32,
    #[serde(default = "tax_default", deserialize_with = "lenient_tax")]
    pub tax_rate: Decimal,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub self_funding: Money,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub revenue_growth_rate: Decimal,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub customer_growth_rate: Decimal,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub expense_growth_rate: Decimal,
    #[serde(default = "discount_default", deserialize_with = "lenient_discount")]
    pub discount_rate: Decimal,
    #[serde(default = "terminal_default", deserialize_with = "lenient_terminal")]
    pub terminal_growth: Decimal,
    /// Calendar year of the last historical year; the system clock when absent.
    #[serde(default, deserialize_with = "optional_year", skip_serializing_if = "Option::is_none")]
    pub current_year: Option<i32>,
    #[serde(default)]
    pub historical_services: Vec<ServiceYear>,
    #[serde(default)]
    pub historical_expenses: Vec<ExpenseYear>,
    #[serde(default)]
    pub historical_equipment: Vec<EquipmentYear>,
    #[serde(default)]
    pub historical_loans: Vec<LoanYear>,
    #[serde(default)]
    pub historical_other: Vec<OtherYear>,
    #[serde(default)]
    pub historical_investments: Vec<InvestmentYear>,
    #[serde(default)]
    pub owner_drawings: OwnerDrawings,
    #[serde(default)]
    pub service_business_model: ServiceBusinessModel,
    #[serde(default)]
    pub working_capital: WorkingCapitalPolicy,
}

impl Default for ProFormaInput {
    fn default() -> Self {
        Self {
            years_in_business: years_default(),
            forecast_years: forecast_default(),
            tax_rate: tax_default(),
            self_funding: Decimal::ZERO,
            revenue_growth_rate: Decimal::ZERO,
            customer_growth_rate: Decimal::ZERO,
            expense_growth_rate: Decimal::ZERO,
            discount_rate: discount_default(),
            terminal_growth: terminal_default(),
            current_year: None,
            historical_services: Vec::new(),
            historical_expenses: Vec::new(),
            historical_equipment: Vec::new(),
            historical_loans: Vec::new(),
            historical_other: Vec::new(),
            historical_investments: Vec::new(),
            owner_drawings: OwnerDrawings::default(),
            service_business_model: ServiceBusinessModel::default(),
            working_capital: WorkingCapitalPolicy::default(),
        }
    }
}

impl ProFormaInput {
    /// Historical plus forecast years.
    pub fn total_years(&self) -> usize {
        (self.years_in_business + self.forecast_years) as usize
    }

    pub fn historical_len(&self) -> usize {
        self.years_in_business as usize
    }

    pub fn tax_fraction(&self) -> Rate {
        percent(self.tax_rate)
    }

    pub fn revenue_growth(&self) -> Rate {
        percent(self.revenue_growth_rate)
    }

    pub fn customer_growth(&self) -> Rate {
        percent(self.customer_growth_rate)
    }

    pub fn expense_growth(&self) -> Rate {
        percent(self.expense_growth_rate)
    }

    pub fn discount_fraction(&self) -> Rate {
        percent(self.discount_rate)
    }

    pub fn terminal_growth_fraction(&self) -> Rate {
        percent(self.terminal_growth)
    }

    /// Year labels, oldest historical year first.
    pub fn year_labels(&self, current_year: i32) -> Vec<String> {
        let anchor = self.current_year.unwrap_or(current_year);
        let first = anchor - self.years_in_business as i32 + 1;
        (0..self.total_years())
            .map(|i| (first + i as i32).to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Historical records
// ---------------------------------------------------------------------------

/// A per-year group of historical records.
///
/// `year` is 1-based. Groups without a year are matched by position.
pub trait YearRecord {
    type Item;

    fn year(&self) -> u32;
    fn items(&self) -> &[Self::Item];
}

/// The record group for historical year index `idx` (0-based).
pub fn record_for_year<R: YearRecord>(records: &[R], idx: usize) -> Option<&R> {
    let year = idx as u32 + 1;
    records
        .iter()
        .find(|r| r.year() == year)
        .or_else(|| records.get(idx).filter(|r| r.year() == 0))
}

/// Items recorded for historical year index `idx`; empty when none exist.
pub fn items_for_year<R: YearRecord>(records: &[R], idx: usize) -> &[R::Item] {
    record_for_year(records, idx)
        .map(|r| r.items())
        .unwrap_or(&[])
}

macro_rules! year_record {
    ($group:ident, $field:ident, $item:ty) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct $group {
            #[serde(default = "record_year_default", deserialize_with = "lenient_record_year")]
            pub year: u32,
            #[serde(default)]
            pub $field: Vec<$item>,
        }

        impl YearRecord for $group {
            type Item = $item;

            fn year(&self) -> u32 {
                self.year
            }

            fn items(&self) -> &[$item] {
                &self.$field
            }
        }
    };
}

year_record!(ServiceYear, services, ServiceRecord);
year_record!(ExpenseYear, expenses, ExpenseRecord);
year_record!(EquipmentYear, equipment, EquipmentRecord);
year_record!(LoanYear, loans, LoanRecord);
year_record!(OtherYear, other, OtherRecord);
year_record!(InvestmentYear, investments, InvestmentRecord);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    #[serde(default = "unknown_service")]
    pub name: String,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub historical_revenue: Money,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub historical_clients: Decimal,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub cost: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    #[serde(default = "other_category")]
    pub category: String,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub historical_amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub cost: Money,
    #[serde(default = "useful_life_default", deserialize_with = "lenient_useful_life")]
    pub useful_life: Decimal,
}

impl EquipmentRecord {
    /// Straight-line annual depreciation; zero when the useful life is not positive.
    pub fn annual_depreciation(&self) -> Money {
        if self.useful_life > Decimal::ZERO {
            self.cost / self.useful_life
        } else {
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub amount: Money,
    /// Annual interest rate in percent.
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub rate: Decimal,
    #[serde(default, deserialize_with = "optional_decimal", skip_serializing_if = "Option::is_none")]
    pub years: Option<Decimal>,
    #[serde(default, deserialize_with = "optional_decimal", skip_serializing_if = "Option::is_none")]
    pub term: Option<Decimal>,
}

impl LoanRecord {
    /// Term in years: `years`, then `term`, then 1.
    pub fn term_years(&self) -> Decimal {
        self.years.or(self.term).unwrap_or(Decimal::ONE)
    }

    pub fn is_short_term(&self) -> bool {
        self.term_years() <= Decimal::ONE
    }

    pub fn annual_interest(&self) -> Money {
        self.amount * percent(self.rate)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub amount: Money,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_income: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub amount: Money,
    /// Whether the holding produces income.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub income: bool,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub income_amount: Money,
}

impl InvestmentRecord {
    pub fn annual_income(&self) -> Money {
        if self.income {
            self.income_amount
        } else {
            Decimal::ZERO
        }
    }
}

// ---------------------------------------------------------------------------
// Owner drawings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawingFrequency {
    #[default]
    Annual,
    Monthly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerDrawings {
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub amount: Money,
    #[serde(default, deserialize_with = "lenient_frequency")]
    pub frequency: DrawingFrequency,
}

/// Anything other than "monthly" is treated as annual.
fn lenient_frequency<'de, D>(deserializer: D) -> Result<DrawingFrequency, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw.as_deref().map(str::trim) {
        Some(f) if f.eq_ignore_ascii_case("monthly") => DrawingFrequency::Monthly,
        _ => DrawingFrequency::Annual,
    })
}

impl OwnerDrawings {
    pub fn annual_amount(&self) -> Money {
        match self.frequency {
            DrawingFrequency::Monthly => self.amount * dec!(12),
            DrawingFrequency::Annual => self.amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Service business model
// ---------------------------------------------------------------------------

/// Customer, capacity and seasonality drivers. Percentages are whole numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBusinessModel {
    #[serde(default = "retention_default", deserialize_with = "lenient_retention")]
    pub client_retention_rate: Decimal,
    #[serde(default = "churn_default", deserialize_with = "lenient_churn")]
    pub churn_rate: Decimal,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub client_acquisition_cost: Money,
    #[serde(default = "zero", deserialize_with = "lenient_zero")]
    pub customer_lifetime_value: Money,
    #[serde(default = "recurring_default", deserialize_with = "lenient_recurring")]
    pub recurring_revenue_percent: Decimal,
    #[serde(default = "expansion_default", deserialize_with = "lenient_expansion")]
    pub expansion_revenue_percent: Decimal,
    #[serde(default = "seasonality_default", deserialize_with = "lenient_seasonality")]
    pub seasonality_factor: Decimal,
    #[serde(default = "utilization_default", deserialize_with = "lenient_utilization")]
    pub utilization_rate: Decimal,
    #[serde(default = "team_size_default", deserialize_with = "lenient_team_size")]
    pub team_size: Decimal,
    #[serde(default = "team_growth_default", deserialize_with = "lenient_team_growth")]
    pub team_growth_rate: Decimal,
    #[serde(
        default = "duration_default",
        deserialize_with = "lenient_duration",
        alias = "averageProjectDuration"
    )]
    pub avg_project_duration: Decimal,
}

impl Default for ServiceBusinessModel {
    fn default() -> Self {
        Self {
            client_retention_rate: retention_default(),
            churn_rate: churn_default(),
            client_acquisition_cost: Decimal::ZERO,
            customer_lifetime_value: Decimal::ZERO,
            recurring_revenue_percent: recurring_default(),
            expansion_revenue_percent: expansion_default(),
            seasonality_factor: seasonality_default(),
            utilization_rate: utilization_default(),
            team_size: team_size_default(),
            team_growth_rate: team_growth_default(),
            avg_project_duration: duration_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Working capital
// ---------------------------------------------------------------------------

/// Balance-sheet working-capital proxies, as fractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingCapitalPolicy {
    #[serde(default = "receivables_default", deserialize_with = "lenient_receivables")]
    pub receivables_pct_revenue: Rate,
    #[serde(default = "payables_default", deserialize_with = "lenient_payables")]
    pub payables_pct_expenses: Rate,
    #[serde(default = "prepaid_default", deserialize_with = "lenient_prepaid")]
    pub prepaid_pct_expenses: Rate,
    #[serde(default = "accrued_default", deserialize_with = "lenient_accrued")]
    pub accrued_pct_expenses: Rate,
    #[serde(default = "taxes_payable_default", deserialize_with = "lenient_taxes_payable")]
    pub taxes_payable_pct_provision: Rate,
}

impl Default for WorkingCapitalPolicy {
    fn default() -> Self {
        Self {
            receivables_pct_revenue: receivables_default(),
            payables_pct_expenses: payables_default(),
            prepaid_pct_expenses: prepaid_default(),
            accrued_pct_expenses: accrued_default(),
            taxes_payable_pct_provision: taxes_payable_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_missing_keys_take_defaults() {
        let input: ProFormaInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(input.years_in_business, 3);
        assert_eq!(input.forecast_years, 5);
        assert_eq!(input.tax_rate, dec!(25));
        assert_eq!(input.discount_rate, dec!(10));
        assert_eq!(input.terminal_growth, dec!(2));
        assert_eq!(input.service_business_model.client_retention_rate, dec!(85));
        assert_eq!(input.working_capital.receivables_pct_revenue, dec!(0.10));
    }

    #[test]
    fn test_numeric_strings_and_blanks() {
        let input: ProFormaInput = serde_json::from_value(json!({
            "yearsInBusiness": "2",
            "forecastYears": 4,
            "taxRate": "",
            "selfFunding": "15000.50",
            "discountRate": null,
            "serviceBusinessModel": { "teamSize": "8", "utilizationRate": "" }
        }))
        .unwrap();
        assert_eq!(input.years_in_business, 2);
        assert_eq!(input.forecast_years, 4);
        assert_eq!(input.tax_rate, dec!(25));
        assert_eq!(input.self_funding, dec!(15000.50));
        assert_eq!(input.discount_rate, dec!(10));
        assert_eq!(input.service_business_model.team_size, dec!(8));
        assert_eq!(input.service_business_model.utilization_rate, dec!(75));
    }

    #[test]
    fn test_rejects_non_numeric_text() {
        let result: Result<ProFormaInput, _> =
            serde_json::from_value(json!({ "taxRate": "twenty" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_year_labels_anchor_on_current_year() {
        let input = ProFormaInput {
            years_in_business: 3,
            forecast_years: 2,
            current_year: Some(2024),
            ..Default::default()
        };
        assert_eq!(
            input.year_labels(1999),
            vec!["2022", "2023", "2024", "2025", "2026"]
        );
    }

    #[test]
    fn test_items_for_year_by_field_then_position() {
        let records: Vec<ExpenseYear> = serde_json::from_value(json!([
            { "year": 2, "expenses": [{ "category": "rent", "historicalAmount": 200 }] },
            { "year": 1, "expenses": [{ "historicalAmount": "100" }] }
        ]))
        .unwrap();
        assert_eq!(items_for_year(&records, 0)[0].historical_amount, dec!(100));
        assert_eq!(items_for_year(&records, 0)[0].category, "Other");
        assert_eq!(items_for_year(&records, 1)[0].category, "rent");
        assert!(items_for_year(&records, 2).is_empty());

        let unnumbered: Vec<ExpenseYear> = serde_json::from_value(json!([
            { "expenses": [{ "historicalAmount": 5 }] }
        ]))
        .unwrap();
        assert_eq!(items_for_year(&unnumbered, 0)[0].historical_amount, dec!(5));
    }

    #[test]
    fn test_loan_term_fallbacks() {
        let loan: LoanRecord =
            serde_json::from_value(json!({ "amount": 1000, "rate": "5", "term": 3 })).unwrap();
        assert_eq!(loan.term_years(), dec!(3));
        assert!(!loan.is_short_term());
        assert_eq!(loan.annual_interest(), dec!(50));

        let loan: LoanRecord = serde_json::from_value(json!({ "amount": 1000 })).unwrap();
        assert!(loan.is_short_term());
    }

    #[test]
    fn test_monthly_drawings_annualise() {
        let drawings: OwnerDrawings =
            serde_json::from_value(json!({ "amount": "1000", "frequency": "monthly" })).unwrap();
        assert_eq!(drawings.annual_amount(), dec!(12000));
    }

    #[test]
    fn test_string_flags() {
        let other: OtherRecord =
            serde_json::from_value(json!({ "amount": 10, "isIncome": "true" })).unwrap();
        assert!(other.is_income);
    }
}
