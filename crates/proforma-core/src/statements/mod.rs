//! Income statement, balance sheet and cash flow generation.
//!
//! The three statements run as one pipeline: the income statement is built
//! once, the balance sheet reads its net income and tax series, and the cash
//! flow reads both. Each stage degrades to a zero-filled placeholder instead
//! of returning an error.

pub mod balance_sheet;
pub mod cash_flow;
pub mod generator;
pub mod income_statement;
pub mod metrics;
pub mod projection;
pub mod validation;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::types::{zeros, Money, YearSeries};

pub use balance_sheet::{generate_balance_sheet, BalanceSheetStage};
pub use cash_flow::{generate_cash_flow, CashFlowStage};
pub use generator::{
    calculate_historical_statements, calculate_historical_statements_value, company_type_info,
    generator, CompanyType, CompanyTypeInfo, ServiceCompanyGenerator, StatementGenerator,
    StatementPipeline, StatementsFailure, StatementsResult, StatementsSuccess,
};
pub use income_statement::{generate_income_statement, IncomeStatementStage, IncomeSummary};
pub use metrics::{company_metrics, CompanyMetrics};
pub use projection::{project, NamedSeries, Projection};
pub use validation::{validate_historical_data, ValidationReport};

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// One presentation row. Headers and spacers always carry zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub label: String,
    pub values: YearSeries,
    pub is_header: bool,
    pub is_total: bool,
    pub is_sub_item: bool,
    pub is_spacer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LineItem {
    fn new(label: impl Into<String>, values: YearSeries) -> Self {
        Self {
            label: label.into(),
            values,
            is_header: false,
            is_total: false,
            is_sub_item: false,
            is_spacer: false,
            category: None,
        }
    }

    pub fn plain(label: impl Into<String>, values: YearSeries) -> Self {
        Self::new(label, values)
    }

    pub fn header(label: impl Into<String>, len: usize) -> Self {
        Self {
            is_header: true,
            ..Self::new(label, zeros(len))
        }
    }

    pub fn sub(label: impl Into<String>, values: YearSeries) -> Self {
        Self {
            is_sub_item: true,
            ..Self::new(label, values)
        }
    }

    pub fn total(label: impl Into<String>, values: YearSeries) -> Self {
        Self {
            is_total: true,
            ..Self::new(label, values)
        }
    }

    pub fn spacer(len: usize) -> Self {
        Self {
            is_spacer: true,
            ..Self::new("", zeros(len))
        }
    }

    /// A trailing breakdown row, e.g. `Revenue - Consulting`.
    pub fn detail(label: impl Into<String>, values: YearSeries, category: &str) -> Self {
        Self {
            category: Some(category.to_string()),
            ..Self::new(label, values)
        }
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Per-year balance identity check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceValidation {
    pub balances: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub years: Vec<String>,
    pub line_items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<IncomeSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<BalanceValidation>,
    /// Set only on degraded placeholder statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub const FALLBACK_YEARS: usize = 5;

impl Statement {
    pub fn new(years: Vec<String>, line_items: Vec<LineItem>) -> Self {
        Self {
            years,
            line_items,
            summary: None,
            metrics: None,
            validation: None,
            note: None,
        }
    }

    /// Placeholder statement: five `FY` years with zero-filled items.
    pub fn fallback(items: &[&str], note: impl Into<String>) -> Self {
        let this_year = chrono::Local::now().year();
        let years = (0..FALLBACK_YEARS)
            .map(|i| format!("FY{}", this_year + i as i32))
            .collect();
        let line_items = items
            .iter()
            .map(|label| LineItem::plain(*label, zeros(FALLBACK_YEARS)))
            .collect();
        Self {
            note: Some(note.into()),
            ..Self::new(years, line_items)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.note.is_some()
    }

    /// Row lookup by label, ignoring indentation.
    pub fn find(&self, label: &str) -> Option<&LineItem> {
        self.line_items
            .iter()
            .find(|item| !item.is_spacer && item.label.trim() == label)
    }

    pub fn values_of(&self, label: &str) -> Option<&[Money]> {
        self.find(label).map(|item| item.values.as_slice())
    }
}

/// The three statements for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialStatements {
    pub income_statement: Statement,
    pub balance_sheet: Statement,
    pub cash_flow: Statement,
}

/// Current calendar year from the local clock.
pub(crate) fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// Title case: first letter of each alphabetic run upper, rest lower.
pub(crate) fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_headers_and_spacers_are_zero() {
        let header = LineItem::header("REVENUE", 3);
        let spacer = LineItem::spacer(3);
        assert!(header.is_header);
        assert!(spacer.is_spacer);
        assert_eq!(spacer.label, "");
        assert!(header.values.iter().chain(spacer.values.iter()).all(|v| v.is_zero()));
    }

    #[test]
    fn test_fallback_shape() {
        let stmt = Statement::fallback(&["Assets", "Liabilities", "Equity"], "degraded");
        assert_eq!(stmt.years.len(), 5);
        assert!(stmt.years[0].starts_with("FY"));
        assert_eq!(stmt.line_items.len(), 3);
        assert!(stmt.line_items.iter().all(|i| i.values == zeros(5)));
        assert!(stmt.is_degraded());
    }

    #[test]
    fn test_find_ignores_indentation() {
        let stmt = Statement::new(
            vec!["2024".into()],
            vec![LineItem::sub("    Service Revenue", vec![dec!(10)])],
        );
        assert_eq!(stmt.values_of("Service Revenue"), Some(&[dec!(10)][..]));
    }

    #[test]
    fn test_wire_shape_omits_empty_optionals() {
        let stmt = Statement::new(vec!["2024".into()], vec![LineItem::spacer(1)]);
        let value = serde_json::to_value(&stmt).unwrap();
        assert!(value.get("note").is_none());
        assert_eq!(value["line_items"][0]["is_spacer"], serde_json::json!(true));
        assert_eq!(value["line_items"][0]["values"][0], serde_json::json!(0.0));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("office rent"), "Office Rent");
        assert_eq!(title_case("SOFTWARE-licenses"), "Software-Licenses");
    }
}
