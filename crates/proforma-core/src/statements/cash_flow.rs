use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::balance_sheet::BalanceSheetStage;
use super::income_statement::IncomeStatementStage;
use super::projection::flat_line_from_records;
use super::{LineItem, Statement};
use crate::error::ProFormaError;
use crate::input::ProFormaInput;
use crate::types::{deltas, negated, zeros, Money, YearSeries};
use crate::ProFormaResult;

const MAINTENANCE_CAPEX_SHARE: Decimal = dec!(0.5);

pub const FALLBACK_ITEMS: [&str; 4] = [
    "Operating Activities",
    "Investing Activities",
    "Financing Activities",
    "Net Change in Cash",
];

/// Cash-flow series for valuation and the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowDetail {
    pub operating: YearSeries,
    /// Increase in receivables and prepaids less increase in payables.
    pub change_in_working_capital: YearSeries,
    pub capital_expenditures: YearSeries,
    pub investing: YearSeries,
    pub financing: YearSeries,
    /// Operating cash flow less capital expenditures.
    pub free_cash_flow: YearSeries,
    pub beginning_cash: YearSeries,
    pub ending_cash: YearSeries,
    pub net_change: YearSeries,
}

#[derive(Debug, Clone)]
pub struct CashFlowStage {
    pub statement: Statement,
    pub detail: Option<CashFlowDetail>,
}

impl CashFlowStage {
    pub fn detail(&self) -> ProFormaResult<&CashFlowDetail> {
        self.detail.as_ref().ok_or_else(|| {
            ProFormaError::InsufficientData("Cash flow statement was degraded".into())
        })
    }

    /// Free cash flows for forecast years only.
    pub fn forecast_free_cash_flow(&self, historical_years: usize) -> Vec<Money> {
        self.detail
            .as_ref()
            .map(|d| d.free_cash_flow.iter().skip(historical_years).copied().collect())
            .unwrap_or_default()
    }
}

/// Historical capex from equipment purchases; forecast capex from gross
/// equipment growth, or half the average positive historical capex.
fn capital_expenditures(input: &ProFormaInput, gross_equipment: &[Money]) -> YearSeries {
    let hist = input.historical_len();
    let n = gross_equipment.len();
    let purchases = flat_line_from_records(&input.historical_equipment, input, |e| e.cost);

    let mut capex = zeros(n);
    capex[..hist.min(n)].copy_from_slice(&purchases[..hist.min(n)]);

    let historical = &capex[..hist.min(n)];
    let positive_years = historical.iter().filter(|c| **c > Decimal::ZERO).count();
    let maintenance = if positive_years > 0 {
        historical.iter().sum::<Decimal>() / Decimal::from(positive_years as u64)
            * MAINTENANCE_CAPEX_SHARE
    } else {
        Decimal::ZERO
    };

    for i in hist.max(1)..n {
        let change = gross_equipment[i] - gross_equipment[i - 1];
        capex[i] = if change > Decimal::ZERO { change } else { maintenance };
    }
    capex
}

pub fn build_cash_flow(
    input: &ProFormaInput,
    income: &IncomeStatementStage,
    balance: &BalanceSheetStage,
) -> ProFormaResult<CashFlowStage> {
    let income_detail = income.detail()?;
    let bs = balance.detail()?;
    let years = balance.statement.years.clone();
    let n = years.len();
    let hist = input.historical_len();

    let net_income = &income_detail.summary.net_income;
    let depreciation = &income_detail.summary.depreciation;
    let drawings = &income_detail.projection.owner_drawings;

    let change_ar = deltas(&bs.accounts_receivable);
    let change_ap = deltas(&bs.accounts_payable);
    let change_prepaid = deltas(&bs.prepaid_expenses);

    let change_in_working_capital: YearSeries = (0..n)
        .map(|i| change_ar[i] - change_ap[i] + change_prepaid[i])
        .collect();
    let operating: YearSeries = (0..n)
        .map(|i| net_income[i] + depreciation[i] - change_in_working_capital[i])
        .collect();

    let capex = capital_expenditures(input, &bs.gross_equipment);
    let mut investment_purchases =
        flat_line_from_records(&input.historical_investments, input, |i| i.amount);
    for slot in investment_purchases.iter_mut().skip(hist) {
        *slot = Decimal::ZERO;
    }
    let investing: YearSeries = (0..n).map(|i| -capex[i] - investment_purchases[i]).collect();

    let mut loan_proceeds = flat_line_from_records(&input.historical_loans, input, |l| l.amount);
    for slot in loan_proceeds.iter_mut().skip(hist) {
        *slot = Decimal::ZERO;
    }
    let mut loan_repayments = zeros(n);
    for i in 1..n {
        let change = bs.total_loans(i) - bs.total_loans(i - 1);
        if change < Decimal::ZERO {
            loan_repayments[i] = -change;
        } else if change > Decimal::ZERO && i >= hist {
            loan_proceeds[i] = change;
        }
    }

    let mut owner_investments = zeros(n);
    if let Some(first) = owner_investments.first_mut() {
        *first = input.self_funding;
    }

    let financing: YearSeries = (0..n)
        .map(|i| owner_investments[i] - drawings[i] + loan_proceeds[i] - loan_repayments[i])
        .collect();

    let ending_cash = bs.cash.clone();
    let beginning_cash: YearSeries = (0..n)
        .map(|i| if i == 0 { Decimal::ZERO } else { ending_cash[i - 1] })
        .collect();
    let net_change: YearSeries = (0..n).map(|i| ending_cash[i] - beginning_cash[i]).collect();
    let free_cash_flow: YearSeries = (0..n).map(|i| operating[i] - capex[i]).collect();

    debug!(
        activity_total = ?(0..n).map(|i| operating[i] + investing[i] + financing[i]).collect::<Vec<_>>(),
        net_change = ?net_change,
        "cash flow reconciled to balance sheet cash"
    );

    let line_items = vec![
        LineItem::header("OPERATING ACTIVITIES", n),
        LineItem::sub("    Net Income", net_income.clone()),
        LineItem::sub("    Depreciation & Amortization (Add Back)", depreciation.clone()),
        LineItem::header("    Changes in Working Capital", n),
        LineItem::sub("        Accounts Receivable", negated(&change_ar)),
        LineItem::sub("        Accounts Payable", change_ap),
        LineItem::sub("        Prepaid Expenses", negated(&change_prepaid)),
        LineItem::total("    Net Cash from Operations", operating.clone()),
        LineItem::spacer(n),
        LineItem::header("INVESTING ACTIVITIES", n),
        LineItem::sub("    Capital Expenditures", negated(&capex)),
        LineItem::sub("    Investment Purchases", negated(&investment_purchases)),
        LineItem::total("    Net Cash from Investing", investing.clone()),
        LineItem::spacer(n),
        LineItem::header("FINANCING ACTIVITIES", n),
        LineItem::sub("    Owner Investments", owner_investments),
        LineItem::sub("    Owner Drawings", negated(drawings)),
        LineItem::sub("    Loan Proceeds", loan_proceeds),
        LineItem::sub("    Loan Repayments", negated(&loan_repayments)),
        LineItem::total("    Net Cash from Financing", financing.clone()),
        LineItem::spacer(n),
        LineItem::total("NET CHANGE IN CASH", net_change.clone()),
        LineItem::sub("    Beginning Cash", beginning_cash.clone()),
        LineItem::total("    Ending Cash", ending_cash.clone()),
    ];

    Ok(CashFlowStage {
        statement: Statement::new(years, line_items),
        detail: Some(CashFlowDetail {
            operating,
            change_in_working_capital,
            capital_expenditures: capex,
            investing,
            financing,
            free_cash_flow,
            beginning_cash,
            ending_cash,
            net_change,
        }),
    })
}

/// Cash flow stage. Ending cash is taken from the balance sheet.
pub fn generate_cash_flow(
    input: &ProFormaInput,
    income: &IncomeStatementStage,
    balance: &BalanceSheetStage,
) -> CashFlowStage {
    match build_cash_flow(input, income, balance) {
        Ok(stage) => stage,
        Err(e) => {
            error!(stage = "cash_flow", error = %e, "cash flow degraded to placeholder");
            CashFlowStage {
                statement: Statement::fallback(
                    &FALLBACK_ITEMS,
                    format!("Cash flow statement could not be generated: {e}"),
                ),
                detail: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::balance_sheet::generate_balance_sheet;
    use crate::statements::income_statement::generate_income_statement;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_input() -> ProFormaInput {
        serde_json::from_value(json!({
            "yearsInBusiness": 2,
            "forecastYears": 2,
            "selfFunding": 10000,
            "currentYear": 2024,
            "historicalServices": [
                { "year": 1, "services": [{ "name": "Audit", "historicalRevenue": 80000, "cost": 30000 }] },
                { "year": 2, "services": [{ "name": "Audit", "historicalRevenue": 90000, "cost": 33000 }] }
            ],
            "historicalExpenses": [
                { "year": 1, "expenses": [{ "category": "salaries", "historicalAmount": 30000 }] },
                { "year": 2, "expenses": [{ "category": "salaries", "historicalAmount": 32000 }] }
            ],
            "historicalEquipment": [
                { "year": 1, "equipment": [{ "cost": 4000, "usefulLife": 4 }] },
                { "year": 2, "equipment": [{ "cost": 2000, "usefulLife": 4 }] }
            ],
            "historicalLoans": [
                { "year": 1, "loans": [{ "amount": 8000, "rate": 5, "years": 3 }] },
                { "year": 2, "loans": [{ "amount": 6000, "rate": 5, "years": 3 }] }
            ],
            "historicalInvestments": [
                { "year": 1, "investments": [{ "amount": 1500 }] }
            ],
            "ownerDrawings": { "amount": 12000 }
        }))
        .unwrap()
    }

    fn pipeline(input: &ProFormaInput) -> (IncomeStatementStage, BalanceSheetStage, CashFlowStage) {
        let income = generate_income_statement(input);
        let balance = generate_balance_sheet(input, &income);
        let cash = generate_cash_flow(input, &income, &balance);
        (income, balance, cash)
    }

    #[test]
    fn test_ending_cash_ties_to_balance_sheet() {
        let (_, balance, cash) = pipeline(&sample_input());
        let bs_cash = balance.statement.values_of("Cash and Cash Equivalents").unwrap();
        let cf_cash = cash.statement.values_of("Ending Cash").unwrap();
        assert_eq!(bs_cash, cf_cash);
    }

    #[test]
    fn test_beginning_cash_chain() {
        let (_, _, cash) = pipeline(&sample_input());
        let d = cash.detail.unwrap();
        assert_eq!(d.beginning_cash[0], Decimal::ZERO);
        for i in 1..d.ending_cash.len() {
            assert_eq!(d.beginning_cash[i], d.ending_cash[i - 1], "Year {i}: beginning cash");
            assert_eq!(d.net_change[i], d.ending_cash[i] - d.beginning_cash[i]);
        }
    }

    #[test]
    fn test_capex_history_and_maintenance() {
        let (_, _, cash) = pipeline(&sample_input());
        let capex = cash.detail.unwrap().capital_expenditures;
        // Gross equipment flat-lines at 2000, so forecast capex is half of avg(4000, 2000).
        assert_eq!(capex, vec![dec!(4000), dec!(2000), dec!(1500), dec!(1500)]);
    }

    #[test]
    fn test_loan_flows() {
        let (_, _, cash) = pipeline(&sample_input());
        let stmt = &cash.statement;
        assert_eq!(
            stmt.values_of("Loan Proceeds").unwrap(),
            &[dec!(8000), dec!(6000), dec!(0), dec!(0)]
        );
        assert_eq!(
            stmt.values_of("Loan Repayments").unwrap(),
            &[dec!(0), dec!(-2000), dec!(0), dec!(0)]
        );
    }

    #[test]
    fn test_owner_investment_only_in_first_year() {
        let (_, _, cash) = pipeline(&sample_input());
        assert_eq!(
            cash.statement.values_of("Owner Investments").unwrap(),
            &[dec!(10000), dec!(0), dec!(0), dec!(0)]
        );
        assert_eq!(
            cash.statement.values_of("Investment Purchases").unwrap(),
            &[dec!(-1500), dec!(0), dec!(0), dec!(0)]
        );
    }

    #[test]
    fn test_free_cash_flow_for_forecast_years() {
        let (_, _, cash) = pipeline(&sample_input());
        let fcf = cash.forecast_free_cash_flow(2);
        let d = cash.detail().unwrap();
        assert_eq!(fcf.len(), 2);
        assert_eq!(fcf[0], d.operating[2] - d.capital_expenditures[2]);
    }

    #[test]
    fn test_degrades_when_upstream_degraded() {
        let mut input = sample_input();
        input.historical_services.clear();
        let (_, _, cash) = pipeline(&input);
        assert!(cash.detail.is_none());
        assert!(cash.detail().is_err());
        let labels: Vec<_> = cash.statement.line_items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, FALLBACK_ITEMS.to_vec());
    }
}
