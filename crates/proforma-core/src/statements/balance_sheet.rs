use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::income_statement::IncomeStatementStage;
use super::projection::flat_line_from_records;
use super::{BalanceValidation, LineItem, Statement};
use crate::input::{ProFormaInput, WorkingCapitalPolicy};
use crate::types::{cumulative, negated, zeros, Money, Rate, YearSeries};
use crate::ProFormaResult;

const BALANCE_TOLERANCE: Decimal = dec!(0.01);

pub const FALLBACK_ITEMS: [&str; 3] = ["Assets", "Liabilities", "Equity"];

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Balance-sheet series consumed by the cash flow and dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceDetail {
    pub cash: YearSeries,
    pub accounts_receivable: YearSeries,
    pub prepaid_expenses: YearSeries,
    pub gross_equipment: YearSeries,
    pub accumulated_depreciation: YearSeries,
    pub net_equipment: YearSeries,
    pub investments: YearSeries,
    pub accounts_payable: YearSeries,
    pub short_term_loans: YearSeries,
    pub accrued_expenses: YearSeries,
    pub taxes_payable: YearSeries,
    pub long_term_loans: YearSeries,
    pub retained_earnings: YearSeries,
    pub total_current_assets: YearSeries,
    pub total_assets: YearSeries,
    pub total_current_liabilities: YearSeries,
    pub total_liabilities: YearSeries,
    pub total_equity: YearSeries,
}

impl BalanceDetail {
    pub fn total_loans(&self, i: usize) -> Money {
        self.short_term_loans[i] + self.long_term_loans[i]
    }
}

#[derive(Debug, Clone)]
pub struct BalanceSheetStage {
    pub statement: Statement,
    pub detail: Option<BalanceDetail>,
}

impl BalanceSheetStage {
    pub fn detail(&self) -> ProFormaResult<&BalanceDetail> {
        self.detail.as_ref().ok_or_else(|| {
            crate::error::ProFormaError::InsufficientData("Balance sheet was degraded".into())
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scaled(series: &[Money], ratio: Rate) -> YearSeries {
    series.iter().map(|v| v * ratio).collect()
}

fn add(a: &[Money], b: &[Money]) -> YearSeries {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

fn sub(a: &[Money], b: &[Money]) -> YearSeries {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// `$1,234.56` / `$-1,234.56`, matching the validation message format.
pub fn format_currency(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("${}{grouped}.{frac}", if negative { "-" } else { "" })
}

/// Working-capital balances derived from revenue, operating expenses and tax.
struct WorkingCapital {
    receivables: YearSeries,
    payables: YearSeries,
    prepaid: YearSeries,
    accrued: YearSeries,
    taxes_payable: YearSeries,
}

impl WorkingCapital {
    fn from_policy(
        policy: &WorkingCapitalPolicy,
        revenue: &[Money],
        expenses: &[Money],
        taxes: &[Money],
    ) -> Self {
        Self {
            receivables: scaled(revenue, policy.receivables_pct_revenue),
            payables: scaled(expenses, policy.payables_pct_expenses),
            prepaid: scaled(expenses, policy.prepaid_pct_expenses),
            accrued: scaled(expenses, policy.accrued_pct_expenses),
            taxes_payable: scaled(taxes, policy.taxes_payable_pct_provision),
        }
    }

    /// Non-cash current assets less non-debt current liabilities.
    fn net(&self, i: usize) -> Money {
        self.receivables[i] + self.prepaid[i]
            - self.payables[i]
            - self.accrued[i]
            - self.taxes_payable[i]
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Compare assets with liabilities plus equity for every year.
pub fn validate_balance(
    years: &[String],
    total_assets: &[Money],
    total_liabilities: &[Money],
    total_equity: &[Money],
) -> BalanceValidation {
    let errors: Vec<String> = years
        .iter()
        .enumerate()
        .filter_map(|(i, year)| {
            let diff = total_assets[i] - (total_liabilities[i] + total_equity[i]);
            (diff.abs() > BALANCE_TOLERANCE).then(|| {
                format!(
                    "Year {year}: Balance sheet doesn't balance by {}",
                    format_currency(diff)
                )
            })
        })
        .collect();

    BalanceValidation {
        balances: errors.is_empty(),
        errors,
    }
}

/// Build the balance sheet from the income statement's authoritative series.
pub fn build_balance_sheet(
    input: &ProFormaInput,
    income: &IncomeStatementStage,
) -> ProFormaResult<BalanceSheetStage> {
    let detail = income.detail()?;
    let summary = &detail.summary;
    let projection = &detail.projection;
    let years = income.statement.years.clone();
    let n = years.len();

    let self_funding = input.self_funding;
    let funding = vec![self_funding; n];

    // Retained earnings roll forward from zero.
    let retained_earnings = cumulative(&sub(&summary.net_income, &projection.owner_drawings));

    let gross_equipment = flat_line_from_records(&input.historical_equipment, input, |e| e.cost);
    let accumulated_depreciation = cumulative(&summary.depreciation);
    let net_equipment = sub(&gross_equipment, &accumulated_depreciation);
    let investments = flat_line_from_records(&input.historical_investments, input, |i| i.amount);

    let short_term_loans = flat_line_from_records(&input.historical_loans, input, |l| {
        if l.is_short_term() {
            l.amount
        } else {
            Decimal::ZERO
        }
    });
    let long_term_loans = flat_line_from_records(&input.historical_loans, input, |l| {
        if l.is_short_term() {
            Decimal::ZERO
        } else {
            l.amount
        }
    });

    let wc = WorkingCapital::from_policy(
        &input.working_capital,
        &summary.total_revenue,
        &summary.operating_expenses,
        &summary.taxes,
    );

    // Cash is solved last so that the identity holds by construction.
    let cash: YearSeries = (0..n)
        .map(|i| {
            self_funding + retained_earnings[i] - wc.net(i) - net_equipment[i] - investments[i]
                + short_term_loans[i]
                + long_term_loans[i]
        })
        .collect();

    let total_current_assets: YearSeries = (0..n)
        .map(|i| cash[i] + wc.receivables[i] + wc.prepaid[i])
        .collect();
    let total_non_current_assets = add(&net_equipment, &investments);
    let total_assets = add(&total_current_assets, &total_non_current_assets);

    let total_current_liabilities: YearSeries = (0..n)
        .map(|i| wc.payables[i] + short_term_loans[i] + wc.accrued[i] + wc.taxes_payable[i])
        .collect();
    let total_liabilities = add(&total_current_liabilities, &long_term_loans);
    let total_equity = add(&funding, &retained_earnings);
    let total_liabilities_and_equity = add(&total_liabilities, &total_equity);

    let validation = validate_balance(&years, &total_assets, &total_liabilities, &total_equity);
    for message in &validation.errors {
        warn!(stage = "balance_sheet", "{message}");
    }

    let line_items = vec![
        LineItem::header("ASSETS", n),
        LineItem::header("Current Assets", n),
        LineItem::sub("    Cash and Cash Equivalents", cash.clone()),
        LineItem::sub("    Accounts Receivable", wc.receivables.clone()),
        LineItem::sub("    Prepaid Expenses", wc.prepaid.clone()),
        LineItem::sub("    Other Current Assets", zeros(n)),
        LineItem::total("Total Current Assets", total_current_assets.clone()),
        LineItem::spacer(n),
        LineItem::header("Non-Current Assets", n),
        LineItem::sub("    Property, Plant & Equipment (Gross)", gross_equipment.clone()),
        LineItem::sub("    Less: Accumulated Depreciation", negated(&accumulated_depreciation)),
        LineItem::sub("    Net Equipment", net_equipment.clone()),
        LineItem::sub("    Investments", investments.clone()),
        LineItem::sub("    Intangible Assets (if applicable)", zeros(n)),
        LineItem::total("Total Non-Current Assets", total_non_current_assets),
        LineItem::spacer(n),
        LineItem::total("TOTAL ASSETS", total_assets.clone()),
        LineItem::spacer(n),
        LineItem::header("LIABILITIES", n),
        LineItem::header("Current Liabilities", n),
        LineItem::sub("    Accounts Payable", wc.payables.clone()),
        LineItem::sub("    Short-Term Loans (Due < 1 Year)", short_term_loans.clone()),
        LineItem::sub("    Accrued Expenses", wc.accrued.clone()),
        LineItem::sub("    Taxes Payable", wc.taxes_payable.clone()),
        LineItem::total("Total Current Liabilities", total_current_liabilities.clone()),
        LineItem::spacer(n),
        LineItem::header("Non-Current Liabilities", n),
        LineItem::sub("    Long-Term Loans", long_term_loans.clone()),
        LineItem::sub("    Lease Liabilities (if any)", zeros(n)),
        LineItem::sub("    Deferred Tax Liabilities", zeros(n)),
        LineItem::total("Total Non-Current Liabilities", long_term_loans.clone()),
        LineItem::spacer(n),
        LineItem::total("TOTAL LIABILITIES", total_liabilities.clone()),
        LineItem::spacer(n),
        LineItem::header("EQUITY", n),
        LineItem::sub("    Common Stock / Share Capital", funding),
        LineItem::sub("    Shareholder Contributions", zeros(n)),
        LineItem::sub("    Retained Earnings", retained_earnings.clone()),
        LineItem::sub("    Other Comprehensive Income (OCI)", zeros(n)),
        LineItem::total("TOTAL EQUITY", total_equity.clone()),
        LineItem::spacer(n),
        LineItem::total("TOTAL LIABILITIES & EQUITY", total_liabilities_and_equity),
    ];

    let mut statement = Statement::new(years, line_items);
    statement.validation = Some(validation);

    Ok(BalanceSheetStage {
        statement,
        detail: Some(BalanceDetail {
            cash,
            accounts_receivable: wc.receivables,
            prepaid_expenses: wc.prepaid,
            gross_equipment,
            accumulated_depreciation,
            net_equipment,
            investments,
            accounts_payable: wc.payables,
            short_term_loans,
            accrued_expenses: wc.accrued,
            taxes_payable: wc.taxes_payable,
            long_term_loans,
            retained_earnings,
            total_current_assets,
            total_assets,
            total_current_liabilities,
            total_liabilities,
            total_equity,
        }),
    })
}

/// Balance sheet stage. Falls back to a placeholder when the income statement degraded.
pub fn generate_balance_sheet(
    input: &ProFormaInput,
    income: &IncomeStatementStage,
) -> BalanceSheetStage {
    match build_balance_sheet(input, income) {
        Ok(stage) => stage,
        Err(e) => {
            error!(stage = "balance_sheet", error = %e, "balance sheet degraded to placeholder");
            BalanceSheetStage {
                statement: Statement::fallback(
                    &FALLBACK_ITEMS,
                    format!("Balance sheet could not be generated: {e}"),
                ),
                detail: None,
            }
        }
    }
}
