use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::projection::{project, Projection};
use super::{current_year, title_case, LineItem, Statement};
use crate::error::ProFormaError;
use crate::input::ProFormaInput;
use crate::types::{negated, Money, Rate, YearSeries};
use crate::ProFormaResult;

pub const FALLBACK_ITEMS: [&str; 5] = [
    "Revenue",
    "Cost of Goods Sold",
    "Gross Profit",
    "Operating Expenses",
    "Net Income",
];

/// Every derived income-statement series, keyed as on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSummary {
    pub total_revenue: YearSeries,
    pub total_cogs: YearSeries,
    pub gross_profit: YearSeries,
    pub operating_expenses: YearSeries,
    pub ebitda: YearSeries,
    pub depreciation: YearSeries,
    pub ebit: YearSeries,
    pub investment_income: YearSeries,
    pub interest_expense: YearSeries,
    pub ebt: YearSeries,
    pub taxes: YearSeries,
    pub net_income: YearSeries,
    pub cash_available_to_owner: YearSeries,
}

/// Authoritative income data handed to the downstream stages.
#[derive(Debug, Clone)]
pub struct IncomeDetail {
    pub projection: Projection,
    pub summary: IncomeSummary,
}

/// The income statement plus, when it was built from real data, its series.
#[derive(Debug, Clone)]
pub struct IncomeStatementStage {
    pub statement: Statement,
    pub detail: Option<IncomeDetail>,
}

impl IncomeStatementStage {
    pub fn detail(&self) -> ProFormaResult<&IncomeDetail> {
        self.detail.as_ref().ok_or_else(|| {
            ProFormaError::InsufficientData("Income statement was degraded".into())
        })
    }
}

/// Tax by year, offsetting positive EBT with losses carried forward.
pub fn tax_with_loss_carryforward(ebt: &[Money], tax_rate: Rate) -> YearSeries {
    let mut accumulated_losses = Decimal::ZERO;
    ebt.iter()
        .map(|&value| {
            if value < Decimal::ZERO {
                accumulated_losses += -value;
                Decimal::ZERO
            } else {
                let offset = accumulated_losses.min(value);
                accumulated_losses -= offset;
                (value - offset) * tax_rate
            }
        })
        .collect()
}

fn summarise(p: &Projection, tax_rate: Rate) -> IncomeSummary {
    let len = p.revenue.len();
    let gross_profit: YearSeries = (0..len).map(|i| p.revenue[i] - p.cogs[i]).collect();
    let ebitda: YearSeries = (0..len)
        .map(|i| gross_profit[i] - p.operating_expenses[i] + p.other_income[i] - p.other_expenses[i])
        .collect();
    let ebit: YearSeries = (0..len).map(|i| ebitda[i] - p.depreciation[i]).collect();
    let ebt: YearSeries = (0..len)
        .map(|i| ebit[i] + p.investment_income[i] - p.interest_expense[i])
        .collect();
    let taxes = tax_with_loss_carryforward(&ebt, tax_rate);
    let net_income: YearSeries = (0..len).map(|i| ebt[i] - taxes[i]).collect();
    let cash_available_to_owner = (0..len)
        .map(|i| net_income[i] - p.owner_drawings[i])
        .collect();

    IncomeSummary {
        total_revenue: p.revenue.clone(),
        total_cogs: p.cogs.clone(),
        gross_profit,
        operating_expenses: p.operating_expenses.clone(),
        ebitda,
        depreciation: p.depreciation.clone(),
        ebit,
        investment_income: p.investment_income.clone(),
        interest_expense: p.interest_expense.clone(),
        ebt,
        taxes,
        net_income,
        cash_available_to_owner,
    }
}

fn line_items(p: &Projection, s: &IncomeSummary) -> Vec<LineItem> {
    let n = s.total_revenue.len();
    let mut items = vec![
        LineItem::header("REVENUE", n),
        LineItem::sub("    Service Revenue", s.total_revenue.clone()),
        LineItem::total("TOTAL REVENUE", s.total_revenue.clone()),
        LineItem::spacer(n),
        LineItem::header("COST OF GOODS SOLD (COGS)", n),
        LineItem::sub("    Direct Costs", s.total_cogs.clone()),
        LineItem::total("TOTAL COGS", s.total_cogs.clone()),
        LineItem::spacer(n),
        LineItem::total("GROSS PROFIT", s.gross_profit.clone()),
        LineItem::spacer(n),
        LineItem::header("OPERATING EXPENSES", n),
    ];

    for category in &p.expense_breakdown {
        items.push(LineItem::sub(
            format!("    {}", title_case(&category.name)),
            category.values.clone(),
        ));
    }

    items.extend([
        LineItem::sub(
            "    Depreciation & Amortization (Operating)",
            s.depreciation.clone(),
        ),
        LineItem::total("TOTAL OPERATING EXPENSES", s.operating_expenses.clone()),
        LineItem::spacer(n),
        LineItem::header("OTHER OPERATING INCOME / EXPENSES", n),
        LineItem::sub("    Other Operating Income", p.other_income.clone()),
        LineItem::sub("    Other Operating Expenses", p.other_expenses.clone()),
        LineItem::spacer(n),
        LineItem::total("EBITDA", s.ebitda.clone()),
        LineItem::sub("    Less: Depreciation & Amortization", negated(&s.depreciation)),
        LineItem::total("EBIT", s.ebit.clone()),
        LineItem::spacer(n),
        LineItem::header("NON-OPERATING INCOME / EXPENSES", n),
        LineItem::sub("    Investment Income", s.investment_income.clone()),
        LineItem::sub("    Interest Expense", s.interest_expense.clone()),
        LineItem::total("EARNINGS BEFORE TAXES (EBT)", s.ebt.clone()),
        LineItem::spacer(n),
        LineItem::header("TAX CALCULATION", n),
        LineItem::sub("    Tax Provision (with Loss Carryforward)", s.taxes.clone()),
        LineItem::total("NET INCOME", s.net_income.clone()),
        LineItem::spacer(n),
        LineItem::header("CASH FLOW TO OWNER", n),
        LineItem::sub("    Less: Owner Drawings", negated(&p.owner_drawings)),
        LineItem::total("CASH AVAILABLE TO OWNER", s.cash_available_to_owner.clone()),
    ]);

    let has_value = |values: &YearSeries| values.iter().any(|v| *v > Decimal::ZERO);
    for service in p.service_breakdown.iter().filter(|s| has_value(&s.values)) {
        items.push(LineItem::detail(
            format!("Revenue - {}", service.name),
            service.values.clone(),
            "revenue_detail",
        ));
    }
    for category in p.expense_breakdown.iter().filter(|c| has_value(&c.values)) {
        items.push(LineItem::detail(
            format!("Expense - {}", category.name),
            category.values.clone(),
            "expense_detail",
        ));
    }

    items
}

/// Build the income statement for explicit year labels.
pub fn build_income_statement(
    input: &ProFormaInput,
    years: Vec<String>,
) -> ProFormaResult<IncomeStatementStage> {
    let projection = project(input)?;
    let summary = summarise(&projection, input.tax_fraction());

    debug!(
        years = years.len(),
        net_income = ?summary.net_income,
        "income statement assembled"
    );

    let mut statement = Statement::new(years, line_items(&projection, &summary));
    statement.summary = Some(summary.clone());
    statement.metrics = Some(serde_json::Map::new());

    Ok(IncomeStatementStage {
        statement,
        detail: Some(IncomeDetail {
            projection,
            summary,
        }),
    })
}

/// Income statement stage. Never fails: internal errors yield the placeholder statement.
pub fn generate_income_statement(input: &ProFormaInput) -> IncomeStatementStage {
    let years = input.year_labels(current_year());
    match build_income_statement(input, years) {
        Ok(stage) => stage,
        Err(e) => {
            error!(
                stage = "income_statement",
                error = %e,
                years_in_business = input.years_in_business,
                service_years = input.historical_services.len(),
                "income statement degraded to placeholder"
            );
            IncomeStatementStage {
                statement: Statement::fallback(
                    &FALLBACK_ITEMS,
                    format!("Income statement could not be generated: {e}"),
                ),
                detail: None,
            }
        }
    }
}
