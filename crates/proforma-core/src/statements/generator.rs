use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::balance_sheet::{generate_balance_sheet, BalanceSheetStage};
use super::cash_flow::{generate_cash_flow, CashFlowStage};
use super::income_statement::{generate_income_statement, IncomeStatementStage};
use super::metrics::{company_metrics, CompanyMetrics};
use super::validation::{validate_historical_data, ValidationReport};
use super::{FinancialStatements, Statement};
use crate::error::ProFormaError;
use crate::input::ProFormaInput;

// ---------------------------------------------------------------------------
// Company types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyType {
    Service,
}

impl CompanyType {
    pub const ALL: [CompanyType; 1] = [CompanyType::Service];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyType::Service => "service",
        }
    }
}

impl fmt::Display for CompanyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompanyType {
    type Err = ProFormaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CompanyType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ProFormaError::UnsupportedCompanyType {
                requested: s.to_string(),
                available: CompanyType::ALL
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyTypeInfo {
    pub name: String,
    pub description: String,
    pub supported_metrics: Vec<String>,
    pub required_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Generator capability
// ---------------------------------------------------------------------------

/// The three statement stages from one pipeline run.
#[derive(Debug, Clone)]
pub struct StatementPipeline {
    pub income: IncomeStatementStage,
    pub balance: BalanceSheetStage,
    pub cash_flow: CashFlowStage,
}

impl StatementPipeline {
    pub fn statements(&self) -> FinancialStatements {
        FinancialStatements {
            income_statement: self.income.statement.clone(),
            balance_sheet: self.balance.statement.clone(),
            cash_flow: self.cash_flow.statement.clone(),
        }
    }

    pub fn into_statements(self) -> FinancialStatements {
        FinancialStatements {
            income_statement: self.income.statement,
            balance_sheet: self.balance.statement,
            cash_flow: self.cash_flow.statement,
        }
    }
}

/// Statement generation for one company type.
pub trait StatementGenerator: Send + Sync {
    fn company_type(&self) -> CompanyType;

    fn info(&self) -> CompanyTypeInfo;

    fn validate(&self, input: &ProFormaInput) -> ValidationReport {
        validate_historical_data(input)
    }

    fn metrics(&self, input: &ProFormaInput) -> CompanyMetrics {
        company_metrics(input)
    }

    /// Income statement once, then balance sheet and cash flow from it.
    fn pipeline(&self, input: &ProFormaInput) -> StatementPipeline {
        let income = generate_income_statement(input);
        let balance = generate_balance_sheet(input, &income);
        let cash_flow = generate_cash_flow(input, &income, &balance);
        StatementPipeline {
            income,
            balance,
            cash_flow,
        }
    }

    fn generate(&self, input: &ProFormaInput) -> FinancialStatements {
        self.pipeline(input).into_statements()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceCompanyGenerator;

const SERVICE_METRICS: [&str; 15] = [
    "revenue_per_employee",
    "profit_margin",
    "operating_margin",
    "ebitda_margin",
    "revenue_growth_rate",
    "customer_acquisition_cost",
    "customer_lifetime_value",
    "recurring_revenue_ratio",
    "service_delivery_efficiency",
    "utilization_rate",
    "billable_hours",
    "average_project_size",
    "client_retention_rate",
    "service_quality_score",
    "employee_productivity",
];

const SERVICE_REQUIRED_FIELDS: [&str; 7] = [
    "revenue",
    "operating_expenses",
    "employee_count",
    "billable_hours",
    "service_delivery_costs",
    "client_count",
    "average_project_value",
];

impl StatementGenerator for ServiceCompanyGenerator {
    fn company_type(&self) -> CompanyType {
        CompanyType::Service
    }

    fn info(&self) -> CompanyTypeInfo {
        CompanyTypeInfo {
            name: "Service Company".into(),
            description: "Service companies provide intangible services to clients. Key metrics \
                          include utilization rates, billable hours, and service delivery efficiency."
                .into(),
            supported_metrics: SERVICE_METRICS.iter().map(|s| s.to_string()).collect(),
            required_fields: SERVICE_REQUIRED_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Dispatch a company type to its generator.
pub fn generator(company_type: CompanyType) -> &'static dyn StatementGenerator {
    match company_type {
        CompanyType::Service => &ServiceCompanyGenerator,
    }
}

pub fn company_type_info(company_type: CompanyType) -> CompanyTypeInfo {
    generator(company_type).info()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementsSuccess {
    pub success: bool,
    pub company_type: CompanyType,
    pub income_statement: Statement,
    pub balance_sheet: Statement,
    pub cash_flow: Statement,
    pub company_metrics: CompanyMetrics,
    pub processed_data: ProFormaInput,
    pub validation: ValidationReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementsFailure {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl StatementsFailure {
    fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            warnings,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatementsResult {
    Success(Box<StatementsSuccess>),
    Invalid(StatementsFailure),
}

impl StatementsResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StatementsResult::Success(_))
    }
}

/// Validation plus pipeline, keeping the stages for downstream analytics.
pub(crate) fn run_statements(
    company_type: CompanyType,
    input: &ProFormaInput,
) -> Result<(StatementsSuccess, StatementPipeline), StatementsFailure> {
    let generator = generator(company_type);
    let validation = generator.validate(input);
    if !validation.valid {
        return Err(StatementsFailure::new(validation.errors, validation.warnings));
    }

    let metrics = generator.metrics(input);
    let pipeline = generator.pipeline(input);
    let statements = pipeline.statements();
    info!(
        company_type = %company_type,
        years = statements.income_statement.years.len(),
        "historical statements calculated"
    );

    let success = StatementsSuccess {
        success: true,
        company_type,
        income_statement: statements.income_statement,
        balance_sheet: statements.balance_sheet,
        cash_flow: statements.cash_flow,
        company_metrics: metrics,
        processed_data: input.clone(),
        validation,
    };
    Ok((success, pipeline))
}

/// Validate, then run the statement pipeline for the given company type.
pub fn calculate_historical_statements(
    company_type: CompanyType,
    input: &ProFormaInput,
) -> StatementsResult {
    match run_statements(company_type, input) {
        Ok((success, _)) => StatementsResult::Success(Box::new(success)),
        Err(failure) => StatementsResult::Invalid(failure),
    }
}

/// JSON-value variant. Bad company types and payloads become failure results.
pub fn calculate_historical_statements_value(
    company_type: &str,
    data: &serde_json::Value,
) -> StatementsResult {
    let company_type = match company_type.parse::<CompanyType>() {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "unsupported company type");
            return StatementsResult::Invalid(StatementsFailure::new(vec![e.to_string()], vec![]));
        }
    };

    match serde_json::from_value::<ProFormaInput>(data.clone()) {
        Ok(input) => calculate_historical_statements(company_type, &input),
        Err(e) => {
            let e = ProFormaError::from(e);
            warn!(error = %e, "input payload rejected");
            StatementsResult::Invalid(StatementsFailure::new(
                vec![format!("Invalid input payload: {e}")],
                vec![],
            ))
        }
    }
}
