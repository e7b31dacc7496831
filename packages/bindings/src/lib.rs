use napi::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use proforma_core::input::ProFormaInput;
use proforma_core::statements::CompanyType;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn parse<T: DeserializeOwned>(json: &str) -> NapiResult<T> {
    serde_json::from_str(json).map_err(to_napi_error)
}

fn render<T: Serialize>(output: &T) -> NapiResult<String> {
    serde_json::to_string(output).map_err(to_napi_error)
}

fn company_type(name: &str) -> NapiResult<CompanyType> {
    name.parse().map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Never rejects: bad company types and payloads come back as
/// `{success: false, errors}`.
#[napi]
pub fn calculate_historical_statements(company_type: String, data_json: String) -> NapiResult<String> {
    let data: serde_json::Value = parse(&data_json)?;
    let result =
        proforma_core::statements::calculate_historical_statements_value(&company_type, &data);
    render(&result)
}

#[napi]
pub fn validate_historical_data(company_type_name: String, data_json: String) -> NapiResult<String> {
    let input: ProFormaInput = parse(&data_json)?;
    let generator = proforma_core::statements::generator(company_type(&company_type_name)?);
    render(&generator.validate(&input))
}

#[napi]
pub fn company_metrics(company_type_name: String, data_json: String) -> NapiResult<String> {
    let input: ProFormaInput = parse(&data_json)?;
    let generator = proforma_core::statements::generator(company_type(&company_type_name)?);
    render(&generator.metrics(&input))
}

#[napi]
pub fn company_types() -> NapiResult<String> {
    let infos: BTreeMap<&str, _> = CompanyType::ALL
        .iter()
        .map(|t| (t.as_str(), proforma_core::statements::company_type_info(*t)))
        .collect();
    render(&infos)
}

#[napi]
pub fn calculate_dashboard(company_type_name: String, data_json: String) -> NapiResult<String> {
    let input: ProFormaInput = parse(&data_json)?;
    let output =
        proforma_core::dashboard::calculate_dashboard(company_type(&company_type_name)?, &input)
            .map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

#[napi]
pub fn value_cash_flows(input_json: String) -> NapiResult<String> {
    let request: proforma_core::valuation::ValuationRequest = parse(&input_json)?;
    let output = proforma_core::valuation::value_cash_flows(&request).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn sensitivity_analysis(input_json: String) -> NapiResult<String> {
    let request: proforma_core::valuation::SensitivityRequest = parse(&input_json)?;
    let output = proforma_core::valuation::run_sensitivity(&request).map_err(to_napi_error)?;
    render(&output)
}

/// `settings_json` may be empty for the default adjustments.
#[napi]
pub fn scenario_analysis(data_json: String, settings_json: Option<String>) -> NapiResult<String> {
    let input: ProFormaInput = parse(&data_json)?;
    let settings: proforma_core::valuation::ScenarioSettings = match settings_json {
        Some(ref s) if !s.trim().is_empty() => parse(s)?,
        _ => Default::default(),
    };
    let output =
        proforma_core::valuation::run_scenarios(&input, &settings).map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Monte Carlo
// ---------------------------------------------------------------------------

#[napi]
pub fn monte_carlo_npv(input_json: String) -> NapiResult<String> {
    let input: proforma_core::monte_carlo::MonteCarloNpvInput = parse(&input_json)?;
    let output =
        proforma_core::monte_carlo::run_monte_carlo_npv(&input).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn risk_analysis(input_json: String) -> NapiResult<String> {
    let input: proforma_core::monte_carlo::RiskAnalysisInput = parse(&input_json)?;
    let output = proforma_core::monte_carlo::run_risk_analysis(&input).map_err(to_napi_error)?;
    render(&output)
}
