use clap::Args;
use serde_json::Value;

use proforma_core::dashboard::calculate_dashboard;
use proforma_core::input::ProFormaInput;
use proforma_core::statements::{
    calculate_historical_statements, company_type_info, generator, CompanyType,
};

use crate::input;

/// Arguments shared by the statement commands
#[derive(Args)]
pub struct StatementsArgs {
    /// Path to a JSON or YAML business payload
    #[arg(long)]
    pub input: Option<String>,

    /// Company type to model
    #[arg(long, default_value = "service")]
    pub company_type: String,
}

impl StatementsArgs {
    fn load(&self, what: &str) -> Result<(CompanyType, ProFormaInput), Box<dyn std::error::Error>> {
        let company_type: CompanyType = self.company_type.parse()?;
        let data: ProFormaInput = input::load(self.input.as_deref(), what)?;
        Ok((company_type, data))
    }
}

pub fn run_statements(args: StatementsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (company_type, data) = args.load("statements")?;
    let result = calculate_historical_statements(company_type, &data);
    Ok(serde_json::to_value(result)?)
}

pub fn run_validate(args: StatementsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (company_type, data) = args.load("validation")?;
    let report = generator(company_type).validate(&data);
    Ok(serde_json::to_value(report)?)
}

pub fn run_metrics(args: StatementsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (company_type, data) = args.load("company metrics")?;
    let metrics = generator(company_type).metrics(&data);
    Ok(serde_json::to_value(metrics)?)
}

pub fn run_dashboard(args: StatementsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (company_type, data) = args.load("the dashboard")?;
    let result = calculate_dashboard(company_type, &data)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_company_types() -> Result<Value, Box<dyn std::error::Error>> {
    let types: Vec<Value> = CompanyType::ALL
        .iter()
        .map(|t| {
            serde_json::json!({
                "company_type": t,
                "info": company_type_info(*t),
            })
        })
        .collect();
    Ok(Value::Array(types))
}
