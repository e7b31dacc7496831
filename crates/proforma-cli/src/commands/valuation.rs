use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use proforma_core::input::ProFormaInput;
use proforma_core::valuation::{
    run_scenarios, run_sensitivity, value_cash_flows, ScenarioSettings, SensitivityRequest,
    TerminalMethod, ValuationRequest, ValuationSettings,
};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Perpetuity,
    ExitMultiple,
    Liquidation,
    None,
}

impl From<MethodArg> for TerminalMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Perpetuity => TerminalMethod::Perpetuity,
            MethodArg::ExitMultiple => TerminalMethod::ExitMultiple,
            MethodArg::Liquidation => TerminalMethod::Liquidation,
            MethodArg::None => TerminalMethod::None,
        }
    }
}

/// Arguments for a one-shot valuation over a cash flow list
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ValuationArgs {
    /// Path to a JSON or YAML valuation request (overrides the flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated cash flows, first flow at t=0 for NPV
    #[arg(long, value_delimiter = ',')]
    pub cash_flows: Vec<Decimal>,

    /// Discount rate as a decimal (0.10 = 10%)
    #[arg(long)]
    pub discount_rate: Option<Decimal>,

    /// Terminal growth rate as a decimal
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,

    /// Terminal value method
    #[arg(long, value_enum)]
    pub terminal_method: Option<MethodArg>,

    /// Metric the exit multiple applies to
    #[arg(long)]
    pub terminal_metric: Option<Decimal>,

    /// Exit multiple
    #[arg(long)]
    pub terminal_multiple: Option<Decimal>,

    /// Liquidation value used by the liquidation method
    #[arg(long)]
    pub liquidation_value: Option<Decimal>,
}

/// Arguments for the WACC x growth matrix and tornado
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct SensitivityArgs {
    /// Path to a JSON or YAML sensitivity request (overrides the flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated forecast free cash flows
    #[arg(long, value_delimiter = ',')]
    pub free_cash_flows: Vec<Decimal>,

    /// Base discount rate as a decimal
    #[arg(long, default_value = "0.10")]
    pub discount_rate: Decimal,

    /// Base terminal growth as a decimal
    #[arg(long, default_value = "0.02")]
    pub terminal_growth: Decimal,
}

/// Arguments for best/base/worst scenarios
#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to a JSON or YAML business payload
    #[arg(long)]
    pub input: Option<String>,

    /// Path to scenario adjustments and sensitivity ranges
    #[arg(long)]
    pub settings: Option<String>,
}

fn request_from_flags(args: &ValuationArgs) -> ValuationRequest {
    let defaults = ValuationSettings::default();
    ValuationRequest {
        cash_flows: args.cash_flows.clone(),
        settings: ValuationSettings {
            discount_rate: args.discount_rate.unwrap_or(defaults.discount_rate),
            terminal_growth: args.terminal_growth.unwrap_or(defaults.terminal_growth),
            terminal_method: args
                .terminal_method
                .map(TerminalMethod::from)
                .unwrap_or(defaults.terminal_method),
            terminal_metric: args.terminal_metric.unwrap_or(defaults.terminal_metric),
            terminal_multiple: args.terminal_multiple.unwrap_or(defaults.terminal_multiple),
            liquidation_value: args.liquidation_value.unwrap_or(defaults.liquidation_value),
        },
        ..Default::default()
    }
}

pub fn run_valuation(args: ValuationArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ValuationRequest = if args.input.is_some() || args.cash_flows.is_empty() {
        input::load(args.input.as_deref(), "valuation")?
    } else {
        request_from_flags(&args)
    };
    let result = value_cash_flows(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sensitivity_cmd(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: SensitivityRequest = if args.input.is_some() || args.free_cash_flows.is_empty() {
        input::load(args.input.as_deref(), "sensitivity analysis")?
    } else {
        SensitivityRequest {
            free_cash_flows: args.free_cash_flows,
            discount_rate: args.discount_rate,
            terminal_growth: args.terminal_growth,
            wacc_range: Vec::new(),
            growth_range: Vec::new(),
            impacts: Vec::new(),
        }
    };
    let result = run_sensitivity(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_scenarios_cmd(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let data: ProFormaInput = input::load(args.input.as_deref(), "scenarios")?;
    let settings: ScenarioSettings = match args.settings {
        Some(ref path) => input::file::read_input(path)?,
        None => ScenarioSettings::default(),
    };
    let result = run_scenarios(&data, &settings)?;
    Ok(serde_json::to_value(result)?)
}
