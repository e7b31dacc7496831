use clap::Args;
use serde_json::Value;

use proforma_core::monte_carlo::{
    run_monte_carlo_npv, run_risk_analysis, MonteCarloNpvInput, RiskAnalysisInput,
};

use crate::input;

/// Arguments for the Monte Carlo NPV histogram
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to a JSON or YAML simulation request
    #[arg(long)]
    pub input: Option<String>,

    /// Number of simulation runs (overrides the request)
    #[arg(long)]
    pub runs: Option<u32>,

    /// Random seed for reproducible draws
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for risk analysis
#[derive(Args)]
pub struct RiskArgs {
    /// Path to a JSON or YAML risk request
    #[arg(long)]
    pub input: Option<String>,

    /// Number of simulation runs (overrides the request)
    #[arg(long)]
    pub runs: Option<u32>,

    /// Random seed for reproducible draws
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut mc_input: MonteCarloNpvInput = input::load(args.input.as_deref(), "Monte Carlo NPV")?;
    if let Some(runs) = args.runs {
        mc_input.runs = runs;
    }
    if args.seed.is_some() {
        mc_input.seed = args.seed;
    }
    let result = run_monte_carlo_npv(&mc_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_risk(args: RiskArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut risk_input: RiskAnalysisInput = input::load(args.input.as_deref(), "risk analysis")?;
    if let Some(runs) = args.runs {
        risk_input.runs = runs;
    }
    if args.seed.is_some() {
        risk_input.seed = args.seed;
    }
    let result = run_risk_analysis(&risk_input)?;
    Ok(serde_json::to_value(result)?)
}
