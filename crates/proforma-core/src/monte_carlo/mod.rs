//! Stochastic NPV and risk analysis. Computed in `f64`, not `Decimal`.

pub mod simulation;

pub use simulation::{
    monte_carlo_npv, risk_analysis, run_monte_carlo_npv, run_risk_analysis, ConfidenceIntervals,
    MonteCarloNpvInput, NpvBin, RiskAnalysis, RiskAnalysisInput, SampleRange,
};
