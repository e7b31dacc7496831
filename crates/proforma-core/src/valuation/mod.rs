//! DCF primitives, the memoised DCF, WACC/growth sensitivity and scenarios.
//!
//! Two discounting conventions coexist. [`dcf::dcf_value`] treats every
//! forecast flow as future (`t+1`), while [`crate::time_value::npv`] leaves
//! the first flow undiscounted (`t=0`). Scenario KPIs use the NPV convention,
//! sensitivity grids and tornado bars use the DCF one.

pub mod cache;
pub mod dcf;
pub mod scenario;
pub mod sensitivity;

pub use cache::DcfCache;
pub use dcf::{
    dcf_value, perpetuity_value, terminal_value, value_cash_flows, TerminalMethod,
    TerminalValueInput, ValuationRequest, ValuationSettings, ValuationSummary,
};
pub use scenario::{
    apply_scenario, scenario_comparison, scenario_kpis, sensitivity_analysis, ForecastYear,
    ScenarioAdjustments, ScenarioComparison, ScenarioKpis, ScenarioSensitivity, ScenarioSettings,
    ScenarioTornadoEntry, ScenarioVariable, SensitivityRange,
};
#[cfg(feature = "statements")]
pub use scenario::{forecast_from_pipeline, run_scenarios, ScenarioReport};
pub use sensitivity::{
    heatmap_axes, run_sensitivity, sensitivity_heatmap, sensitivity_matrix, standard_impacts,
    tornado_data, ImpactKind, SensitivityRequest, SensitivityRow, TornadoEntry, VariableImpact,
};
