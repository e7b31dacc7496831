use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::Uniform;
use std::time::Instant;
use tracing::debug;

use crate::error::ProFormaError;
use crate::time_value::irr;
use crate::types::{ComputationMetadata, ComputationOutput};
use crate::ProFormaResult;

const DEFAULT_RUNS: u32 = 100;
const IRR_THRESHOLD: f64 = 0.15;
const MIN_PERPETUITY_SPREAD: f64 = 0.001;

/// Upper edges of the NPV histogram; the last bin is open-ended.
const BIN_EDGES: [f64; 6] = [0.0, 100_000.0, 200_000.0, 300_000.0, 400_000.0, 500_000.0];
const BIN_LABELS: [&str; 7] = [
    "<0",
    "0-100k",
    "100k-200k",
    "200k-300k",
    "300k-400k",
    "400k-500k",
    ">500k",
];

// ---------------------------------------------------------------------------
// f64 output envelope
// ---------------------------------------------------------------------------

fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_runs() -> u32 {
    DEFAULT_RUNS
}

/// Inclusive sampling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRange {
    pub min: f64,
    pub max: f64,
}

impl SampleRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloNpvInput {
    pub free_cash_flows: Vec<f64>,
    pub discount_rate_range: SampleRange,
    pub terminal_growth_range: SampleRange,
    #[serde(default = "default_runs")]
    pub runs: u32,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpvBin {
    pub bin: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysisInput {
    pub free_cash_flows: Vec<f64>,
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    #[serde(default = "default_terminal_growth")]
    pub terminal_growth: f64,
    #[serde(default = "default_runs")]
    pub runs: u32,
    pub seed: Option<u64>,
}

fn default_discount_rate() -> f64 {
    0.10
}

fn default_terminal_growth() -> f64 {
    0.02
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    pub npv_5th_percentile: f64,
    pub npv_95th_percentile: f64,
    /// Percent
    pub irr_5th_percentile: f64,
    /// Percent
    pub irr_95th_percentile: f64,
}

/// Probabilities are percentages rounded to one decimal place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub positive_npv_probability: f64,
    pub irr_above_threshold_probability: f64,
    pub probability_of_loss: f64,
    pub confidence_intervals: ConfidenceIntervals,
}

impl RiskAnalysis {
    fn no_flows() -> Self {
        Self {
            positive_npv_probability: 0.0,
            irr_above_threshold_probability: 0.0,
            probability_of_loss: 100.0,
            confidence_intervals: ConfidenceIntervals::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

enum Sampler {
    Fixed(f64),
    Uniform(Uniform),
}

impl Sampler {
    fn new(range: SampleRange, field: &str) -> ProFormaResult<Self> {
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return Err(ProFormaError::InvalidInput {
                field: field.into(),
                reason: format!("Invalid range [{}, {}]", range.min, range.max),
            });
        }
        if (range.max - range.min).abs() < f64::EPSILON {
            return Ok(Sampler::Fixed(range.min));
        }
        Uniform::new(range.min, range.max)
            .map(Sampler::Uniform)
            .map_err(|e| ProFormaError::InvalidInput {
                field: field.into(),
                reason: format!("Invalid Uniform parameters: {e}"),
            })
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        match self {
            Sampler::Fixed(v) => *v,
            Sampler::Uniform(u) => rng.sample(u),
        }
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn perpetuity_f64(last_fcf: f64, rate: f64, growth: f64) -> f64 {
    if rate - growth > MIN_PERPETUITY_SPREAD {
        last_fcf * (1.0 + growth) / (rate - growth)
    } else {
        0.0
    }
}

/// NPV with the first flow at t = 0.
fn npv_f64(rate: f64, flows: &[f64]) -> f64 {
    let mut discount = 1.0;
    let mut total = 0.0;
    for (t, cf) in flows.iter().enumerate() {
        if t > 0 {
            discount *= 1.0 + rate;
        }
        total += cf / discount;
    }
    total
}

/// Sampled NPVs of the flows plus a perpetuity terminal value.
fn simulate_npvs(
    fcf: &[f64],
    discount: &Sampler,
    growth: &Sampler,
    runs: u32,
    rng: &mut StdRng,
) -> Vec<f64> {
    let last = fcf.last().copied().unwrap_or(0.0);
    let mut flows = fcf.to_vec();
    flows.push(0.0);
    let tv_slot = flows.len() - 1;

    (0..runs)
        .map(|_| {
            let rate = discount.sample(rng);
            let g = growth.sample(rng);
            flows[tv_slot] = perpetuity_f64(last, rate, g);
            npv_f64(rate, &flows)
        })
        .collect()
}

fn bin_index(npv: f64) -> usize {
    BIN_EDGES
        .iter()
        .position(|edge| npv < *edge)
        .unwrap_or(BIN_EDGES.len())
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `sorted[floor(len * p)]`, clamped to the last element.
fn percentile_index(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Histogram of simulated NPVs over fixed 100k-wide bins.
pub fn monte_carlo_npv(
    free_cash_flows: &[f64],
    discount_rate_range: SampleRange,
    terminal_growth_range: SampleRange,
    runs: u32,
    seed: Option<u64>,
) -> ProFormaResult<Vec<NpvBin>> {
    let discount = Sampler::new(discount_rate_range, "discount_rate_range")?;
    let growth = Sampler::new(terminal_growth_range, "terminal_growth_range")?;
    if discount_rate_range.min <= -1.0 {
        return Err(ProFormaError::InvalidInput {
            field: "discount_rate_range".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut rng = rng_for(seed);
    let npvs = simulate_npvs(free_cash_flows, &discount, &growth, runs, &mut rng);

    let mut counts = [0u32; BIN_LABELS.len()];
    for npv in &npvs {
        counts[bin_index(*npv)] += 1;
    }
    debug!(runs, counts = ?counts, "monte carlo npv binned");

    Ok(BIN_LABELS
        .iter()
        .zip(counts)
        .map(|(label, count)| NpvBin {
            bin: (*label).to_string(),
            count,
        })
        .collect())
}

/// Probability of positive NPV and loss, IRR threshold probability and
/// 5th/95th percentile bands.
///
/// Discount rate is drawn from 80%-120% of base, growth within one point of
/// base (floored at zero). The IRR input forces a positive first flow
/// negative; it does not depend on the draws.
pub fn risk_analysis(
    free_cash_flows: &[f64],
    discount_rate: f64,
    terminal_growth: f64,
    runs: u32,
    seed: Option<u64>,
) -> ProFormaResult<RiskAnalysis> {
    if free_cash_flows.is_empty() {
        return Ok(RiskAnalysis::no_flows());
    }

    let (low, high) = (discount_rate * 0.8, discount_rate * 1.2);
    let discount = Sampler::new(SampleRange::new(low.min(high), low.max(high)), "discount_rate")?;
    let growth = Sampler::new(
        SampleRange::new((terminal_growth - 0.01).max(0.0), terminal_growth + 0.01),
        "terminal_growth",
    )?;
    if low.min(high) <= -1.0 {
        return Err(ProFormaError::InvalidInput {
            field: "discount_rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut rng = rng_for(seed);
    let mut npvs = simulate_npvs(free_cash_flows, &discount, &growth, runs, &mut rng);
    npvs.sort_by(|a, b| a.total_cmp(b));

    let mut irr_flows: Vec<Decimal> = free_cash_flows
        .iter()
        .map(|cf| Decimal::from_f64(*cf).unwrap_or(Decimal::ZERO))
        .collect();
    if let Some(first) = irr_flows.first_mut() {
        if *first > Decimal::ZERO {
            *first = -*first;
        }
    }
    let project_irr = irr(&irr_flows).and_then(|r| r.to_f64());

    let positive = npvs.iter().filter(|npv| **npv > 0.0).count();
    let positive_npv_probability = if npvs.is_empty() {
        0.0
    } else {
        positive as f64 / npvs.len() as f64 * 100.0
    };
    let irr_above_threshold_probability = match project_irr {
        Some(r) if runs > 0 && r > IRR_THRESHOLD => 100.0,
        _ => 0.0,
    };
    let irr_percentile = project_irr.filter(|_| runs > 0).unwrap_or(0.0) * 100.0;

    Ok(RiskAnalysis {
        positive_npv_probability: round_to(positive_npv_probability, 1),
        irr_above_threshold_probability: round_to(irr_above_threshold_probability, 1),
        probability_of_loss: round_to(100.0 - positive_npv_probability, 1),
        confidence_intervals: ConfidenceIntervals {
            npv_5th_percentile: round_to(percentile_index(&npvs, 0.05), 0),
            npv_95th_percentile: round_to(percentile_index(&npvs, 0.95), 0),
            irr_5th_percentile: round_to(irr_percentile, 1),
            irr_95th_percentile: round_to(irr_percentile, 1),
        },
    })
}

pub fn run_monte_carlo_npv(
    input: &MonteCarloNpvInput,
) -> ProFormaResult<ComputationOutput<Vec<NpvBin>>> {
    let start = Instant::now();
    let mut warnings = Vec::new();
    if input.free_cash_flows.is_empty() {
        warnings.push("No free cash flows supplied; NPV is terminal value only".to_string());
    }

    let bins = monte_carlo_npv(
        &input.free_cash_flows,
        input.discount_rate_range,
        input.terminal_growth_range,
        input.runs,
        input.seed,
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo NPV (uniform discount rate and terminal growth)",
        &serde_json::json!({
            "runs": input.runs,
            "seed": input.seed,
            "discount_rate_range": input.discount_rate_range,
            "terminal_growth_range": input.terminal_growth_range,
        }),
        warnings,
        elapsed,
        bins,
    ))
}

pub fn run_risk_analysis(
    input: &RiskAnalysisInput,
) -> ProFormaResult<ComputationOutput<RiskAnalysis>> {
    let start = Instant::now();
    let result = risk_analysis(
        &input.free_cash_flows,
        input.discount_rate,
        input.terminal_growth,
        input.runs,
        input.seed,
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo risk analysis",
        &serde_json::json!({
            "runs": input.runs,
            "seed": input.seed,
            "discount_rate": input.discount_rate,
            "terminal_growth": input.terminal_growth,
            "irr_threshold": IRR_THRESHOLD,
        }),
        Vec::new(),
        elapsed,
        result,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEED: u64 = 42;

    fn sample_fcf() -> Vec<f64> {
        vec![20_000.0, 22_000.0, 24_000.0]
    }

    #[test]
    fn test_bins_cover_every_run() {
        let bins = monte_carlo_npv(
            &sample_fcf(),
            SampleRange::new(0.08, 0.12),
            SampleRange::new(0.01, 0.03),
            100,
            Some(SEED),
        )
        .unwrap();
        assert_eq!(bins.len(), 7);
        assert_eq!(bins[0].bin, "<0");
        assert_eq!(bins[6].bin, ">500k");
        assert_eq!(bins.iter().map(|b| b.count).sum::<u32>(), 100);
    }

    #[test]
    fn test_seeded_reproducibility() {
        let run = || {
            monte_carlo_npv(
                &[-50_000.0, 30_000.0, 30_000.0],
                SampleRange::new(0.05, 0.20),
                SampleRange::new(0.0, 0.04),
                200,
                Some(SEED),
            )
            .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_bin_edges() {
        assert_eq!(bin_index(-0.01), 0);
        assert_eq!(bin_index(0.0), 1);
        assert_eq!(bin_index(99_999.0), 1);
        assert_eq!(bin_index(100_000.0), 2);
        assert_eq!(bin_index(1e9), 6);
    }

    #[test]
    fn test_fixed_range_is_deterministic() {
        let bins = monte_carlo_npv(
            &[1_000.0],
            SampleRange::new(0.10, 0.10),
            SampleRange::new(0.02, 0.02),
            10,
            None,
        )
        .unwrap();
        // 1000 + 12750 / 1.1 lands in 0-100k every time.
        assert_eq!(bins[1].count, 10);
    }

    #[test]
    fn test_invalid_range() {
        assert!(monte_carlo_npv(
            &sample_fcf(),
            SampleRange::new(0.2, 0.1),
            SampleRange::new(0.0, 0.01),
            10,
            Some(SEED)
        )
        .is_err());
    }

    #[test]
    fn test_risk_analysis_profitable_flows() {
        let risk = risk_analysis(&sample_fcf(), 0.10, 0.02, 100, Some(SEED)).unwrap();
        assert_eq!(risk.positive_npv_probability, 100.0);
        assert_eq!(risk.probability_of_loss, 0.0);
        assert!(
            risk.confidence_intervals.npv_5th_percentile
                <= risk.confidence_intervals.npv_95th_percentile
        );
        // IRR of [-20000, 22000, 24000] is roughly 77%.
        assert_eq!(risk.irr_above_threshold_probability, 100.0);
        assert!(risk.confidence_intervals.irr_5th_percentile > 15.0);
    }

    #[test]
    fn test_risk_analysis_without_flows() {
        let risk = risk_analysis(&[], 0.10, 0.02, 100, Some(SEED)).unwrap();
        assert_eq!(risk, RiskAnalysis::no_flows());
        assert_eq!(risk.probability_of_loss, 100.0);
    }

    #[test]
    fn test_percentile_index() {
        let sorted: Vec<f64> = (0..100).map(f64::from).collect();
        assert_eq!(percentile_index(&sorted, 0.05), 5.0);
        assert_eq!(percentile_index(&sorted, 0.95), 95.0);
        assert_eq!(percentile_index(&[], 0.5), 0.0);
    }
}
