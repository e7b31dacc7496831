#![cfg(feature = "monte_carlo")]

use proforma_core::monte_carlo::{monte_carlo_npv, risk_analysis, SampleRange};
use pretty_assertions::assert_eq;

const SEED: u64 = 7;

fn sample_flows() -> Vec<f64> {
    vec![-50_000.0, 20_000.0, 30_000.0, 40_000.0]
}

#[test]
fn test_histogram_counts_every_run() {
    let bins = monte_carlo_npv(
        &sample_flows(),
        SampleRange::new(0.08, 0.12),
        SampleRange::new(0.01, 0.03),
        500,
        Some(SEED),
    )
    .unwrap();

    assert_eq!(bins.len(), 7);
    assert_eq!(bins[0].bin, "<0");
    assert_eq!(bins.iter().map(|b| b.count).sum::<u32>(), 500);
}

#[test]
fn test_seeded_runs_repeat() {
    let run = || {
        risk_analysis(&sample_flows(), 0.10, 0.02, 300, Some(SEED)).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_risk_bands_are_ordered() {
    let risk = risk_analysis(&sample_flows(), 0.10, 0.02, 1000, Some(SEED)).unwrap();
    let ci = &risk.confidence_intervals;
    assert!(ci.npv_5th_percentile <= ci.npv_95th_percentile);
    assert!((0.0..=100.0).contains(&risk.positive_npv_probability));
    assert!(
        (risk.positive_npv_probability + risk.probability_of_loss - 100.0).abs() < 0.2,
        "positive {} loss {}",
        risk.positive_npv_probability,
        risk.probability_of_loss
    );
}

#[test]
fn test_inverted_range_is_rejected() {
    let result = monte_carlo_npv(
        &sample_flows(),
        SampleRange::new(0.2, 0.1),
        SampleRange::new(0.01, 0.03),
        10,
        Some(SEED),
    );
    assert!(result.is_err());
}
