use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::cache::DcfCache;
use super::dcf::perpetuity_value;
use crate::types::{checked_product, with_metadata, ComputationOutput, Money, Rate};
use crate::ProFormaResult;

const HEATMAP_WACC_STEP: Decimal = dec!(0.02);
const HEATMAP_WACC_FLOOR: Decimal = dec!(0.05);
const HEATMAP_WACC_CAP: Decimal = dec!(0.20);
const HEATMAP_GROWTH_STEP: Decimal = dec!(0.01);
const HEATMAP_GROWTH_FLOOR: Decimal = dec!(0.005);
const HEATMAP_GROWTH_CAP: Decimal = dec!(0.08);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthPoint {
    pub growth: Rate,
    pub dcf: Money,
}

/// One WACC row of a WACC x terminal-growth grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRow {
    pub wacc: Rate,
    pub values: Vec<GrowthPoint>,
}

/// Which input a tornado bar flexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactKind {
    /// `low`/`high` multiply every free cash flow
    Fcf,
    /// `low`/`high` replace the discount rate
    Wacc,
    /// `low`/`high` replace the terminal growth rate
    Growth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableImpact {
    pub variable: String,
    #[serde(rename = "type")]
    pub kind: ImpactKind,
    pub low: Decimal,
    pub high: Decimal,
}

impl VariableImpact {
    pub fn new(variable: impl Into<String>, kind: ImpactKind, low: Decimal, high: Decimal) -> Self {
        Self {
            variable: variable.into(),
            kind,
            low,
            high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoEntry {
    pub variable: String,
    pub low: Money,
    pub high: Money,
    pub base: Money,
}

impl TornadoEntry {
    pub fn spread(&self) -> Money {
        self.high
            .checked_sub(self.low)
            .map(|d| d.abs())
            .unwrap_or(Decimal::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRequest {
    pub free_cash_flows: Vec<Money>,
    pub discount_rate: Rate,
    pub terminal_growth: Rate,
    /// Defaults to the heatmap WACC axis
    #[serde(default)]
    pub wacc_range: Vec<Rate>,
    /// Defaults to the heatmap growth axis
    #[serde(default)]
    pub growth_range: Vec<Rate>,
    /// Defaults to [`standard_impacts`]
    #[serde(default)]
    pub impacts: Vec<VariableImpact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityReport {
    pub sensitivity_matrix: Vec<SensitivityRow>,
    pub tornado: Vec<TornadoEntry>,
    pub heatmap: Vec<SensitivityRow>,
}

// ---------------------------------------------------------------------------
// Sweeps
// ---------------------------------------------------------------------------

fn perpetuity_dcf(
    cache: &mut DcfCache,
    fcf: &[Money],
    wacc: Rate,
    growth: Rate,
) -> ProFormaResult<Money> {
    let last = fcf.last().copied().unwrap_or(Decimal::ZERO);
    let tv = perpetuity_value(last, wacc, growth)?;
    cache.dcf_value(fcf, wacc, Some(tv), None)
}

/// DCF value for every WACC x growth combination.
pub fn sensitivity_matrix(
    cache: &mut DcfCache,
    free_cash_flows: &[Money],
    wacc_range: &[Rate],
    growth_range: &[Rate],
) -> ProFormaResult<Vec<SensitivityRow>> {
    if free_cash_flows.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows = Vec::with_capacity(wacc_range.len());
    for &wacc in wacc_range {
        let mut values = Vec::with_capacity(growth_range.len());
        for &growth in growth_range {
            values.push(GrowthPoint {
                growth,
                dcf: perpetuity_dcf(cache, free_cash_flows, wacc, growth)?,
            });
        }
        rows.push(SensitivityRow { wacc, values });
    }
    Ok(rows)
}

/// DCF at the low and high bound of each variable, others held at base.
/// Sorted by descending spread.
pub fn tornado_data(
    cache: &mut DcfCache,
    free_cash_flows: &[Money],
    base_wacc: Rate,
    base_growth: Rate,
    impacts: &[VariableImpact],
) -> ProFormaResult<Vec<TornadoEntry>> {
    if free_cash_flows.is_empty() {
        return Ok(Vec::new());
    }

    let base = perpetuity_dcf(cache, free_cash_flows, base_wacc, base_growth)?;
    let mut entries = Vec::with_capacity(impacts.len());

    for impact in impacts {
        let (low, high) = match impact.kind {
            ImpactKind::Fcf => {
                let scaled = |factor: Decimal| -> ProFormaResult<Vec<Money>> {
                    free_cash_flows
                        .iter()
                        .map(|cf| checked_product(*cf, factor, "free_cash_flows"))
                        .collect()
                };
                (
                    perpetuity_dcf(cache, &scaled(impact.low)?, base_wacc, base_growth)?,
                    perpetuity_dcf(cache, &scaled(impact.high)?, base_wacc, base_growth)?,
                )
            }
            ImpactKind::Wacc => (
                perpetuity_dcf(cache, free_cash_flows, impact.low, base_growth)?,
                perpetuity_dcf(cache, free_cash_flows, impact.high, base_growth)?,
            ),
            ImpactKind::Growth => (
                perpetuity_dcf(cache, free_cash_flows, base_wacc, impact.low)?,
                perpetuity_dcf(cache, free_cash_flows, base_wacc, impact.high)?,
            ),
        };
        entries.push(TornadoEntry {
            variable: impact.variable.clone(),
            low,
            high,
            base,
        });
    }

    entries.sort_by(|a, b| b.spread().cmp(&a.spread()));
    Ok(entries)
}

/// Heatmap axes: three WACC and three growth points around the base case.
pub fn heatmap_axes(wacc: Rate, growth: Rate) -> ([Rate; 3], [Rate; 3]) {
    (
        [
            (wacc - HEATMAP_WACC_STEP).max(HEATMAP_WACC_FLOOR),
            wacc,
            (wacc + HEATMAP_WACC_STEP).min(HEATMAP_WACC_CAP),
        ],
        [
            (growth - HEATMAP_GROWTH_STEP).max(HEATMAP_GROWTH_FLOOR),
            growth,
            (growth + HEATMAP_GROWTH_STEP).min(HEATMAP_GROWTH_CAP),
        ],
    )
}

pub fn sensitivity_heatmap(
    cache: &mut DcfCache,
    free_cash_flows: &[Money],
    wacc: Rate,
    growth: Rate,
) -> ProFormaResult<Vec<SensitivityRow>> {
    let (wacc_axis, growth_axis) = heatmap_axes(wacc, growth);
    sensitivity_matrix(cache, free_cash_flows, &wacc_axis, &growth_axis)
}

/// Free cash flow x0.8/x1.2, WACC +/-2 points, terminal growth +/-1 point.
pub fn standard_impacts(wacc: Rate, growth: Rate) -> Vec<VariableImpact> {
    vec![
        VariableImpact::new("Free Cash Flow", ImpactKind::Fcf, dec!(0.8), dec!(1.2)),
        VariableImpact::new("WACC", ImpactKind::Wacc, wacc - dec!(0.02), wacc + dec!(0.02)),
        VariableImpact::new(
            "Terminal Growth",
            ImpactKind::Growth,
            growth - dec!(0.01),
            growth + dec!(0.01),
        ),
    ]
}

/// Matrix, tornado and heatmap from one shared cache.
pub fn run_sensitivity(
    request: &SensitivityRequest,
) -> ProFormaResult<ComputationOutput<SensitivityReport>> {
    let start = Instant::now();
    let mut cache = DcfCache::new();
    let (wacc_axis, growth_axis) = heatmap_axes(request.discount_rate, request.terminal_growth);

    let wacc_range = if request.wacc_range.is_empty() {
        wacc_axis.to_vec()
    } else {
        request.wacc_range.clone()
    };
    let growth_range = if request.growth_range.is_empty() {
        growth_axis.to_vec()
    } else {
        request.growth_range.clone()
    };
    let impacts = if request.impacts.is_empty() {
        standard_impacts(request.discount_rate, request.terminal_growth)
    } else {
        request.impacts.clone()
    };

    let fcf = &request.free_cash_flows;
    let report = SensitivityReport {
        sensitivity_matrix: sensitivity_matrix(&mut cache, fcf, &wacc_range, &growth_range)?,
        tornado: tornado_data(
            &mut cache,
            fcf,
            request.discount_rate,
            request.terminal_growth,
            &impacts,
        )?,
        heatmap: sensitivity_heatmap(
            &mut cache,
            fcf,
            request.discount_rate,
            request.terminal_growth,
        )?,
    };

    let mut warnings = Vec::new();
    if fcf.is_empty() {
        warnings.push("No free cash flows supplied".to_string());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "WACC x terminal growth DCF sensitivity",
        &serde_json::json!({
            "discount_rate": request.discount_rate.to_string(),
            "terminal_growth": request.terminal_growth.to_string(),
            "cache_hits": cache.hits(),
            "cache_misses": cache.misses(),
        }),
        warnings,
        elapsed,
        report,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::dcf::dcf_value;
    use pretty_assertions::assert_eq;

    fn sample_fcf() -> Vec<Money> {
        vec![dec!(1000), dec!(1100), dec!(1200)]
    }

    #[test]
    fn test_matrix_shape_and_values() {
        let mut cache = DcfCache::new();
        let rows = sensitivity_matrix(
            &mut cache,
            &sample_fcf(),
            &[dec!(0.08), dec!(0.10)],
            &[dec!(0.01), dec!(0.02), dec!(0.03)],
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].values.len(), 3);

        let tv = perpetuity_value(dec!(1200), dec!(0.10), dec!(0.02)).unwrap();
        let expected = dcf_value(&sample_fcf(), dec!(0.10), Some(tv), None).unwrap();
        assert_eq!(rows[1].values[1].dcf, expected);
        // Higher growth raises value along a row.
        assert!(rows[0].values[2].dcf > rows[0].values[0].dcf);
    }

    #[test]
    fn test_empty_flows() {
        let mut cache = DcfCache::new();
        assert!(sensitivity_matrix(&mut cache, &[], &[dec!(0.1)], &[dec!(0.02)])
            .unwrap()
            .is_empty());
        assert!(tornado_data(&mut cache, &[], dec!(0.1), dec!(0.02), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_tornado_sorted_by_spread() {
        let mut cache = DcfCache::new();
        let impacts = vec![
            VariableImpact::new("Flat", ImpactKind::Fcf, dec!(1), dec!(1)),
            VariableImpact::new("Growth", ImpactKind::Growth, dec!(0.01), dec!(0.03)),
            VariableImpact::new("WACC", ImpactKind::Wacc, dec!(0.08), dec!(0.12)),
        ];
        let entries =
            tornado_data(&mut cache, &sample_fcf(), dec!(0.10), dec!(0.02), &impacts).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].spread() >= entries[1].spread());
        assert!(entries[1].spread() >= entries[2].spread());
        assert_eq!(entries[2].variable, "Flat");
        assert_eq!(entries[2].low, entries[2].base);
        // Lower WACC means higher value.
        let wacc = entries.iter().find(|e| e.variable == "WACC").unwrap();
        assert!(wacc.low > wacc.high);
    }

    #[test]
    fn test_heatmap_axes_clamped() {
        let (w, g) = heatmap_axes(dec!(0.06), dec!(0.075));
        assert_eq!(w, [dec!(0.05), dec!(0.06), dec!(0.08)]);
        assert_eq!(g, [dec!(0.065), dec!(0.075), dec!(0.08)]);

        let mut cache = DcfCache::new();
        let grid = sensitivity_heatmap(&mut cache, &sample_fcf(), dec!(0.10), dec!(0.02)).unwrap();
        assert_eq!(grid.len(), 3);
        assert!(grid.iter().all(|row| row.values.len() == 3));
    }

    #[test]
    fn test_run_sensitivity_reuses_cache() {
        let request = SensitivityRequest {
            free_cash_flows: sample_fcf(),
            discount_rate: dec!(0.10),
            terminal_growth: dec!(0.02),
            wacc_range: vec![],
            growth_range: vec![],
            impacts: vec![],
        };
        let out = run_sensitivity(&request).unwrap();
        assert_eq!(out.result.tornado.len(), 3);
        assert_eq!(out.result.sensitivity_matrix, out.result.heatmap);
        assert!(out.assumptions["cache_hits"].as_u64().unwrap() > 0);
    }
}
