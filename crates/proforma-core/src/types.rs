use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ProFormaError;
use crate::ProFormaResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Percent inputs are converted with [`percent`].
pub type Rate = Decimal;

/// One value per fiscal year, historical years first, then forecast years.
pub type YearSeries = Vec<Money>;

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
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
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Series helpers
// ---------------------------------------------------------------------------

/// A zero-filled series of the given length.
pub fn zeros(len: usize) -> YearSeries {
    vec![Decimal::ZERO; len]
}

/// Force a series to exactly `len` entries: zero-pad on the right, or truncate.
pub fn normalize_length(mut series: YearSeries, len: usize) -> YearSeries {
    series.resize(len, Decimal::ZERO);
    series
}

/// Element-wise negation, used for "Less:" presentation rows.
pub fn negated(series: &[Money]) -> YearSeries {
    series.iter().map(|v| -v).collect()
}

/// Running total of a series.
pub fn cumulative(series: &[Money]) -> YearSeries {
    series
        .iter()
        .scan(Decimal::ZERO, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// Year-over-year deltas with the first entry pinned to zero.
pub fn deltas(series: &[Money]) -> YearSeries {
    let mut out = zeros(series.len());
    for i in 1..series.len() {
        out[i] = series[i] - series[i - 1];
    }
    out
}

/// `base * (1 + rate)^periods` by repeated multiplication.
pub fn compound(base: Money, rate: Rate, periods: u32) -> ProFormaResult<Money> {
    let factor = Decimal::ONE + rate;
    let mut value = base;
    for _ in 0..periods {
        value = checked_product(value, factor, "compound")?;
    }
    Ok(value)
}

/// Multiplication that reports overflow instead of panicking.
pub fn checked_product(a: Decimal, b: Decimal, context: &str) -> ProFormaResult<Decimal> {
    a.checked_mul(b).ok_or_else(|| ProFormaError::InvalidInput {
        field: context.to_string(),
        reason: "value exceeds the representable range".into(),
    })
}

/// Convert a whole-number percentage (25 = 25%) to a fraction.
pub fn percent(value: Decimal) -> Rate {
    value / dec!(100)
}

/// Division that yields zero when the denominator is zero.
pub fn safe_divide(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_pads_short_series() {
        let out = normalize_length(vec![dec!(1), dec!(2)], 5);
        assert_eq!(out, vec![dec!(1), dec!(2), dec!(0), dec!(0), dec!(0)]);
    }

    #[test]
    fn test_normalize_truncates_long_series() {
        let out = normalize_length(vec![dec!(1), dec!(2), dec!(3), dec!(4)], 2);
        assert_eq!(out, vec![dec!(1), dec!(2)]);
    }

    #[test]
    fn test_compound_growth() {
        assert_eq!(compound(dec!(100), dec!(0.10), 2).unwrap(), dec!(121.00));
        assert_eq!(compound(dec!(100), dec!(0.10), 0).unwrap(), dec!(100));
    }

    #[test]
    fn test_compound_overflow_is_an_error() {
        let err = compound(dec!(100000), dec!(10), 40).unwrap_err();
        assert!(err.to_string().contains("representable range"));
    }

    #[test]
    fn test_cumulative_and_deltas() {
        let s = vec![dec!(10), dec!(15), dec!(12)];
        assert_eq!(cumulative(&s), vec![dec!(10), dec!(25), dec!(37)]);
        assert_eq!(deltas(&s), vec![dec!(0), dec!(5), dec!(-3)]);
    }

    #[test]
    fn test_safe_divide_zero_denominator() {
        assert_eq!(safe_divide(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_divide(dec!(5), dec!(2)), dec!(2.5));
    }
}
