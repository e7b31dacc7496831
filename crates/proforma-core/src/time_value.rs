use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ProFormaError;
use crate::types::{Money, Rate};
use crate::ProFormaResult;

const IRR_TOLERANCE: Decimal = dec!(0.000001);
const MAX_IRR_ITERATIONS: u32 = 50;
const IRR_FLOOR: Decimal = dec!(-0.99);
const IRR_CEILING: Decimal = dec!(10);

/// Payback sentinel for flows whose cumulative total never turns non-negative.
pub const PAYBACK_NEVER: Decimal = dec!(999);

/// Net Present Value with the first flow at t = 0 (undiscounted).
///
/// This differs from [`crate::valuation::dcf::dcf_value`], which treats every
/// flow as future and discounts the first one by a full period.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> ProFormaResult<Money> {
    if rate <= dec!(-1) {
        return Err(ProFormaError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = next_discount(discount, one_plus_r, "NPV")?;
        }
        result = accumulate(result, discounted(*cf, discount, "NPV", t)?, "NPV")?;
    }

    Ok(result)
}

// ---------------------------------------------------------------------------
// Checked discounting
// ---------------------------------------------------------------------------

fn discount_out_of_range(context: &str) -> ProFormaError {
    ProFormaError::InvalidInput {
        field: "discount_rate".into(),
        reason: format!("{context} discounting exceeds the representable range"),
    }
}

/// `discount * (1 + r)`, or an error once the factor leaves Decimal's range.
pub(crate) fn next_discount(
    discount: Decimal,
    one_plus_r: Decimal,
    context: &str,
) -> ProFormaResult<Decimal> {
    discount
        .checked_mul(one_plus_r)
        .ok_or_else(|| discount_out_of_range(context))
}

/// `cf / discount`. A factor that has decayed to zero is a division by zero.
pub(crate) fn discounted(
    cf: Money,
    discount: Decimal,
    context: &str,
    period: usize,
) -> ProFormaResult<Money> {
    if discount.is_zero() {
        return Err(ProFormaError::DivisionByZero {
            context: format!("{context} discount factor at period {period}"),
        });
    }
    cf.checked_div(discount)
        .ok_or_else(|| discount_out_of_range(context))
}

pub(crate) fn accumulate(total: Money, value: Money, context: &str) -> ProFormaResult<Money> {
    total
        .checked_add(value)
        .ok_or_else(|| discount_out_of_range(context))
}

/// Newton-Raphson settings for [`irr_with`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrOptions {
    pub guess: Rate,
    pub max_iterations: u32,
    pub tolerance: Decimal,
}

impl Default for IrrOptions {
    fn default() -> Self {
        Self {
            guess: dec!(0.1),
            max_iterations: MAX_IRR_ITERATIONS,
            tolerance: IRR_TOLERANCE,
        }
    }
}

/// Internal Rate of Return with default settings (guess 10%, 50 iterations, 1e-6).
pub fn irr(cash_flows: &[Money]) -> Option<Rate> {
    irr_with(cash_flows, &IrrOptions::default())
}

/// Internal Rate of Return using Newton-Raphson on NPV.
///
/// Returns `None` when the IRR is undefined: empty or single-signed flows,
/// a zero derivative, divergence outside [-0.99, 10], or no convergence.
pub fn irr_with(cash_flows: &[Money], options: &IrrOptions) -> Option<Rate> {
    if cash_flows.is_empty()
        || cash_flows.iter().all(|cf| *cf >= Decimal::ZERO)
        || cash_flows.iter().all(|cf| *cf <= Decimal::ZERO)
    {
        return None;
    }

    let mut rate = options.guess;

    for _ in 0..options.max_iterations {
        let one_plus_r = Decimal::ONE + rate;
        if one_plus_r <= Decimal::ZERO {
            return None;
        }

        let (npv_val, dnpv) = npv_and_derivative(cash_flows, one_plus_r)?;

        if npv_val.abs() < options.tolerance {
            return Some(rate);
        }
        if dnpv.is_zero() {
            return None;
        }

        rate = rate.checked_sub(npv_val.checked_div(dnpv)?)?;

        if rate < IRR_FLOOR || rate > IRR_CEILING {
            return None;
        }
    }

    None
}

/// NPV and its derivative at `1 + r`, or None if either leaves Decimal's range.
fn npv_and_derivative(cash_flows: &[Money], one_plus_r: Decimal) -> Option<(Decimal, Decimal)> {
    let mut npv_val = Decimal::ZERO;
    let mut dnpv = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
        }
        npv_val = npv_val.checked_add(cf.checked_div(discount)?)?;
        let t_dec = Decimal::from(t as u64);
        let slope = t_dec
            .checked_mul(*cf)?
            .checked_div(discount.checked_mul(one_plus_r)?)?;
        dnpv = dnpv.checked_sub(slope)?;
    }

    Some((npv_val, dnpv))
}

/// Periods until the cumulative cash flow turns non-negative.
///
/// Flow 0 sits at t = 0, so crossing inside flow `i` reports
/// `(i - 1) + remaining / cf_i`. Returns [`PAYBACK_NEVER`] when the
/// cumulative total stays negative and zero when it never goes negative.
pub fn payback_period(cash_flows: &[Money]) -> Decimal {
    let mut cumulative = Decimal::ZERO;

    for (i, cf) in cash_flows.iter().enumerate() {
        let previous = cumulative;
        cumulative += cf;

        if previous < Decimal::ZERO && cumulative >= Decimal::ZERO {
            let elapsed = Decimal::from(i as u64) - Decimal::ONE;
            if cf.is_zero() {
                return elapsed.max(Decimal::ZERO);
            }
            return (elapsed + (-previous) / cf).max(Decimal::ZERO);
        }
    }

    if cumulative < Decimal::ZERO {
        PAYBACK_NEVER
    } else {
        Decimal::ZERO
    }
}

/// Owner ROI: (total returned - total invested) / total invested.
pub fn owner_roi(owner_investments: &[Money], owner_returns: &[Money]) -> Rate {
    let invested: Money = owner_investments.iter().sum();
    let returned: Money = owner_returns.iter().sum();
    if invested.is_zero() {
        return Decimal::ZERO;
    }
    (returned - invested) / invested
}
