use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ProFormaError;
use crate::time_value::{
    accumulate, discounted, irr, next_discount, npv, owner_roi, payback_period,
};
use crate::types::{checked_product, with_metadata, ComputationOutput, Money, Rate};
use crate::ProFormaResult;

/// Below this spread between discount rate and growth the perpetuity is undefined.
const MIN_PERPETUITY_SPREAD: Decimal = dec!(0.001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Method for computing terminal value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalMethod {
    /// Gordon growth: TV = FCF_last * (1+g) / (r-g)
    #[default]
    Perpetuity,
    /// TV = metric * multiple
    ExitMultiple,
    /// TV = a caller-supplied liquidation value
    Liquidation,
    None,
}

/// Discounting and terminal value assumptions shared by the valuation commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationSettings {
    /// Discount rate (WACC) as a decimal
    #[serde(default = "default_discount_rate")]
    pub discount_rate: Rate,
    /// Perpetuity growth rate as a decimal
    #[serde(default = "default_terminal_growth")]
    pub terminal_growth: Rate,
    #[serde(default)]
    pub terminal_method: TerminalMethod,
    /// Metric the exit multiple applies to (e.g. final-year EBITDA)
    #[serde(default)]
    pub terminal_metric: Money,
    #[serde(default)]
    pub terminal_multiple: Decimal,
    #[serde(default)]
    pub liquidation_value: Money,
}

fn default_discount_rate() -> Rate {
    dec!(0.10)
}

fn default_terminal_growth() -> Rate {
    dec!(0.02)
}

impl Default for ValuationSettings {
    fn default() -> Self {
        Self {
            discount_rate: default_discount_rate(),
            terminal_growth: default_terminal_growth(),
            terminal_method: TerminalMethod::default(),
            terminal_metric: Decimal::ZERO,
            terminal_multiple: Decimal::ZERO,
            liquidation_value: Decimal::ZERO,
        }
    }
}

impl ValuationSettings {
    pub fn terminal_value(&self, last_fcf: Money) -> ProFormaResult<Money> {
        terminal_value(
            self.terminal_method,
            &TerminalValueInput {
                last_fcf,
                discount_rate: self.discount_rate,
                terminal_growth: self.terminal_growth,
                metric_value: self.terminal_metric,
                multiple: self.terminal_multiple,
                custom_value: self.liquidation_value,
            },
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalValueInput {
    pub last_fcf: Money,
    pub discount_rate: Rate,
    #[serde(default)]
    pub terminal_growth: Rate,
    #[serde(default)]
    pub metric_value: Money,
    #[serde(default)]
    pub multiple: Decimal,
    #[serde(default)]
    pub custom_value: Money,
}

/// Flows plus settings for a one-shot valuation summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuationRequest {
    pub cash_flows: Vec<Money>,
    #[serde(flatten)]
    pub settings: ValuationSettings,
    #[serde(default)]
    pub owner_investments: Vec<Money>,
    #[serde(default)]
    pub owner_returns: Vec<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationSummary {
    pub terminal_value: Money,
    /// Flows discounted from t+1, terminal value at the final year
    pub dcf_value: Money,
    /// Flows discounted from t=0, terminal value appended as a final flow
    pub npv: Money,
    /// None when the IRR is undefined
    pub irr: Option<Rate>,
    pub payback_period: Decimal,
    pub owner_roi: Rate,
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Gordon growth value, or zero when the discount rate does not exceed growth.
pub fn perpetuity_value(
    last_fcf: Money,
    discount_rate: Rate,
    terminal_growth: Rate,
) -> ProFormaResult<Money> {
    let spread = discount_rate - terminal_growth;
    if spread <= MIN_PERPETUITY_SPREAD {
        return Ok(Decimal::ZERO);
    }
    last_fcf
        .checked_mul(Decimal::ONE + terminal_growth)
        .and_then(|next| next.checked_div(spread))
        .ok_or_else(|| terminal_out_of_range("perpetuity"))
}

pub fn terminal_value(method: TerminalMethod, input: &TerminalValueInput) -> ProFormaResult<Money> {
    match method {
        TerminalMethod::Perpetuity => {
            perpetuity_value(input.last_fcf, input.discount_rate, input.terminal_growth)
        }
        TerminalMethod::ExitMultiple => {
            checked_product(input.metric_value, input.multiple, "terminalMultiple")
        }
        TerminalMethod::Liquidation => Ok(input.custom_value),
        TerminalMethod::None => Ok(Decimal::ZERO),
    }
}

fn terminal_out_of_range(method: &str) -> ProFormaError {
    ProFormaError::InvalidInput {
        field: "terminal_value".into(),
        reason: format!("{method} terminal value exceeds the representable range"),
    }
}

/// Discounted value of forecast flows, each treated as a full period in the
/// future: `sum(cf_t / (1+r)^(t+1))`.
///
/// The terminal value is discounted at `terminal_year`, which defaults to the
/// number of flows. Unlike [`crate::time_value::npv`], no flow is left
/// undiscounted.
pub fn dcf_value(
    cash_flows: &[Money],
    discount_rate: Rate,
    terminal_value: Option<Money>,
    terminal_year: Option<u32>,
) -> ProFormaResult<Money> {
    if cash_flows.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let one_plus_r = Decimal::ONE + discount_rate;
    if one_plus_r <= Decimal::ZERO {
        return Err(ProFormaError::InvalidInput {
            field: "discount_rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut value = Decimal::ZERO;
    let mut factor = Decimal::ONE;
    for (t, cf) in cash_flows.iter().enumerate() {
        factor = next_discount(factor, one_plus_r, "DCF")?;
        value = accumulate(value, discounted(*cf, factor, "DCF", t + 1)?, "DCF")?;
    }

    if let Some(tv) = terminal_value {
        let year = terminal_year.unwrap_or(cash_flows.len() as u32);
        let mut tv_factor = Decimal::ONE;
        for _ in 0..year {
            tv_factor = next_discount(tv_factor, one_plus_r, "DCF")?;
        }
        value = accumulate(value, discounted(tv, tv_factor, "DCF", year as usize)?, "DCF")?;
    }

    Ok(value)
}

/// Terminal value, DCF, NPV, IRR, payback and owner ROI over one flow list.
pub fn value_cash_flows(
    request: &ValuationRequest,
) -> ProFormaResult<ComputationOutput<ValuationSummary>> {
    let start = Instant::now();
    let mut warnings = Vec::new();
    let settings = &request.settings;

    let last_fcf = request.cash_flows.last().copied().unwrap_or(Decimal::ZERO);
    let tv = settings.terminal_value(last_fcf)?;
    if settings.terminal_method == TerminalMethod::Perpetuity
        && settings.discount_rate - settings.terminal_growth <= MIN_PERPETUITY_SPREAD
    {
        warnings.push("Discount rate does not exceed terminal growth; terminal value set to 0".into());
    }

    let dcf = dcf_value(&request.cash_flows, settings.discount_rate, Some(tv), None)?;

    let mut npv_flows = request.cash_flows.clone();
    npv_flows.push(tv);
    let npv = npv(settings.discount_rate, &npv_flows)?;

    let irr = irr(&npv_flows);
    if irr.is_none() && !request.cash_flows.is_empty() {
        warnings.push("IRR is undefined for these cash flows".into());
    }

    let summary = ValuationSummary {
        terminal_value: tv,
        dcf_value: dcf,
        npv,
        irr,
        payback_period: payback_period(&request.cash_flows),
        owner_roi: owner_roi(&request.owner_investments, &request.owner_returns),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Discounted cash flow valuation",
        &serde_json::json!({
            "discount_rate": settings.discount_rate.to_string(),
            "terminal_growth": settings.terminal_growth.to_string(),
            "terminal_method": settings.terminal_method,
            "periods": request.cash_flows.len(),
        }),
        warnings,
        elapsed,
        summary,
    ))
}
