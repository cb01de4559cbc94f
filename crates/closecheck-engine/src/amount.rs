//! Exact monetary arithmetic: quantization, tolerance math, lenient parsing.
//!
//! Invariants:
//! - Money is [`rust_decimal::Decimal`] throughout; floats never enter a
//!   comparison.
//! - Quantization rounds to the scale of the configured increment (e.g.
//!   `"0.01"` → 2 decimal places) with banker's rounding, so shifting every
//!   input by less than half the quantum cannot change a verdict.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Quantization
// ---------------------------------------------------------------------------

/// Round `value` to the scale of `increment` (banker's rounding). `None`
/// leaves the value exact.
pub fn quantize(value: Decimal, increment: Option<Decimal>) -> Decimal {
    match increment {
        Some(q) => {
            value.round_dp_with_strategy(q.scale(), RoundingStrategy::MidpointNearestEven)
        }
        None => value,
    }
}

// ---------------------------------------------------------------------------
// VarianceThreshold
// ---------------------------------------------------------------------------

/// Acceptable variance for a should-be-zero account: a fixed floor and/or a
/// fraction of period revenue, whichever is larger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceThreshold {
    #[serde(default)]
    pub floor_amount: Decimal,
    #[serde(default)]
    pub pct_of_revenue: Decimal,
}

impl VarianceThreshold {
    /// Whether either component is set to a non-zero value.
    pub fn is_configured(&self) -> bool {
        !self.floor_amount.is_zero() || !self.pct_of_revenue.is_zero()
    }

    /// `max(floor_amount, |revenue| * pct_of_revenue)`; the revenue
    /// component is zero when revenue is unknown.
    pub fn allowed_variance(&self, revenue_total: Option<Decimal>) -> Decimal {
        let revenue_component = match revenue_total {
            Some(revenue) => (revenue.abs() * self.pct_of_revenue).abs(),
            None => Decimal::ZERO,
        };
        self.floor_amount.max(revenue_component)
    }
}

// ---------------------------------------------------------------------------
// Lenient parsing
// ---------------------------------------------------------------------------

/// Parse a decimal out of free-form evidence metadata. Accepts JSON numbers
/// and strings (thousands separators stripped); anything else is `None`.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<Decimal>().ok()
        }
        _ => None,
    }
}
