//! Asset precision and float/chain-integer conversion.
//!
//! The chain represents amounts as integers at a fixed number of decimal
//! places per asset. The core works in floats internally and only crosses
//! into chain-integer space at the batch planner boundary; this module is
//! the single place that conversion happens so the round-trip law in
//! testable properties has one implementation to hold.

use serde::{Deserialize, Serialize};

/// Decimal precision for one asset, as reported by chain metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetPrecision {
    /// Number of decimal places the chain uses for this asset's amounts.
    pub decimals: u32,
}

impl AssetPrecision {
    pub fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    /// Smallest representable positive amount at this precision.
    pub fn epsilon(&self) -> f64 {
        10f64.powi(-(self.decimals as i32))
    }

    /// Truncate (or round up) a float to this asset's decimal places.
    pub fn round(&self, value: f64, round_up: bool) -> f64 {
        truncate_float(value, self.decimals, round_up)
    }

    /// Convert a float amount to the chain's integer representation.
    ///
    /// Returns `None` if the scaled value does not fit in a `u64`, which the
    /// batch planner treats as "not representable" and drops the operation.
    pub fn float_to_chain_int(&self, value: f64) -> Option<u64> {
        if value < 0.0 {
            return None;
        }
        let scaled = value * 10f64.powi(self.decimals as i32);
        let rounded = scaled.round();
        if rounded.is_finite() && rounded >= 0.0 && rounded <= u64::MAX as f64 {
            Some(rounded as u64)
        } else {
            None
        }
    }

    /// Convert a chain integer amount back to a float.
    pub fn chain_int_to_float(&self, value: u64) -> f64 {
        value as f64 / 10f64.powi(self.decimals as i32)
    }
}

impl Default for AssetPrecision {
    fn default() -> Self {
        Self { decimals: 8 }
    }
}

/// Truncate (or round up) `value` to `decimals` decimal places.
///
/// This mirrors the exchange's tick-size rounding: truncation by default,
/// with an explicit round-up path used when a quote needs to clear a
/// minimum (e.g. buying slightly above the reference price).
pub fn truncate_float(value: f64, decimals: u32, round_up: bool) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    let truncated = if round_up {
        scaled.trunc() + if scaled.fract().abs() > 1e-9 { 1.0 } else { 0.0 }
    } else {
        scaled.trunc()
    };
    truncated / factor
}
