//! Exact rate arithmetic.
//!
//! The rate table stores rates as integer basis points. For a given
//! purchase price the engine rescales them into units of
//! `1 / (RATE_SCALE * buy)`, in which every price boundary `p / buy` is a
//! whole number. Inverting a quote and intersecting bounds is then exact
//! integer math at any purchase price. Basis points are the special case
//! `buy = 1`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PriceRange;

/// Basis points per 1.0 multiplier.
pub const RATE_SCALE: i64 = 10_000;

/// Closed-open interval `[low, high)` of rates, in basis points or in
/// price-scaled units (see [`scaled`](RateInterval::scaled)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateInterval {
    pub low: i64,
    pub high: i64,
}

impl RateInterval {
    pub const EMPTY: RateInterval = RateInterval { low: 0, high: 0 };

    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    /// Interval covering `low..=high`.
    pub fn inclusive(low: i64, high: i64) -> Self {
        Self { low, high: high + 1 }
    }

    /// Basis-point bound rescaled into units of `1 / (RATE_SCALE * buy)`.
    pub fn scaled(&self, buy_price: u32) -> Self {
        let buy = i64::from(buy_price);
        Self {
            low: self.low * buy,
            high: self.high * buy,
        }
    }

    /// Inclusive basis-point step `[low, high - 1]` rescaled like
    /// [`scaled`](Self::scaled), staying inclusive.
    pub fn scaled_step(&self, buy_price: u32) -> Self {
        let buy = i64::from(buy_price);
        Self::inclusive(self.low * buy, (self.high - 1) * buy)
    }

    /// Scaled rates `r` with `floor(r / RATE_SCALE) + offset == price`.
    pub fn from_price(price: u32, offset: i64) -> Self {
        Self::from_prices(i64::from(price), i64::from(price), offset)
    }

    /// Scaled rates whose price (after `offset`) falls anywhere in `lo..=hi`.
    pub fn from_prices(lo: i64, hi: i64, offset: i64) -> Self {
        let lo = (lo - offset).max(0);
        let hi = hi - offset;
        if hi < lo {
            return Self::EMPTY;
        }
        Self {
            low: lo * RATE_SCALE,
            high: (hi + 1) * RATE_SCALE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low >= self.high
    }

    pub fn intersect(&self, other: &RateInterval) -> Option<RateInterval> {
        let out = RateInterval {
            low: self.low.max(other.low),
            high: self.high.min(other.high),
        };
        (!out.is_empty()).then_some(out)
    }

    /// Smallest interval covering both.
    pub fn hull(&self, other: &RateInterval) -> RateInterval {
        RateInterval {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }

    /// Rates reachable by subtracting a step in `step` from a rate in
    /// `self`. Clamped at zero.
    pub fn decayed(&self, step: &RateInterval) -> RateInterval {
        RateInterval {
            low: (self.low - (step.high - 1)).max(0),
            high: (self.high - step.low).max(0),
        }
    }

    /// Raise the lower bound to at least `low`.
    pub fn at_least(&self, low: i64) -> RateInterval {
        RateInterval {
            low: self.low.max(low),
            high: self.high,
        }
    }

    /// Lower the (exclusive) upper bound to at most `high`.
    pub fn below(&self, high: i64) -> RateInterval {
        RateInterval {
            low: self.low,
            high: self.high.min(high),
        }
    }

    pub fn contains(&self, rate: i64) -> bool {
        self.low <= rate && rate < self.high
    }

    /// Range of prices produced by the scaled rates in this interval.
    /// Returns `None` for an empty interval.
    pub fn prices(&self, offset: i64) -> Option<PriceRange> {
        if self.is_empty() {
            return None;
        }
        let min = price_of(self.low, offset);
        let max = price_of(self.high - 1, offset);
        Some(PriceRange::new(min, max))
    }
}

impl fmt::Display for RateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4})",
            self.low as f64 / RATE_SCALE as f64,
            self.high as f64 / RATE_SCALE as f64
        )
    }
}

/// Price of a scaled rate: `floor(units / RATE_SCALE) + offset`,
/// saturating at zero.
pub fn price_of(units: i64, offset: i64) -> u32 {
    let raw = units.max(0) / RATE_SCALE + offset;
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

/// `floor(buy * rate / 10_000) + offset` for a rate in basis points.
pub fn price_at(buy_price: u32, rate: i64, offset: i64) -> u32 {
    price_of(i64::from(buy_price) * rate, offset)
}

/// Convert a decimal multiplier (e.g. `0.9`) to basis points.
pub fn to_basis_points(multiplier: f64) -> Option<i64> {
    if !multiplier.is_finite() || multiplier < 0.0 {
        return None;
    }
    Some((multiplier * RATE_SCALE as f64).round() as i64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
