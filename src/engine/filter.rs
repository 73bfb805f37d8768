//! Consistency filter.
//!
//! Folds a layout over the week's slots, carrying the rate interval of
//! decaying runs forward from slot to slot. Observed quotes narrow the
//! carried interval, and the narrowed interval (not the phase's static
//! bound) seeds the next slot. A layout whose bounds miss any observed
//! quote is rejected.
//!
//! Bounds are worked in units of `1 / (RATE_SCALE * buy)` (see
//! [`RateInterval::scaled`]), so quotes invert exactly at any purchase
//! price.

use crate::engine::layouts::Layout;
use crate::rates::{PatternSpec, RateInterval, RateRule, PEAK_FLANK_OFFSET};
use crate::types::{Observations, Pattern, PriceRange, SLOT_COUNT};

/// Scaled rate bound of a single slot plus the price offset its quote
/// carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBound {
    pub rate: RateInterval,
    pub offset: i64,
}

impl SlotBound {
    fn plain(rate: RateInterval) -> Self {
        Self { rate, offset: 0 }
    }

    /// Achievable prices for this slot.
    pub fn prices(&self) -> Option<PriceRange> {
        self.rate.prices(self.offset)
    }
}

/// A layout that survived the observations, with the achievable bound of
/// every slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistentLayout {
    pub pattern: Pattern,
    pub lengths: Vec<usize>,
    pub slots: [SlotBound; SLOT_COUNT],
}

impl ConsistentLayout {
    /// Per-slot price ranges.
    pub fn slot_prices(&self) -> Option<[PriceRange; SLOT_COUNT]> {
        let mut out = [PriceRange::single(0); SLOT_COUNT];
        for (range, bound) in out.iter_mut().zip(self.slots.iter()) {
            *range = bound.prices()?;
        }
        Some(out)
    }
}

/// Rates compatible with the quote at `slot`, or `None` when unobserved.
///
/// `tolerance` widens the quote to `price ± tolerance` Bells.
fn required(obs: &Observations, slot: usize, offset: i64, tolerance: u32) -> Option<RateInterval> {
    let price = i64::from(obs.quote(slot)?);
    let slack = i64::from(tolerance);
    Some(RateInterval::from_prices(price - slack, price + slack, offset))
}

/// Narrow `bound` by the quote at `slot`, if any. `None` means the quote
/// contradicts the bound.
fn narrow(
    bound: RateInterval,
    obs: &Observations,
    slot: usize,
    offset: i64,
    tolerance: u32,
) -> Option<RateInterval> {
    match required(obs, slot, offset, tolerance) {
        Some(req) => bound.intersect(&req),
        None => (!bound.is_empty()).then_some(bound),
    }
}

/// Check a layout against the observations.
///
/// Returns the layout's per-slot achievable bounds, or `None` if some
/// observed quote cannot be produced by it.
pub fn check(spec: &PatternSpec, layout: &Layout, obs: &Observations, tolerance: u32) -> Option<ConsistentLayout> {
    let buy_price = obs.buy_price()?;
    debug_assert!(obs.is_gap_free(), "observed quotes must form a prefix");

    let mut slots = [SlotBound::plain(RateInterval::EMPTY); SLOT_COUNT];
    let mut cursor = 0;

    for (phase, len) in layout.segments(spec) {
        let run = cursor..cursor + len;
        match &phase.rule {
            RateRule::Fixed(iv) => {
                for slot in run {
                    let rate = narrow(iv.scaled(buy_price), obs, slot, 0, tolerance)?;
                    slots[slot] = SlotBound::plain(rate);
                }
            }
            RateRule::Decay { start, step } => {
                let step = step.scaled_step(buy_price);
                let mut carried = start.scaled(buy_price);
                for slot in run {
                    let rate = narrow(carried, obs, slot, 0, tolerance)?;
                    slots[slot] = SlotBound::plain(rate);
                    carried = rate.decayed(&step);
                }
            }
            RateRule::Peak(iv) => {
                if len != 3 {
                    return None;
                }
                let [left, middle, right] = peak(iv.scaled(buy_price), obs, cursor, tolerance)?;
                slots[cursor] = left;
                slots[cursor + 1] = middle;
                slots[cursor + 2] = right;
            }
        }
        cursor += len;
    }

    debug_assert_eq!(cursor, SLOT_COUNT);
    Some(ConsistentLayout {
        pattern: layout.pattern,
        lengths: layout.lengths.clone(),
        slots,
    })
}

/// Bounds for a peak triple starting at `start`.
///
/// The middle rate `m` lies in `iv`; each flank lies in `[iv.low, m)`.
/// A flank quote therefore also lifts the floor of `m`.
fn peak(iv: RateInterval, obs: &Observations, start: usize, tolerance: u32) -> Option<[SlotBound; 3]> {
    let middle = narrow(iv, obs, start + 1, 0, tolerance)?;

    let flank_cap = RateInterval::new(iv.low, middle.high - 1);
    let left = narrow(flank_cap, obs, start, PEAK_FLANK_OFFSET, tolerance)?;
    let right = narrow(flank_cap, obs, start + 2, PEAK_FLANK_OFFSET, tolerance)?;

    let middle = middle.at_least(left.low.max(right.low) + 1);
    if middle.is_empty() {
        return None;
    }

    let flank = |rate| SlotBound {
        rate,
        offset: PEAK_FLANK_OFFSET,
    };
    Some([flank(left), SlotBound::plain(middle), flank(right)])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::RateTable;

    fn table() -> RateTable {
        RateTable::builtin().unwrap()
    }

    fn survivors(table: &RateTable, pattern: Pattern, obs: &Observations) -> Vec<ConsistentLayout> {
        let spec = table.pattern(pattern).unwrap();
        spec.layouts().filter_map(|l| check(spec, &l, obs, 0)).collect()
    }

    #[test]
    fn test_no_buy_price_rejects() {
        let table = table();
        let spec = table.pattern(Pattern::Decreasing).unwrap();
        let layout = spec.layouts().next().unwrap();
        assert!(check(spec, &layout, &Observations::new(), 0).is_none());
    }

    #[test]
    fn test_unobserved_decreasing_propagates() {
        let table = table();
        let obs = Observations::new().with_buy_price(100);
        let layouts = survivors(&table, Pattern::Decreasing, &obs);
        assert_eq!(layouts.len(), 1);
        let slots = &layouts[0].slots;
        assert_eq!(slots[0].rate, RateInterval::new(8_500, 9_000).scaled(100));
        assert_eq!(slots[1].rate, RateInterval::new(8_000, 8_700).scaled(100));
        assert_eq!(slots[11].rate, RateInterval::new(3_000, 5_700).scaled(100));
    }

    #[test]
    fn test_observation_narrows_following_slots() {
        let table = table();
        let obs = Observations::from_prices(100, &[86]);
        let layouts = survivors(&table, Pattern::Decreasing, &obs);
        let slots = &layouts[0].slots;
        assert_eq!(slots[0].rate, RateInterval::new(8_600, 8_700).scaled(100));
        // Next slot is seeded by the narrowed interval, not the static start.
        assert_eq!(slots[1].rate, RateInterval::new(8_100, 8_400).scaled(100));
        assert_eq!(slots[1].prices(), Some(PriceRange::new(81, 83)));
    }

    #[test]
    fn test_rise_eliminates_decreasing() {
        let table = table();
        let obs = Observations::from_prices(100, &[85, 110]);
        assert!(survivors(&table, Pattern::Decreasing, &obs).is_empty());
    }

    #[test]
    fn test_decreasing_rejects_too_steep_drop() {
        let table = table();
        // 0.85 -> 0.70 needs a 0.15 step; the largest is 0.05.
        let obs = Observations::from_prices(100, &[85, 70]);
        assert!(survivors(&table, Pattern::Decreasing, &obs).is_empty());
    }

    #[test]
    fn test_observed_slots_collapse_to_quote() {
        let table = table();
        let obs = Observations::from_prices(100, &[85, 110]);
        for layout in survivors(&table, Pattern::LargeSpike, &obs) {
            assert_eq!(layout.slots[0].prices(), Some(PriceRange::single(85)));
            assert_eq!(layout.slots[1].prices(), Some(PriceRange::single(110)));
        }
    }

    #[test]
    fn test_large_spike_peak_day_pinned() {
        let table = table();
        let obs = Observations::from_prices(100, &[85, 110]);
        let layouts = survivors(&table, Pattern::LargeSpike, &obs);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].lengths[0], 1);
        assert_eq!(layouts[0].slots[3].prices(), Some(PriceRange::new(200, 599)));
    }

    #[test]
    fn test_tolerance_admits_near_miss() {
        let table = table();
        let spec = table.pattern(Pattern::Decreasing).unwrap();
        let layout = spec.layouts().next().unwrap();
        // 90 needs a rate of 0.90, just outside the closed-open start bound.
        let obs = Observations::from_prices(100, &[90]);
        assert!(check(spec, &layout, &obs, 0).is_none());
        assert!(check(spec, &layout, &obs, 1).is_some());
    }

    #[test]
    fn test_peak_flanks_sit_below_middle() {
        let table = table();
        // Small spike with no run-in: rise, rise, flank, peak, flank.
        let obs = Observations::from_prices(100, &[100, 120, 150, 180]);
        let layouts = survivors(&table, Pattern::SmallSpike, &obs);
        assert_eq!(layouts.len(), 1);
        let layout = &layouts[0];
        assert_eq!(layout.slots[2].offset, PEAK_FLANK_OFFSET);
        assert_eq!(layout.slots[2].prices(), Some(PriceRange::single(150)));
        assert_eq!(layout.slots[3].prices(), Some(PriceRange::single(180)));
        // Right flank is capped by the realized peak: rate < 1.81 -> price <= 179.
        let right = layout.slots[4].prices().unwrap();
        assert_eq!(right, PriceRange::new(139, 179));
    }

    #[test]
    fn test_flank_quote_lifts_peak_floor() {
        let table = table();
        let obs = Observations::from_prices(100, &[100, 120, 170]);
        let layouts = survivors(&table, Pattern::SmallSpike, &obs);
        let layout = layouts.iter().find(|l| l.lengths[0] == 0).unwrap();
        // Left flank read 170 -> rate in [1.71, 1.72); peak must exceed it.
        let middle = layout.slots[3].prices().unwrap();
        assert_eq!(middle, PriceRange::new(171, 199));
    }

    #[test]
    fn test_flank_above_peak_cap_rejected() {
        let table = table();
        // A flank of 199 needs rate >= 2.00, outside the peak interval.
        let obs = Observations::from_prices(100, &[100, 120, 199]);
        let layouts = survivors(&table, Pattern::SmallSpike, &obs);
        assert!(layouts.iter().all(|l| l.lengths[0] != 0));
    }

    #[test]
    fn test_slot_prices_covers_week() {
        let table = table();
        let obs = Observations::new().with_buy_price(100);
        for layout in survivors(&table, Pattern::Fluctuating, &obs) {
            let prices = layout.slot_prices().unwrap();
            assert!(prices.iter().all(|r| r.min <= r.max));
        }
    }

    #[test]
    fn test_large_purchase_price_inverts_exactly() {
        let table = table();
        // 17 001 / 20 000 = 0.85005, between whole basis points.
        let obs = Observations::from_prices(20_000, &[17_001]);
        let layouts = survivors(&table, Pattern::Decreasing, &obs);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].slots[0].prices(), Some(PriceRange::single(17_001)));
    }
}
