//! Week sampler.
//!
//! Draws a complete, internally consistent week from the rate table: a
//! pattern from the prior row, a purchase price, a layout and a realized
//! rate for every slot. Quotes use the same floor formula as the engine,
//! so a sampled week is always honest input for the predictor.

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::engine::layouts::Layout;
use crate::rates::{price_at, PatternSpec, RateRule, RateTable, PEAK_FLANK_OFFSET};
use crate::types::{Observations, Pattern, SLOT_COUNT};

/// Purchase prices drawn by the sampler (inclusive).
pub const BUY_PRICE_RANGE: std::ops::RangeInclusive<u32> = 90..=110;

/// One simulated week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedWeek {
    pub pattern: Pattern,
    pub buy_price: u32,
    /// Phase lengths of the drawn layout.
    pub lengths: Vec<usize>,
    /// Realized rate per slot, in basis points.
    pub rates: [i64; SLOT_COUNT],
    pub quotes: [u32; SLOT_COUNT],
}

impl SimulatedWeek {
    /// Snapshot with the first `observed` quotes revealed.
    pub fn observations(&self, observed: usize, previous: Option<Pattern>, first_buy: bool) -> Observations {
        let shown = observed.min(SLOT_COUNT);
        Observations::from_prices(self.buy_price, &self.quotes[..shown])
            .with_previous_pattern(previous)
            .with_first_buy(first_buy)
    }
}

/// Draw a week for a player with the given history.
pub fn sample_week<R: Rng + ?Sized>(
    table: &RateTable,
    previous: Option<Pattern>,
    first_buy: bool,
    rng: &mut R,
) -> SimulatedWeek {
    let spec = draw_pattern(table, previous, first_buy, rng);
    let pattern = spec.pattern;
    let buy_price = rng.random_range(BUY_PRICE_RANGE);

    let layouts: Vec<Layout> = spec.layouts().collect();
    let layout = &layouts[rng.random_range(0..layouts.len())];

    let mut rates = [0i64; SLOT_COUNT];
    let mut quotes = [0u32; SLOT_COUNT];
    let mut slot = 0;
    for (phase, len) in layout.segments(spec) {
        if len == 0 {
            continue;
        }
        match phase.rule {
            RateRule::Fixed(iv) => {
                for _ in 0..len {
                    rates[slot] = rng.random_range(iv.low..iv.high);
                    quotes[slot] = price_at(buy_price, rates[slot], 0);
                    slot += 1;
                }
            }
            RateRule::Decay { start, step } => {
                let mut rate = rng.random_range(start.low..start.high);
                for i in 0..len {
                    if i > 0 {
                        rate = (rate - rng.random_range(step.low..step.high)).max(0);
                    }
                    rates[slot] = rate;
                    quotes[slot] = price_at(buy_price, rate, 0);
                    slot += 1;
                }
            }
            RateRule::Peak(iv) => {
                let middle = rng.random_range(iv.low + 1..iv.high);
                let offsets = [PEAK_FLANK_OFFSET, 0, PEAK_FLANK_OFFSET];
                for (i, offset) in offsets.into_iter().enumerate().take(len) {
                    rates[slot] = if i == 1 {
                        middle
                    } else {
                        rng.random_range(iv.low..middle)
                    };
                    quotes[slot] = price_at(buy_price, rates[slot], offset);
                    slot += 1;
                }
            }
        }
    }

    debug!(
        pattern = %pattern,
        buy_price,
        lengths = ?layout.lengths,
        "Week sampled"
    );

    SimulatedWeek {
        pattern,
        buy_price,
        lengths: layout.lengths.clone(),
        rates,
        quotes,
    }
}

/// Pick a pattern in proportion to its prior weight.
///
/// A validated table has every modelled pattern and at least one positive
/// weight in each prior row, so there is always something to pick.
fn draw_pattern<'t, R: Rng + ?Sized>(
    table: &'t RateTable,
    previous: Option<Pattern>,
    first_buy: bool,
    rng: &mut R,
) -> &'t PatternSpec {
    let weighted: Vec<(&PatternSpec, f64)> = table
        .patterns()
        .map(|spec| (spec, table.prior(spec.pattern, previous, first_buy)))
        .filter(|(_, w)| *w > 0.0)
        .collect();
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();

    let mut target = rng.random_range(0.0..total);
    for (spec, weight) in &weighted {
        if target < *weight {
            return *spec;
        }
        target -= weight;
    }
    // Rounding can leave a sliver past the last bucket.
    weighted[weighted.len() - 1].0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::filter;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn table() -> RateTable {
        RateTable::builtin().unwrap()
    }

    #[test]
    fn test_same_seed_same_week() {
        let table = table();
        let a = sample_week(&table, None, false, &mut StdRng::seed_from_u64(7));
        let b = sample_week(&table, None, false, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_first_buy_always_small_spike() {
        let table = table();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let week = sample_week(&table, None, true, &mut rng);
            assert_eq!(week.pattern, Pattern::SmallSpike);
        }
    }

    #[test]
    fn test_buy_price_and_lengths() {
        let table = table();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let week = sample_week(&table, None, false, &mut rng);
            assert!(BUY_PRICE_RANGE.contains(&week.buy_price));
            assert_eq!(week.lengths.iter().sum::<usize>(), SLOT_COUNT);
        }
    }

    #[test]
    fn test_transition_row_skews_draws() {
        let table = table();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: BTreeMap<Pattern, usize> = BTreeMap::new();
        for _ in 0..2_000 {
            let week = sample_week(&table, Some(Pattern::Decreasing), false, &mut rng);
            *counts.entry(week.pattern).or_default() += 1;
        }
        // Large spike follows a decreasing week nine times as often as
        // another decreasing week does.
        assert!(counts[&Pattern::LargeSpike] > counts[&Pattern::Fluctuating]);
        assert!(counts.get(&Pattern::Decreasing).copied().unwrap_or(0) < 250);
    }

    #[test]
    fn test_sampled_layout_passes_filter() {
        let table = table();
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..200 {
            let week = sample_week(&table, None, false, &mut rng);
            let spec = table.pattern(week.pattern).unwrap();
            let layout = Layout {
                pattern: week.pattern,
                lengths: week.lengths.clone(),
            };
            let obs = week.observations(SLOT_COUNT, None, false);
            assert!(
                filter::check(spec, &layout, &obs, 0).is_some(),
                "{:?} rejected its own quotes {:?}",
                week.pattern,
                week.quotes
            );
        }
    }

    #[test]
    fn test_observations_prefix() {
        let week = sample_week(&table(), None, false, &mut StdRng::seed_from_u64(5));
        let obs = week.observations(4, Some(Pattern::Fluctuating), false);
        assert_eq!(obs.observed_count(), 4);
        assert_eq!(obs.buy_price(), Some(week.buy_price));
        assert_eq!(obs.quote(3), Some(week.quotes[3]));
        assert_eq!(obs.quote(4), None);
        assert_eq!(obs.previous_pattern(), Some(Pattern::Fluctuating));
    }
}
