//! Prediction engine: enumerate, filter, weigh, aggregate.

pub mod filter;
pub mod latest;
pub mod layouts;
pub mod ranges;
pub mod weights;

use std::sync::Arc;
use tracing::debug;

use crate::rates::RateTable;
use crate::types::{Observations, Pattern, PatternResult, PredictionSet, PriceRange, SLOT_COUNT};
use weights::PatternTally;

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// Stateless predictor over a shared, immutable rate table.
///
/// Every call re-solves from scratch; identical observations always give
/// identical results. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Predictor {
    table: Arc<RateTable>,
    max_tolerance: u32,
}

impl Predictor {
    pub fn new(table: Arc<RateTable>) -> Self {
        Self {
            table,
            max_tolerance: 0,
        }
    }

    /// Allow retries with up to `max_tolerance` Bells of slack around each
    /// quote before giving up on every pattern. Zero disables retries.
    pub fn with_max_tolerance(mut self, max_tolerance: u32) -> Self {
        self.max_tolerance = max_tolerance;
        self
    }

    pub fn table(&self) -> &RateTable {
        &self.table
    }

    /// Posterior pattern probabilities and price ranges for a snapshot.
    ///
    /// Empty when the purchase price is unset. When the quotes contradict
    /// every candidate pattern (even after tolerance retries) the result is
    /// a single `Unknown` entry spanning everything the table allows.
    /// A pattern pin limits the candidates to that pattern.
    pub fn predict(&self, obs: &Observations) -> PredictionSet {
        let Some(buy_price) = obs.buy_price() else {
            return PredictionSet::empty();
        };

        for tolerance in 0..=self.max_tolerance {
            let tallies = self.tally(obs, tolerance);
            let results = self.assemble(obs, &tallies);
            if !results.is_empty() {
                let envelope = ranges::envelope(&results);
                let slot_envelope = ranges::slot_envelope(&results);
                debug!(
                    buy_price,
                    observed = obs.observed_count(),
                    tolerance,
                    patterns = results.len(),
                    top = %results[0].pattern,
                    "Prediction complete"
                );
                return PredictionSet {
                    results,
                    envelope,
                    slot_envelope,
                    tolerance,
                };
            }
            debug!(tolerance, "No pattern matches the quotes");
        }

        self.fallback(buy_price)
    }

    /// Outer `(min, max)` envelope of [`predict`](Self::predict), or `None`
    /// when nothing can be predicted.
    pub fn expected_range(&self, obs: &Observations) -> Option<PriceRange> {
        self.predict(obs).envelope
    }

    /// Enumerate and filter every candidate pattern.
    fn tally(&self, obs: &Observations, tolerance: u32) -> Vec<PatternTally> {
        let pinned = obs.pattern_filter();
        self.table
            .patterns()
            .filter(|spec| pinned.is_none() || pinned == Some(spec.pattern))
            .map(|spec| {
                let mut total = 0;
                let survivors = spec
                    .layouts()
                    .inspect(|_| total += 1)
                    .filter_map(|layout| filter::check(spec, &layout, obs, tolerance))
                    .collect::<Vec<_>>();
                let prior = match pinned {
                    Some(_) => 1.0,
                    None => self
                        .table
                        .prior(spec.pattern, obs.previous_pattern(), obs.first_buy()),
                };
                debug!(
                    pattern = %spec.pattern,
                    prior,
                    total,
                    surviving = survivors.len(),
                    "Pattern evaluated"
                );
                PatternTally {
                    pattern: spec.pattern,
                    prior,
                    total,
                    survivors,
                }
            })
            .collect()
    }

    /// Normalize tallies into ordered pattern results.
    fn assemble(&self, obs: &Observations, tallies: &[PatternTally]) -> Vec<PatternResult> {
        weights::posterior(tallies)
            .into_iter()
            .filter_map(|(index, probability)| {
                let tally = &tallies[index];
                let slots = ranges::slot_ranges(&tally.survivors)?;
                let range = ranges::remaining_range(&slots, obs.remaining_slots())?;
                Some(PatternResult {
                    pattern: tally.pattern,
                    probability,
                    min_price: range.min,
                    max_price: range.max,
                    slots,
                    layouts: tally.survivors.len(),
                    description: tally.pattern.description().to_string(),
                })
            })
            .collect()
    }

    /// Single `Unknown` result covering every price any layout of any
    /// modelled pattern allows with no quotes, slot by slot.
    fn fallback(&self, buy_price: u32) -> PredictionSet {
        let open = &Observations::new().with_buy_price(buy_price);
        let layouts: Vec<_> = self
            .table
            .patterns()
            .flat_map(|spec| {
                spec.layouts()
                    .filter_map(move |layout| filter::check(spec, &layout, open, 0))
            })
            .collect();
        let Some(slots) = ranges::slot_ranges(&layouts) else {
            return PredictionSet::empty();
        };
        let Some(range) = ranges::remaining_range(&slots, 0..SLOT_COUNT) else {
            return PredictionSet::empty();
        };

        debug!(buy_price, %range, "Falling back to unknown pattern");
        let result = PatternResult {
            pattern: Pattern::Unknown,
            probability: 1.0,
            min_price: range.min,
            max_price: range.max,
            slots: slots.clone(),
            layouts: 0,
            description: Pattern::Unknown.description().to_string(),
        };
        PredictionSet {
            results: vec![result],
            envelope: Some(range),
            slot_envelope: slots,
            tolerance: self.max_tolerance,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
