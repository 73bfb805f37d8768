//! Property-based tests for the prediction engine.
//!
//! Weeks are drawn from the rate table with the sampler, so every input is
//! honest: some layout of the true pattern reproduces it exactly.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;

use stalk_oracle::engine::Predictor;
use stalk_oracle::rates::RateTable;
use stalk_oracle::sim::{sample_week, SimulatedWeek};
use stalk_oracle::types::{Pattern, PredictionSet, SLOT_COUNT};

/// Tolerance for the probability sum.
const TOL: f64 = 1e-9;

fn predictor() -> Predictor {
    Predictor::new(Arc::new(RateTable::builtin().unwrap()))
}

fn history() -> impl Strategy<Value = (Option<Pattern>, bool)> {
    (
        prop::option::of(prop::sample::select(Pattern::MODELLED.to_vec())),
        any::<bool>(),
    )
}

fn week(p: &Predictor, seed: u64, previous: Option<Pattern>, first_buy: bool) -> SimulatedWeek {
    sample_week(p.table(), previous, first_buy, &mut StdRng::seed_from_u64(seed))
}

fn patterns(set: &PredictionSet) -> HashSet<Pattern> {
    set.results.iter().map(|r| r.pattern).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Probabilities of a non-empty prediction sum to one.
    #[test]
    fn probabilities_sum_to_one(seed in any::<u64>(), (previous, first_buy) in history(), observed in 0usize..=SLOT_COUNT) {
        let p = predictor();
        let w = week(&p, seed, previous, first_buy);
        let set = p.predict(&w.observations(observed, previous, first_buy));
        prop_assert!(!set.is_empty());
        prop_assert!((set.total_probability() - 1.0).abs() < TOL, "sum = {}", set.total_probability());
        for r in &set.results {
            prop_assert!(r.probability > 0.0);
        }
    }

    /// The true pattern survives every prefix of its own week, and each of
    /// its quotes lies in that pattern's range for the slot.
    #[test]
    fn true_pattern_never_eliminated(seed in any::<u64>(), (previous, first_buy) in history(), observed in 0usize..=SLOT_COUNT) {
        let p = predictor();
        let w = week(&p, seed, previous, first_buy);
        let set = p.predict(&w.observations(observed, previous, first_buy));
        prop_assert!(!set.is_fallback());
        let result = set.get(w.pattern);
        prop_assert!(result.is_some(), "{} eliminated after {} quotes {:?}", w.pattern, observed, w.quotes);
        let result = result.unwrap();
        for (slot, range) in result.slots.iter().enumerate() {
            prop_assert!(range.contains(w.quotes[slot]), "slot {} quote {} outside {}", slot, w.quotes[slot], range);
        }
    }

    /// One more honest quote never widens a surviving pattern's range, the
    /// envelope, or the set of candidate patterns.
    #[test]
    fn more_quotes_only_narrow(seed in any::<u64>(), (previous, first_buy) in history(), observed in 0usize..SLOT_COUNT) {
        let p = predictor();
        let w = week(&p, seed, previous, first_buy);
        let before = p.predict(&w.observations(observed, previous, first_buy));
        let after = p.predict(&w.observations(observed + 1, previous, first_buy));

        prop_assert!(patterns(&after).is_subset(&patterns(&before)));
        for result in &after.results {
            let earlier = before.get(result.pattern).unwrap();
            prop_assert!(result.range().is_within(&earlier.range()),
                "{}: {} not within {}", result.pattern, result.range(), earlier.range());
            for (now, then) in result.slots.iter().zip(&earlier.slots) {
                prop_assert!(now.is_within(then));
            }
        }
        prop_assert!(after.envelope.unwrap().is_within(&before.envelope.unwrap()));
        for (now, then) in after.slot_envelope.iter().zip(&before.slot_envelope) {
            prop_assert!(now.is_within(then), "slot hull {} not within {}", now, then);
        }
    }

    /// Identical observations give identical predictions.
    #[test]
    fn prediction_is_deterministic(seed in any::<u64>(), observed in 0usize..=SLOT_COUNT) {
        let p = predictor();
        let w = week(&p, seed, None, false);
        let obs = w.observations(observed, None, false);
        prop_assert_eq!(p.predict(&obs), p.predict(&obs));
        prop_assert_eq!(predictor().predict(&obs), p.predict(&obs));
    }

    /// Arbitrary (possibly dishonest) quotes still give a well-formed set.
    #[test]
    fn arbitrary_quotes_are_well_formed(buy in 90u32..=110, quotes in prop::collection::vec(1u32..700, 0..=SLOT_COUNT)) {
        let p = predictor();
        let set = p.predict(&stalk_oracle::types::Observations::from_prices(buy, &quotes));
        prop_assert!(!set.is_empty());
        prop_assert!((set.total_probability() - 1.0).abs() < TOL);
        let envelope = set.envelope.unwrap();
        for r in &set.results {
            prop_assert_eq!(r.slots.len(), SLOT_COUNT);
            prop_assert!(r.min_price <= r.max_price);
            prop_assert!(r.range().is_within(&envelope));
        }
    }
}
