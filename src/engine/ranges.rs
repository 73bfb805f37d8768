//! Price range aggregation.
//!
//! Turns surviving layouts into the per-slot and per-pattern price ranges
//! reported to callers, and the envelopes across patterns.

use std::ops::Range;

use crate::engine::filter::ConsistentLayout;
use crate::types::{PatternResult, PriceRange};

/// Per-slot hull of every layout's achievable prices.
///
/// `None` if `layouts` is empty.
pub fn slot_ranges<'a>(layouts: impl IntoIterator<Item = &'a ConsistentLayout>) -> Option<Vec<PriceRange>> {
    layouts
        .into_iter()
        .filter_map(ConsistentLayout::slot_prices)
        .map(|prices| prices.to_vec())
        .reduce(hull_slots)
}

/// Tightest range covering every slot in `remaining`.
pub fn remaining_range(slots: &[PriceRange], remaining: Range<usize>) -> Option<PriceRange> {
    slots
        .get(remaining)?
        .iter()
        .copied()
        .reduce(PriceRange::hull)
}

/// Outer envelope: lowest min and highest max across results.
pub fn envelope(results: &[PatternResult]) -> Option<PriceRange> {
    results.iter().map(PatternResult::range).reduce(PriceRange::hull)
}

/// Per-slot hull across every result's slot ranges. Empty when there are
/// no results.
pub fn slot_envelope(results: &[PatternResult]) -> Vec<PriceRange> {
    results
        .iter()
        .map(|r| r.slots.clone())
        .reduce(hull_slots)
        .unwrap_or_default()
}

fn hull_slots(mut acc: Vec<PriceRange>, other: Vec<PriceRange>) -> Vec<PriceRange> {
    for (a, b) in acc.iter_mut().zip(other) {
        *a = a.hull(b);
    }
    acc
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
