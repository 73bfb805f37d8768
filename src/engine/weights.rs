//! Posterior pattern weights.
//!
//! Every layout of a pattern is equally likely a priori, so a pattern's
//! posterior weight is its prior scaled by the share of its layouts that
//! survived the observations. Weights are normalized across patterns.

use std::cmp::Ordering;

use crate::engine::filter::ConsistentLayout;
use crate::types::Pattern;

/// Survivors of one pattern's enumeration.
#[derive(Debug, Clone)]
pub struct PatternTally {
    pub pattern: Pattern,
    pub prior: f64,
    /// Layouts enumerated before filtering.
    pub total: usize,
    pub survivors: Vec<ConsistentLayout>,
}

impl PatternTally {
    /// Unnormalized posterior weight.
    pub fn weight(&self) -> f64 {
        if self.total == 0 || self.survivors.is_empty() {
            return 0.0;
        }
        self.prior * self.survivors.len() as f64 / self.total as f64
    }
}

/// Normalized posterior per pattern, dropping zero-weight patterns.
///
/// Ordered by descending probability; ties keep the input order. Returns an
/// empty list when no pattern carries any weight.
pub fn posterior(tallies: &[PatternTally]) -> Vec<(usize, f64)> {
    let total: f64 = tallies.iter().map(PatternTally::weight).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut out: Vec<(usize, f64)> = tallies
        .iter()
        .enumerate()
        .filter_map(|(i, tally)| {
            let w = tally.weight();
            (w > 0.0).then(|| (i, w / total))
        })
        .collect();

    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
