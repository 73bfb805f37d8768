//! Shared types for the stalk-market predictor.
//!
//! These types form the data model used across all modules: the pattern
//! tags, the weekly observation snapshot fed to the engine, and the plain
//! value types it hands back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of half-day quotation slots in a week (Mon AM .. Sat PM).
pub const SLOT_COUNT: usize = 12;

/// Display labels for each slot, in order.
pub const SLOT_LABELS: [&str; SLOT_COUNT] = [
    "Mon AM", "Mon PM", "Tue AM", "Tue PM", "Wed AM", "Wed PM",
    "Thu AM", "Thu PM", "Fri AM", "Fri PM", "Sat AM", "Sat PM",
];

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// Price-behaviour archetype governing a week of resale quotes.
///
/// Carries no behaviour of its own: phase structure and rate bounds live in
/// the [`RateTable`](crate::rates::RateTable), keyed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Fluctuating,
    LargeSpike,
    Decreasing,
    SmallSpike,
    Unknown,
}

impl Pattern {
    /// Patterns the rate table models, in declaration order.
    pub const MODELLED: [Pattern; 4] = [
        Pattern::Fluctuating,
        Pattern::LargeSpike,
        Pattern::Decreasing,
        Pattern::SmallSpike,
    ];

    /// Stable snake_case key, as used in the rate table and JSON output.
    pub fn key(&self) -> &'static str {
        match self {
            Pattern::Fluctuating => "fluctuating",
            Pattern::LargeSpike => "large_spike",
            Pattern::Decreasing => "decreasing",
            Pattern::SmallSpike => "small_spike",
            Pattern::Unknown => "unknown",
        }
    }

    /// Human-readable summary of how prices move under this pattern.
    pub fn description(&self) -> &'static str {
        match self {
            Pattern::Fluctuating => "Prices fluctuate up and down throughout the week.",
            Pattern::LargeSpike => "Prices drop then spike dramatically, peaking at 200-600% of the purchase price.",
            Pattern::Decreasing => "Prices continuously decrease throughout the week.",
            Pattern::SmallSpike => "Prices drop then rise moderately, peaking at 140-200% of the purchase price.",
            Pattern::Unknown => "Not enough consistent data to predict the pattern.",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Fluctuating => write!(f, "Fluctuating"),
            Pattern::LargeSpike => write!(f, "Large Spike"),
            Pattern::Decreasing => write!(f, "Decreasing"),
            Pattern::SmallSpike => write!(f, "Small Spike"),
            Pattern::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Attempt to parse a string into a Pattern (case-insensitive, accepts
/// `large_spike`, `large-spike`, `Large Spike` and `largespike`).
impl std::str::FromStr for Pattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "fluctuating" | "random" => Ok(Pattern::Fluctuating),
            "largespike" | "large" => Ok(Pattern::LargeSpike),
            "decreasing" | "falling" => Ok(Pattern::Decreasing),
            "smallspike" | "small" => Ok(Pattern::SmallSpike),
            "unknown" => Ok(Pattern::Unknown),
            _ => Err(anyhow::anyhow!("Unknown pattern: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// A week's price snapshot: purchase price plus the quotes seen so far.
///
/// Quotes are filled strictly left to right; a quote after an unobserved
/// slot is a caller error (checked with `debug_assert!` by the engine).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Observations {
    buy_price: Option<u32>,
    quotes: [Option<u32>; SLOT_COUNT],
    #[serde(default)]
    previous_pattern: Option<Pattern>,
    #[serde(default)]
    first_buy: bool,
    /// Restrict the prediction to this pattern.
    #[serde(default)]
    pattern_filter: Option<Pattern>,
}

impl Observations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot with a purchase price and a prefix of observed quotes.
    /// Quotes beyond the twelfth are ignored.
    pub fn from_prices(buy_price: u32, quotes: &[u32]) -> Self {
        let mut obs = Self::new().with_buy_price(buy_price);
        for (slot, &price) in quotes.iter().take(SLOT_COUNT).enumerate() {
            obs.quotes[slot] = Some(price);
        }
        obs
    }

    pub fn with_buy_price(mut self, buy_price: u32) -> Self {
        self.buy_price = Some(buy_price);
        self
    }

    /// Set the quote for a slot. Out-of-range slots are ignored.
    pub fn with_quote(mut self, slot: usize, price: u32) -> Self {
        if slot < SLOT_COUNT {
            self.quotes[slot] = Some(price);
        }
        self
    }

    /// Append a quote in the first unobserved slot (no-op on a full week).
    pub fn push_quote(&mut self, price: u32) {
        let next = self.observed_count();
        if next < SLOT_COUNT {
            self.quotes[next] = Some(price);
        }
    }

    pub fn with_previous_pattern(mut self, previous: Option<Pattern>) -> Self {
        self.previous_pattern = previous;
        self
    }

    pub fn with_first_buy(mut self, first_buy: bool) -> Self {
        self.first_buy = first_buy;
        self
    }

    /// Pin the week to one pattern. The pin overrides the prior rows.
    pub fn with_pattern_filter(mut self, pattern: Option<Pattern>) -> Self {
        self.pattern_filter = pattern;
        self
    }

    /// Purchase price, if set. A zero price carries no information and is
    /// reported as unset.
    pub fn buy_price(&self) -> Option<u32> {
        self.buy_price.filter(|&p| p > 0)
    }

    pub fn quote(&self, slot: usize) -> Option<u32> {
        self.quotes.get(slot).copied().flatten()
    }

    pub fn quotes(&self) -> &[Option<u32>; SLOT_COUNT] {
        &self.quotes
    }

    pub fn previous_pattern(&self) -> Option<Pattern> {
        self.previous_pattern
    }

    pub fn first_buy(&self) -> bool {
        self.first_buy
    }

    pub fn pattern_filter(&self) -> Option<Pattern> {
        self.pattern_filter
    }

    /// Length of the observed prefix.
    pub fn observed_count(&self) -> usize {
        self.quotes.iter().take_while(|q| q.is_some()).count()
    }

    /// True when no observed quote follows an unobserved slot.
    pub fn is_gap_free(&self) -> bool {
        let prefix = self.observed_count();
        self.quotes[prefix..].iter().all(Option::is_none)
    }

    /// Slots whose prices are still to come. Once the week is complete the
    /// final slot stands in, so a pattern range never becomes empty.
    pub fn remaining_slots(&self) -> std::ops::Range<usize> {
        let start = self.observed_count().min(SLOT_COUNT - 1);
        start..SLOT_COUNT
    }
}

// ---------------------------------------------------------------------------
// Price ranges
// ---------------------------------------------------------------------------

/// Inclusive range of prices in Bells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: u32,
    pub max: u32,
}

impl PriceRange {
    pub fn new(min: u32, max: u32) -> Self {
        debug_assert!(min <= max, "inverted price range {min}..{max}");
        Self { min, max }
    }

    pub fn single(price: u32) -> Self {
        Self { min: price, max: price }
    }

    /// Smallest range covering both.
    pub fn hull(self, other: PriceRange) -> PriceRange {
        PriceRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains(&self, price: u32) -> bool {
        self.min <= price && price <= self.max
    }

    /// True when every price in `self` is also in `other`.
    pub fn is_within(&self, other: &PriceRange) -> bool {
        other.min <= self.min && self.max <= other.max
    }

    pub fn midpoint(&self) -> u32 {
        self.min + (self.max - self.min) / 2
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    /// Classify the midpoint against the purchase price.
    pub fn outlook(&self, buy_price: u32) -> Outlook {
        if buy_price == 0 {
            return Outlook::Loss;
        }
        let ratio = f64::from(self.midpoint()) / f64::from(buy_price);
        if ratio >= 2.0 {
            Outlook::Jackpot
        } else if ratio >= 1.0 {
            Outlook::Profit
        } else if ratio >= 0.8 {
            Outlook::MinorLoss
        } else {
            Outlook::Loss
        }
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Coarse verdict on selling at a given price range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outlook {
    Jackpot,
    Profit,
    MinorLoss,
    Loss,
}

impl fmt::Display for Outlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outlook::Jackpot => write!(f, "jackpot"),
            Outlook::Profit => write!(f, "profit"),
            Outlook::MinorLoss => write!(f, "minor loss"),
            Outlook::Loss => write!(f, "loss"),
        }
    }
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Posterior view of one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    pub pattern: Pattern,
    /// Normalized posterior probability (0.0–1.0).
    pub probability: f64,
    /// Lowest price still achievable over the remaining slots.
    pub min_price: u32,
    /// Highest price still achievable over the remaining slots.
    pub max_price: u32,
    /// Achievable range per slot, observed slots included.
    pub slots: Vec<PriceRange>,
    /// Number of phase layouts that survived the observations.
    pub layouts: usize,
    pub description: String,
}

impl PatternResult {
    pub fn range(&self) -> PriceRange {
        PriceRange::new(self.min_price, self.max_price)
    }
}

impl fmt::Display for PatternResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:>5.1}%  {}-{} Bells ({} layouts)",
            self.pattern.to_string(),
            self.probability * 100.0,
            self.min_price,
            self.max_price,
            self.layouts,
        )
    }
}

/// Full prediction for one snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionSet {
    /// Patterns with nonzero probability, most likely first.
    pub results: Vec<PatternResult>,
    /// Outer envelope of every result's range.
    pub envelope: Option<PriceRange>,
    /// Per-slot hull across every result (empty when there are none).
    #[serde(default)]
    pub slot_envelope: Vec<PriceRange>,
    /// Bells of slack that were needed to match the quotes (0 = exact).
    pub tolerance: u32,
}

impl PredictionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, pattern: Pattern) -> Option<&PatternResult> {
        self.results.iter().find(|r| r.pattern == pattern)
    }

    /// Probability of a pattern (0.0 when it was eliminated).
    pub fn probability_of(&self, pattern: Pattern) -> f64 {
        self.get(pattern).map_or(0.0, |r| r.probability)
    }

    pub fn most_likely(&self) -> Option<&PatternResult> {
        self.results.first()
    }

    pub fn total_probability(&self) -> f64 {
        self.results.iter().map(|r| r.probability).sum()
    }

    /// True when the observations contradicted every modelled pattern.
    pub fn is_fallback(&self) -> bool {
        matches!(self.results.as_slice(), [only] if only.pattern == Pattern::Unknown)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Pattern tests --

    #[test]
    fn test_pattern_display() {
        assert_eq!(format!("{}", Pattern::LargeSpike), "Large Spike");
        assert_eq!(format!("{}", Pattern::Decreasing), "Decreasing");
        assert_eq!(format!("{}", Pattern::Unknown), "Unknown");
    }

    #[test]
    fn test_pattern_from_str() {
        assert_eq!("fluctuating".parse::<Pattern>().unwrap(), Pattern::Fluctuating);
        assert_eq!("large-spike".parse::<Pattern>().unwrap(), Pattern::LargeSpike);
        assert_eq!("Small Spike".parse::<Pattern>().unwrap(), Pattern::SmallSpike);
        assert_eq!("DECREASING".parse::<Pattern>().unwrap(), Pattern::Decreasing);
        assert!("sideways".parse::<Pattern>().is_err());
    }

    #[test]
    fn test_pattern_serialization_uses_keys() {
        for pattern in Pattern::MODELLED {
            let json = serde_json::to_string(&pattern).unwrap();
            assert_eq!(json, format!("\"{}\"", pattern.key()));
        }
    }

    #[test]
    fn test_modelled_excludes_unknown() {
        assert_eq!(Pattern::MODELLED.len(), 4);
        assert!(!Pattern::MODELLED.contains(&Pattern::Unknown));
    }

    // -- Observations tests --

    #[test]
    fn test_observations_from_prices() {
        let obs = Observations::from_prices(100, &[85, 110]);
        assert_eq!(obs.buy_price(), Some(100));
        assert_eq!(obs.quote(0), Some(85));
        assert_eq!(obs.quote(1), Some(110));
        assert_eq!(obs.quote(2), None);
        assert_eq!(obs.observed_count(), 2);
        assert!(obs.is_gap_free());
    }

    #[test]
    fn test_zero_buy_price_is_unset() {
        let obs = Observations::new().with_buy_price(0);
        assert_eq!(obs.buy_price(), None);
    }

    #[test]
    fn test_gap_detection() {
        let obs = Observations::new().with_buy_price(100).with_quote(0, 90).with_quote(2, 80);
        assert_eq!(obs.observed_count(), 1);
        assert!(!obs.is_gap_free());
    }

    #[test]
    fn test_out_of_range_quote_ignored() {
        let obs = Observations::new().with_quote(12, 90);
        assert_eq!(obs.observed_count(), 0);
    }

    #[test]
    fn test_push_quote_fills_next_slot() {
        let mut obs = Observations::from_prices(100, &[90]);
        obs.push_quote(85);
        assert_eq!(obs.quote(1), Some(85));
        assert_eq!(obs.observed_count(), 2);
    }

    #[test]
    fn test_remaining_slots() {
        assert_eq!(Observations::new().remaining_slots(), 0..12);
        assert_eq!(Observations::from_prices(100, &[90, 80]).remaining_slots(), 2..12);
        let full = Observations::from_prices(100, &[90; 12]);
        assert_eq!(full.remaining_slots(), 11..12);
    }

    #[test]
    fn test_observations_serialization_roundtrip() {
        let obs = Observations::from_prices(97, &[88, 84])
            .with_previous_pattern(Some(Pattern::SmallSpike))
            .with_first_buy(true);
        let json = serde_json::to_string(&obs).unwrap();
        let back: Observations = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obs);
    }

    // -- PriceRange tests --

    #[test]
    fn test_price_range_hull_and_contains() {
        let a = PriceRange::new(40, 90);
        let b = PriceRange::new(60, 140);
        let h = a.hull(b);
        assert_eq!(h, PriceRange::new(40, 140));
        assert!(h.contains(40));
        assert!(h.contains(140));
        assert!(!h.contains(141));
        assert!(a.is_within(&h));
        assert!(!h.is_within(&a));
    }

    #[test]
    fn test_price_range_outlook() {
        assert_eq!(PriceRange::new(200, 600).outlook(100), Outlook::Jackpot);
        assert_eq!(PriceRange::new(90, 140).outlook(100), Outlook::Profit);
        assert_eq!(PriceRange::new(80, 90).outlook(100), Outlook::MinorLoss);
        assert_eq!(PriceRange::new(40, 60).outlook(100), Outlook::Loss);
    }

    #[test]
    fn test_price_range_display() {
        assert_eq!(PriceRange::single(85).to_string(), "85");
        assert_eq!(PriceRange::new(40, 599).to_string(), "40-599");
    }

    // -- PredictionSet tests --

    #[test]
    fn test_empty_prediction_set() {
        let set = PredictionSet::empty();
        assert!(set.is_empty());
        assert!(set.most_likely().is_none());
        assert_eq!(set.probability_of(Pattern::Fluctuating), 0.0);
        assert!(!set.is_fallback());
    }
}
