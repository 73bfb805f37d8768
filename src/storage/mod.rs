//! Persistence layer.
//!
//! A week's purchase price and quotes are kept as a JSON [`WeekRecord`] so
//! the CLI can re-run predictions as new quotes come in.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{Observations, Pattern, SLOT_COUNT};

/// Default week file path.
pub const DEFAULT_WEEK_FILE: &str = "week.json";

/// One week of stalk-market data as entered by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekRecord {
    pub id: Uuid,
    /// Sunday the week starts on.
    pub week_start: NaiveDate,
    pub buy_price: Option<u32>,
    /// Twelve half-day quotes, Monday AM to Saturday PM.
    #[serde(default)]
    pub prices: Vec<Option<u32>>,
    #[serde(default)]
    pub previous_pattern: Option<Pattern>,
    #[serde(default)]
    pub first_buy: bool,
    /// Pattern the player has pinned the week to, if any.
    #[serde(default)]
    pub pattern_filter: Option<Pattern>,
    pub created_at: DateTime<Utc>,
}

impl WeekRecord {
    /// Empty record for the week containing `date`.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            week_start: week_start_of(date),
            buy_price: None,
            prices: vec![None; SLOT_COUNT],
            previous_pattern: None,
            first_buy: false,
            pattern_filter: None,
            created_at: Utc::now(),
        }
    }

    /// Record pre-filled from an observation snapshot.
    pub fn from_observations(date: NaiveDate, obs: &Observations) -> Self {
        Self {
            buy_price: obs.buy_price(),
            prices: obs.quotes().to_vec(),
            previous_pattern: obs.previous_pattern(),
            first_buy: obs.first_buy(),
            pattern_filter: obs.pattern_filter(),
            ..Self::new(date)
        }
    }

    /// Normalize into engine input.
    ///
    /// A price list that does not hold exactly twelve entries is ignored,
    /// and quotes after the first missing slot are dropped.
    pub fn observations(&self) -> Observations {
        let mut obs = Observations::new()
            .with_previous_pattern(self.previous_pattern)
            .with_first_buy(self.first_buy)
            .with_pattern_filter(self.pattern_filter);
        if let Some(buy_price) = self.buy_price {
            obs = obs.with_buy_price(buy_price);
        }

        if self.prices.len() != SLOT_COUNT {
            warn!(
                id = %self.id,
                len = self.prices.len(),
                "Price list is not twelve slots long, ignoring quotes"
            );
            return obs;
        }

        let prefix = self.prices.iter().take_while(|p| p.is_some()).count();
        let dropped = self.prices[prefix..].iter().filter(|p| p.is_some()).count();
        if dropped > 0 {
            warn!(
                id = %self.id,
                gap_at = prefix,
                dropped,
                "Quotes after a missing slot dropped"
            );
        }

        for price in self.prices[..prefix].iter().flatten() {
            obs.push_quote(*price);
        }
        obs
    }
}

/// The Sunday on or before `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_sunday();
    date - Duration::days(i64::from(back))
}

/// Save a week record to a JSON file.
pub fn save_week(record: &WeekRecord, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_WEEK_FILE);
    let json = serde_json::to_string_pretty(record)
        .context("Failed to serialise week record")?;

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write week to {path}"))?;

    debug!(path, id = %record.id, week_start = %record.week_start, "Week saved");
    Ok(())
}

/// Load a week record from a JSON file.
/// Returns None if the file doesn't exist.
pub fn load_week(path: Option<&str>) -> Result<Option<WeekRecord>> {
    let path = path.unwrap_or(DEFAULT_WEEK_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved week found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read week from {path}"))?;

    let record: WeekRecord = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse week from {path}"))?;

    info!(
        path,
        id = %record.id,
        week_start = %record.week_start,
        buy_price = ?record.buy_price,
        "Week loaded from disk"
    );

    Ok(Some(record))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
