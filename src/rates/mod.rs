//! Rate table: the versioned reference data behind every prediction.
//!
//! Holds, per modelled pattern, the ordered phase specs with their length
//! ranges and rate rules, plus the prior pattern probabilities. The table
//! is parsed from TOML once at startup, validated, and then only read.
//! Any problem with it is a [`RateTableError`]; the engine never sees a
//! partial table.

pub mod interval;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::engine::layouts::Layouts;
use crate::types::{Pattern, SLOT_COUNT};
pub use interval::{price_at, RateInterval, RATE_SCALE};

/// The dataset shipped with the crate.
pub const BUILTIN_TABLE: &str = include_str!("../../data/rate_table.toml");

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal rate-table configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum RateTableError {
    #[error("Failed to read rate table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rate table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Pattern {0} is missing from the rate table")]
    MissingPattern(Pattern),

    #[error("Pattern {0} cannot be modelled by the rate table")]
    UnmodelledPattern(Pattern),

    #[error("Invalid phase {pattern}/{phase}: {message}")]
    InvalidPhase {
        pattern: Pattern,
        phase: String,
        message: String,
    },

    #[error("Invalid length constraint for {pattern}: {message}")]
    InvalidLengthSum { pattern: Pattern, message: String },

    #[error("Pattern {0} has no layout covering the week")]
    NoLayouts(Pattern),

    #[error("Invalid prior row '{row}': {message}")]
    InvalidPrior { row: String, message: String },
}

// ---------------------------------------------------------------------------
// Phase specs
// ---------------------------------------------------------------------------

/// How a phase bounds the rate of each slot it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateRule {
    /// Every slot draws independently from the interval.
    Fixed(RateInterval),
    /// First slot in `start`; each later slot is the previous slot's rate
    /// minus a step from `step`.
    Decay { start: RateInterval, step: RateInterval },
    /// Three slots: the middle one's rate `m` lies in the interval, the
    /// flanks lie in `[low, m)` and read one Bell below the floor price.
    Peak(RateInterval),
}

/// Price offset of the peak flanks relative to the floor formula.
pub const PEAK_FLANK_OFFSET: i64 = -1;

/// Contiguous run of slots sharing one rate rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSpec {
    pub name: String,
    pub min_len: usize,
    pub max_len: usize,
    pub rule: RateRule,
}

/// Lengths of the listed phases (indices into the pattern's phases) must
/// add up to `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthSum {
    pub phases: Vec<usize>,
    pub total: usize,
}

/// Phase structure of one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pub pattern: Pattern,
    pub phases: Vec<PhaseSpec>,
    pub length_sums: Vec<LengthSum>,
}

impl PatternSpec {
    /// Lazily enumerate every valid layout of this pattern.
    pub fn layouts(&self) -> Layouts<'_> {
        Layouts::new(self)
    }
}

// ---------------------------------------------------------------------------
// Priors
// ---------------------------------------------------------------------------

/// Relative prior weight per pattern. Patterns absent from a row weigh 0.
pub type PriorRow = BTreeMap<Pattern, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct Priors {
    pub default: PriorRow,
    pub first_buy: Option<PriorRow>,
    pub after: BTreeMap<Pattern, PriorRow>,
}

impl Priors {
    /// Select the prior row for a week.
    ///
    /// First-time buyers use the first-buy row when the table has one;
    /// otherwise the row for last week's pattern, falling back to the
    /// default row when that is unknown.
    pub fn row(&self, previous: Option<Pattern>, first_buy: bool) -> &PriorRow {
        if first_buy {
            if let Some(row) = &self.first_buy {
                return row;
            }
        }
        previous
            .filter(|p| *p != Pattern::Unknown)
            .and_then(|p| self.after.get(&p))
            .unwrap_or(&self.default)
    }
}

// ---------------------------------------------------------------------------
// Rate table
// ---------------------------------------------------------------------------

/// Validated, immutable reference dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    version: String,
    patterns: BTreeMap<Pattern, PatternSpec>,
    priors: Priors,
}

impl RateTable {
    /// The dataset embedded in the crate.
    pub fn builtin() -> Result<Self, RateTableError> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    /// Load and validate a table from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RateTableError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| RateTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), version = %table.version, "Rate table loaded");
        Ok(table)
    }

    /// Parse and validate a table from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, RateTableError> {
        let raw: RawTable = toml::from_str(contents)?;
        raw.validate()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Phase structure of a modelled pattern. Always present for the four
    /// modelled patterns; `None` for `Unknown`.
    pub fn pattern(&self, pattern: Pattern) -> Option<&PatternSpec> {
        self.patterns.get(&pattern)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PatternSpec> {
        self.patterns.values()
    }

    pub fn priors(&self) -> &Priors {
        &self.priors
    }

    /// Prior weight of `pattern` for a week with the given history.
    pub fn prior(&self, pattern: Pattern, previous: Option<Pattern>, first_buy: bool) -> f64 {
        self.priors
            .row(previous, first_buy)
            .get(&pattern)
            .copied()
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Raw (unvalidated) TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    version: String,
    priors: RawPriors,
    patterns: BTreeMap<Pattern, RawPattern>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPriors {
    default: BTreeMap<Pattern, f64>,
    first_buy: Option<BTreeMap<Pattern, f64>>,
    #[serde(default)]
    after: BTreeMap<Pattern, BTreeMap<Pattern, f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPattern {
    phases: Vec<RawPhase>,
    #[serde(default)]
    length_sums: Vec<RawLengthSum>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPhase {
    name: String,
    length: [usize; 2],
    fixed: Option<[f64; 2]>,
    decay: Option<RawDecay>,
    peak: Option<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDecay {
    start: [f64; 2],
    step: [f64; 2],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLengthSum {
    phases: Vec<String>,
    total: usize,
}

impl RawTable {
    fn validate(self) -> Result<RateTable, RateTableError> {
        let mut patterns = BTreeMap::new();
        for (pattern, raw) in self.patterns {
            if pattern == Pattern::Unknown {
                return Err(RateTableError::UnmodelledPattern(pattern));
            }
            patterns.insert(pattern, raw.validate(pattern)?);
        }
        for pattern in Pattern::MODELLED {
            let spec = patterns
                .get(&pattern)
                .ok_or(RateTableError::MissingPattern(pattern))?;
            let count = spec.layouts().count();
            if count == 0 {
                return Err(RateTableError::NoLayouts(pattern));
            }
            debug!(pattern = %pattern, layouts = count, "Pattern layouts enumerated");
        }

        let priors = self.priors.validate()?;

        Ok(RateTable {
            version: self.version,
            patterns,
            priors,
        })
    }
}

impl RawPattern {
    fn validate(self, pattern: Pattern) -> Result<PatternSpec, RateTableError> {
        let phases = self
            .phases
            .into_iter()
            .map(|raw| raw.validate(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let mut length_sums = Vec::with_capacity(self.length_sums.len());
        for raw in self.length_sums {
            let indices = raw
                .phases
                .iter()
                .map(|name| {
                    phases.iter().position(|p| &p.name == name).ok_or_else(|| {
                        RateTableError::InvalidLengthSum {
                            pattern,
                            message: format!("unknown phase '{name}'"),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if indices.is_empty() {
                return Err(RateTableError::InvalidLengthSum {
                    pattern,
                    message: "no phases listed".into(),
                });
            }
            length_sums.push(LengthSum {
                phases: indices,
                total: raw.total,
            });
        }

        Ok(PatternSpec {
            pattern,
            phases,
            length_sums,
        })
    }
}

impl RawPhase {
    fn validate(self, pattern: Pattern) -> Result<PhaseSpec, RateTableError> {
        let invalid = |message: String| RateTableError::InvalidPhase {
            pattern,
            phase: self.name.clone(),
            message,
        };

        let [min_len, max_len] = self.length;
        if min_len > max_len || max_len > SLOT_COUNT {
            return Err(invalid(format!("bad length range [{min_len}, {max_len}]")));
        }

        let rule = match (&self.fixed, &self.decay, &self.peak) {
            (Some(fixed), None, None) => RateRule::Fixed(half_open(fixed).map_err(&invalid)?),
            (None, Some(decay), None) => RateRule::Decay {
                start: half_open(&decay.start).map_err(&invalid)?,
                step: inclusive(&decay.step).map_err(&invalid)?,
            },
            (None, None, Some(peak)) => {
                if (min_len, max_len) != (3, 3) {
                    return Err(invalid("peak phases span exactly 3 slots".into()));
                }
                let iv = half_open(peak).map_err(&invalid)?;
                if iv.high - iv.low < 2 {
                    return Err(invalid("peak interval leaves no room below the peak".into()));
                }
                RateRule::Peak(iv)
            }
            _ => return Err(invalid("exactly one of fixed/decay/peak is required".into())),
        };

        Ok(PhaseSpec {
            name: self.name,
            min_len,
            max_len,
            rule,
        })
    }
}

impl RawPriors {
    fn validate(self) -> Result<Priors, RateTableError> {
        let default = validate_row("default", self.default)?;
        let first_buy = self
            .first_buy
            .map(|row| validate_row("first_buy", row))
            .transpose()?;

        let mut after = BTreeMap::new();
        for (previous, row) in self.after {
            after.insert(previous, validate_row(previous.key(), row)?);
        }
        for previous in Pattern::MODELLED {
            if !after.contains_key(&previous) {
                return Err(RateTableError::InvalidPrior {
                    row: previous.key().into(),
                    message: "missing transition row".into(),
                });
            }
        }

        Ok(Priors {
            default,
            first_buy,
            after,
        })
    }
}

fn validate_row(name: &str, row: BTreeMap<Pattern, f64>) -> Result<PriorRow, RateTableError> {
    let invalid = |message: String| RateTableError::InvalidPrior {
        row: name.to_string(),
        message,
    };
    for (pattern, weight) in &row {
        if *pattern == Pattern::Unknown {
            return Err(invalid("unknown has no prior".into()));
        }
        if !weight.is_finite() || *weight < 0.0 {
            return Err(invalid(format!("weight {weight} for {pattern}")));
        }
    }
    let total: f64 = row.values().sum();
    if total <= 0.0 {
        return Err(invalid("weights sum to zero".into()));
    }
    Ok(row)
}

fn half_open(bounds: &[f64; 2]) -> Result<RateInterval, String> {
    let low = interval::to_basis_points(bounds[0]).ok_or_else(|| format!("bad rate {}", bounds[0]))?;
    let high = interval::to_basis_points(bounds[1]).ok_or_else(|| format!("bad rate {}", bounds[1]))?;
    let iv = RateInterval::new(low, high);
    if iv.is_empty() {
        return Err(format!("empty rate interval {iv}"));
    }
    Ok(iv)
}

fn inclusive(bounds: &[f64; 2]) -> Result<RateInterval, String> {
    let low = interval::to_basis_points(bounds[0]).ok_or_else(|| format!("bad step {}", bounds[0]))?;
    let high = interval::to_basis_points(bounds[1]).ok_or_else(|| format!("bad step {}", bounds[1]))?;
    if low > high {
        return Err(format!("inverted step [{}, {}]", bounds[0], bounds[1]));
    }
    Ok(RateInterval::inclusive(low, high))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
