//! Phase layout enumeration.
//!
//! A layout assigns a length to every phase of a pattern so that the
//! lengths cover the twelve slots exactly. [`Layouts`] walks the candidate
//! lengths as an odometer over all phases but the last (whose length is
//! whatever remains), so it holds only the current digits and can be
//! dropped at any point.

use crate::rates::{PatternSpec, PhaseSpec};
use crate::types::{Pattern, SLOT_COUNT};

/// One concrete assignment of phase lengths for a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    pub pattern: Pattern,
    /// Length of each phase, aligned with the pattern's phase list.
    pub lengths: Vec<usize>,
}

impl Layout {
    /// `(phase, length)` pairs in slot order, zero-length phases included.
    pub fn segments<'a>(&'a self, spec: &'a PatternSpec) -> impl Iterator<Item = (&'a PhaseSpec, usize)> + 'a {
        spec.phases.iter().zip(self.lengths.iter().copied())
    }

    /// First slot covered by each phase.
    pub fn starts(&self) -> Vec<usize> {
        self.lengths
            .iter()
            .scan(0, |cursor, len| {
                let start = *cursor;
                *cursor += len;
                Some(start)
            })
            .collect()
    }
}

/// Iterator over every valid [`Layout`] of a pattern.
#[derive(Debug, Clone)]
pub struct Layouts<'a> {
    spec: &'a PatternSpec,
    /// Lengths of all phases but the last; `None` once exhausted.
    digits: Option<Vec<usize>>,
}

impl<'a> Layouts<'a> {
    pub fn new(spec: &'a PatternSpec) -> Self {
        let digits = spec
            .phases
            .split_last()
            .map(|(_, head)| head.iter().map(|p| p.min_len).collect());
        Self { spec, digits }
    }

    /// Complete the current digits into a layout, if the remainder fits the
    /// last phase and every length constraint holds.
    fn complete(&self, digits: &[usize]) -> Option<Layout> {
        let (last, _) = self.spec.phases.split_last()?;
        let used: usize = digits.iter().sum();
        let remainder = SLOT_COUNT.checked_sub(used)?;
        if remainder < last.min_len || remainder > last.max_len {
            return None;
        }

        let mut lengths = digits.to_vec();
        lengths.push(remainder);

        let sums_hold = self.spec.length_sums.iter().all(|sum| {
            sum.phases.iter().map(|&i| lengths[i]).sum::<usize>() == sum.total
        });
        sums_hold.then(|| Layout {
            pattern: self.spec.pattern,
            lengths,
        })
    }

    /// Advance the odometer; least significant digit is the last one.
    fn advance(&self, digits: &mut [usize]) -> bool {
        for (i, digit) in digits.iter_mut().enumerate().rev() {
            let phase = &self.spec.phases[i];
            if *digit < phase.max_len {
                *digit += 1;
                return true;
            }
            *digit = phase.min_len;
        }
        false
    }
}

impl Iterator for Layouts<'_> {
    type Item = Layout;

    fn next(&mut self) -> Option<Layout> {
        loop {
            let mut digits = self.digits.take()?;
            let candidate = self.complete(&digits);
            if self.advance(&mut digits) {
                self.digits = Some(digits);
            }
            if candidate.is_some() {
                return candidate;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
