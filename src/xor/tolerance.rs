//! Tolerance schedules.
//!
//! Each tolerance `t` filters out differences narrower than `t`: the raw XOR is shrunk by
//! `t / 2` and grown back by the same amount. Results of tolerance `i` go to the output layer
//! `base + i * bump`.

use crate::{db::Coord, Error, Result};

/// A non-empty, strictly ascending list of non-negative tolerances in database units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToleranceSchedule {
    values: Vec<Coord>,
}

impl Default for ToleranceSchedule {
    fn default() -> Self {
        Self { values: vec![0] }
    }
}

impl ToleranceSchedule {
    /// Creates a schedule from database-unit values. An empty list means `[0]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTolerances`] for negative or non-ascending values.
    pub fn new(values: Vec<Coord>) -> Result<Self> {
        if values.is_empty() {
            return Ok(Self::default());
        }
        if let Some(negative) = values.iter().find(|&&t| t < 0) {
            return Err(Error::InvalidTolerances(format!(
                "tolerance {negative} is negative"
            )));
        }
        if let Some(w) = values.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidTolerances(format!(
                "tolerances must be strictly ascending, found {} followed by {}",
                w[0], w[1]
            )));
        }
        Ok(Self { values })
    }

    /// Creates a schedule from micrometer values, rounding to the database grid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTolerances`] for non-finite, negative or non-ascending values,
    /// including values that collapse onto the same grid point.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_micron(values: &[f64], dbu: f64) -> Result<Self> {
        if !(dbu.is_finite() && dbu > 0.0) {
            return Err(Error::InvalidTolerances(format!(
                "database unit {dbu} is not positive"
            )));
        }
        let mut converted = Vec::with_capacity(values.len());
        for &v in values {
            if !v.is_finite() {
                return Err(Error::InvalidTolerances(format!("tolerance {v} is not finite")));
            }
            converted.push((v / dbu).round() as Coord);
        }
        Self::new(converted)
    }

    /// The tolerance values.
    #[must_use]
    pub fn values(&self) -> &[Coord] {
        &self.values
    }

    /// Iterates `(index, tolerance)` pairs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Coord)> + '_ {
        self.values.iter().copied().enumerate()
    }

    /// Number of tolerance levels, at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; present for symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The tolerance at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Coord> {
        self.values.get(index).copied()
    }

    /// The largest tolerance.
    #[must_use]
    pub fn max(&self) -> Coord {
        self.values.last().copied().unwrap_or(0)
    }

    /// Per-side shrink/grow amount of level `index`.
    #[must_use]
    pub fn half(&self, index: usize) -> Coord {
        self.get(index).unwrap_or(0) / 2
    }

    /// Output layer number of tolerance level `index`.
    #[must_use]
    pub fn output_layer(base: i32, index: usize, bump: i32) -> i32 {
        let index = i32::try_from(index).unwrap_or(i32::MAX);
        base.saturating_add(index.saturating_mul(bump))
    }
}
