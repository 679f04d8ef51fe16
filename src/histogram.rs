//! Binned accumulators
//!
//! Histograms have 1 to 3 uniform axes. Each axis carries an underflow and an
//! overflow bin in addition to its regular bins, so that every fill lands in
//! exactly one bin and the sum of all bin contents always matches the sum of
//! all fill weights.

use crate::{error::ConfigurationError, numeric::Float};
use serde::Serialize;

/// Maximal number of axes of a histogram
pub const MAX_AXES: usize = 3;

/// Uniform binning of one histogram axis
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Binning {
    /// Number of regular bins
    pub num_bins: usize,

    /// Lower edge of the first regular bin
    pub low: Float,

    /// Upper edge of the last regular bin
    pub high: Float,
}
//
impl Binning {
    /// Set up a binning, checking that it describes a non-empty range
    pub fn new(num_bins: usize, low: Float, high: Float) -> Result<Self, ConfigurationError> {
        if num_bins == 0 {
            return Err(ConfigurationError::Invalid {
                name: "binning".to_owned(),
                reason: "an axis needs at least one bin".to_owned(),
            });
        }
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(ConfigurationError::Invalid {
                name: "binning".to_owned(),
                reason: format!("[{low}, {high}) is not a usable range"),
            });
        }
        Ok(Self {
            num_bins,
            low,
            high,
        })
    }

    /// Number of storage slots, including underflow and overflow
    pub fn num_slots(&self) -> usize {
        self.num_bins + 2
    }

    /// Storage slot of a value: 0 is underflow, num_bins + 1 is overflow
    ///
    /// NaN is filed as overflow, so that it never pollutes regular bins.
    ///
    pub fn slot(&self, x: Float) -> usize {
        if x < self.low {
            0
        } else if x >= self.high || x.is_nan() {
            self.num_bins + 1
        } else {
            let width = (self.high - self.low) / self.num_bins as Float;
            let bin = ((x - self.low) / width) as usize;
            // Rounding can push values right below `high` into overflow
            1 + bin.min(self.num_bins - 1)
        }
    }
}

/// Binned counter and sum of weights over 1 to 3 axes
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Histogram {
    axes: Vec<Binning>,
    /// Sum of weights per slot (row-major, first axis varies slowest)
    sum_w: Vec<Float>,
    /// Sum of squared weights per slot
    sum_w2: Vec<Float>,
    /// Number of fills
    entries: u64,
}
//
impl Histogram {
    /// Create an empty histogram
    pub fn new(axes: Vec<Binning>) -> Result<Self, ConfigurationError> {
        if axes.is_empty() || axes.len() > MAX_AXES {
            return Err(ConfigurationError::Invalid {
                name: "histogram".to_owned(),
                reason: format!("expected 1 to {MAX_AXES} axes, got {}", axes.len()),
            });
        }
        let num_slots = axes.iter().map(Binning::num_slots).product();
        Ok(Self {
            axes,
            sum_w: vec![0.; num_slots],
            sum_w2: vec![0.; num_slots],
            entries: 0,
        })
    }

    /// Empty histogram with the same axes
    pub fn cleared(&self) -> Self {
        Self {
            axes: self.axes.clone(),
            sum_w: vec![0.; self.sum_w.len()],
            sum_w2: vec![0.; self.sum_w2.len()],
            entries: 0,
        }
    }

    /// Number of fills
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of all weights, including underflow and overflow
    pub fn total_weight(&self) -> Float {
        self.sum_w.iter().sum()
    }

    /// Storage index of a point
    fn index_of(&self, values: &[Float]) -> usize {
        assert_eq!(
            values.len(),
            self.axes.len(),
            "Fill dimension must match histogram dimension"
        );
        self.axes
            .iter()
            .zip(values)
            .fold(0, |idx, (axis, &x)| idx * axis.num_slots() + axis.slot(x))
    }

    /// Accumulate one weighted point
    pub fn fill(&mut self, values: &[Float], weight: Float) {
        let idx = self.index_of(values);
        self.sum_w[idx] += weight;
        self.sum_w2[idx] += weight * weight;
        self.entries += 1;
    }

    /// Sum of weights in the slot containing a point
    pub fn content_at(&self, values: &[Float]) -> Float {
        self.sum_w[self.index_of(values)]
    }

    /// Sum of weights in a slot, given per-axis slot indices
    pub fn content(&self, slots: &[usize]) -> Float {
        assert_eq!(slots.len(), self.axes.len());
        let idx = self
            .axes
            .iter()
            .zip(slots)
            .fold(0, |idx, (axis, &s)| {
                assert!(s < axis.num_slots(), "Slot index out of range");
                idx * axis.num_slots() + s
            });
        self.sum_w[idx]
    }

    /// Add the contents of another histogram of identical shape
    #[allow(clippy::needless_pass_by_value)]
    pub fn merge(&mut self, other: Self) {
        assert_eq!(self.axes, other.axes, "Only identical histograms can be merged");
        for (a, b) in self.sum_w.iter_mut().zip(other.sum_w) {
            *a += b;
        }
        for (a, b) in self.sum_w2.iter_mut().zip(other.sum_w2) {
            *a += b;
        }
        self.entries += other.entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_land_in_the_right_slots() {
        let b = Binning::new(4, 0., 2.).unwrap();
        assert_eq!(b.slot(-0.1), 0);
        assert_eq!(b.slot(0.), 1);
        assert_eq!(b.slot(0.49), 1);
        assert_eq!(b.slot(0.5), 2);
        assert_eq!(b.slot(1.99), 4);
        assert_eq!(b.slot(2.), 5);
        assert_eq!(b.slot(Float::NAN), 5);
        assert_eq!(b.slot(-9999.), 0);
    }

    #[test]
    fn bad_binnings_are_rejected() {
        assert!(Binning::new(0, 0., 1.).is_err());
        assert!(Binning::new(10, 1., 1.).is_err());
        assert!(Binning::new(10, 0., Float::INFINITY).is_err());
        assert!(Histogram::new(vec![]).is_err());
        let b = Binning::new(1, 0., 1.).unwrap();
        assert!(Histogram::new(vec![b; 4]).is_err());
    }

    #[test]
    fn every_fill_is_kept() {
        let mut h = Histogram::new(vec![
            Binning::new(3, 0., 3.).unwrap(),
            Binning::new(2, -1., 1.).unwrap(),
        ])
        .unwrap();
        let points = [[0.5, 0.5], [10., 0.], [-3., -3.], [2.5, Float::NAN], [1.5, -0.5]];
        for p in &points {
            h.fill(p, 2.);
        }
        assert_eq!(h.entries(), points.len() as u64);
        assert_eq!(h.total_weight(), 2. * points.len() as Float);
        assert_eq!(h.content_at(&[0.5, 0.5]), 2.);
        assert_eq!(h.content(&[2, 1]), 2.);
        assert_eq!(h.content(&[4, 2]), 2.);
    }

    #[test]
    fn merging_adds_bin_contents() {
        let axes = vec![Binning::new(5, 0., 5.).unwrap()];
        let mut a = Histogram::new(axes.clone()).unwrap();
        let mut b = Histogram::new(axes.clone()).unwrap();
        let mut both = Histogram::new(axes).unwrap();
        for x in [0.5, 1.5, 1.7, 7.] {
            a.fill(&[x], 1.);
            both.fill(&[x], 1.);
        }
        for x in [1.2, -1.] {
            b.fill(&[x], 1.);
            both.fill(&[x], 1.);
        }
        a.merge(b);
        assert_eq!(a, both);
    }
}
