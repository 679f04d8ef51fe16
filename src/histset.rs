//! Collection of histograms keyed by category and cut-pass state
//!
//! The histograms to be filled are declared once, at configuration time, as a
//! static list of (category selector, cut state, axes). On top of those, every
//! histogram set carries a cut-flow table which counts, for each category, how
//! many candidates passed exactly k leading cuts in a row.

use crate::{
    category::{Category, CategorySelector},
    cuts::{CutState, CutVector},
    error::{ConfigurationError, MissingFeature},
    features::{CandidateView, Observable},
    histogram::{Binning, Histogram, MAX_AXES},
    numeric::Float,
};
use serde::Serialize;
use std::collections::HashSet;

/// One axis of a histogram declaration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisDecl {
    /// Quantity on this axis
    pub observable: Observable,

    /// Binning of this axis
    pub binning: Binning,
}

/// Static description of one histogram
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramDecl {
    /// Unique name of the histogram
    pub name: String,

    /// Which candidates this histogram applies to
    pub category: CategorySelector,

    /// Selection state required for a candidate to be filled in
    pub state: CutState,

    /// Axes of the histogram
    pub axes: Vec<AxisDecl>,
}

/// Check a list of histogram declarations
pub fn validate_decls(decls: &[HistogramDecl]) -> Result<(), ConfigurationError> {
    let mut names = HashSet::new();
    for decl in decls {
        if !names.insert(decl.name.as_str()) {
            return Err(ConfigurationError::Duplicate {
                kind: "histogram",
                name: decl.name.clone(),
            });
        }
        if decl.axes.is_empty() || decl.axes.len() > MAX_AXES {
            return Err(ConfigurationError::Invalid {
                name: format!("histogram {}", decl.name),
                reason: format!("expected 1 to {MAX_AXES} axes, got {}", decl.axes.len()),
            });
        }
    }
    Ok(())
}

/// Per-category count of candidates by number of leading cuts passed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CutFlow {
    num_cuts: usize,
    /// Raw candidate counts, indexed by [category][cuts passed in a row]
    counts: Vec<Vec<u64>>,
    /// Weighted candidate counts, same layout as `counts`
    weights: Vec<Vec<Float>>,
}
//
impl CutFlow {
    fn new(num_cuts: usize) -> Self {
        Self {
            num_cuts,
            counts: vec![vec![0; num_cuts + 1]; Category::COUNT],
            weights: vec![vec![0.; num_cuts + 1]; Category::COUNT],
        }
    }

    fn fill(&mut self, category: Category, cuts: &CutVector, weight: Float) {
        let bin = cuts.passed_through();
        self.counts[category.index()][bin] += 1;
        self.weights[category.index()][bin] += weight;
    }

    /// Number of candidates of a category which passed exactly `passed`
    /// leading cuts
    pub fn count(&self, category: Category, passed: usize) -> u64 {
        self.counts[category.index()][passed]
    }

    /// Number of candidates of a category which passed at least the first
    /// `passed` cuts (the usual efficiency-after-cut-k numerator)
    pub fn cumulative_count(&self, category: Category, passed: usize) -> u64 {
        self.counts[category.index()][passed..].iter().sum()
    }

    /// Number of candidates in the table
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Number of configured cuts
    pub fn num_cuts(&self) -> usize {
        self.num_cuts
    }

    #[allow(clippy::needless_pass_by_value)]
    fn merge(&mut self, other: Self) {
        assert_eq!(self.num_cuts, other.num_cuts);
        for (a, b) in self.counts.iter_mut().flatten().zip(other.counts.into_iter().flatten()) {
            *a += b;
        }
        for (a, b) in self.weights.iter_mut().flatten().zip(other.weights.into_iter().flatten()) {
            *a += b;
        }
    }
}

/// A candidate which went through cut evaluation and awaits histogramming
///
/// Filling consumes this value, so a candidate cannot be filled twice.
///
#[derive(Debug)]
pub struct EvaluatedCandidate<'ev> {
    /// The candidate and its derived features
    pub view: CandidateView<'ev>,

    /// Outcome of the cuts
    pub cuts: CutVector,
}

/// Full collection of histograms produced by a processing run
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSet<'cfg> {
    decls: &'cfg [HistogramDecl],
    histograms: Vec<Histogram>,
    cut_flow: CutFlow,
}
//
impl<'cfg> HistogramSet<'cfg> {
    /// Create empty histograms from their declarations
    pub fn new(decls: &'cfg [HistogramDecl], num_cuts: usize) -> Result<Self, ConfigurationError> {
        validate_decls(decls)?;
        let histograms = decls
            .iter()
            .map(|d| Histogram::new(d.axes.iter().map(|a| a.binning).collect()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            decls,
            histograms,
            cut_flow: CutFlow::new(num_cuts),
        })
    }

    /// Empty histogram set with the same declarations
    pub fn cleared(&self) -> Self {
        Self {
            decls: self.decls,
            histograms: self.histograms.iter().map(Histogram::cleared).collect(),
            cut_flow: CutFlow::new(self.cut_flow.num_cuts),
        }
    }

    /// Fill one evaluated candidate into every histogram that applies to it
    ///
    /// All values are computed before anything is filled, so a candidate which
    /// lacks a feature leaves the histograms untouched.
    ///
    #[allow(clippy::needless_pass_by_value)]
    pub fn fill(&mut self, evaluated: EvaluatedCandidate<'_>) -> Result<(), MissingFeature> {
        let EvaluatedCandidate { view, cuts } = evaluated;
        let mut plan = Vec::new();
        for (idx, decl) in self.decls.iter().enumerate() {
            if !(decl.category.accepts(view.category) && decl.state.is_satisfied_by(&cuts)) {
                continue;
            }
            let mut values = [0.; MAX_AXES];
            for (value, axis) in values.iter_mut().zip(&decl.axes) {
                *value = view.observe(axis.observable)?;
            }
            plan.push((idx, values));
        }

        let weight = view.candidate.weight;
        for (idx, values) in plan {
            let dim = self.decls[idx].axes.len();
            self.histograms[idx].fill(&values[..dim], weight);
        }
        self.cut_flow.fill(view.category, &cuts, weight);
        Ok(())
    }

    /// Add the contents of a histogram set built from the same declarations
    #[allow(clippy::needless_pass_by_value)]
    pub fn merge(&mut self, other: Self) {
        assert!(
            std::ptr::eq(self.decls, other.decls) || self.decls == other.decls,
            "Only histogram sets with identical declarations can be merged"
        );
        for (a, b) in self.histograms.iter_mut().zip(other.histograms) {
            a.merge(b);
        }
        self.cut_flow.merge(other.cut_flow);
    }

    /// Declarations and histograms, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&'cfg HistogramDecl, &Histogram)> {
        self.decls.iter().zip(&self.histograms)
    }

    /// Look up a histogram by name
    pub fn get(&self, name: &str) -> Option<&Histogram> {
        self.iter().find(|(d, _)| d.name == name).map(|(_, h)| h)
    }

    /// Cut-flow table
    pub fn cut_flow(&self) -> &CutFlow {
        &self.cut_flow
    }
}
