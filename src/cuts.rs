//! Mechanism to apply an ordered list of cuts to candidates
//!
//! Cuts are declared in order of increasing strictness. Every cut is evaluated
//! on every candidate, regardless of the outcome of the other cuts, so that
//! histograms can later be gated on cumulative ("through cut k"), exclusive
//! ("all but cut k") or inclusive ("any cut") selection states.

use crate::{
    error::{ConfigurationError, MissingFeature},
    features::{CandidateView, SiteIndex},
    linalg::{X, Y},
    numeric::Float,
    projection::DetectorSite,
};
use std::{collections::HashSet, fmt};

/// Maximal number of cuts, bounded by the size of a cut vector
pub const MAX_CUTS: usize = 64;

/// A selection predicate over candidates
///
/// Predicates must be pure: their outcome may only depend on the candidate
/// view which they are given.
///
pub trait CutPredicate: Send + Sync {
    /// Decide whether a candidate passes this cut
    fn test(&self, view: &CandidateView<'_>) -> Result<bool, MissingFeature>;
}

impl<F> CutPredicate for F
where
    F: Fn(&CandidateView<'_>) -> Result<bool, MissingFeature> + Send + Sync,
{
    fn test(&self, view: &CandidateView<'_>) -> Result<bool, MissingFeature> {
        self(view)
    }
}

/// Predicates whose thresholds are read from the configuration file
#[derive(Clone, Debug, PartialEq)]
pub enum Threshold {
    /// Energy within [min, max]
    Energy { min: Float, max: Float },

    /// Plane intersection within a transverse box
    Fiducial {
        site: SiteIndex,
        x_min: Float,
        x_max: Float,
        y_min: Float,
        y_max: Float,
    },

    /// Radial offset at most `max`
    MaxRadius { site: SiteIndex, max: Float },

    /// Off-axis angle at most `max`
    MaxOffAxis { site: SiteIndex, max: Float },

    /// Particle type among a list of PDG codes
    Pdg(Vec<i32>),

    /// Parent particle type among a list of PDG codes
    ParentPdg(Vec<i32>),

    /// Angle to the parent direction at most `max`
    MaxParentAngle(Float),
}
//
impl Threshold {
    /// Decode a threshold predicate from its configuration keyword and values
    pub fn parse(
        kind: &str,
        args: &[&str],
        sites: &[DetectorSite],
    ) -> Result<Self, ConfigurationError> {
        let expect_args = |n: usize| {
            if args.len() == n {
                Ok(())
            } else {
                Err(ConfigurationError::Invalid {
                    name: format!("{kind} cut"),
                    reason: format!("expected {n} arguments, got {}", args.len()),
                })
            }
        };
        let float = |idx: usize| -> Result<Float, ConfigurationError> {
            args[idx]
                .parse::<Float>()
                .map_err(|e| ConfigurationError::Invalid {
                    name: format!("{kind} cut"),
                    reason: format!("\"{}\": {e}", args[idx]),
                })
        };
        let codes = || -> Result<Vec<i32>, ConfigurationError> {
            args.iter()
                .flat_map(|a| a.split(','))
                .filter(|a| !a.is_empty())
                .map(|a| {
                    a.parse::<i32>().map_err(|e| ConfigurationError::Invalid {
                        name: format!("{kind} cut"),
                        reason: format!("\"{a}\": {e}"),
                    })
                })
                .collect()
        };
        let threshold = match kind {
            "energy" => {
                expect_args(2)?;
                Threshold::Energy {
                    min: float(0)?,
                    max: float(1)?,
                }
            }
            "fiducial" => {
                expect_args(5)?;
                Threshold::Fiducial {
                    site: SiteIndex::resolve(args[0], sites)?,
                    x_min: float(1)?,
                    x_max: float(2)?,
                    y_min: float(3)?,
                    y_max: float(4)?,
                }
            }
            "max_radius" => {
                expect_args(2)?;
                Threshold::MaxRadius {
                    site: SiteIndex::resolve(args[0], sites)?,
                    max: float(1)?,
                }
            }
            "max_off_axis" => {
                expect_args(2)?;
                Threshold::MaxOffAxis {
                    site: SiteIndex::resolve(args[0], sites)?,
                    max: float(1)?,
                }
            }
            "pdg" => Threshold::Pdg(codes()?),
            "parent_pdg" => Threshold::ParentPdg(codes()?),
            "max_parent_angle" => {
                expect_args(1)?;
                Threshold::MaxParentAngle(float(0)?)
            }
            _ => {
                return Err(ConfigurationError::UnknownReference {
                    kind: "cut kind",
                    name: kind.to_owned(),
                })
            }
        };
        threshold.check(kind)?;
        Ok(threshold)
    }

    /// Reject thresholds that no candidate could ever meet
    fn check(&self, kind: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| {
            Err(ConfigurationError::Invalid {
                name: format!("{kind} cut"),
                reason: reason.to_owned(),
            })
        };
        match self {
            Threshold::Energy { min, max } if !(min <= max) => invalid("empty energy range"),
            Threshold::Fiducial {
                x_min,
                x_max,
                y_min,
                y_max,
                ..
            } if !(x_min <= x_max && y_min <= y_max) => invalid("empty fiducial box"),
            Threshold::Pdg(codes) | Threshold::ParentPdg(codes) if codes.is_empty() => {
                invalid("no PDG code given")
            }
            _ => Ok(()),
        }
    }
}

impl CutPredicate for Threshold {
    fn test(&self, view: &CandidateView<'_>) -> Result<bool, MissingFeature> {
        let c = view.candidate;
        Ok(match self {
            Threshold::Energy { min, max } => (*min..=*max).contains(&c.energy),
            Threshold::Fiducial {
                site,
                x_min,
                x_max,
                y_min,
                y_max,
            } => {
                let p = &view.projection(*site).intersection;
                (*x_min..=*x_max).contains(&p[X]) && (*y_min..=*y_max).contains(&p[Y])
            }
            Threshold::MaxRadius { site, max } => {
                view.projection(*site).observables.radial_offset <= *max
            }
            Threshold::MaxOffAxis { site, max } => {
                view.projection(*site).observables.off_axis_angle <= *max
            }
            Threshold::Pdg(codes) => codes.contains(&c.pdg),
            Threshold::ParentPdg(codes) => codes.contains(&view.parent_pdg()?),
            Threshold::MaxParentAngle(max) => view.parent_angle()? <= *max,
        })
    }
}

/// A named selection predicate
pub struct Cut {
    name: String,
    predicate: Box<dyn CutPredicate>,
}
//
impl Cut {
    /// Cut based on configured thresholds
    pub fn threshold(name: impl Into<String>, threshold: Threshold) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(threshold),
        }
    }

    /// Cut based on arbitrary user-provided logic
    pub fn custom(
        name: impl Into<String>,
        predicate: impl Fn(&CandidateView<'_>) -> Result<bool, MissingFeature> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Name of the cut
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Cut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cut").field("name", &self.name).finish()
    }
}

/// Ordered list of cuts, fixed at configuration time
#[derive(Debug)]
pub struct CutSpec {
    cuts: Vec<Cut>,
}
//
impl CutSpec {
    /// Set up the cut list, checking that it is usable
    pub fn new(cuts: Vec<Cut>) -> Result<Self, ConfigurationError> {
        if cuts.is_empty() {
            return Err(ConfigurationError::NoCuts);
        }
        if cuts.len() > MAX_CUTS {
            return Err(ConfigurationError::TooManyCuts(cuts.len()));
        }
        let mut names = HashSet::new();
        for cut in &cuts {
            if !names.insert(cut.name()) {
                return Err(ConfigurationError::Duplicate {
                    kind: "cut",
                    name: cut.name().to_owned(),
                });
            }
        }
        Ok(Self { cuts })
    }

    /// Number of cuts
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    /// A cut list is never empty, this only exists for API consistency
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Cuts in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Cut> {
        self.cuts.iter()
    }

    /// Position of a cut in the declaration order
    pub fn index_of(&self, name: &str) -> Result<usize, ConfigurationError> {
        self.cuts
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| ConfigurationError::UnknownReference {
                kind: "cut",
                name: name.to_owned(),
            })
    }

    /// Apply every cut to a candidate
    ///
    /// All predicates are evaluated even after one has failed. If one of them
    /// needs a feature which the candidate lacks, the candidate cannot be
    /// classified and the error is propagated.
    ///
    pub fn evaluate(&self, view: &CandidateView<'_>) -> Result<CutVector, MissingFeature> {
        let mut outcome = CutVector::new(self.len());
        for (idx, cut) in self.cuts.iter().enumerate() {
            outcome.set(idx, cut.predicate.test(view)?);
        }
        Ok(outcome)
    }
}

/// Pass/fail outcome of each cut, in declaration order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CutVector {
    bits: u64,
    len: u8,
}
//
impl CutVector {
    /// Vector of `len` failed cuts
    fn new(len: usize) -> Self {
        assert!(len <= MAX_CUTS, "Cut vectors hold at most {MAX_CUTS} cuts");
        Self {
            bits: 0,
            len: len as u8,
        }
    }

    /// Build a cut vector from explicit outcomes
    pub fn from_outcomes(outcomes: &[bool]) -> Self {
        let mut vector = Self::new(outcomes.len());
        for (idx, &passed) in outcomes.iter().enumerate() {
            vector.set(idx, passed);
        }
        vector
    }

    fn set(&mut self, idx: usize, passed: bool) {
        debug_assert!(idx < self.len());
        if passed {
            self.bits |= 1 << idx;
        } else {
            self.bits &= !(1 << idx);
        }
    }

    fn full_mask(&self) -> u64 {
        if self.len() == MAX_CUTS {
            u64::MAX
        } else {
            (1 << self.len) - 1
        }
    }

    /// Number of cuts
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Truth that no cut was configured
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Outcome of the idx-th cut
    pub fn passed(&self, idx: usize) -> bool {
        assert!(idx < self.len(), "Cut index out of range");
        self.bits & (1 << idx) != 0
    }

    /// Number of leading cuts passed in a row, from 0 to len()
    pub fn passed_through(&self) -> usize {
        (self.bits.trailing_ones() as usize).min(self.len())
    }

    /// Truth that every cut was passed
    pub fn all_passed(&self) -> bool {
        self.bits == self.full_mask()
    }

    /// Truth that at least one cut was passed
    pub fn any_passed(&self) -> bool {
        self.bits != 0
    }

    /// Truth that every cut except the idx-th one was passed
    pub fn all_passed_except(&self, idx: usize) -> bool {
        let mask = self.full_mask() & !(1 << idx);
        self.bits & mask == mask
    }

    /// Outcomes in declaration order
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(|idx| self.passed(idx))
    }
}

/// Cut-pass state that a histogram fill is gated on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CutState {
    /// No gating
    Always,

    /// Every cut passed
    AllPassed,

    /// At least one cut passed
    AnyPassed,

    /// No cut passed
    NonePassed,

    /// Every cut up to and including the given one passed
    Through(usize),

    /// Every cut except the given one passed
    NMinusOne(usize),

    /// The given cut passed
    Passed(usize),

    /// The given cut failed
    Failed(usize),
}
//
impl CutState {
    /// Decode a cut state such as "all" or "through:fiducial"
    pub fn parse(s: &str, cuts: &CutSpec) -> Result<Self, ConfigurationError> {
        if let Some((state, cut)) = s.split_once(':') {
            let idx = cuts.index_of(cut)?;
            return match state {
                "through" => Ok(CutState::Through(idx)),
                "nminus1" => Ok(CutState::NMinusOne(idx)),
                "pass" => Ok(CutState::Passed(idx)),
                "fail" => Ok(CutState::Failed(idx)),
                _ => Err(ConfigurationError::UnknownReference {
                    kind: "cut state",
                    name: s.to_owned(),
                }),
            };
        }
        match s {
            "always" => Ok(CutState::Always),
            "all" => Ok(CutState::AllPassed),
            "any" => Ok(CutState::AnyPassed),
            "none" => Ok(CutState::NonePassed),
            _ => Err(ConfigurationError::UnknownReference {
                kind: "cut state",
                name: s.to_owned(),
            }),
        }
    }

    /// Truth that a cut vector is in this state
    pub fn is_satisfied_by(self, cuts: &CutVector) -> bool {
        match self {
            CutState::Always => true,
            CutState::AllPassed => cuts.all_passed(),
            CutState::AnyPassed => cuts.any_passed(),
            CutState::NonePassed => !cuts.any_passed(),
            CutState::Through(idx) => cuts.passed_through() > idx,
            CutState::NMinusOne(idx) => cuts.all_passed_except(idx),
            CutState::Passed(idx) => cuts.passed(idx),
            CutState::Failed(idx) => !cuts.passed(idx),
        }
    }

    /// Name of the state, as written in configuration files
    pub fn describe(self, cuts: &CutSpec) -> String {
        let named = |state: &str, idx: usize| {
            let name = cuts.iter().nth(idx).map_or("?", |c| c.name());
            format!("{state}:{name}")
        };
        match self {
            CutState::Always => "always".to_owned(),
            CutState::AllPassed => "all".to_owned(),
            CutState::AnyPassed => "any".to_owned(),
            CutState::NonePassed => "none".to_owned(),
            CutState::Through(idx) => named("through", idx),
            CutState::NMinusOne(idx) => named("nminus1", idx),
            CutState::Passed(idx) => named("pass", idx),
            CutState::Failed(idx) => named("fail", idx),
        }
    }
}
