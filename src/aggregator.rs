//! This module accumulates selection results across events
//!
//! The aggregator is a per-event fold: `new` sets up empty histograms from the
//! configuration, `process` integrates one event, and `finalize` hands over the
//! results. Aggregators built from the same configuration can be merged, which
//! is how batches of events processed independently are combined.

use crate::{
    config::Configuration,
    error::{ConfigurationError, MalformedEvent, MissingFeature, ParallelTrajectory},
    event::{Candidate, Event},
    features::CandidateView,
    histset::{EvaluatedCandidate, HistogramSet},
};
use log::{debug, info, warn};
use serde::Serialize;

/// Why a candidate was left out of the histograms
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Its trajectory never crosses a detector site's plane
    ParallelTrajectory,

    /// A cut or histogram needed a feature which it lacks
    MissingFeature(MissingFeature),
}

impl From<ParallelTrajectory> for SkipReason {
    fn from(_: ParallelTrajectory) -> Self {
        SkipReason::ParallelTrajectory
    }
}

impl From<MissingFeature> for SkipReason {
    fn from(e: MissingFeature) -> Self {
        SkipReason::MissingFeature(e)
    }
}

/// Final state of a candidate after processing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// The candidate went into the histograms
    Filled,

    /// The candidate was left out
    Skipped(SkipReason),
}

/// Counters which make every dropped event or candidate observable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Events which went through processing, including empty ones
    pub processed_events: u64,

    /// Events which were rejected as malformed
    pub malformed_events: u64,

    /// Candidates which went into the histograms
    pub filled_candidates: u64,

    /// Candidates skipped because their trajectory is parallel to a plane
    pub parallel_trajectories: u64,

    /// Candidates skipped because they lack a required feature
    pub missing_features: u64,

    /// Site projections replaced by sentinel values
    pub sentinel_substitutions: u64,
}
//
impl Diagnostics {
    /// Total number of skipped candidates
    pub fn skipped_candidates(&self) -> u64 {
        self.parallel_trajectories + self.missing_features
    }

    fn record(&mut self, outcome: &CandidateOutcome) {
        match outcome {
            CandidateOutcome::Filled => self.filled_candidates += 1,
            CandidateOutcome::Skipped(SkipReason::ParallelTrajectory) => {
                self.parallel_trajectories += 1
            }
            CandidateOutcome::Skipped(SkipReason::MissingFeature(_)) => {
                self.missing_features += 1
            }
        }
    }

    fn merge(&mut self, other: &Self) {
        self.processed_events += other.processed_events;
        self.malformed_events += other.malformed_events;
        self.filled_candidates += other.filled_candidates;
        self.parallel_trajectories += other.parallel_trajectories;
        self.missing_features += other.missing_features;
        self.sentinel_substitutions += other.sentinel_substitutions;
    }
}

/// Selection state accumulated over a sequence of events
#[derive(Debug)]
pub struct SelectionAggregator<'cfg> {
    /// Configuration of the selection
    cfg: &'cfg Configuration,

    /// Histograms filled so far
    histograms: HistogramSet<'cfg>,

    /// Skip counters
    diagnostics: Diagnostics,
}
//
impl<'cfg> SelectionAggregator<'cfg> {
    /// Prepare for results accumulation
    pub fn new(cfg: &'cfg Configuration) -> Result<Self, ConfigurationError> {
        let histograms = HistogramSet::new(&cfg.histograms, cfg.cuts.len())?;
        info!(
            "Selection initialized: {} cuts, {} histograms, {} detector sites",
            cfg.cuts.len(),
            cfg.histograms.len(),
            cfg.sites.len()
        );
        Ok(Self {
            cfg,
            histograms,
            diagnostics: Diagnostics::default(),
        })
    }

    /// Fresh aggregator sharing this one's configuration
    pub fn empty_like(&self) -> Self {
        Self {
            cfg: self.cfg,
            histograms: self.histograms.cleared(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Derive a candidate's features and evaluate the cuts on it
    pub fn evaluate<'ev>(
        &self,
        event: &'ev Event,
        candidate: &'ev Candidate,
    ) -> Result<EvaluatedCandidate<'ev>, SkipReason> {
        let cfg = self.cfg;
        let view = CandidateView::derive(
            event,
            candidate,
            &cfg.sites,
            &cfg.center_shift,
            cfg.on_parallel,
        )?;
        let cuts = cfg.cuts.evaluate(&view)?;
        Ok(EvaluatedCandidate { view, cuts })
    }

    /// Process one event, or report why it could not be processed
    ///
    /// Returns the outcome of each candidate, in event order.
    ///
    pub fn process(&mut self, event: &Event) -> Result<Vec<CandidateOutcome>, MalformedEvent> {
        if let Err(e) = event.validate() {
            self.reject(&e);
            return Err(e);
        }

        let mut outcomes = Vec::with_capacity(event.candidates.len());
        for (idx, candidate) in event.candidates.iter().enumerate() {
            let outcome = match self.evaluate(event, candidate) {
                Ok(evaluated) => {
                    let sentinels = evaluated.view.sentinel_count() as u64;
                    match self.histograms.fill(evaluated) {
                        Ok(()) => {
                            self.diagnostics.sentinel_substitutions += sentinels;
                            CandidateOutcome::Filled
                        }
                        Err(e) => CandidateOutcome::Skipped(e.into()),
                    }
                }
                Err(reason) => CandidateOutcome::Skipped(reason),
            };
            if let CandidateOutcome::Skipped(reason) = &outcome {
                debug!("Event {}: skipped candidate {idx} ({reason:?})", event.id);
            }
            self.diagnostics.record(&outcome);
            outcomes.push(outcome);
        }
        self.diagnostics.processed_events += 1;
        Ok(outcomes)
    }

    /// Account for an event which could not be read or validated
    pub fn reject(&mut self, error: &MalformedEvent) {
        warn!("Skipping malformed event: {error}");
        self.diagnostics.malformed_events += 1;
    }

    /// Integrate results from another aggregator
    #[allow(clippy::needless_pass_by_value)]
    pub fn merge(&mut self, other: Self) {
        assert!(
            std::ptr::eq(self.cfg, other.cfg),
            "Only aggregators sharing a configuration can be merged"
        );
        self.histograms.merge(other.histograms);
        self.diagnostics.merge(&other.diagnostics);
    }

    /// Skip counters accumulated so far
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Turn accumulated data into final results
    pub fn finalize(self) -> FinalResults<'cfg> {
        let diag = &self.diagnostics;
        info!(
            "Selection finalized: {} events processed, {} malformed, {} candidates filled, {} skipped",
            diag.processed_events,
            diag.malformed_events,
            diag.filled_candidates,
            diag.skipped_candidates()
        );
        FinalResults {
            histograms: self.histograms,
            diagnostics: self.diagnostics,
            cfg: self.cfg,
        }
    }
}

/// Final results of a selection run
#[derive(Debug)]
pub struct FinalResults<'cfg> {
    /// Filled histograms and cut-flow table
    pub histograms: HistogramSet<'cfg>,

    /// Skip counters
    pub diagnostics: Diagnostics,

    /// Configuration of the run (for further derivation)
    pub cfg: &'cfg Configuration,
}
