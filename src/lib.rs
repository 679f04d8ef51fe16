//! Off-axis selection: trajectory projection and cut-driven histogramming
//!
//!
//! # Introduction (for the physicist)
//!
//! A neutrino beam is simulated up to the point where each neutrino leaves the
//! decay region. What an experiment actually sees, however, depends on where
//! its detector sits: at some distance along the beam (the baseline), and
//! possibly away from the beam axis. Detectors placed off-axis see a narrower
//! energy spectrum, and comparing several such positions is the whole point of
//! an off-axis analysis.
//!
//! This crate takes the simulated neutrinos, extends their straight-line
//! trajectories to the plane of each detector site, and derives where they
//! cross it: the transverse distance to the beam axis and the off-axis angle.
//! It then applies an ordered list of selection cuts and fills histograms,
//! split by neutrino flavor, along with a cut-flow table telling how many
//! neutrinos of each flavor survived each cut.
//!
//!
//! # Introduction (for the computer guy)
//!
//! The processing pipeline is a fold over events:
//!
//! * read in the configuration (sites, cuts, histogram declarations)
//! * for each event, and each candidate in it,
//!     * project its trajectory to every detector site,
//!     * evaluate every cut, keeping all outcomes rather than stopping at the
//!       first failure,
//!     * fill the histograms whose category and cut-state gate match, and the
//!       cut-flow table,
//! * then merge partial results and output them.
//!
//! Since partial results merge by simple addition, events are processed in
//! batches which may run in parallel (see the `multi-threading` feature).

#![warn(missing_docs)]

pub mod aggregator;
pub mod category;
pub mod config;
pub mod cuts;
pub mod error;
pub mod event;
pub mod features;
pub mod histogram;
pub mod histset;
pub mod input;
pub mod linalg;
pub mod numeric;
pub mod output;
pub mod projection;
pub mod scheduling;

/// We'll use eyre's type-erased result type for application-level plumbing
pub type Result<T> = eyre::Result<T>;
