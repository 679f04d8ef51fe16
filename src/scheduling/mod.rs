//! This module takes care of scheduling the selection work, encapsulating use
//! of multiple threads and cooperative cancellation

#[cfg(feature = "multi-threading")]
mod multi_threading;
#[cfg(not(feature = "multi-threading"))]
mod sequential;

use crate::{
    aggregator::{FinalResults, SelectionAggregator},
    config::Configuration,
    error::{ConfigurationError, MalformedEvent},
    event::Event,
};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

/// Size of the processed event batches
///
/// Events are grouped in batches of a certain size, each folded into its own
/// aggregator before being merged in input order. This keeps floating-point
/// accumulation error in check and makes sequential and parallel runs produce
/// identical results.
///
const EVENT_BATCH_SIZE: usize = 10_000;

/// Item type of event sources
pub type EventRecord = Result<Event, MalformedEvent>;

/// Cooperative cancellation request
///
/// The flag is checked before each event is pulled from the input. Once it is
/// raised, no further event is read, and the results accumulated so far are
/// finalized as usual.
///
#[derive(Debug, Default)]
pub struct StopFlag(AtomicBool);
//
impl StopFlag {
    /// Flag which has not been raised yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the selection to stop after the current event
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Truth that a stop was requested
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run the selection in the manner that was configured at build time
///
/// Takes as parameters the run configuration, the event source and a stop flag
/// that may be raised from another thread.
///
/// Returns the finalized selection results
///
pub fn run_selection<'cfg>(
    cfg: &'cfg Configuration,
    events: impl Iterator<Item = EventRecord>,
    stop: &StopFlag,
) -> Result<FinalResults<'cfg>, ConfigurationError> {
    let template = SelectionAggregator::new(cfg)?;

    // Integrate event batches...
    let aggregator = {
        // ...in sequential mode
        #[cfg(not(feature = "multi-threading"))]
        {
            sequential::run_selection_impl(template, events, stop)
        }

        // ...in multi-threaded mode
        #[cfg(feature = "multi-threading")]
        {
            multi_threading::run_selection_impl(template, events, stop)
        }
    };

    if stop.is_stop_requested() {
        warn!("Selection was interrupted, results only cover the events read so far");
    }
    Ok(aggregator.finalize())
}

/// Pull the next batch of events, unless a stop was requested
///
/// An empty batch means that the input is exhausted or that the run was
/// stopped.
///
fn next_batch(events: &mut impl Iterator<Item = EventRecord>, stop: &StopFlag) -> Vec<EventRecord> {
    let mut batch = Vec::with_capacity(EVENT_BATCH_SIZE);
    while batch.len() < EVENT_BATCH_SIZE && !stop.is_stop_requested() {
        match events.next() {
            Some(record) => batch.push(record),
            None => break,
        }
    }
    batch
}

/// Fold a batch of events into a fresh aggregator
fn process_batch<'cfg>(
    template: &SelectionAggregator<'cfg>,
    batch: Vec<EventRecord>,
) -> SelectionAggregator<'cfg> {
    let mut aggregator = template.empty_like();
    for record in batch {
        match record {
            // Per-candidate outcomes are tallied in the diagnostics, and
            // invalid events are accounted for by the aggregator itself
            Ok(event) => {
                let _ = aggregator.process(&event);
            }
            Err(e) => aggregator.reject(&e),
        }
    }
    aggregator
}

/// Log progress every so many batches
fn report_progress(batches_done: usize) {
    if batches_done % 100 == 0 {
        info!("Read {} events", batches_done * EVENT_BATCH_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Candidate, EventId};
    use crate::linalg::Vector3;
    use crate::numeric::Float;

    const CONFIG: &str = "
        center_shift 45.7 0
        on_parallel sentinel -1
        site near 0 11000
        site far 49000 60000
        cut energy energy 0.2 8
        cut fiducial fiducial near -200 200 -200 200
        hist oaa all all oaa@near:40:0:0.05 oaa@far:40:0:0.05
        hist r numu through:energy r@far:30:0:600
    ";

    fn events(count: u32) -> Vec<EventRecord> {
        (0..count)
            .map(|i| {
                if i % 997 == 13 {
                    return Err(MalformedEvent::Unparseable {
                        record: i as usize,
                        reason: "garbage".to_owned(),
                    });
                }
                let t = i as Float;
                let candidate = Candidate::new(
                    if i % 2 == 0 { 14 } else { -12 },
                    (t % 97.) / 10.,
                    Vector3::new((t % 51.) - 25., (t % 37.) - 18., -500.),
                    Vector3::new(((t % 13.) - 6.) * 1e-3, ((t % 7.) - 3.) * 1e-3, 1.),
                );
                Ok(Event::new(
                    EventId {
                        run: 1,
                        subrun: 0,
                        event: i,
                    },
                    vec![candidate],
                ))
            })
            .collect()
    }

    #[test]
    fn batching_matches_a_single_fold() {
        let cfg = Configuration::parse(CONFIG).unwrap();
        let input = events(25_000);

        let mut single = SelectionAggregator::new(&cfg).unwrap();
        for record in input.clone() {
            match record {
                Ok(event) => {
                    let _ = single.process(&event);
                }
                Err(e) => single.reject(&e),
            }
        }
        let single = single.finalize();

        let batched = run_selection(&cfg, input.into_iter(), &StopFlag::new()).unwrap();
        assert_eq!(batched.diagnostics, single.diagnostics);
        assert_eq!(batched.diagnostics.processed_events, 24_974);
        assert_eq!(batched.diagnostics.malformed_events, 26);
        // Unit weights sum exactly, so batch boundaries must not show at all
        assert_eq!(batched.histograms, single.histograms);
    }

    #[test]
    fn raised_stop_flag_reads_nothing() {
        let cfg = Configuration::parse(CONFIG).unwrap();
        let stop = StopFlag::new();
        stop.request_stop();
        let mut input = events(100).into_iter();
        let results = run_selection(&cfg, &mut input, &stop).unwrap();
        assert_eq!(results.diagnostics.processed_events, 0);
        assert_eq!(input.len(), 100);
    }

    #[test]
    fn stop_flag_interrupts_a_running_selection() {
        let cfg = Configuration::parse(CONFIG).unwrap();
        let stop = StopFlag::new();
        let stop_after = 1_234;
        let input = events(50_000)
            .into_iter()
            .enumerate()
            .inspect(|(idx, _)| {
                if *idx + 1 == stop_after {
                    stop.request_stop();
                }
            })
            .map(|(_, record)| record);
        let results = run_selection(&cfg, input, &stop).unwrap();
        let diag = results.diagnostics;
        assert_eq!(diag.processed_events + diag.malformed_events, stop_after as u64);
    }
}
