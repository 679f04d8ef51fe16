//! Multi-threaded back-end of the selection

#[cfg(feature = "faster-threading")]
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    aggregator::SelectionAggregator,
    scheduling::{next_batch, process_batch, report_progress, EventRecord, StopFlag},
};

#[cfg(not(feature = "faster-threading"))]
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Process events in multi-threaded mode
///
/// The calling thread reads the input and hands each batch of events over to a
/// rayon task. The input need not be `Send`, only the events are.
///
/// Does not finalize the output results, so should be readily amenable to
/// extra layers of parallelization (such as distribution across multiple
/// compute nodes).
///
pub fn run_selection_impl<'cfg>(
    template: SelectionAggregator<'cfg>,
    mut events: impl Iterator<Item = EventRecord>,
    stop: &StopFlag,
) -> SelectionAggregator<'cfg> {
    // The results of parallel tasks will be aggregated...
    let accumulator = {
        // ...in a way that is optimized for numerical reproduciblity
        #[cfg(not(feature = "faster-threading"))]
        {
            ReproducibleAccumulator::new(template.empty_like())
        }

        // ...in a way that is optimized for computational performance
        #[cfg(feature = "faster-threading")]
        {
            FastAccumulator::new(template.empty_like())
        }
    };

    // Past this many unmerged batches, the reader stops spawning tasks and
    // processes batches itself, which bounds memory use on fast inputs
    let max_in_flight = 2 * rayon::current_num_threads();

    // The input is read on this thread, so we need a scope which does not
    // require its body to be Send. It only returns once all inner tasks have
    // been executed.
    let template_ref = &template;
    let accumulator_ref = &accumulator;
    rayon::in_place_scope(|scope| {
        let mut batches_done = 0;
        loop {
            let batch = next_batch(&mut events, stop);
            if batch.is_empty() {
                break;
            }
            let busy = accumulator_ref.tasks_in_flight() >= max_in_flight;
            let batch_id = accumulator_ref.reserve();
            if busy {
                let result = process_batch(template_ref, batch);
                accumulator_ref.set_task_result(batch_id, result);
            } else {
                scope.spawn(move |_| {
                    let result = process_batch(template_ref, batch);
                    accumulator_ref.set_task_result(batch_id, result);
                });
            }
            batches_done += 1;
            report_progress(batches_done);
        }
    });

    // Extract the results from the accumulator
    accumulator.get_merged_result()
}

/// Reproducibility-optimized results accumulation mechanism
///
/// Batch results are merged in input order as soon as every earlier batch has
/// been merged, which makes the output bitwise identical to a sequential run.
/// Only results which arrived ahead of an unfinished batch are kept around.
///
#[cfg(not(feature = "faster-threading"))]
struct ReproducibleAccumulator<'cfg> {
    /// Merge state of the parallel tasks
    state: Mutex<InOrderMerge<'cfg>>,
}
//
#[cfg(not(feature = "faster-threading"))]
struct InOrderMerge<'cfg> {
    /// Results of every task before `next_task`, merged in order
    merged: SelectionAggregator<'cfg>,

    /// Results which wait for an earlier task to complete
    pending: BTreeMap<usize, SelectionAggregator<'cfg>>,

    /// Identifier of the next task whose result should be merged
    next_task: usize,

    /// Number of tasks which were started
    num_tasks: usize,
}
//
#[cfg(not(feature = "faster-threading"))]
impl<'cfg> ReproducibleAccumulator<'cfg> {
    /// Set up results storage, starting from some initial results
    fn new(initial: SelectionAggregator<'cfg>) -> Self {
        Self {
            state: Mutex::new(InOrderMerge {
                merged: initial,
                pending: BTreeMap::new(),
                next_task: 0,
                num_tasks: 0,
            }),
        }
    }

    /// Account for a new task, return its identifier
    fn reserve(&self) -> usize {
        let mut lock = self.state.lock().expect("Mutex data should be valid");
        lock.num_tasks += 1;
        lock.num_tasks - 1
    }

    /// Number of tasks whose results were not merged yet
    fn tasks_in_flight(&self) -> usize {
        let lock = self.state.lock().expect("Mutex data should be valid");
        lock.num_tasks - lock.next_task
    }

    /// Integrate the results of the n-th task
    fn set_task_result(&self, task_id: usize, result: SelectionAggregator<'cfg>) {
        let mut lock = self.state.lock().expect("Mutex data should be valid");
        let state = &mut *lock;
        assert!(
            task_id >= state.next_task && task_id < state.num_tasks,
            "Results should come from a started task"
        );
        let previous = state.pending.insert(task_id, result);
        assert!(previous.is_none(), "Tasks should not report results twice");
        while let Some(next) = state.pending.remove(&state.next_task) {
            state.merged.merge(next);
            state.next_task += 1;
        }
    }

    /// Collect the merged results
    fn get_merged_result(self) -> SelectionAggregator<'cfg> {
        let state = self.state.into_inner().expect("Mutex data should be valid");
        assert_eq!(
            state.next_task, state.num_tasks,
            "All tasks should have completed their work"
        );
        state.merged
    }
}

/// Speed-optimized results accumulation mechanism
///
/// Batch results are merged as soon as they are ready, in whichever order the
/// tasks complete. Counts are unaffected, but floating-point sums may differ
/// in the last digits from one run to another.
///
#[cfg(feature = "faster-threading")]
struct FastAccumulator<'cfg> {
    /// Storage location in which results will be merged out of order
    merged_result: Mutex<SelectionAggregator<'cfg>>,

    /// Number of tasks which were started
    tasks_started: AtomicUsize,

    /// Number of tasks which have reported their results
    tasks_finished: AtomicUsize,
}
//
#[cfg(feature = "faster-threading")]
impl<'cfg> FastAccumulator<'cfg> {
    /// Set up results storage, starting from some initial results
    fn new(initial: SelectionAggregator<'cfg>) -> Self {
        Self {
            merged_result: Mutex::new(initial),
            tasks_started: AtomicUsize::new(0),
            tasks_finished: AtomicUsize::new(0),
        }
    }

    /// Account for a new task, return its identifier
    fn reserve(&self) -> usize {
        self.tasks_started.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of tasks whose results were not merged yet
    fn tasks_in_flight(&self) -> usize {
        let finished = self.tasks_finished.load(Ordering::Relaxed);
        self.tasks_started.load(Ordering::Relaxed).saturating_sub(finished)
    }

    /// Integrate the results of the n-th task
    fn set_task_result(&self, _task_id: usize, result: SelectionAggregator<'cfg>) {
        self.merged_result
            .lock()
            .expect("Mutex data should be valid")
            .merge(result);

        // Remember that this task has completed its work
        self.tasks_finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Collect the merged results
    fn get_merged_result(self) -> SelectionAggregator<'cfg> {
        assert_eq!(
            self.tasks_finished.into_inner(),
            self.tasks_started.into_inner(),
            "All tasks should have completed their work"
        );
        self.merged_result
            .into_inner()
            .expect("Mutex data should be valid")
    }
}

#[cfg(all(test, not(feature = "faster-threading")))]
mod tests {
    use super::*;
    use crate::{
        config::Configuration,
        event::{Candidate, Event, EventId},
        linalg::Vector3,
        numeric::Float,
    };

    const CONFIG: &str = "
        center_shift 0 0
        on_parallel skip
        site near 0 11000
        cut energy energy 0.5 10
        hist e all always energy:10:0:10
    ";

    fn batch_result<'cfg>(
        template: &SelectionAggregator<'cfg>,
        energy: Float,
    ) -> SelectionAggregator<'cfg> {
        let mut result = template.empty_like();
        let candidate = Candidate::new(14, energy, Vector3::zeros(), Vector3::z());
        result
            .process(&Event::new(EventId::default(), vec![candidate]))
            .unwrap();
        result
    }

    #[test]
    fn results_are_merged_as_soon_as_their_turn_comes() {
        let cfg = Configuration::parse(CONFIG).unwrap();
        let template = SelectionAggregator::new(&cfg).unwrap();
        let accumulator = ReproducibleAccumulator::new(template.empty_like());
        let ids = (0..3).map(|_| accumulator.reserve()).collect::<Vec<_>>();
        assert_eq!(ids, [0, 1, 2]);
        assert_eq!(accumulator.tasks_in_flight(), 3);

        // A late result waits for its predecessors
        accumulator.set_task_result(2, batch_result(&template, 3.));
        assert_eq!(accumulator.tasks_in_flight(), 3);
        accumulator.set_task_result(0, batch_result(&template, 1.));
        assert_eq!(accumulator.tasks_in_flight(), 2);
        {
            let state = accumulator.state.lock().unwrap();
            assert_eq!(state.pending.len(), 1);
            assert_eq!(state.merged.diagnostics().processed_events, 1);
        }

        // Filling the gap flushes everything that was waiting
        accumulator.set_task_result(1, batch_result(&template, 2.));
        assert_eq!(accumulator.tasks_in_flight(), 0);
        assert!(accumulator.state.lock().unwrap().pending.is_empty());

        let merged = accumulator.get_merged_result();
        assert_eq!(merged.diagnostics().processed_events, 3);
        assert_eq!(merged.diagnostics().filled_candidates, 3);

        let mut sequential = template.empty_like();
        for energy in [1., 2., 3.] {
            sequential.merge(batch_result(&template, energy));
        }
        assert_eq!(merged.finalize().histograms, sequential.finalize().histograms);
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn duplicate_results_are_rejected() {
        let cfg = Configuration::parse(CONFIG).unwrap();
        let template = SelectionAggregator::new(&cfg).unwrap();
        let accumulator = ReproducibleAccumulator::new(template.empty_like());
        accumulator.reserve();
        accumulator.reserve();
        accumulator.set_task_result(1, batch_result(&template, 1.));
        accumulator.set_task_result(1, batch_result(&template, 1.));
    }
}
