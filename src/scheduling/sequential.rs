//! Sequential back-end of the selection

use crate::{
    aggregator::SelectionAggregator,
    scheduling::{next_batch, process_batch, report_progress, EventRecord, StopFlag},
};

/// Process events in sequential mode
///
/// We use batched logic even in sequential mode, in order to achieve
/// reproducibility with respect to multi-threaded runs.
///
/// Note that this is anyways generally a good thing to do when accumulating
/// lots of results, as otherwise the accumulator will eventually grow much
/// larger than the accumulated values and numerical accumulation errors
/// will start to blow up.
///
pub fn run_selection_impl<'cfg>(
    template: SelectionAggregator<'cfg>,
    mut events: impl Iterator<Item = EventRecord>,
    stop: &StopFlag,
) -> SelectionAggregator<'cfg> {
    let mut accumulator = template;
    let mut batches_done = 0;
    loop {
        let batch = next_batch(&mut events, stop);
        if batch.is_empty() {
            break;
        }
        let result = process_batch(&accumulator, batch);
        accumulator.merge(result);
        batches_done += 1;
        report_progress(batches_done);
    }
    accumulator
}
