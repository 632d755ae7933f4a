//! Detect the spike of every page and select the ones to be reported

use crate::{
    config::Config,
    dataset::Dataset,
    progress::{ProgressReport, Work},
    spike::{self, SpikeResult},
};
use rayon::prelude::*;
use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, VecDeque},
    num::NonZeroUsize,
};

/// Compute the largest spike of every page, then apply output selection
///
/// Unless asked to sort by magnitude, spikes are emitted in entity key order.
pub fn pick_top_spikes<'dataset>(
    config: &Config,
    dataset: &'dataset Dataset,
    report: &ProgressReport,
) -> Vec<SpikeResult<'dataset>> {
    // Each page is processed independently, blocks of pages are processed in
    // parallel
    let progress = report.add("Detecting spikes", Work::Percent(dataset.blocks().len()));
    let spikes = (dataset.blocks().par_iter()).flat_map(|block| {
        let result = (block.entities())
            .map(|entity| spike::aggregate(entity.key(), entity.hours()))
            .collect::<Vec<_>>();
        progress.inc(1);
        result
    });

    // What happens next depends on the output configuration
    match (
        config.max_outputs.map(NonZeroUsize::get),
        config.sort_by_magnitude,
    ) {
        // If there is no sorting and no limit, keep entity key order
        (None, false) => spikes.collect(),

        // If there is sorting without a limit, sort everything
        (None, true) => {
            let mut sorted = spikes.map(Ranked).collect::<Vec<_>>();
            sorted.par_sort_unstable_by(|lhs, rhs| rhs.cmp(lhs));
            sorted.into_iter().map(|Ranked(spike)| spike).collect()
        }

        // If there is a limit, then...
        (Some(max_len), sort) => {
            // Find the top spikes up to this limit
            let mut top_spikes = spikes
                // First determine top spikes on each thread using a min-heap...
                .fold(
                    || BinaryHeap::with_capacity(max_len + 1),
                    |mut heap, spike| {
                        heap.push(Reverse(Ranked(spike)));
                        if heap.len() > max_len {
                            heap.pop();
                        }
                        heap
                    },
                )
                // ...then merge thread results into a global result
                .reduce(BinaryHeap::new, |heap1, heap2| {
                    let (mut dst, mut src) = if heap1.len() >= heap2.len() {
                        (heap1, heap2)
                    } else {
                        (heap2, heap1)
                    };
                    while let Some(elem) = src.pop() {
                        dst.push(elem);
                        if dst.len() > max_len {
                            dst.pop();
                        }
                    }
                    dst
                });

            // If not asked to sort by magnitude, restore entity key order
            if !sort {
                let mut result = top_spikes
                    .into_iter()
                    .map(|Reverse(Ranked(spike))| spike)
                    .collect::<Vec<_>>();
                result.sort_unstable_by_key(|spike| spike.entity);
                return result;
            }

            // Otherwise, collect the results in order of decreasing magnitude
            // This requires an order reversal since we used a min-heap.
            let mut result = VecDeque::with_capacity(top_spikes.len());
            while let Some(Reverse(Ranked(spike))) = top_spikes.pop() {
                result.push_front(spike);
            }
            result.into()
        }
    }
}

/// Spike ordered by magnitude, then by reverse entity key
///
/// The greatest `Ranked` spike is the one which is reported first.
#[derive(Clone, Copy, Debug)]
struct Ranked<'dataset>(SpikeResult<'dataset>);
//
impl Ranked<'_> {
    fn key(&self) -> (u64, Reverse<&str>) {
        (self.0.magnitude, Reverse(self.0.entity))
    }
}
//
impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
//
impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
//
impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
//
impl Eq for Ranked<'_> {}
