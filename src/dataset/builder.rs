//! Mechanism for building a [`Dataset`] from extracted page view counts

use super::{Dataset, DatasetBlock};
use crate::{
    config::Config,
    extract::{ExtractStats, NormalizedTuple},
    progress::{ProgressReport, Work},
    EntityKey, HourlyCount,
};
use rayon::prelude::*;
use std::{
    collections::{hash_map, HashMap},
    sync::Arc,
};

/// Accumulator for tuples extracted from a single dump file
///
/// Once you're done with an input file, call
/// [`finish_file()`](Self::finish_file) to get a [`DatasetFiles`] accumulator
/// that can be merged with the data from other input files.
#[derive(Debug)]
pub struct DatasetBuilder {
    /// Data collection configuration
    config: Arc<Config>,

    /// Hourly data accumulated so far, by page
    entities: HashMap<EntityKey, Vec<HourlyCount>>,
}
//
impl DatasetBuilder {
    /// Set up the accumulator
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            entities: HashMap::new(),
        }
    }

    /// Integrate a new tuple
    ///
    /// Tuples may come in any order, the dataset will be sorted when
    /// [`DatasetFiles::finish()`] is called.
    pub fn add_tuple(&mut self, tuple: NormalizedTuple) {
        let data = tuple.data();
        match self.entities.entry(tuple.entity) {
            hash_map::Entry::Occupied(o) => {
                log::trace!("Recorded another {data:?} for page {:?}", o.key());
                o.into_mut().push(data);
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(vec![data]);
            }
        }
    }

    /// Export the file data
    ///
    /// Call this when you're done accumulating tuples from a source file.
    /// `stats` tells what happened to the records of that file.
    pub fn finish_file(self, stats: ExtractStats) -> DatasetFiles {
        DatasetFiles {
            config: self.config,
            data: self.entities,
            stats,
        }
    }
}

/// Accumulated knowledge from one or more input files
///
/// Produced from [`DatasetBuilder`] once done accumulating data about a single
/// input file. Can be used to aggregate data from other input files, then
/// turned into a [`Dataset`] once done.
#[derive(Debug)]
pub struct DatasetFiles {
    /// Data collection configuration
    config: Arc<Config>,

    /// Accumulated data, by page
    data: HashMap<EntityKey, Vec<HourlyCount>>,

    /// What happened to the input records
    stats: ExtractStats,
}
//
impl DatasetFiles {
    /// Create an empty accumulator
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            data: HashMap::new(),
            stats: ExtractStats::default(),
        }
    }

    /// Merge with data from another file
    pub fn merge(&mut self, other: Self) {
        self.stats.merge(other.stats);
        for (entity, hourly) in other.data {
            match self.data.entry(entity) {
                hash_map::Entry::Occupied(o) => o.into_mut().extend(hourly),
                hash_map::Entry::Vacant(v) => {
                    v.insert(hourly);
                }
            }
        }
    }

    /// What happened to the input records so far
    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    /// Convert the dataset to its final form
    pub fn finish(self, report: &ProgressReport) -> Arc<Dataset> {
        // Put the hourly data of each page in chronological order...
        let sort = report.add("Sorting hourly data", Work::Percent(self.data.len()));
        let mut entities = (self.data.into_par_iter())
            .map(|(entity, mut hourly)| {
                hourly.sort_by_key(HourlyCount::timestamp);
                sort.inc(1);
                (entity, hourly)
            })
            .collect::<Vec<_>>();

        // ...and order pages by entity key
        entities.par_sort_unstable_by(|(entity1, _), (entity2, _)| entity1.cmp(entity2));

        // Convert the ordered data into the final dataset layout
        let build = report.add("Optimizing data layout", Work::Percent(entities.len()));
        let dataset_blocks = entities
            .par_chunks(self.config.memory_chunk.get())
            .map(|chunk| {
                let mut builder = DatasetBlockBuilder::new();
                for (entity, hourly) in chunk {
                    builder.push(entity, hourly);
                    build.inc(1);
                }
                builder.build()
            })
            .collect::<Vec<_>>();

        // Liberating the original data takes a while, do it in the background
        std::thread::spawn(move || entities.into_par_iter().for_each(std::mem::drop));
        Arc::new(Dataset(dataset_blocks.into()))
    }
}

/// Accumulator of data in the final dataset layout
///
/// All fields have the same meaning as in [`DatasetBlock`].
#[derive(Debug, Default)]
struct DatasetBlockBuilder {
    key_ends: Vec<usize>,
    keys: String,
    data_ends: Vec<usize>,
    hourly: Vec<HourlyCount>,
}
//
impl DatasetBlockBuilder {
    /// Create a new dataset block
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page to the block
    ///
    /// Pages should be added in entity key order, and hourly data should be
    /// in chronological order.
    pub fn push(&mut self, entity: &str, hourly: &[HourlyCount]) {
        self.keys.push_str(entity);
        self.key_ends.push(self.keys.len());
        self.hourly.extend_from_slice(hourly);
        self.data_ends.push(self.hourly.len());
    }

    /// Build the final dataset block
    pub fn build(self) -> DatasetBlock {
        DatasetBlock {
            key_ends: self.key_ends.into(),
            keys: self.keys.into(),
            data_ends: self.data_ends.into(),
            hourly: self.hourly.into(),
        }
    }
}
