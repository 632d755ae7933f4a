//! Page view counts from all input files, grouped by page
//!
//! This is the grouping stage of the pipeline. Once built, the dataset
//! guarantees that...
//!
//! - All hourly data about a given page is stored in one place
//! - Hourly data for each page is sorted in chronological order
//! - Pages are sorted by entity key and sliced into independent blocks for
//!   easy parallelism.

pub mod builder;

use crate::{Day, Hour, HourlyCount};
use thiserror::Error;

/// Hourly page view data aggregated from all input files
///
/// Sliced into independent blocks for easy parallelism.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Dataset(Box<[DatasetBlock]>);
//
impl Dataset {
    /// Iterate sequentially over all pages in the dataset
    #[cfg(test)]
    pub fn entities(&self) -> impl Iterator<Item = EntityView<'_>> {
        self.blocks().iter().flat_map(DatasetBlock::entities)
    }

    /// Access the dataset in a block-wise fashion
    pub fn blocks(&self) -> &[DatasetBlock] {
        &self.0[..]
    }

    /// Number of pages in the dataset
    pub fn num_entities(&self) -> usize {
        self.blocks().iter().map(|block| block.key_ends.len()).sum()
    }
}

/// Block of data from a [`Dataset`]
///
/// Pages are sorted by entity key, and for each page, hourly data is sorted by
/// increasing date and hour.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct DatasetBlock {
    /// Offsets that mark the end of each entity key in the "keys" string
    key_ends: Box<[usize]>,

    /// Concatenated entity keys
    keys: Box<str>,

    /// Offsets that mark the end of each page's data in the "hourly" array
    data_ends: Box<[usize]>,

    /// Concatenated hourly data from all pages
    hourly: Box<[HourlyCount]>,
}
//
impl DatasetBlock {
    /// Iterate over the pages of this block, in entity key order
    pub fn entities(&self) -> impl Iterator<Item = EntityView<'_>> {
        let mut last_key_end = 0;
        let mut last_data_end = 0;
        (self.key_ends.iter().copied())
            .zip(self.data_ends.iter().copied())
            .map(move |(key_end, data_end)| {
                let key = &self.keys[last_key_end..key_end];
                let hourly = &self.hourly[last_data_end..data_end];
                last_key_end = key_end;
                last_data_end = data_end;
                EntityView {
                    key,
                    hours: OrderedHours::new_unchecked(hourly),
                }
            })
    }
}

/// Page from the dataset
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EntityView<'dataset> {
    /// Language code + page title
    key: &'dataset str,

    /// Hourly data about this page
    hours: OrderedHours<'dataset>,
}
//
impl<'dataset> EntityView<'dataset> {
    /// Entity key of this page
    pub fn key(&self) -> &'dataset str {
        self.key
    }

    /// Hourly data for this page, in chronological order
    pub fn hours(&self) -> OrderedHours<'dataset> {
        self.hours
    }
}

/// Non-empty hourly data about one page, in chronological order
///
/// Spike detection relies on hourly data being sorted by increasing day, then
/// increasing hour. This type can only be built from data which is known to
/// honor this ordering, which makes out-of-order input unrepresentable.
/// Several entries may share the same day and hour.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OrderedHours<'data>(&'data [HourlyCount]);
//
impl<'data> OrderedHours<'data> {
    /// Check that hourly data is suitably ordered
    pub fn new(hourly: &'data [HourlyCount]) -> Result<Self, OrderError> {
        if hourly.is_empty() {
            return Err(OrderError::Empty);
        }
        if let Some(idx) = hourly
            .windows(2)
            .position(|pair| pair[0].timestamp() > pair[1].timestamp())
        {
            let (day, hour) = hourly[idx + 1].timestamp();
            return Err(OrderError::Unordered {
                index: idx + 1,
                day,
                hour,
            });
        }
        Ok(Self(hourly))
    }

    /// Put hourly data in chronological order
    #[cfg(test)]
    pub fn sort(hourly: &'data mut [HourlyCount]) -> Result<Self, OrderError> {
        hourly.sort_by_key(HourlyCount::timestamp);
        Self::new(hourly)
    }

    /// Wrap hourly data that the dataset builder already sorted
    fn new_unchecked(hourly: &'data [HourlyCount]) -> Self {
        debug_assert!(
            Self::new(hourly).is_ok(),
            "dataset builder should have sorted hourly data"
        );
        Self(hourly)
    }

    /// Iterate over hourly data in chronological order
    pub fn iter(self) -> impl Iterator<Item = HourlyCount> + 'data {
        self.0.iter().copied()
    }
}

/// Hourly data that cannot be handed over to spike detection
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum OrderError {
    #[error("no hourly data")]
    Empty,

    #[error("entry #{index} ({day} {hour:02}) comes before its predecessor")]
    Unordered { index: usize, day: Day, hour: Hour },
}
