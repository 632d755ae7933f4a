//! Processing pipeline configuration

use crate::Args;
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc};

/// Final process configuration
///
/// This is the digested form of [`Args`], please refer to it to know more
/// about individual fields.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    pub inputs: Box<[Box<str>]>,
    pub output: Option<PathBuf>,
    pub max_outputs: Option<NonZeroUsize>,
    pub sort_by_magnitude: bool,
    pub memory_chunk: NonZeroUsize,
}
//
impl Config {
    /// Determine process configuration from CLI arguments
    pub(crate) fn new(args: Args) -> Arc<Self> {
        let Args {
            inputs,
            output,
            max_outputs,
            sort_by_magnitude,
            memory_chunk,
        } = args;
        Arc::new(Self {
            inputs: inputs.into(),
            output,
            max_outputs,
            sort_by_magnitude,
            memory_chunk,
        })
    }

    /// Configuration used by unit tests
    #[cfg(test)]
    pub fn for_tests(memory_chunk: usize) -> Arc<Self> {
        Arc::new(Self {
            inputs: Box::default(),
            output: None,
            max_outputs: None,
            sort_by_magnitude: false,
            memory_chunk: NonZeroUsize::new(memory_chunk).expect("chunk size must be nonzero"),
        })
    }

    /// Rebuild with a different output selection
    #[cfg(test)]
    pub fn with_output_selection(
        &self,
        max_outputs: Option<usize>,
        sort_by_magnitude: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            max_outputs: max_outputs.and_then(NonZeroUsize::new),
            sort_by_magnitude,
            ..self.clone()
        })
    }
}
