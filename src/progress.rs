//! Progress reporting infrastructure

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Terminal report of ongoing operations
///
/// Progress bars are drawn on stderr, so the results can be piped from stdout
/// while processing is ongoing. Diagnostics go to the system logs.
#[derive(Clone, Debug)]
pub struct ProgressReport(MultiProgress);
//
impl ProgressReport {
    /// Prepare to report progress on stderr
    pub fn new() -> Self {
        Self(MultiProgress::with_draw_target(ProgressDrawTarget::stderr()))
    }

    /// Track progress without displaying anything
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    /// Start tracking an operation whose amount of work is known upfront
    pub fn add(&self, what: impl Into<Cow<'static, str>>, work: Work) -> ProgressTracker {
        self.make_tracker(what.into(), work, false)
    }

    /// Start tracking an operation whose amount of work will be discovered as
    /// it goes on
    ///
    /// Call [`ProgressTracker::done_adding_work()`] once the full amount of
    /// work is known, so that the progress bar can disappear when done.
    pub fn add_growing(&self, what: impl Into<Cow<'static, str>>, work: Work) -> ProgressTracker {
        self.make_tracker(what.into(), work, true)
    }

    /// Set up a progress bar
    fn make_tracker(&self, what: Cow<'static, str>, work: Work, growing: bool) -> ProgressTracker {
        let trailer = match work {
            Work::Steps(_) => "{pos}/{len}",
            Work::Percent(_) => "{percent:>3}% (~{eta} left)",
            Work::Bytes(_) => "{decimal_bytes}/{decimal_total_bytes} ({decimal_bytes_per_sec})",
        };
        let style = ProgressStyle::with_template(&format!("{{prefix}} {{wide_bar}} {trailer}"))
            .expect("all styles above should be valid indicatif styles");
        let bar = ProgressBar::new(work.amount())
            .with_prefix(what)
            .with_style(style);
        let shown = work.amount() > 0;
        if shown {
            self.0.add(bar.clone());
        }
        ProgressTracker {
            bar,
            report: self.0.clone(),
            shown: Arc::new(AtomicBool::new(shown)),
            growing: Arc::new(AtomicBool::new(growing)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }
}
//
impl Default for ProgressReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Amount of work to be performed by some operation
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Work {
    /// Steps to be taken, with a precise count display
    Steps(usize),

    /// Steps to be taken, with a percentage-based display
    Percent(usize),

    /// Bytes to be processed
    Bytes(u64),
}
//
impl Work {
    /// Initial length of the progress bar
    fn amount(self) -> u64 {
        match self {
            Work::Steps(steps) | Work::Percent(steps) => steps as u64,
            Work::Bytes(bytes) => bytes,
        }
    }
}

/// Handle to a progress bar, shared by everyone who contributes to the work
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    /// Progress bar of this operation
    bar: ProgressBar,

    /// Report that the progress bar belongs to
    report: MultiProgress,

    /// Truth that the progress bar was added to the report
    shown: Arc<AtomicBool>,

    /// Truth that more work may still be added
    growing: Arc<AtomicBool>,

    /// Truth that some call to [`inc()`](Self::inc) already reported
    /// completion
    finished: Arc<AtomicBool>,
}
//
impl ProgressTracker {
    /// Record that some work was done
    ///
    /// Returns truth that all the work has been done. Among concurrent
    /// callers, only one observes this transition.
    pub fn inc(&self, amount: u64) -> bool {
        self.bar.inc(amount);
        let done = self.bar.position();
        let total = self.bar.length().unwrap_or(0);
        if done < total || self.growing.load(Ordering::Acquire) {
            return false;
        }
        let first = !self.finished.swap(true, Ordering::AcqRel);
        if first {
            self.hide();
        }
        first
    }

    /// Record that more work must be done
    pub fn add_work(&self, amount: u64) {
        debug_assert!(
            self.growing.load(Ordering::Acquire),
            "work should only be added to growing progress bars"
        );
        if amount > 0 && !self.shown.swap(true, Ordering::AcqRel) {
            self.report.add(self.bar.clone());
        }
        self.bar.inc_length(amount);
    }

    /// Promise that [`add_work()`](Self::add_work) will not be called anymore
    pub fn done_adding_work(&self) {
        let was_growing = self.growing.swap(false, Ordering::AcqRel);
        debug_assert!(was_growing, "work should only be frozen once");
        if self.bar.position() >= self.bar.length().unwrap_or(0) {
            self.hide();
        }
    }

    /// Remove the progress bar from the report
    fn hide(&self) {
        self.bar.finish_and_clear();
        if self.shown.swap(false, Ordering::AcqRel) {
            self.report.remove(&self.bar);
        }
    }
}
