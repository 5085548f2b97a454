//! Progress reporting and cooperative cancellation for transfers.
//!
//! Transfers poll [`ProgressReporter::should_cancel`] at every entry
//! boundary, never in the middle of an entry. A cancelled transfer keeps
//! whatever it completed before the cancellation was observed.
//!
//! # Example
//!
//! ```rust
//! use pbokit::progress::{AtomicProgress, ProgressReporter};
//!
//! let progress = AtomicProgress::shared();
//! let worker_handle = progress.clone();
//!
//! // From any thread:
//! progress.cancel();
//! assert!(worker_handle.should_cancel());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Progress reporting trait for transfer operations.
pub trait ProgressReporter: Send {
    /// Called once before the first entry with the number of entries.
    fn on_total(&mut self, total_entries: usize) {
        let _ = total_entries;
    }

    /// Called when starting to process an entry.
    fn on_entry_start(&mut self, entry_name: &str, size: u64) {
        let _ = (entry_name, size);
    }

    /// Called when an entry has been fully processed.
    fn on_entry_complete(&mut self, entry_name: &str, success: bool) {
        let _ = (entry_name, success);
    }

    /// Called on any warning during processing.
    fn on_warning(&mut self, message: &str) {
        let _ = message;
    }

    /// Checks if cancellation has been requested.
    ///
    /// This is called before processing each entry.
    fn should_cancel(&self) -> bool {
        false
    }
}

/// A progress reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

impl<P: ProgressReporter + ?Sized> ProgressReporter for &mut P {
    fn on_total(&mut self, total_entries: usize) {
        (**self).on_total(total_entries);
    }

    fn on_entry_start(&mut self, entry_name: &str, size: u64) {
        (**self).on_entry_start(entry_name, size);
    }

    fn on_entry_complete(&mut self, entry_name: &str, success: bool) {
        (**self).on_entry_complete(entry_name, success);
    }

    fn on_warning(&mut self, message: &str) {
        (**self).on_warning(message);
    }

    fn should_cancel(&self) -> bool {
        (**self).should_cancel()
    }
}

/// A thread-safe progress reporter and cancellation flag.
///
/// Share it through [`AtomicProgress::shared`]; one handle goes to the
/// transfer, another stays with whoever may cancel it.
#[derive(Debug, Default)]
pub struct AtomicProgress {
    total_entries: AtomicUsize,
    completed_entries: AtomicUsize,
    processed_bytes: AtomicU64,
    cancelled: AtomicBool,
}

impl AtomicProgress {
    /// Creates a new atomic progress reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared atomic progress reporter.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of entries announced by the transfer.
    pub fn total_entries(&self) -> usize {
        self.total_entries.load(Ordering::Relaxed)
    }

    /// Returns the number of entries completed so far.
    pub fn completed_entries(&self) -> usize {
        self.completed_entries.load(Ordering::Relaxed)
    }

    /// Returns the sum of the sizes of started entries.
    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes.load(Ordering::Relaxed)
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn record_total(&self, total_entries: usize) {
        self.total_entries.store(total_entries, Ordering::Relaxed);
    }

    fn record_start(&self, size: u64) {
        self.processed_bytes.fetch_add(size, Ordering::Relaxed);
    }

    fn record_complete(&self) {
        self.completed_entries.fetch_add(1, Ordering::Relaxed);
    }
}

impl ProgressReporter for AtomicProgress {
    fn on_total(&mut self, total_entries: usize) {
        self.record_total(total_entries);
    }

    fn on_entry_start(&mut self, _entry_name: &str, size: u64) {
        self.record_start(size);
    }

    fn on_entry_complete(&mut self, _entry_name: &str, _success: bool) {
        self.record_complete();
    }

    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

/// Progress reporter for shared `Arc<AtomicProgress>`.
impl ProgressReporter for Arc<AtomicProgress> {
    fn on_total(&mut self, total_entries: usize) {
        self.record_total(total_entries);
    }

    fn on_entry_start(&mut self, _entry_name: &str, size: u64) {
        self.record_start(size);
    }

    fn on_entry_complete(&mut self, _entry_name: &str, _success: bool) {
        self.record_complete();
    }

    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

/// A progress reporter that calls a closure after every entry.
pub struct ClosureProgress<F> {
    callback: F,
    completed: usize,
    total: usize,
    cancelled: bool,
}

impl<F> ClosureProgress<F>
where
    F: FnMut(usize, usize) -> bool + Send,
{
    /// Creates a progress reporter from a closure.
    ///
    /// The closure receives (entries_completed, total_entries) and returns
    /// `true` to continue or `false` to cancel before the next entry.
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            completed: 0,
            total: 0,
            cancelled: false,
        }
    }
}

impl<F> ProgressReporter for ClosureProgress<F>
where
    F: FnMut(usize, usize) -> bool + Send,
{
    fn on_total(&mut self, total_entries: usize) {
        self.total = total_entries;
    }

    fn on_entry_complete(&mut self, _entry_name: &str, _success: bool) {
        self.completed += 1;
        if !(self.callback)(self.completed, self.total) {
            self.cancelled = true;
        }
    }

    fn should_cancel(&self) -> bool {
        self.cancelled
    }
}

/// Creates a closure-based progress reporter.
pub fn progress_fn<F>(f: F) -> ClosureProgress<F>
where
    F: FnMut(usize, usize) -> bool + Send,
{
    ClosureProgress::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress_never_cancels() {
        let mut progress = NoProgress;
        progress.on_total(3);
        progress.on_entry_complete("a", true);
        assert!(!progress.should_cancel());
    }

    #[test]
    fn test_atomic_progress_counts() {
        let mut progress = AtomicProgress::new();
        progress.on_total(2);
        progress.on_entry_start("a", 10);
        progress.on_entry_complete("a", true);
        progress.on_entry_start("b", 5);
        assert_eq!(progress.total_entries(), 2);
        assert_eq!(progress.completed_entries(), 1);
        assert_eq!(progress.processed_bytes(), 15);
    }

    #[test]
    fn test_atomic_progress_shared_cancel() {
        let progress = AtomicProgress::shared();
        let observer = Arc::clone(&progress);
        assert!(!observer.should_cancel());
        progress.cancel();
        assert!(observer.should_cancel());
    }

    #[test]
    fn test_closure_progress_cancels_after_callback_declines() {
        let mut progress = progress_fn(|completed, _total| completed < 2);
        progress.on_total(5);
        progress.on_entry_complete("a", true);
        assert!(!progress.should_cancel());
        progress.on_entry_complete("b", true);
        assert!(progress.should_cancel());
    }

    #[test]
    fn test_mut_ref_forwards() {
        let mut inner = progress_fn(|_, _| false);
        let mut by_ref = &mut inner;
        by_ref.on_entry_complete("x", true);
        assert!(by_ref.should_cancel());
    }
}
