//! Progress-callback trait shared by the long-running tools.
//!
//! Transcodes, downloads, PDF renders and stress runs can take minutes. Each
//! tool accepts an optional [`ProgressCallback`] and reports through it; the
//! library never draws anything itself. The `kit` binary plugs in an
//! `indicatif` bar, tests plug in counters.
//!
//! Units are chosen by the tool and stated in its docs: the video converter
//! reports milliseconds of media, the downloader reports per-mille, the
//! stress tester counts requests, the PDF renderer counts pages.
//!
//! # Example
//!
//! ```rust
//! use scriptkit::TaskProgress;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! struct Counter(AtomicU64);
//!
//! impl TaskProgress for Counter {
//!     fn on_advance(&self, delta: u64) {
//!         self.0.fetch_add(delta, Ordering::Relaxed);
//!     }
//! }
//!
//! let c = Counter(AtomicU64::new(0));
//! c.on_advance(3);
//! assert_eq!(c.0.load(Ordering::Relaxed), 3);
//! ```

use std::sync::Arc;

/// Receives progress events from a running tool.
///
/// Implementations must be `Send + Sync`: the stress tester reports from many
/// tasks at once. All methods default to no-ops.
pub trait TaskProgress: Send + Sync {
    /// Called once before work starts. `total` is `None` when the amount of
    /// work is unknown (e.g. a media file without a duration).
    fn on_start(&self, label: &str, total: Option<u64>) {
        let _ = (label, total);
    }

    /// Absolute position, in the tool's unit.
    fn on_position(&self, position: u64) {
        let _ = position;
    }

    /// Relative advance, in the tool's unit.
    fn on_advance(&self, delta: u64) {
        let _ = delta;
    }

    /// Free-form status text (current file, speed, ETA …).
    fn on_message(&self, message: &str) {
        let _ = message;
    }

    /// Called once when the work is over.
    fn on_finish(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl TaskProgress for NoopProgress {}

/// Shared handle type accepted by every tool.
pub type ProgressCallback = Arc<dyn TaskProgress>;

/// Forward an event to an optional callback.
pub(crate) fn emit(progress: Option<&ProgressCallback>, f: impl FnOnce(&dyn TaskProgress)) {
    if let Some(cb) = progress {
        f(cb.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct Tracking {
        starts: AtomicUsize,
        position: AtomicU64,
        advanced: AtomicU64,
        finished_ok: AtomicUsize,
    }

    impl TaskProgress for Tracking {
        fn on_start(&self, _label: &str, _total: Option<u64>) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_position(&self, position: u64) {
            self.position.store(position, Ordering::SeqCst);
        }
        fn on_advance(&self, delta: u64) {
            self.advanced.fetch_add(delta, Ordering::SeqCst);
        }
        fn on_finish(&self, success: bool) {
            if success {
                self.finished_ok.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn callbacks_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<NoopProgress>();
        assert_send_sync::<dyn TaskProgress>();
    }

    #[test]
    fn noop_does_not_panic() {
        let cb = NoopProgress;
        cb.on_start("x", Some(10));
        cb.on_position(5);
        cb.on_advance(1);
        cb.on_message("hello");
        cb.on_finish(true);
    }

    #[test]
    fn emit_reaches_callback() {
        let tracker = Arc::new(Tracking {
            starts: AtomicUsize::new(0),
            position: AtomicU64::new(0),
            advanced: AtomicU64::new(0),
            finished_ok: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = tracker.clone();

        emit(Some(&cb), |p| p.on_start("transcode", Some(100)));
        emit(Some(&cb), |p| p.on_position(40));
        emit(Some(&cb), |p| p.on_advance(2));
        emit(Some(&cb), |p| p.on_advance(3));
        emit(Some(&cb), |p| p.on_finish(true));
        emit(None, |p| p.on_finish(true));

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.position.load(Ordering::SeqCst), 40);
        assert_eq!(tracker.advanced.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.finished_ok.load(Ordering::SeqCst), 1);
    }
}
