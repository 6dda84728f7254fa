//! Progress-callback trait for pipeline stage transitions.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`], or pass one
//! to [`crate::orchestrator::Orchestrator::submit_with`], to be told about
//! every stage a run enters and how it ends.
//!
//! Callbacks rather than channels: callers can forward events to a terminal
//! spinner, a WebSocket or a database row without the library knowing how
//! the host application communicates. [`crate::stream`] builds a `Stream`
//! on top of this trait for callers that prefer one.
//!
//! # Example
//!
//! ```rust
//! use resume_pipeline::{PipelineObserver, Stage};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct StatusLine {
//!     last: Mutex<String>,
//! }
//!
//! impl PipelineObserver for StatusLine {
//!     fn on_stage(&self, stage: Stage) {
//!         *self.last.lock().unwrap() = stage.status_text().to_string();
//!     }
//! }
//!
//! let line = StatusLine::default();
//! line.on_stage(Stage::Rasterizing);
//! assert_eq!(*line.last.lock().unwrap(), "Converting to image ...");
//! ```

use crate::error::StageFailure;
use crate::orchestrator::Stage;
use crate::record::JobId;
use std::sync::Arc;

/// Called by the orchestrator as a run advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls for one run are sequential; a shared observer
/// may still see calls from several runs at once.
pub trait PipelineObserver: Send + Sync {
    /// The run entered `stage`.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// The job record was written; from here on the job is discoverable
    /// even if analysis fails.
    fn on_record_persisted(&self, id: &JobId) {
        let _ = id;
    }

    /// The run stopped at `failure.stage`.
    fn on_failed(&self, failure: &StageFailure) {
        let _ = failure;
    }

    /// The run finished and the record carries its analysis result.
    fn on_done(&self, id: &JobId) {
        let _ = id;
    }
}

/// A no-op observer, the default when none is configured.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineObserver>;

/// Fans every event out to several observers, in order.
pub(crate) struct Fanout(pub Vec<ProgressCallback>);

impl PipelineObserver for Fanout {
    fn on_stage(&self, stage: Stage) {
        self.0.iter().for_each(|o| o.on_stage(stage));
    }

    fn on_record_persisted(&self, id: &JobId) {
        self.0.iter().for_each(|o| o.on_record_persisted(id));
    }

    fn on_failed(&self, failure: &StageFailure) {
        self.0.iter().for_each(|o| o.on_failed(failure));
    }

    fn on_done(&self, id: &JobId) {
        self.0.iter().for_each(|o| o.on_done(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tracking {
        stages: Mutex<Vec<Stage>>,
        persisted: AtomicUsize,
        failures: AtomicUsize,
        done: AtomicUsize,
    }

    impl PipelineObserver for Tracking {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_record_persisted(&self, _id: &JobId) {
            self.persisted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failed(&self, _failure: &StageFailure) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_done(&self, _id: &JobId) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_stage(Stage::Uploading);
        o.on_record_persisted(&JobId::from("x"));
        o.on_failed(&StageFailure::new(Stage::Analyzing, PipelineError::NoPages));
        o.on_done(&JobId::from("x"));
    }

    #[test]
    fn fanout_reaches_every_observer() {
        let a = Arc::new(Tracking::default());
        let b = Arc::new(Tracking::default());
        let fan = Fanout(vec![a.clone(), b.clone(), Arc::new(NoopObserver)]);

        fan.on_stage(Stage::Uploading);
        fan.on_stage(Stage::Rasterizing);
        fan.on_record_persisted(&JobId::from("1"));
        fan.on_done(&JobId::from("1"));

        for t in [&a, &b] {
            assert_eq!(*t.stages.lock().unwrap(), vec![Stage::Uploading, Stage::Rasterizing]);
            assert_eq!(t.persisted.load(Ordering::SeqCst), 1);
            assert_eq!(t.done.load(Ordering::SeqCst), 1);
            assert_eq!(t.failures.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: ProgressCallback = Arc::new(NoopObserver);
        o.on_stage(Stage::Analyzing);
    }
}
