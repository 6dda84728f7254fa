//! Streaming submission API: emit run states as the pipeline advances.
//!
//! [`Orchestrator::submit`] returns only once the run ends, which for a
//! vision-LLM analysis can take a minute. [`submit_stream`] instead yields a
//! [`RunState`] for every stage the run enters, then exactly one terminal
//! state (`Done` or `Failed`), so a caller can render status as it happens.
//!
//! The run executes on a spawned task: dropping the stream stops delivery,
//! not the run, which always proceeds to completion.

use crate::error::StageFailure;
use crate::orchestrator::{Orchestrator, RunState, Stage, Submission};
use crate::progress::{PipelineObserver, ProgressCallback};
use crate::record::JobId;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// A boxed stream of run states.
pub type RunStream = Pin<Box<dyn Stream<Item = RunState> + Send>>;

/// Forwards observer events into a channel.
struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunState>,
}

impl ChannelObserver {
    fn send(&self, state: RunState) {
        if self.tx.send(state).is_err() {
            debug!("Run-state receiver dropped; run continues");
        }
    }
}

impl PipelineObserver for ChannelObserver {
    fn on_stage(&self, stage: Stage) {
        self.send(RunState::Active(stage));
    }

    fn on_failed(&self, failure: &StageFailure) {
        self.send(RunState::Failed {
            stage: failure.stage,
            reason: failure.error.to_string(),
        });
    }

    fn on_done(&self, id: &JobId) {
        self.send(RunState::Done(id.clone()));
    }
}

/// Submit `submission` and stream its run states.
///
/// Must be called from within a Tokio runtime.
pub fn submit_stream(orchestrator: Orchestrator, submission: Submission) -> RunStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer: ProgressCallback = Arc::new(ChannelObserver { tx });

    tokio::spawn(async move {
        // Outcome is delivered through the observer.
        let _ = orchestrator.submit_with(submission, observer).await;
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}
