//! End-to-end orchestration of one résumé submission.
//!
//! ```text
//! Uploading ─▶ Rasterizing ─▶ UploadingImage ─▶ PersistingRecord ─▶ Analyzing ─▶ Done
//!     │             │               │                  │                │
//!     └─────────────┴───────────────┴──────────────────┴────────────────┴─▶ Failed(stage, reason)
//! ```
//!
//! Stages run strictly in order, each awaited before the next starts, and
//! the first failure ends the run. There are no automatic retries.
//!
//! The job record is written as soon as both artifacts are stored and before
//! analysis starts, so a run that fails at `Analyzing` still leaves a
//! discoverable record with an empty result. [`Orchestrator::retry_analysis`]
//! runs the analysis stage again for such a record.
//!
//! Dropping the future returned by [`Orchestrator::submit`] stops the run at
//! its next await point. Uploads already issued are not undone.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StageFailure};
use crate::pipeline::analysis::{AnalysisInvoker, InferenceEndpoint};
use crate::pipeline::engine::EngineLoader;
use crate::pipeline::input::AcquiredDocument;
use crate::pipeline::llm::LlmInferenceEndpoint;
use crate::pipeline::render::PageRasterizer;
use crate::progress::{Fanout, NoopObserver, PipelineObserver, ProgressCallback};
use crate::prompts::analysis_instructions;
use crate::record::{is_reserved_key, JobId, JobRecord, Metadata, JOB_DESCRIPTION, JOB_TITLE};
use crate::store::{ArtifactStore, BlobStore, JobRecords, KeyValueStore};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ── Stages ───────────────────────────────────────────────────────────────

/// A step of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Uploading,
    Rasterizing,
    UploadingImage,
    PersistingRecord,
    Analyzing,
}

impl Stage {
    /// Human-readable status shown while the stage runs.
    pub fn status_text(self) -> &'static str {
        match self {
            Stage::Uploading => "Uploading the file ...",
            Stage::Rasterizing => "Converting to image ...",
            Stage::UploadingImage => "Uploading the image ...",
            Stage::PersistingRecord => "Preparing data ...",
            Stage::Analyzing => "Analyzing ...",
        }
    }

    /// Label used in the failure status line.
    pub fn failure_label(self) -> &'static str {
        match self {
            Stage::Uploading => "Failed to upload file",
            Stage::Rasterizing => "Failed to convert PDF to image",
            Stage::UploadingImage => "Failed to upload image",
            Stage::PersistingRecord => "Failed to save record",
            Stage::Analyzing => "Failed to analyze",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Uploading => "Uploading",
            Stage::Rasterizing => "Rasterizing",
            Stage::UploadingImage => "UploadingImage",
            Stage::PersistingRecord => "PersistingRecord",
            Stage::Analyzing => "Analyzing",
        })
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Active(Stage),
    Done(JobId),
    Failed { stage: Stage, reason: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Active(_))
    }

    pub fn status_text(&self) -> String {
        match self {
            RunState::Active(stage) => stage.status_text().to_string(),
            RunState::Done(_) => "Analysis Done".to_string(),
            RunState::Failed { stage, reason } => {
                format!("Error: {} - {}", stage.failure_label(), reason)
            }
        }
    }
}

/// Transient state of one run. Only moves forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    state: RunState,
}

impl PipelineRun {
    /// A run about to execute `stage` first.
    pub fn starting_at(stage: Stage) -> Self {
        Self {
            state: RunState::Active(stage),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Current stage, if the run has not terminated.
    pub fn stage(&self) -> Option<Stage> {
        match self.state {
            RunState::Active(stage) => Some(stage),
            _ => None,
        }
    }

    /// Move to `next`, which must come strictly after the current stage.
    pub fn enter(&mut self, next: Stage) -> Result<(), PipelineError> {
        match self.state {
            RunState::Active(current) if next > current => {
                self.state = RunState::Active(next);
                Ok(())
            }
            _ => Err(PipelineError::Internal(format!(
                "illegal transition from {:?} to {next}",
                self.state
            ))),
        }
    }

    pub fn finish(&mut self, id: JobId) {
        if !self.state.is_terminal() {
            self.state = RunState::Done(id);
        }
    }

    pub fn fail(&mut self, failure: &StageFailure) {
        if !self.state.is_terminal() {
            self.state = RunState::Failed {
                stage: failure.stage,
                reason: failure.error.to_string(),
            };
        }
    }
}

// ── Inputs and outputs ───────────────────────────────────────────────────

/// A document plus the job it is being submitted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub document: Vec<u8>,
    /// Original file name; used to name both artifacts.
    pub file_name: String,
    pub metadata: Metadata,
}

impl Submission {
    pub fn new(document: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            document,
            file_name: file_name.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata field. Empty values and reserved record field names
    /// are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        if is_reserved_key(&key) {
            warn!("Ignoring metadata field '{}': reserved record field", key);
        } else if !value.is_empty() {
            self.metadata.insert(key, value);
        }
        self
    }
}

impl From<AcquiredDocument> for Submission {
    fn from(doc: AcquiredDocument) -> Self {
        Self::new(doc.bytes, doc.file_name)
    }
}

/// A stored job with both artifacts read back.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedJob {
    pub record: JobRecord,
    pub document: Vec<u8>,
    pub image: Vec<u8>,
}

impl LoadedJob {
    /// Read the record for `id` and both of its artifacts.
    pub async fn load(
        artifacts: &ArtifactStore,
        records: &JobRecords,
        id: &JobId,
    ) -> Result<Option<Self>, PipelineError> {
        let Some(record) = records.get(id).await? else {
            return Ok(None);
        };
        let (document, image) = futures::try_join!(
            artifacts.fetch(&record.document),
            artifacts.fetch(&record.image)
        )?;
        Ok(Some(Self {
            record,
            document,
            image,
        }))
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Sequences upload, rasterisation, persistence and analysis.
#[derive(Clone)]
pub struct Orchestrator {
    artifacts: ArtifactStore,
    records: JobRecords,
    rasterizer: PageRasterizer,
    analysis: AnalysisInvoker,
    observer: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        artifacts: ArtifactStore,
        records: JobRecords,
        rasterizer: PageRasterizer,
        analysis: AnalysisInvoker,
    ) -> Self {
        Self {
            artifacts,
            records,
            rasterizer,
            analysis,
            observer: None,
        }
    }

    /// Wire the production stack: the process-wide pdfium loader and an
    /// LLM endpoint resolved from `config`.
    pub fn from_config(
        config: &PipelineConfig,
        blobs: Arc<dyn BlobStore>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Result<Self, PipelineError> {
        let rasterizer = PageRasterizer::new(EngineLoader::global()).with_scale(config.render_scale);
        let artifacts = ArtifactStore::new(blobs);
        let endpoint = LlmInferenceEndpoint::from_config(config, artifacts.clone(), rasterizer.clone())?;
        Ok(Self::with_endpoint(config, artifacts, kv, rasterizer, Arc::new(endpoint)))
    }

    /// Like [`from_config`](Self::from_config) with a caller-supplied
    /// inference endpoint and rasteriser.
    pub fn with_endpoint(
        config: &PipelineConfig,
        artifacts: ArtifactStore,
        kv: Arc<dyn KeyValueStore>,
        rasterizer: PageRasterizer,
        endpoint: Arc<dyn InferenceEndpoint>,
    ) -> Self {
        let mut orchestrator = Self::new(
            artifacts,
            JobRecords::with_prefix(kv, config.record_prefix.clone()),
            rasterizer,
            AnalysisInvoker::new(endpoint),
        );
        orchestrator.observer = config.progress_callback.clone();
        orchestrator
    }

    /// Notify `observer` about every run this orchestrator executes.
    pub fn with_observer(mut self, observer: ProgressCallback) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn records(&self) -> &JobRecords {
        &self.records
    }

    /// Run the whole pipeline for `submission` and return the new job id.
    pub async fn submit(&self, submission: Submission) -> Result<JobId, StageFailure> {
        match &self.observer {
            Some(observer) => self.run_submission(submission, observer.as_ref()).await,
            None => self.run_submission(submission, &NoopObserver).await,
        }
    }

    /// [`submit`](Self::submit), additionally reporting to `observer`.
    pub async fn submit_with(
        &self,
        submission: Submission,
        observer: ProgressCallback,
    ) -> Result<JobId, StageFailure> {
        let fan = self.fanout(observer);
        self.run_submission(submission, &fan).await
    }

    /// Run the analysis stage again for a stored job that has no result.
    ///
    /// Fails with `RecordNotFound` for an unknown id and `AlreadyAnalyzed`
    /// when the record already carries a result. Returns the updated record.
    pub async fn retry_analysis(&self, id: &JobId) -> Result<JobRecord, StageFailure> {
        let observer = match &self.observer {
            Some(o) => Arc::clone(o),
            None => Arc::new(NoopObserver) as ProgressCallback,
        };
        let mut run = PipelineRun::starting_at(Stage::Analyzing);
        observer.on_stage(Stage::Analyzing);
        info!("Retrying analysis for job {}", id);

        let outcome = self
            .retry_body(id)
            .await
            .map_err(|e| StageFailure::new(Stage::Analyzing, e).with_record(id.clone()));

        match &outcome {
            Ok(record) => {
                run.finish(record.id.clone());
                observer.on_done(&record.id);
            }
            Err(failure) => {
                run.fail(failure);
                warn!("{}", run.state().status_text());
                observer.on_failed(failure);
            }
        }
        outcome
    }

    async fn retry_body(&self, id: &JobId) -> Result<JobRecord, PipelineError> {
        let record = self
            .records
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::RecordNotFound { id: id.clone() })?;
        if record.is_analyzed() {
            return Err(PipelineError::AlreadyAnalyzed { id: id.clone() });
        }
        self.analyze_and_store(&record).await
    }

    /// The stored job with both artifacts, or `None` for an unknown id.
    pub async fn load(&self, id: &JobId) -> Result<Option<LoadedJob>, PipelineError> {
        LoadedJob::load(&self.artifacts, &self.records, id).await
    }

    /// Every stored job record.
    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>, PipelineError> {
        self.records.list().await
    }

    fn fanout(&self, extra: ProgressCallback) -> Fanout {
        let mut observers = Vec::with_capacity(2);
        if let Some(o) = &self.observer {
            observers.push(Arc::clone(o));
        }
        observers.push(extra);
        Fanout(observers)
    }

    // ── Run body ─────────────────────────────────────────────────────────

    async fn run_submission(
        &self,
        submission: Submission,
        observer: &dyn PipelineObserver,
    ) -> Result<JobId, StageFailure> {
        info!(
            "Starting pipeline for '{}' ({} bytes)",
            submission.file_name,
            submission.document.len()
        );
        let mut run = PipelineRun::starting_at(Stage::Uploading);
        let outcome = self.drive(&mut run, &submission, observer).await;

        match &outcome {
            Ok(id) => {
                run.finish(id.clone());
                info!("Pipeline finished: job {}", id);
                observer.on_done(id);
            }
            Err(failure) => {
                run.fail(failure);
                warn!("{}", run.state().status_text());
                observer.on_failed(failure);
            }
        }
        outcome
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        submission: &Submission,
        observer: &dyn PipelineObserver,
    ) -> Result<JobId, StageFailure> {
        let fail = |stage: Stage| move |e: PipelineError| StageFailure::new(stage, e);

        // ── 1. Upload the raw document ───────────────────────────────────
        info!("{}", Stage::Uploading.status_text());
        observer.on_stage(Stage::Uploading);
        let document = self
            .artifacts
            .store(&submission.document, &submission.file_name)
            .await
            .map_err(fail(Stage::Uploading))?;

        // ── 2. Rasterise page 1 ──────────────────────────────────────────
        self.enter(run, Stage::Rasterizing, observer)?;
        let page = self
            .rasterizer
            .rasterize_first_page(&submission.document, &submission.file_name)
            .await
            .map_err(fail(Stage::Rasterizing))?;

        // ── 3. Upload the raster ─────────────────────────────────────────
        self.enter(run, Stage::UploadingImage, observer)?;
        let image = self
            .artifacts
            .store(&page.image, &page.artifact_name)
            .await
            .map_err(fail(Stage::UploadingImage))?;

        // ── 4. Persist the record with an empty result ───────────────────
        self.enter(run, Stage::PersistingRecord, observer)?;
        let id = JobId::generate();
        let record = JobRecord::new(id.clone(), document, image, submission.metadata.clone());
        self.records
            .put(&id, &record)
            .await
            .map_err(fail(Stage::PersistingRecord))?;
        info!("Persisted job record {}", self.records.key(&id));
        observer.on_record_persisted(&id);

        // ── 5. Analyse ───────────────────────────────────────────────────
        self.enter(run, Stage::Analyzing, observer)
            .map_err(|f| f.with_record(id.clone()))?;
        self.analyze_and_store(&record)
            .await
            .map_err(|e| StageFailure::new(Stage::Analyzing, e).with_record(id.clone()))?;

        Ok(id)
    }

    fn enter(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        observer: &dyn PipelineObserver,
    ) -> Result<(), StageFailure> {
        run.enter(stage).map_err(|e| StageFailure::new(stage, e))?;
        info!("{}", stage.status_text());
        observer.on_stage(stage);
        Ok(())
    }

    /// Stage 5 against a persisted record: analyse, then write the result.
    async fn analyze_and_store(&self, record: &JobRecord) -> Result<JobRecord, PipelineError> {
        let instructions = analysis_instructions(
            record.metadata_value(JOB_TITLE).unwrap_or_default(),
            record.metadata_value(JOB_DESCRIPTION).unwrap_or_default(),
        );
        let feedback = self.analysis.analyze(&record.document, &instructions).await?;
        self.records.set_result(&record.id, feedback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Uploading < Stage::Rasterizing);
        assert!(Stage::PersistingRecord < Stage::Analyzing);
    }

    #[test]
    fn status_texts() {
        assert_eq!(Stage::Uploading.status_text(), "Uploading the file ...");
        assert_eq!(Stage::Analyzing.status_text(), "Analyzing ...");
        assert_eq!(Stage::Rasterizing.failure_label(), "Failed to convert PDF to image");
        assert_eq!(Stage::UploadingImage.to_string(), "UploadingImage");
    }

    #[test]
    fn run_moves_forward_only() {
        let mut run = PipelineRun::starting_at(Stage::Uploading);
        run.enter(Stage::Rasterizing).unwrap();
        run.enter(Stage::PersistingRecord).unwrap();
        assert!(run.enter(Stage::Rasterizing).is_err());
        assert!(run.enter(Stage::PersistingRecord).is_err());
        assert_eq!(run.stage(), Some(Stage::PersistingRecord));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut run = PipelineRun::starting_at(Stage::Analyzing);
        let failure = StageFailure::new(
            Stage::Analyzing,
            PipelineError::InferenceFailed {
                detail: "timeout".into(),
            },
        );
        run.fail(&failure);
        run.finish(JobId::from("late"));
        assert_eq!(
            run.state(),
            &RunState::Failed {
                stage: Stage::Analyzing,
                reason: "Inference failed: timeout".into()
            }
        );
        assert!(run.enter(Stage::Analyzing).is_err());
        assert_eq!(
            run.state().status_text(),
            "Error: Failed to analyze - Inference failed: timeout"
        );
    }

    #[test]
    fn submission_skips_empty_metadata() {
        let s = Submission::new(b"%PDF".to_vec(), "cv.pdf")
            .with_metadata(JOB_TITLE, "SRE")
            .with_metadata(JOB_DESCRIPTION, "");
        assert_eq!(s.metadata.len(), 1);
    }

    #[test]
    fn submission_skips_reserved_metadata_keys() {
        let s = Submission::new(b"%PDF".to_vec(), "cv.pdf")
            .with_metadata("feedback", "x")
            .with_metadata("resumePath", "./elsewhere.pdf")
            .with_metadata(JOB_TITLE, "SRE");
        assert_eq!(s.metadata.keys().map(String::as_str).collect::<Vec<_>>(), vec![JOB_TITLE]);
    }
}
