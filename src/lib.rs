//! # resume-pipeline
//!
//! Ingest a résumé PDF, rasterise its first page, store both artifacts and
//! have a vision LLM score the résumé against a target job.
//!
//! ## Why rasterise?
//!
//! Résumés lean on layout: columns, sidebars, icons, typographic emphasis.
//! Text extraction loses all of it. A PNG of the first page lets a vision
//! model judge the document the way a recruiter (or an ATS screenshot
//! reviewer) sees it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Uploading         store the raw document in the blob store
//!  ├─ 2. Rasterizing       render page 1 via pdfium at 4× (spawn_blocking)
//!  ├─ 3. UploadingImage    store the PNG
//!  ├─ 4. PersistingRecord  write `resume:<id>` with an empty result
//!  └─ 5. Analyzing         vision-LLM call → structured feedback → record update
//! ```
//!
//! Any stage can fail; the run stops there and reports
//! [`StageFailure`]. Once stage 4 has succeeded the record stays
//! discoverable even if analysis fails, and
//! [`Orchestrator::retry_analysis`] can finish it later.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resume_pipeline::store::fs::{FsBlobStore, FsKeyValueStore};
//! use resume_pipeline::{input, Orchestrator, PipelineConfig, Submission, JOB_TITLE};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = PipelineConfig::default();
//!     let orchestrator = Orchestrator::from_config(
//!         &config,
//!         Arc::new(FsBlobStore::new("data/blobs")),
//!         Arc::new(FsKeyValueStore::new("data/kv.json")),
//!     )?;
//!
//!     let doc = input::acquire("cv.pdf", config.download_timeout_secs).await?;
//!     let id = orchestrator
//!         .submit(Submission::from(doc).with_metadata(JOB_TITLE, "Backend Engineer"))
//!         .await?;
//!     println!("job {id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resume-pipeline` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! resume-pipeline = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, StageFailure};
pub use orchestrator::{LoadedJob, Orchestrator, PipelineRun, RunState, Stage, Submission};
pub use pipeline::analysis::{AnalysisInvoker, InferenceEndpoint, InferenceResponse};
pub use pipeline::engine::{EngineLoader, RenderEngine};
pub use pipeline::input;
pub use pipeline::render::{PageRasterizer, RasterizedPage};
pub use progress::{NoopObserver, PipelineObserver, ProgressCallback};
pub use record::{
    AnalysisFeedback, ArtifactHandle, JobId, JobRecord, Metadata, COMPANY_NAME, JOB_DESCRIPTION,
    JOB_TITLE,
};
pub use store::{wipe, ArtifactStore, BlobStore, JobRecords, KeyValueStore, StoreError};
pub use stream::submit_stream;
