//! Error types for the resume-pipeline library.
//!
//! Two layers reflect two distinct audiences:
//!
//! * [`PipelineError`]: what went wrong. One variant per failure class
//!   (upload returned no handle, malformed document, inference returned
//!   nothing, ...). Every component returns this type.
//!
//! * [`StageFailure`]: where it went wrong. The orchestrator wraps the
//!   error with the stage that was running and, when the job record had
//!   already been written, its id. This is what a caller-facing UI renders.
//!
//! Storage backends have their own [`crate::store::StoreError`], converted
//! into [`PipelineError::Store`] at the client boundary.

use crate::orchestrator::Stage;
use crate::record::JobId;
use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the resume-pipeline library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Storage ───────────────────────────────────────────────────────────
    /// The blob store accepted the upload call but returned no handle.
    #[error("Upload of '{name}' returned no handle")]
    UploadFailed { name: String },

    /// A stored artifact could not be read back.
    #[error("Artifact '{handle}' is missing from the blob store")]
    ArtifactMissing { handle: String },

    /// No job record exists under the given id.
    #[error("No job record found for id '{id}'")]
    RecordNotFound { id: JobId },

    /// The job record already carries an analysis result.
    #[error("Job '{id}' has already been analysed")]
    AlreadyAnalyzed { id: JobId },

    /// A stored record could not be encoded or decoded.
    #[error("Job record '{key}' could not be (de)serialised: {detail}")]
    RecordEncoding { key: String, detail: String },

    /// The underlying blob or key-value backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Rendering ─────────────────────────────────────────────────────────
    /// The rendering engine could not be initialised in this environment.
    #[error(
        "Rendering engine unavailable: {reason}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory) or install pdfium system-wide."
    )]
    EngineUnavailable { reason: String },

    /// The input bytes are not a readable paged document.
    #[error("Document could not be parsed: {detail}")]
    DocumentParseError { detail: String },

    /// The document parsed but has zero pages.
    #[error("Document has no pages")]
    NoPages,

    /// Rendering or every encoding strategy failed.
    #[error("Rasterisation failed: {detail}")]
    RasterizationFailed { detail: String },

    // ── Analysis ──────────────────────────────────────────────────────────
    /// The inference endpoint returned no response.
    #[error("Inference failed: {detail}")]
    InferenceFailed { detail: String },

    /// The inference response could not be parsed as structured feedback.
    #[error("Analysis result is malformed: {detail}")]
    MalformedResult { detail: String },

    /// The configured LLM provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Input ─────────────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a readable path nor an HTTP(S) URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input was read but is not a PDF.
    #[error("'{name}' is not a PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, join failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A pipeline run that stopped at `stage` because of `error`.
///
/// `record_id` is set once the job record has been persisted (stage 4
/// succeeded), so the caller can still reach the uploaded artifacts and
/// retry the analysis alone.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
    pub record_id: Option<JobId>,
}

impl StageFailure {
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self {
            stage,
            error,
            record_id: None,
        }
    }

    pub fn with_record(mut self, id: JobId) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Human-readable status line, e.g. `Error: Failed to upload file - ...`.
    pub fn status_text(&self) -> String {
        format!("Error: {} - {}", self.stage.failure_label(), self.error)
    }
}
