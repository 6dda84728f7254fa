//! Analysis invocation: document handle + instructions → structured feedback.
//!
//! The inference endpoint is an external collaborator behind
//! [`InferenceEndpoint`]. Its reply is an envelope
//! `{ message: { content } }` where `content` is either a plain string or a
//! list of content parts; the first part carrying text is the payload. The
//! payload must be a single JSON object matching
//! [`AnalysisFeedback`](crate::record::AnalysisFeedback).

use crate::error::PipelineError;
use crate::record::{AnalysisFeedback, ArtifactHandle};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Reply envelope returned by the inference endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub message: InferenceMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceMessage {
    pub content: MessageContent,
}

/// `content` is a string or a sequence of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl InferenceResponse {
    /// A reply whose content is the plain string `text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message: InferenceMessage {
                content: MessageContent::Text(text.into()),
            },
        }
    }
}

impl MessageContent {
    /// The payload text: the string itself, or the first part with text.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| p.text.as_deref()),
        }
    }
}

/// AI inference endpoint contract.
#[async_trait]
pub trait InferenceEndpoint: Send + Sync {
    /// Run inference over the stored document at `document`. `Ok(None)` means
    /// the endpoint answered without a response.
    async fn infer(
        &self,
        document: &ArtifactHandle,
        instructions: &str,
    ) -> Result<Option<InferenceResponse>, PipelineError>;
}

/// A single outer ```` ``` ```` or ```` ```json ```` fence around the payload.
static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_json_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Parse the textual payload of a reply into structured feedback.
pub fn parse_feedback(text: &str) -> Result<AnalysisFeedback, PipelineError> {
    let body = strip_json_fences(text);
    serde_json::from_str(body).map_err(|e| PipelineError::MalformedResult {
        detail: e.to_string(),
    })
}

/// Submits documents to an [`InferenceEndpoint`] and parses the answer.
#[derive(Clone)]
pub struct AnalysisInvoker {
    endpoint: Arc<dyn InferenceEndpoint>,
}

impl AnalysisInvoker {
    pub fn new(endpoint: Arc<dyn InferenceEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Analyse the document behind `document` according to `instructions`.
    ///
    /// `InferenceFailed` when the endpoint gives no response or its reply
    /// carries no text; `MalformedResult` when the text is not feedback JSON.
    pub async fn analyze(
        &self,
        document: &ArtifactHandle,
        instructions: &str,
    ) -> Result<AnalysisFeedback, PipelineError> {
        info!("Requesting analysis of {}", document);
        let response = self
            .endpoint
            .infer(document, instructions)
            .await?
            .ok_or_else(|| PipelineError::InferenceFailed {
                detail: "endpoint returned no response".to_string(),
            })?;

        let text = response
            .message
            .content
            .first_text()
            .ok_or_else(|| PipelineError::InferenceFailed {
                detail: "response carries no text content".to_string(),
            })?;
        debug!("Analysis reply: {} chars", text.len());

        let feedback = parse_feedback(text)?;
        info!("Analysis complete: overall score {}", feedback.overall_score);
        Ok(feedback)
    }
}
