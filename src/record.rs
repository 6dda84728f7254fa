//! Job record and structured analysis feedback.
//!
//! The record is persisted as JSON under `resume:<id>` in the key-value
//! store:
//!
//! ```json
//! {
//!   "id": "7c1e…",
//!   "resumePath": "./3f2a_cv.pdf",
//!   "imagePath": "./91bc_cv.png",
//!   "companyName": "Acme",
//!   "jobTitle": "Backend Engineer",
//!   "jobDescription": "…",
//!   "feedback": ""
//! }
//! ```
//!
//! `feedback` stays the empty string until analysis completes, then holds an
//! [`AnalysisFeedback`] object. User metadata fields are flattened into the
//! top level.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Metadata key for the target company.
pub const COMPANY_NAME: &str = "companyName";
/// Metadata key for the target job title.
pub const JOB_TITLE: &str = "jobTitle";
/// Metadata key for the target job description.
pub const JOB_DESCRIPTION: &str = "jobDescription";

/// User-supplied free-form fields attached to a job at creation.
pub type Metadata = BTreeMap<String, String>;

/// Top-level record fields; metadata may not use these names since it is
/// flattened alongside them.
pub const RESERVED_KEYS: [&str; 4] = ["id", "resumePath", "imagePath", "feedback"];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Opaque, globally unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// A fresh UUID v4 identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Reference returned by the blob store for a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,

    /// Uploaded raw document.
    #[serde(rename = "resumePath")]
    pub document: ArtifactHandle,

    /// Uploaded first-page raster.
    #[serde(rename = "imagePath")]
    pub image: ArtifactHandle,

    #[serde(flatten)]
    pub metadata: Metadata,

    /// `None` until analysis succeeds; serialised as `""` while empty.
    #[serde(rename = "feedback", default, with = "feedback_field")]
    pub result: Option<AnalysisFeedback>,
}

impl JobRecord {
    /// A freshly created record with no analysis result. Metadata entries
    /// named like a record field are dropped.
    pub fn new(
        id: JobId,
        document: ArtifactHandle,
        image: ArtifactHandle,
        mut metadata: Metadata,
    ) -> Self {
        metadata.retain(|key, _| {
            let reserved = is_reserved_key(key);
            if reserved {
                warn!("Dropping metadata field '{}': reserved record field", key);
            }
            !reserved
        });
        Self {
            id,
            document,
            image,
            metadata,
            result: None,
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.result.is_some()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// `feedback` is `""` before analysis and an object after.
mod feedback_field {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Feedback(Box<AnalysisFeedback>),
        Empty(String),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<AnalysisFeedback>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(feedback) => feedback.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<AnalysisFeedback>, D::Error> {
        match Option::<Wire>::deserialize(deserializer)? {
            Some(Wire::Feedback(feedback)) => Ok(Some(*feedback)),
            Some(Wire::Empty(s)) if s.is_empty() => Ok(None),
            Some(Wire::Empty(s)) => Err(serde::de::Error::custom(format!(
                "expected feedback object or empty string, got {s:?}"
            ))),
            None => Ok(None),
        }
    }
}

// ── Structured result ─────────────────────────────────────────────────────

/// Whether a tip praises the resume or asks for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipKind {
    Good,
    Improve,
}

/// Applicant-tracking-system tip (no explanation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsTip {
    #[serde(rename = "type")]
    pub kind: TipKind,
    pub tip: String,
}

/// Category tip with a longer explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    #[serde(rename = "type")]
    pub kind: TipKind,
    pub tip: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsFeedback {
    pub score: u32,
    #[serde(default)]
    pub tips: Vec<AtsTip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFeedback {
    pub score: u32,
    #[serde(default)]
    pub tips: Vec<Tip>,
}

/// Structured output of the analysis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFeedback {
    pub overall_score: u32,
    #[serde(rename = "ATS")]
    pub ats: AtsFeedback,
    pub tone_and_style: CategoryFeedback,
    pub content: CategoryFeedback,
    pub structure: CategoryFeedback,
    pub skills: CategoryFeedback,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_feedback() -> AnalysisFeedback {
        let category = CategoryFeedback {
            score: 70,
            tips: vec![Tip {
                kind: TipKind::Improve,
                tip: "Quantify impact".into(),
                explanation: "Add numbers to achievements.".into(),
            }],
        };
        AnalysisFeedback {
            overall_score: 72,
            ats: AtsFeedback {
                score: 80,
                tips: vec![AtsTip {
                    kind: TipKind::Good,
                    tip: "Standard headings".into(),
                }],
            },
            tone_and_style: category.clone(),
            content: category.clone(),
            structure: category.clone(),
            skills: category,
        }
    }

    fn sample_record() -> JobRecord {
        let mut metadata = Metadata::new();
        metadata.insert(COMPANY_NAME.into(), "Acme".into());
        metadata.insert(JOB_TITLE.into(), "Backend Engineer".into());
        JobRecord::new(
            JobId::from("job-1"),
            ArtifactHandle::new("./cv.pdf"),
            ArtifactHandle::new("./cv.png"),
            metadata,
        )
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn empty_record_uses_wire_field_names() {
        let value = serde_json::to_value(sample_record()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "job-1",
                "resumePath": "./cv.pdf",
                "imagePath": "./cv.png",
                "companyName": "Acme",
                "jobTitle": "Backend Engineer",
                "feedback": ""
            })
        );
    }

    #[test]
    fn analysed_record_embeds_feedback_object() {
        let mut record = sample_record();
        record.result = Some(sample_feedback());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["feedback"]["overallScore"], 72);
        assert_eq!(value["feedback"]["ATS"]["tips"][0]["type"], "good");
        assert_eq!(value["feedback"]["toneAndStyle"]["score"], 70);

        let back: JobRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn empty_feedback_string_reads_as_none() {
        let record: JobRecord = serde_json::from_str(
            r#"{"id":"x","resumePath":"a","imagePath":"b","feedback":""}"#,
        )
        .unwrap();
        assert!(!record.is_analyzed());
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn missing_feedback_reads_as_none() {
        let record: JobRecord =
            serde_json::from_str(r#"{"id":"x","resumePath":"a","imagePath":"b","jobTitle":"SRE"}"#)
                .unwrap();
        assert!(record.result.is_none());
        assert_eq!(record.metadata_value(JOB_TITLE), Some("SRE"));
    }

    #[test]
    fn reserved_metadata_keys_are_dropped() {
        let mut metadata = Metadata::new();
        metadata.insert("feedback".into(), "x".into());
        metadata.insert("id".into(), "other".into());
        metadata.insert(JOB_TITLE.into(), "SRE".into());
        let record = JobRecord::new(
            JobId::from("job-1"),
            ArtifactHandle::new("./cv.pdf"),
            ArtifactHandle::new("./cv.png"),
            metadata,
        );
        assert_eq!(record.metadata.len(), 1);

        let raw = serde_json::to_string(&record).unwrap();
        let back: JobRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.id, JobId::from("job-1"));
        assert!(back.result.is_none());
        assert_eq!(back.metadata_value(JOB_TITLE), Some("SRE"));
    }

    #[test]
    fn non_empty_feedback_string_is_rejected() {
        let err = serde_json::from_str::<JobRecord>(
            r#"{"id":"x","resumePath":"a","imagePath":"b","feedback":"pending"}"#,
        );
        assert!(err.is_err());
    }
}
