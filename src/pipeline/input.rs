//! Document acquisition: turn a user-supplied path or URL into bytes.
//!
//! The blob store and the rendering engine both take byte buffers, so a
//! downloaded document never touches the local filesystem. The PDF magic
//! bytes (`%PDF`) are checked here so callers get a meaningful error before
//! anything is uploaded.

use crate::error::PipelineError;
use std::path::Path;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A document read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredDocument {
    pub bytes: Vec<u8>,
    /// Name used for the uploaded artifact, e.g. `cv.pdf`.
    pub file_name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local PDF, or download one when `input` is an HTTP(S) URL.
pub async fn acquire(input: &str, timeout_secs: u64) -> Result<AcquiredDocument, PipelineError> {
    if input.trim().is_empty() {
        return Err(PipelineError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<AcquiredDocument, PipelineError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    check_magic(&file_name, &bytes)?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(AcquiredDocument { bytes, file_name })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<AcquiredDocument, PipelineError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            PipelineError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;
    if !response.status().is_success() {
        return Err(PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let file_name = filename_from_url(url);
    let bytes = response.bytes().await.map_err(classify)?.to_vec();
    check_magic(&file_name, &bytes)?;

    info!("Downloaded {} ({} bytes)", file_name, bytes.len());
    Ok(AcquiredDocument { bytes, file_name })
}

fn check_magic(name: &str, bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err(PipelineError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        })
    }
}

/// Last URL path segment when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_comes_from_last_segment() {
        assert_eq!(filename_from_url("https://x.io/files/cv.pdf?dl=1"), "cv.pdf");
        assert_eq!(filename_from_url("https://x.io/files/"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.io/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn reads_local_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.pdf");
        std::fs::write(&path, b"%PDF-1.7 body").unwrap();

        let doc = acquire(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(doc.file_name, "cv.pdf");
        assert_eq!(doc.bytes, b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = acquire("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_with_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.docx");
        std::fs::write(&path, b"PK\x03\x04rest").unwrap();

        match acquire(path.to_str().unwrap(), 5).await.unwrap_err() {
            PipelineError::NotAPdf { name, magic } => {
                assert_eq!(name, "cv.docx");
                assert_eq!(magic, b"PK\x03\x04");
            }
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        assert!(matches!(
            acquire("  ", 5).await,
            Err(PipelineError::InvalidInput { .. })
        ));
    }
}
