//! First-page rasterisation: document bytes → PNG artifact.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and no async story.
//! Parsing, rendering and PNG encoding are all CPU-bound, so the whole
//! sequence runs on a `spawn_blocking` thread and the Tokio workers never
//! stall on a large page.
//!
//! ## Why a fixed scale factor?
//!
//! The raster is read by a vision model, not a human. Rendering at 4× the
//! page's point size (a US-Letter page becomes 2448 × 3168 px) keeps small
//! résumé fonts legible after the provider downsamples the image.

use crate::error::PipelineError;
use crate::pipeline::encode::{default_encoders, ImageEncoder, PNG_EXTENSION};
use crate::pipeline::engine::{EngineHandle, EngineLoader, Viewport};
use image::RgbaImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upscaling factor relative to the page's native point size.
pub const DEFAULT_RENDER_SCALE: f32 = 4.0;

/// Trailing `.ext` of a file name (no path separators, no leading dot).
static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^./\\])\.[^./\\]+$").unwrap());

/// The encoded first page of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizedPage {
    /// Encoded image bytes, never empty.
    pub image: Vec<u8>,
    /// Source name with its extension replaced by `.png`.
    pub artifact_name: String,
    pub width: u32,
    pub height: u32,
    /// Name of the encoding strategy that produced `image`.
    pub encoder: &'static str,
}

/// Renders page 1 of a document through the shared engine.
#[derive(Clone)]
pub struct PageRasterizer {
    loader: Arc<EngineLoader>,
    encoders: Vec<Arc<dyn ImageEncoder>>,
    scale: f32,
}

impl PageRasterizer {
    /// A rasteriser over `loader` with the default encoders and 4× scale.
    pub fn new(loader: Arc<EngineLoader>) -> Self {
        Self {
            loader,
            encoders: default_encoders(),
            scale: DEFAULT_RENDER_SCALE,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Replace the encoding strategies. They are tried in order.
    pub fn with_encoders(mut self, encoders: Vec<Arc<dyn ImageEncoder>>) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Rasterise the first page of `document` into an image artifact.
    ///
    /// Waits for the engine if it is still initialising. Fails with
    /// `DocumentParseError` on unreadable input, `NoPages` on an empty
    /// document and `RasterizationFailed` when rendering or every encoder
    /// fails.
    pub async fn rasterize_first_page(
        &self,
        document: &[u8],
        source_name: &str,
    ) -> Result<RasterizedPage, PipelineError> {
        let engine = self.loader.ensure_loaded().await?;
        let bytes = document.to_vec();
        let encoders = self.encoders.clone();
        let scale = self.scale;

        let (width, height, image, encoder) = tokio::task::spawn_blocking(move || {
            let surface = render_first_page(&engine, &bytes, scale)?;
            let (image, encoder) = encode_with_fallback(&encoders, &surface)?;
            Ok::<_, PipelineError>((surface.width(), surface.height(), image, encoder))
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Render task panicked: {e}")))??;

        let page = RasterizedPage {
            image,
            artifact_name: artifact_name(source_name),
            width,
            height,
            encoder,
        };
        info!(
            "Rasterised page 1 of '{}' → {}x{} px, {} bytes ({})",
            source_name,
            page.width,
            page.height,
            page.image.len(),
            page.encoder
        );
        Ok(page)
    }
}

/// Blocking: parse, pick page 1, render at `scale`.
fn render_first_page(
    engine: &EngineHandle,
    bytes: &[u8],
    scale: f32,
) -> Result<RgbaImage, PipelineError> {
    let document = engine.open(bytes)?;
    let total = document.page_count();
    debug!("Document loaded: {} pages", total);
    if total == 0 {
        return Err(PipelineError::NoPages);
    }

    let size = document.page_size(0)?;
    let viewport = Viewport::scaled(size, scale);
    debug!(
        "Page 1: {}x{} pt → {}x{} px",
        size.width, size.height, viewport.width, viewport.height
    );
    document.render(0, viewport)
}

/// Try each encoder in order; the first non-empty output wins.
fn encode_with_fallback(
    encoders: &[Arc<dyn ImageEncoder>],
    surface: &RgbaImage,
) -> Result<(Vec<u8>, &'static str), PipelineError> {
    for encoder in encoders {
        match encoder.encode(surface) {
            Ok(bytes) if !bytes.is_empty() => return Ok((bytes, encoder.name())),
            Ok(_) => warn!("Encoder '{}' produced no bytes, trying next", encoder.name()),
            Err(e) => warn!("Encoder failed, trying next: {}", e),
        }
    }
    Err(PipelineError::RasterizationFailed {
        detail: "encode failed".to_string(),
    })
}

/// `cv.pdf` → `cv.png`; `cv` → `cv.png`.
pub fn artifact_name(source_name: &str) -> String {
    if RE_EXTENSION.is_match(source_name) {
        RE_EXTENSION
            .replace(source_name, format!("${{1}}.{PNG_EXTENSION}"))
            .into_owned()
    } else {
        format!("{source_name}.{PNG_EXTENSION}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::{EncodeError, PngEncoder};
    use crate::pipeline::engine::{EngineDocument, PageSize, RenderEngine};
    use image::Rgba;

    /// Treats the input as a page count and renders solid grey pages.
    struct FakeEngine {
        page: PageSize,
    }

    struct FakeDocument {
        pages: usize,
        page: PageSize,
    }

    impl RenderEngine for FakeEngine {
        fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn EngineDocument + 'a>, PipelineError> {
            match bytes {
                [b'%', b'P', b'D', b'F', pages, ..] => Ok(Box::new(FakeDocument {
                    pages: *pages as usize,
                    page: self.page,
                })),
                _ => Err(PipelineError::DocumentParseError {
                    detail: "missing header".into(),
                }),
            }
        }
    }

    impl EngineDocument for FakeDocument {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn page_size(&self, _: usize) -> Result<PageSize, PipelineError> {
            Ok(self.page)
        }

        fn render(&self, _: usize, viewport: Viewport) -> Result<RgbaImage, PipelineError> {
            Ok(RgbaImage::from_pixel(
                viewport.width,
                viewport.height,
                Rgba([200, 200, 200, 255]),
            ))
        }
    }

    struct EmptyEncoder;

    impl ImageEncoder for EmptyEncoder {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn encode(&self, _: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
            Ok(Vec::new())
        }
    }

    struct BrokenEncoder;

    impl ImageEncoder for BrokenEncoder {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn encode(&self, _: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
            Err(EncodeError::Failed {
                encoder: "broken",
                detail: "surface lost".into(),
            })
        }
    }

    fn rasterizer() -> PageRasterizer {
        let engine: EngineHandle = Arc::new(FakeEngine {
            page: PageSize {
                width: 60.0,
                height: 80.0,
            },
        });
        PageRasterizer::new(Arc::new(EngineLoader::ready(engine)))
    }

    #[tokio::test]
    async fn renders_first_page_at_four_times_scale() {
        let page = rasterizer()
            .rasterize_first_page(b"%PDF\x01", "cv.pdf")
            .await
            .unwrap();
        assert_eq!((page.width, page.height), (240, 320));
        assert_eq!(page.artifact_name, "cv.png");
        assert_eq!(page.encoder, "png");
        assert_eq!(&page.image[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn custom_scale_is_applied() {
        let page = rasterizer()
            .with_scale(1.5)
            .rasterize_first_page(b"%PDF\x03", "cv.pdf")
            .await
            .unwrap();
        assert_eq!((page.width, page.height), (90, 120));
    }

    #[tokio::test]
    async fn zero_pages_is_no_pages() {
        let err = rasterizer()
            .rasterize_first_page(b"%PDF\x00", "empty.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoPages));
    }

    #[tokio::test]
    async fn unparseable_document_is_parse_error() {
        let err = rasterizer()
            .rasterize_first_page(b"hello", "notes.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DocumentParseError { .. }));
    }

    #[tokio::test]
    async fn empty_primary_falls_back_to_identical_bytes() {
        let direct = rasterizer()
            .rasterize_first_page(b"%PDF\x01", "cv.pdf")
            .await
            .unwrap();
        let fallback = rasterizer()
            .with_encoders(vec![
                Arc::new(EmptyEncoder),
                Arc::new(crate::pipeline::encode::DataUrlEncoder),
            ])
            .rasterize_first_page(b"%PDF\x01", "cv.pdf")
            .await
            .unwrap();
        assert_eq!(fallback.encoder, "data-url");
        assert_eq!(fallback.image, direct.image);
    }

    #[tokio::test]
    async fn all_encoders_failing_is_rasterization_failure() {
        let err = rasterizer()
            .with_encoders(vec![Arc::new(BrokenEncoder), Arc::new(EmptyEncoder)])
            .rasterize_first_page(b"%PDF\x01", "cv.pdf")
            .await
            .unwrap_err();
        match err {
            PipelineError::RasterizationFailed { detail } => assert_eq!(detail, "encode failed"),
            other => panic!("expected RasterizationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broken_primary_is_skipped() {
        let page = rasterizer()
            .with_encoders(vec![Arc::new(BrokenEncoder), Arc::new(PngEncoder)])
            .rasterize_first_page(b"%PDF\x01", "cv.pdf")
            .await
            .unwrap();
        assert_eq!(page.encoder, "png");
    }

    #[tokio::test]
    async fn unavailable_engine_surfaces_reason() {
        let loader = EngineLoader::new(|| Err("no pdfium here".to_string()));
        let err = PageRasterizer::new(Arc::new(loader))
            .rasterize_first_page(b"%PDF\x01", "cv.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EngineUnavailable { .. }));
    }

    #[test]
    fn artifact_name_replaces_or_appends_extension() {
        assert_eq!(artifact_name("cv.pdf"), "cv.png");
        assert_eq!(artifact_name("my.resume.PDF"), "my.resume.png");
        assert_eq!(artifact_name("resume"), "resume.png");
        assert_eq!(artifact_name(".hidden"), ".hidden.png");
    }
}
