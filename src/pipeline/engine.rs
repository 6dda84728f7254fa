//! Rendering-engine abstraction and its process-wide loader.
//!
//! pdfium is a shared library that must be bound once; binding it on every
//! call is slow and, on some platforms, not re-entrant. [`EngineLoader`]
//! binds it lazily on first use and fans that single outcome out to every
//! caller, including callers that arrive while the bind is still in flight.
//! The outcome is memoised whether it succeeded or failed: a process without
//! pdfium keeps reporting the same `EngineUnavailable` reason instead of
//! retrying the bind on every submission.
//!
//! The engine itself sits behind [`RenderEngine`] so the rasteriser can be
//! exercised without a native library.

use crate::error::PipelineError;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Native page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Pixel dimensions of the surface a page is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Scale a page's point size, truncating to whole pixels (minimum 1).
    pub fn scaled(page: PageSize, scale: f32) -> Self {
        let px = |v: f32| ((v * scale).floor() as u32).max(1);
        Self {
            width: px(page.width),
            height: px(page.height),
        }
    }
}

/// A loaded paged-document engine.
///
/// Implementations are shared across threads and must tolerate concurrent
/// `open` calls.
pub trait RenderEngine: Send + Sync {
    /// Parse `bytes` as a paged document.
    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn EngineDocument + 'a>, PipelineError>;
}

/// A parsed document. Page indices are 0-based.
pub trait EngineDocument {
    fn page_count(&self) -> usize;

    fn page_size(&self, index: usize) -> Result<PageSize, PipelineError>;

    /// Render page `index` with high-quality smoothing into a surface of
    /// exactly `viewport` pixels.
    fn render(&self, index: usize, viewport: Viewport) -> Result<RgbaImage, PipelineError>;
}

/// Shared handle to a loaded engine.
pub type EngineHandle = Arc<dyn RenderEngine>;

type Initializer = dyn Fn() -> Result<EngineHandle, String> + Send + Sync;

type LoadOutcome = Shared<BoxFuture<'static, Result<EngineHandle, String>>>;

/// Initialises a [`RenderEngine`] at most once.
///
/// The bind runs on a detached blocking task; waiters only poll a shared
/// handle to its outcome, so a cancelled waiter never restarts the load.
pub struct EngineLoader {
    init: Arc<Initializer>,
    load: OnceLock<LoadOutcome>,
}

impl EngineLoader {
    /// A loader that runs `init` (on a blocking thread) the first time an
    /// engine is requested.
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> Result<EngineHandle, String> + Send + Sync + 'static,
    {
        Self {
            init: Arc::new(init),
            load: OnceLock::new(),
        }
    }

    /// A loader that is already resolved to `engine`.
    pub fn ready(engine: EngineHandle) -> Self {
        Self {
            init: Arc::new(|| Err("loader was constructed pre-initialised".to_string())),
            load: OnceLock::from(future::ready(Ok(engine)).boxed().shared()),
        }
    }

    /// The process-wide pdfium loader.
    ///
    /// Library resolution happens on first [`ensure_loaded`](Self::ensure_loaded):
    /// `PDFIUM_LIB_PATH` (a file, or a directory holding the platform
    /// library) if set, otherwise the system library search path.
    pub fn global() -> Arc<EngineLoader> {
        static GLOBAL: OnceLock<Arc<EngineLoader>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| {
            Arc::new(EngineLoader::new(|| {
                let lib_path = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
                PdfiumEngine::bind(lib_path.as_deref()).map(|e| Arc::new(e) as EngineHandle)
            }))
        }))
    }

    /// Whether initialisation has completed (successfully or not).
    pub fn is_initialized(&self) -> bool {
        self.load.get().and_then(|load| load.peek()).is_some()
    }

    /// Return the engine, initialising it on first call.
    ///
    /// Concurrent callers wait on the same initialisation and all observe
    /// the same handle, or the same failure.
    pub async fn ensure_loaded(&self) -> Result<EngineHandle, PipelineError> {
        let load = self.load.get_or_init(|| self.start()).clone();
        load.await
            .map_err(|reason| PipelineError::EngineUnavailable { reason })
    }

    /// Spawn the bind. Must be called from within a Tokio runtime.
    fn start(&self) -> LoadOutcome {
        info!("Initialising rendering engine");
        let init = Arc::clone(&self.init);
        let task = tokio::task::spawn_blocking(move || {
            let outcome = init();
            match &outcome {
                Ok(_) => info!("Rendering engine ready"),
                Err(reason) => warn!("Rendering engine unavailable: {}", reason),
            }
            outcome
        });
        async move {
            task.await
                .unwrap_or_else(|e| Err(format!("engine initialisation panicked: {e}")))
        }
        .boxed()
        .shared()
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`RenderEngine`] backed by a bound pdfium library.
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

impl PdfiumEngine {
    /// Bind pdfium from `lib_path` (file or directory), or from the system
    /// library search path when `None`.
    pub fn bind(lib_path: Option<&Path>) -> Result<Self, String> {
        let bindings = match lib_path {
            Some(path) if path.is_dir() => {
                let lib = path.join(Pdfium::pdfium_platform_library_name());
                debug!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            Some(path) => {
                debug!("Binding pdfium from {}", path.display());
                Pdfium::bind_to_library(path)
            }
            None => {
                debug!("Binding system pdfium");
                Pdfium::bind_to_system_library()
            }
        }
        .map_err(|e| format!("{e:?}"))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl RenderEngine for PdfiumEngine {
    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn EngineDocument + 'a>, PipelineError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PipelineError::DocumentParseError {
                detail: format!("{e:?}"),
            })?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumDocument<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'a>, PipelineError> {
        let index = u16::try_from(index).map_err(|_| PipelineError::RasterizationFailed {
            detail: format!("page index {index} out of range"),
        })?;
        self.document
            .pages()
            .get(index)
            .map_err(|e| PipelineError::RasterizationFailed {
                detail: format!("{e:?}"),
            })
    }
}

impl EngineDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize, PipelineError> {
        let page = self.page(index)?;
        Ok(PageSize {
            width: page.width().value,
            height: page.height().value,
        })
    }

    fn render(&self, index: usize, viewport: Viewport) -> Result<RgbaImage, PipelineError> {
        let page = self.page(index)?;
        let config = PdfRenderConfig::new()
            .set_target_width(viewport.width as i32)
            .set_target_height(viewport.height as i32)
            .set_image_smoothing(true)
            .set_text_smoothing(true)
            .set_path_smoothing(true)
            .render_form_data(true);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PipelineError::RasterizationFailed {
                detail: format!("{e:?}"),
            })?;
        Ok(bitmap.as_image().to_rgba8())
    }
}
