//! Pipeline stages for résumé ingestion and analysis.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and a backend (rendering engine, LLM provider) can be
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ engine/render ──▶ encode ──▶ analysis ◀── llm
//! (path/URL)  (pdfium, page 1)  (PNG)    (parse JSON)  (VLM endpoint)
//! ```
//!
//! 1. [`input`]: read a local path or download a URL into bytes
//! 2. [`engine`]: bind pdfium once per process and share the handle
//! 3. [`render`]: rasterise page 1; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 4. [`encode`]: PNG encoding strategies, primary then fallback
//! 5. [`analysis`]: call the inference endpoint and parse its feedback
//! 6. [`llm`]: the vision-LLM inference endpoint; the only stage with
//!    network I/O besides URL download

pub mod analysis;
pub mod encode;
pub mod engine;
pub mod input;
pub mod llm;
pub mod render;
