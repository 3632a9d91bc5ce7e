//! Pipeline stages for PDF-to-Markdown conversion.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ scheduler(llm) ──▶ postprocess ──▶ headings
//! (path/URL) (pdfium,   (base64)   (bounded fan-out,   (per-page     (outline
//!            regions)              ordered fan-in)     cleanup)       fix-up)
//! ```
//!
//! 1. [`input`]: resolve a path, URL or byte buffer to a local PDF file
//! 2. [`render`]: rasterise selected pages on the blocking pool and, in
//!    region mode, cluster page objects into regions
//! 3. [`encode`]: PNG bytes for region files, base64 for the request body
//! 4. [`scheduler`] + [`llm`]: one model call per page, at most
//!    `concurrency` in flight, results in page order
//! 5. [`postprocess`]: deterministic cleanup of each reply
//! 6. [`headings`]: document-wide heading depth correction

pub mod encode;
pub mod headings;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod scheduler;
