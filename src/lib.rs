//! # layout-pdf2md
//!
//! Convert PDF documents to Markdown with a vision language model, either one
//! whole page image per request or with figures and tables cut out as
//! separate region images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file, URL or byte buffer
//!  ├─ 2. Render    rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Regions   cluster text/path/image objects into blocks (region mode)
//!  ├─ 4. VLM       one call per page, at most `concurrency` in flight
//!  ├─ 5. Assemble  clean replies, join in page order
//!  └─ 6. Headings  re-level the outline across the whole document
//! ```
//!
//! The clustering engine ([`layout`], on top of [`geometry`]) and the
//! scheduler ([`pipeline::scheduler`]) are usable on their own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layout_pdf2md::{convert, ConversionConfig, RenderMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ConversionConfig::builder()
//!         .render_mode(RenderMode::Regions)
//!         .image_dir("out")
//!         .build()?;
//!     let output = convert("document.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     for err in output.page_errors() {
//!         eprintln!("{err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! layout-pdf2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, PageSelection, PageSeparator, RegionConfig, RenderMode,
};
pub use convert::{convert, convert_from_bytes, convert_pages, convert_sync, convert_to_file, inspect};
pub use error::{PageError, Pdf2MdError};
pub use geometry::Rect;
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, PageResult};
pub use pipeline::llm::{LlmVisionModel, ModelError, VisionModel, VisionReply, VisionRequest};
pub use pipeline::render::RenderedPage;
pub use pipeline::scheduler::CancelHandle;
pub use progress::{ConversionProgressCallback, ProgressCallback, ProgressState, TaskStatus};
