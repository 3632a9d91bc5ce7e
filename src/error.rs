//! Error types.
//!
//! * [`Pdf2MdError`] is fatal: the conversion cannot produce a document at
//!   all. Returned as `Err` from the top-level `convert*` functions; no
//!   `Finished` progress event is emitted in that case.
//!
//! * [`PageError`] means one page failed (render glitch, provider error,
//!   timeout). Stored in [`crate::output::PageResult::error`] so callers can
//!   detect partial documents from the return value instead of the logs.
//!
//! Geometry problems never surface here: the clustering engine drops bad
//! rectangles and carries on. A missing or malformed heading outline is also
//! non-fatal and only logged.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the library.
#[derive(Debug, Error)]
pub enum Pdf2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("No selected page is in range (document has {total} pages)")]
    PageOutOfRange { total: usize },

    /// No page could be rasterised.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every page failed; the output would be empty.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// Some pages succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::ConversionOutput::into_result`] when the
    /// caller treats any page failure as an error.
    #[error("{failed}/{total} pages failed during conversion")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    /// The conversion was cancelled through its [`crate::CancelHandle`].
    #[error("Conversion cancelled after {settled}/{total} pages")]
    Cancelled { settled: usize, total: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    #[error("Page {page}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The per-call deadline elapsed.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The conversion was cancelled before this page settled.
    #[error("Page {page}: cancelled")]
    Cancelled { page: usize },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::LlmFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::Cancelled { page } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = Pdf2MdError::PartialFailure {
            success: 9,
            failed: 1,
            total: 10,
        };
        assert!(e.to_string().contains("1/10"), "got: {e}");
    }

    #[test]
    fn cancelled_display() {
        let e = Pdf2MdError::Cancelled {
            settled: 3,
            total: 8,
        };
        assert!(e.to_string().contains("3/8"), "got: {e}");
    }

    #[test]
    fn page_error_reports_its_page() {
        let e = PageError::Timeout { page: 4, secs: 60 };
        assert_eq!(e.page(), 4);
        assert!(e.to_string().contains("60s"));
        assert_eq!(PageError::Cancelled { page: 2 }.page(), 2);
    }
}
