//! Result types returned by the conversion entry points.

use crate::error::{PageError, Pdf2MdError};
use serde::{Deserialize, Serialize};

/// The assembled document plus per-page outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Final Markdown, pages in ascending order, headings reconciled.
    pub markdown: String,
    /// One entry per selected page, in ascending page order.
    pub pages: Vec<PageResult>,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Turn any page failure into [`Pdf2MdError::PartialFailure`].
    pub fn into_result(self) -> Result<Self, Pdf2MdError> {
        if self.stats.failed_pages == 0 {
            return Ok(self);
        }
        Err(Pdf2MdError::PartialFailure {
            success: self.stats.processed_pages,
            failed: self.stats.failed_pages,
            total: self.pages.len(),
        })
    }

    /// Errors of every failed page, in page order.
    pub fn page_errors(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(|p| p.error.as_ref())
    }
}

/// Outcome of one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Cleaned Markdown; empty when the page failed.
    pub markdown: String,
    /// Region image files written for this page, relative to the image dir.
    pub images: Vec<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    /// `Some` when the page contributed no content.
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn failed(page_num: usize, error: PageError) -> Self {
        Self {
            page_num,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// PDF document information, available without an API key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Counters and timings of a conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    /// Regions detected across all pages (region mode only).
    pub total_regions: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// True when the heading outline was rewritten by the model.
    pub headings_corrected: bool,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result_flags_partial_failure() {
        let output = ConversionOutput {
            markdown: "ok\n".into(),
            pages: vec![
                PageResult {
                    page_num: 1,
                    markdown: "ok\n".into(),
                    ..PageResult::default()
                },
                PageResult::failed(2, PageError::Timeout { page: 2, secs: 5 }),
            ],
            metadata: DocumentMetadata::default(),
            stats: ConversionStats {
                processed_pages: 1,
                failed_pages: 1,
                ..ConversionStats::default()
            },
        };
        assert_eq!(output.page_errors().count(), 1);
        match output.into_result() {
            Err(Pdf2MdError::PartialFailure { success, failed, total }) => {
                assert_eq!((success, failed, total), (1, 1, 2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
