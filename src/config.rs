//! Configuration types for PDF-to-Markdown conversion.
//!
//! Every knob lives in [`ConversionConfig`], built through
//! [`ConversionConfigBuilder`]. Region clustering thresholds are grouped in
//! [`RegionConfig`] because they only matter in [`RenderMode::Regions`].

use crate::error::Pdf2MdError;
use crate::pipeline::scheduler::CancelHandle;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a PDF-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use layout_pdf2md::{ConversionConfig, RenderMode};
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .concurrency(4)
///     .render_mode(RenderMode::Regions)
///     .image_dir("out/images")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Maximum number of unsettled model calls at any time. Default: 10.
    ///
    /// Bounds provider rate-limit pressure and the number of page images held
    /// in memory while requests are in flight.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4.1-nano". `None` uses the provider default.
    pub model: Option<String>,

    /// LLM provider name ("openai", "anthropic", "gemini", "ollama", …).
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per request. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed model call, with exponential backoff. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom page prompt. `None` uses the built-in prompt for the render mode.
    pub system_prompt: Option<String>,

    /// Whole pages or clustered regions. Default: [`RenderMode::FullPage`].
    pub render_mode: RenderMode,

    /// Clustering thresholds for [`RenderMode::Regions`].
    pub regions: RegionConfig,

    /// Directory receiving cropped region images. Required by
    /// [`RenderMode::Regions`]; Markdown references use bare file names, so
    /// this is normally the directory of the output file.
    pub image_dir: Option<PathBuf>,

    /// Run the heading reconciliation pass after assembly. Default: true.
    pub correct_headings: bool,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Separator between pages in the assembled output. Default: blank line.
    pub page_separator: PageSeparator,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call model timeout in seconds; 0 disables it. Default: 60.
    ///
    /// A timed-out call counts as a failed page, like any other call error.
    pub api_timeout_secs: u64,

    /// Receives progress updates.
    pub progress_callback: Option<ProgressCallback>,

    /// Cancels a running conversion from another task.
    pub cancel: Option<CancelHandle>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 10,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            system_prompt: None,
            render_mode: RenderMode::default(),
            regions: RegionConfig::default(),
            image_dir: None,
            correct_headings: true,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("render_mode", &self.render_mode)
            .field("regions", &self.regions)
            .field("image_dir", &self.image_dir)
            .field("correct_headings", &self.correct_headings)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl ConversionConfig {
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Checks constraints the field types cannot express.
    ///
    /// Also run by the conversion entry points, since the struct can be built
    /// without the builder.
    pub fn validate(&self) -> Result<(), Pdf2MdError> {
        if self.render_mode == RenderMode::Regions && self.image_dir.is_none() {
            return Err(Pdf2MdError::InvalidConfig(
                "Region mode needs an image directory for the cropped regions".into(),
            ));
        }
        self.regions.validate()
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.config.render_mode = mode;
        self
    }

    pub fn regions(mut self, regions: RegionConfig) -> Self {
        self.config.regions = regions;
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = Some(dir.into());
        self
    }

    pub fn correct_headings(mut self, v: bool) -> Self {
        self.config.correct_headings = v;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel(mut self, handle: CancelHandle) -> Self {
        self.config.cancel = Some(handle);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2MdError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2MdError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How each page is turned into model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Send the whole rendered page. (default)
    #[default]
    FullPage,
    /// Cluster the page's figures and tables into regions, crop them to image
    /// files, and ask the model to reference them from the Markdown.
    Regions,
}

/// Thresholds of the region clustering pipeline, in PDF points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// First merge pass over drawings and images. Default: 10.
    pub merge_distance: f64,
    /// Vertical gap joining stacked horizontal rules. Default: 100.
    pub horizontal_merge_distance: f64,
    /// Adsorption distance for body text; 0.1 means "touching". Default: 0.1.
    pub large_text_adsorb_distance: f64,
    /// Adsorption distance for labels and captions. Default: 5.
    pub small_text_adsorb_distance: f64,
    /// Merge pass after adsorption. Default: 10.
    pub final_merge_distance: f64,
    /// Regions must be strictly wider than this. Default: 20.
    pub min_width: f64,
    /// Regions must be strictly taller than this. Default: 20.
    pub min_height: f64,
    /// Flat paths narrower than this are ignored. Default: 30.
    pub short_line_max_width: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            merge_distance: 10.0,
            horizontal_merge_distance: 100.0,
            large_text_adsorb_distance: 0.1,
            small_text_adsorb_distance: 5.0,
            final_merge_distance: 10.0,
            min_width: 20.0,
            min_height: 20.0,
            short_line_max_width: 30.0,
        }
    }
}

impl RegionConfig {
    fn validate(&self) -> Result<(), Pdf2MdError> {
        let values = [
            ("merge_distance", self.merge_distance),
            ("horizontal_merge_distance", self.horizontal_merge_distance),
            ("large_text_adsorb_distance", self.large_text_adsorb_distance),
            ("small_text_adsorb_distance", self.small_text_adsorb_distance),
            ("final_merge_distance", self.final_merge_distance),
            ("min_width", self.min_width),
            ("min_height", self.min_height),
            ("short_line_max_width", self.short_line_max_width),
        ];
        for (name, v) in values {
            if !v.is_finite() || v < 0.0 {
                return Err(Pdf2MdError::InvalidConfig(format!(
                    "regions.{name} must be a non-negative number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let in_range = |p: &usize| (1..=total_pages).contains(p);
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => std::iter::once(*p).filter(in_range).map(|p| p - 1).collect(),
            PageSelection::Range(start, end) => ((*start).max(1) - 1..(*end).min(total_pages)).collect(),
            PageSelection::Set(pages) => pages.iter().copied().filter(in_range).map(|p| p - 1).collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Pages joined with a blank line. (default)
    #[default]
    None,
    /// Horizontal rule between pages.
    HorizontalRule,
    /// HTML comment carrying the next page number.
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Separator placed before the page numbered `page_num` (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {page_num} -->\n\n"),
            PageSeparator::Custom(s) => format!("\n\n{s}\n\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_and_validates() {
        let c = ConversionConfig::builder()
            .dpi(9999)
            .concurrency(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn negative_region_threshold_is_rejected() {
        let regions = RegionConfig {
            min_width: -1.0,
            ..RegionConfig::default()
        };
        let err = ConversionConfig::builder().regions(regions).build().unwrap_err();
        assert!(err.to_string().contains("min_width"), "got: {err}");
    }

    #[test]
    fn region_mode_requires_image_dir() {
        let err = ConversionConfig::builder()
            .render_mode(RenderMode::Regions)
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::InvalidConfig(_)));
        assert!(ConversionConfig::builder()
            .render_mode(RenderMode::Regions)
            .image_dir("imgs")
            .build()
            .is_ok());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Single(0).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(PageSelection::Range(4, 99).to_indices(5), vec![3, 4]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3, 9]).to_indices(5), vec![0, 2]);
    }

    #[test]
    fn separator_render() {
        assert_eq!(PageSeparator::None.render(2), "\n\n");
        assert_eq!(PageSeparator::Comment.render(7), "\n\n<!-- page 7 -->\n\n");
        assert_eq!(PageSeparator::Custom("***".into()).render(1), "\n\n***\n\n");
    }
}
