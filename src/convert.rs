//! Conversion entry points.
//!
//! [`convert`] and friends resolve the input, pick a provider and rasterise
//! the pages; [`convert_pages`] then runs the model-facing half of the
//! pipeline over already rendered pages:
//!
//! 1. emit `Starting`;
//! 2. crop and save region images, encode each page, build its prompt;
//! 3. run one model call per page through the bounded scheduler, emitting
//!    `Running` as each page settles;
//! 4. clean every reply and join the successful pages in page order;
//! 5. reconcile heading depth across the whole document;
//! 6. emit `Finished`.
//!
//! Per-page failures end up in [`PageResult::error`]; only document-level
//! problems are returned as `Err`, and then no `Finished` event is sent.

use crate::config::ConversionConfig;
use crate::error::{PageError, Pdf2MdError};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, PageResult};
use crate::pipeline::headings::{reconcile_headings, Reconciled};
use crate::pipeline::llm::{LlmVisionModel, VisionModel, VisionRequest};
use crate::pipeline::render::RenderedPage;
use crate::pipeline::scheduler::{run_bounded, Limits, Outcome};
use crate::pipeline::{encode, input, postprocess, render};
use crate::progress::{emit, ProgressState};
use crate::prompts::page_prompt;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Convert a PDF file or URL to Markdown.
///
/// # Returns
/// `Ok(ConversionOutput)` even if some pages failed; check
/// `output.stats.failed_pages` or call
/// [`ConversionOutput::into_result`].
///
/// # Errors
/// Only fatal errors: unreadable input, no provider, no page rendered, every
/// page failed, or cancellation.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    config.validate()?;
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_path(resolved.path(), config).await
}

/// Convert PDF bytes held in memory.
///
/// The bytes are spilled to a temp file that is removed on return.
///
/// # Example
/// ```rust,no_run
/// use layout_pdf2md::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("document.pdf")?;
/// let output = convert_from_bytes(&bytes, &ConversionConfig::default()).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    config.validate()?;
    let resolved = input::spill_bytes(bytes).await?;
    convert_path(resolved.path(), config).await
}

/// Convert a PDF and write the Markdown to `output_path`.
///
/// The file is written to a sibling temp file first and renamed into place,
/// so readers never observe a partial document.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    let output = convert(input_str, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output)
}

/// Blocking wrapper around [`convert`] on a private runtime.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Read PDF metadata without converting. Needs no provider.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, Pdf2MdError> {
    let timeout = ConversionConfig::default().download_timeout_secs;
    let resolved = input::resolve_input(input_str.as_ref(), timeout).await?;
    render::extract_metadata(resolved.path(), None).await
}

async fn convert_path(pdf_path: &Path, config: &ConversionConfig) -> Result<ConversionOutput, Pdf2MdError> {
    let total_start = Instant::now();
    let model = LlmVisionModel::new(resolve_provider(config)?, config);

    let metadata = render::extract_metadata(pdf_path, config.password.as_deref()).await?;
    let page_indices = config.pages.to_indices(metadata.page_count);
    if page_indices.is_empty() {
        return Err(Pdf2MdError::PageOutOfRange {
            total: metadata.page_count,
        });
    }
    info!(
        "PDF has {} pages, {} selected",
        metadata.page_count,
        page_indices.len()
    );

    let render_start = Instant::now();
    let rendered = render::render_pages(pdf_path, config, &page_indices).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    if let Some(Err(first)) = rendered.first().filter(|_| rendered.iter().all(Result::is_err)) {
        return Err(Pdf2MdError::RasterisationFailed {
            page: first.page(),
            detail: first.to_string(),
        });
    }
    info!("Rendered {} pages in {}ms", rendered.len(), render_duration_ms);

    let mut output = convert_pages(&model, rendered, metadata, config).await?;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Conversion complete: {}/{} pages, {}ms total",
        output.stats.processed_pages, output.stats.total_pages, output.stats.total_duration_ms
    );
    Ok(output)
}

/// A page ready for its model call.
struct PageJob {
    /// Position in the caller's page list.
    slot: usize,
    page_num: usize,
    request: VisionRequest,
    region_images: Vec<String>,
}

/// Run the model half of the pipeline over rendered pages.
///
/// `pages` holds one entry per selected page, in page order; `Err` entries
/// are pages that failed to render. Progress events go to
/// `config.progress_callback`.
pub async fn convert_pages(
    model: &dyn VisionModel,
    pages: Vec<Result<RenderedPage, PageError>>,
    metadata: DocumentMetadata,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    let start = Instant::now();
    let total = pages.len();
    let callback = config.progress_callback.as_ref();
    emit(callback, ProgressState::starting(total));

    let mut slots: Vec<Option<PageResult>> = (0..total).map(|_| None).collect();
    let mut settled = 0usize;
    let mut total_regions = 0usize;
    let mut jobs = Vec::with_capacity(total);

    for (slot, page) in pages.into_iter().enumerate() {
        let prepared = match page {
            Ok(page) => {
                total_regions += page.regions.len();
                prepare_job(slot, page, config).await
            }
            Err(e) => Err(e),
        };
        match prepared {
            Ok(job) => jobs.push(job),
            Err(e) => {
                slots[slot] = Some(PageResult::failed(e.page(), e));
                settled += 1;
                emit(callback, ProgressState::running(settled, total));
            }
        }
    }

    let owners: Vec<(usize, usize)> = jobs.iter().map(|j| (j.slot, j.page_num)).collect();
    let llm_start = Instant::now();
    let outcomes = run_bounded(
        jobs,
        Limits::new(config.concurrency, config.api_timeout_secs),
        config.cancel.as_ref(),
        |job| run_page(model, job),
        |_, _| {
            settled += 1;
            emit(callback, ProgressState::running(settled, total));
        },
    )
    .await;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let mut cancelled = false;
    for ((slot, page_num), outcome) in owners.into_iter().zip(outcomes) {
        let result = match outcome {
            Outcome::Completed(result) => result,
            Outcome::TimedOut => {
                warn!("Page {}: timed out after {}s", page_num, config.api_timeout_secs);
                PageResult::failed(
                    page_num,
                    PageError::Timeout {
                        page: page_num,
                        secs: config.api_timeout_secs,
                    },
                )
            }
            Outcome::Cancelled => {
                cancelled = true;
                PageResult::failed(page_num, PageError::Cancelled { page: page_num })
            }
        };
        slots[slot] = Some(result);
    }
    if cancelled {
        return Err(Pdf2MdError::Cancelled { settled, total });
    }

    let pages: Vec<PageResult> = slots.into_iter().flatten().collect();
    let processed = pages.iter().filter(|p| p.is_success()).count();
    if processed == 0 {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "No pages selected".to_string());
        return Err(Pdf2MdError::AllPagesFailed { total, first_error });
    }

    let mut markdown = assemble_document(&pages, config);
    let mut stats = ConversionStats {
        total_pages: total,
        processed_pages: processed,
        failed_pages: total - processed,
        total_regions,
        total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
        llm_duration_ms,
        ..ConversionStats::default()
    };

    if config.correct_headings {
        let reconciled = reconcile_within_limits(model, markdown, config, total).await?;
        markdown = reconciled.content;
        stats.headings_corrected = reconciled.corrected;
        stats.total_input_tokens += reconciled.input_tokens as u64;
        stats.total_output_tokens += reconciled.output_tokens as u64;
    }
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    emit(callback, ProgressState::finished(total));
    Ok(ConversionOutput {
        markdown,
        pages,
        metadata,
        stats,
    })
}

/// Heading pass under the same per-call deadline as the pages.
///
/// A timeout leaves the document as assembled. Cancellation wins over a
/// pending reply and aborts the conversion.
async fn reconcile_within_limits(
    model: &dyn VisionModel,
    markdown: String,
    config: &ConversionConfig,
    total: usize,
) -> Result<Reconciled, Pdf2MdError> {
    let deadline = Limits::new(config.concurrency, config.api_timeout_secs).timeout;
    let fallback = markdown.clone();
    let pass = async move {
        let Some(limit) = deadline else {
            return reconcile_headings(model, markdown).await;
        };
        match tokio::time::timeout(limit, reconcile_headings(model, markdown)).await {
            Ok(reconciled) => reconciled,
            Err(_) => {
                warn!(
                    "Heading correction skipped: no reply within {}s",
                    config.api_timeout_secs
                );
                Reconciled {
                    content: fallback,
                    ..Reconciled::default()
                }
            }
        }
    };

    let cancelled = Pdf2MdError::Cancelled {
        settled: total,
        total,
    };
    match config.cancel.as_ref() {
        Some(handle) if handle.is_cancelled() => Err(cancelled),
        Some(handle) => tokio::select! {
            biased;
            _ = handle.cancelled() => Err(cancelled),
            reconciled = pass => Ok(reconciled),
        },
        None => Ok(pass.await),
    }
}

/// Save region crops, encode the page and build its request.
async fn prepare_job(slot: usize, page: RenderedPage, config: &ConversionConfig) -> Result<PageJob, PageError> {
    let page_num = page.page_index + 1;
    let region_images = match &config.image_dir {
        Some(dir) if !page.regions.is_empty() => save_regions(&page, dir).await,
        _ => Vec::new(),
    };

    let image = encode::encode_page(&page.image).map_err(|e| PageError::RenderFailed {
        page: page_num,
        detail: format!("Image encoding failed: {}", e),
    })?;
    let prompt = page_prompt(config.system_prompt.as_deref(), &region_images);

    Ok(PageJob {
        slot,
        page_num,
        request: VisionRequest::with_image(prompt, image),
        region_images,
    })
}

/// Write `page_{n}_{i}.png` for every region; returns the names written.
///
/// A region that cannot be written is left out of the prompt.
async fn save_regions(page: &RenderedPage, dir: &Path) -> Vec<String> {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Cannot create image dir {}: {}", dir.display(), e);
        return Vec::new();
    }

    let page_num = page.page_index + 1;
    let mut names = Vec::new();
    for (i, crop) in page.crop_regions().iter().enumerate() {
        let name = format!("page_{}_{}.png", page_num, i);
        match encode::save_png(crop, &dir.join(&name)).await {
            Ok(()) => names.push(name),
            Err(e) => warn!("Page {}: could not save {}: {}", page_num, name, e),
        }
    }
    debug!("Page {}: saved {} region images", page_num, names.len());
    names
}

async fn run_page(model: &dyn VisionModel, job: PageJob) -> PageResult {
    let start = Instant::now();
    let page_num = job.page_num;

    match model.invoke(job.request).await {
        Ok(reply) => PageResult {
            page_num,
            markdown: postprocess::clean_page(&reply.content, &job.region_images),
            images: job.region_images,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
            retries: reply.retries,
            error: None,
        },
        Err(e) => {
            warn!("Page {}: model call failed: {}", page_num, e);
            PageResult {
                page_num,
                duration_ms: start.elapsed().as_millis() as u64,
                retries: e.retries,
                error: Some(PageError::LlmFailed {
                    page: page_num,
                    retries: e.retries,
                    detail: e.detail,
                }),
                ..PageResult::default()
            }
        }
    }
}

/// Join successful pages in order, separated per `config.page_separator`.
fn assemble_document(pages: &[PageResult], config: &ConversionConfig) -> String {
    let mut doc = String::new();
    for page in pages.iter().filter(|p| p.is_success()) {
        if !doc.is_empty() {
            doc.push_str(&config.page_separator.render(page.page_num));
        }
        doc.push_str(page.markdown.trim_end());
    }
    postprocess::finish_document(&doc)
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), Pdf2MdError> {
    let write_failed = |source| Pdf2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Pick the provider, most specific source first:
///
/// 1. `config.provider`, used as-is;
/// 2. `config.provider_name` with `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. whatever `ProviderFactory::from_env` detects.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2MdError> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(name) = &config.provider_name {
        return create_vision_provider(name, model);
    }

    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    if let (Some(provider), Some(env_model)) = (env("EDGEQUAKE_LLM_PROVIDER"), env("EDGEQUAKE_MODEL")) {
        return create_vision_provider(&provider, &env_model);
    }
    if env("OPENAI_API_KEY").is_some() {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2MdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSeparator;

    fn ok(page_num: usize, md: &str) -> PageResult {
        PageResult {
            page_num,
            markdown: md.to_string(),
            ..PageResult::default()
        }
    }

    #[test]
    fn assembly_skips_failed_pages_and_keeps_order() {
        let pages = vec![
            ok(1, "one\n"),
            PageResult::failed(2, PageError::Cancelled { page: 2 }),
            ok(3, "three\n"),
        ];
        let config = ConversionConfig::default();
        assert_eq!(assemble_document(&pages, &config), "one\n\nthree\n");
    }

    #[test]
    fn assembly_uses_separator() {
        let pages = vec![ok(1, "a\n"), ok(2, "b\n")];
        let config = ConversionConfig {
            page_separator: PageSeparator::Comment,
            ..ConversionConfig::default()
        };
        assert_eq!(assemble_document(&pages, &config), "a\n\n<!-- page 2 -->\n\nb\n");
    }

    #[tokio::test]
    async fn atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.md");
        write_atomic(&path, "# Doc\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Doc\n");
        assert!(!path.with_extension("md.tmp").exists());
    }
}
