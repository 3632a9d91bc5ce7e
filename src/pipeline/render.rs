//! PDF rasterisation and region detection via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. All pdfium work therefore runs on
//! tokio's blocking pool, one task per document.
//!
//! ## Pixel budget
//!
//! Pages are rendered at `dpi`, but the longest edge never exceeds
//! `max_rendered_pixels`: an A0 poster at 150 DPI would otherwise produce a
//! 7,000 × 10,000 px image.
//!
//! ## Regions
//!
//! In [`RenderMode::Regions`] every text, path and image object on the page
//! becomes a candidate rectangle for [`crate::layout::cluster_regions`]. The
//! clustered regions are cropped out of the rendered bitmap; PDF space has
//! its origin at the bottom-left, so the y axis is flipped on the way.

use crate::config::{ConversionConfig, RegionConfig, RenderMode};
use crate::error::{PageError, Pdf2MdError};
use crate::geometry::Rect;
use crate::layout::{classify_text, cluster_regions, reading_order, RegionKind, TaggedRegion};
use crate::output::DocumentMetadata;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PDF points per inch.
const POINTS_PER_INCH: f64 = 72.0;

/// One rasterised page plus its detected regions.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 0-indexed page number.
    pub page_index: usize,
    pub image: DynamicImage,
    /// Page size in PDF points.
    pub page_width: f64,
    pub page_height: f64,
    /// Regions in reading order, in PDF points. Empty in full-page mode.
    pub regions: Vec<Rect>,
}

impl RenderedPage {
    /// Crop every region out of the page bitmap, in reading order.
    ///
    /// Regions that fall entirely outside the bitmap are skipped.
    pub fn crop_regions(&self) -> Vec<DynamicImage> {
        self.regions
            .iter()
            .filter_map(|r| crop_region(&self.image, self.page_width, self.page_height, r))
            .collect()
    }
}

/// Rasterise selected pages of a PDF.
///
/// Returns `Err` only when the document cannot be opened. A page that fails
/// to render yields `Err(PageError::RenderFailed)` in its slot.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ConversionConfig,
    page_indices: &[usize],
) -> Result<Vec<Result<RenderedPage, PageError>>, Pdf2MdError> {
    let job = RenderJob {
        path: pdf_path.to_path_buf(),
        password: config.password.clone(),
        dpi: config.dpi,
        max_pixels: config.max_rendered_pixels,
        regions: (config.render_mode == RenderMode::Regions).then(|| config.regions.clone()),
        indices: page_indices.to_vec(),
    };

    tokio::task::spawn_blocking(move || job.run())
        .await
        .map_err(|e| Pdf2MdError::Internal(format!("Render task panicked: {}", e)))?
}

/// Extract document metadata without rendering pages.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2MdError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| Pdf2MdError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Everything the blocking render thread needs, owned.
struct RenderJob {
    path: PathBuf,
    password: Option<String>,
    dpi: u32,
    max_pixels: u32,
    /// `Some` in region mode.
    regions: Option<RegionConfig>,
    indices: Vec<usize>,
}

impl RenderJob {
    fn run(self) -> Result<Vec<Result<RenderedPage, PageError>>, Pdf2MdError> {
        let pdfium = bind()?;
        let document = open(&pdfium, &self.path, self.password.as_deref())?;
        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages", total);

        let mut rendered = Vec::with_capacity(self.indices.len());
        for &idx in &self.indices {
            let result = if idx >= total {
                Err(format!("page out of range (document has {total} pages)"))
            } else {
                pages
                    .get(idx as u16)
                    .map_err(|e| format!("{:?}", e))
                    .and_then(|page| self.render_one(idx, &page))
            };
            rendered.push(result.map_err(|detail| {
                warn!("Page {}: render failed: {}", idx + 1, detail);
                PageError::RenderFailed {
                    page: idx + 1,
                    detail,
                }
            }));
        }
        Ok(rendered)
    }

    fn render_one(&self, idx: usize, page: &PdfPage) -> Result<RenderedPage, String> {
        let page_width = page.width().value as f64;
        let page_height = page.height().value as f64;
        let scale = render_scale(page_width, page_height, self.dpi, self.max_pixels);
        let width_px = (page_width * scale).round().max(1.0) as i32;
        let height_px = (page_height * scale).round().max(1.0) as i32;

        let render_config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_maximum_height(height_px);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?;
        let image = bitmap.as_image();

        let regions = match &self.regions {
            Some(cfg) => reading_order(cluster_regions(&page_candidates(page), cfg)),
            None => Vec::new(),
        };

        debug!(
            "Rendered page {} → {}x{} px, {} regions",
            idx + 1,
            image.width(),
            image.height(),
            regions.len()
        );

        Ok(RenderedPage {
            page_index: idx,
            image,
            page_width,
            page_height,
            regions,
        })
    }
}

fn bind() -> Result<Pdfium, Pdf2MdError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| Pdf2MdError::PdfiumBindingFailed(e.to_string()))
}

fn open<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2MdError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                Pdf2MdError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                Pdf2MdError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            Pdf2MdError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        }
    })
}

/// Candidate rectangles for clustering, one per page object.
fn page_candidates(page: &PdfPage) -> Vec<TaggedRegion> {
    let mut candidates = Vec::new();
    for object in page.objects().iter() {
        let kind = match object.object_type() {
            PdfPageObjectType::Text => object
                .as_text_object()
                .map(|text| classify_text(&text.text()))
                .unwrap_or(RegionKind::TextSmall),
            PdfPageObjectType::Path | PdfPageObjectType::Shading | PdfPageObjectType::XObjectForm => {
                RegionKind::Drawing
            }
            PdfPageObjectType::Image => RegionKind::Image,
            _ => continue,
        };
        let Ok(bounds) = object.bounds() else {
            continue;
        };
        let rect = Rect::from_corners(
            bounds.left().value as f64,
            bounds.bottom().value as f64,
            bounds.right().value as f64,
            bounds.top().value as f64,
        );
        candidates.push(TaggedRegion::new(rect, kind));
    }
    candidates
}

/// Pixels per PDF point for a page of `width × height` points.
fn render_scale(width: f64, height: f64, dpi: u32, max_pixels: u32) -> f64 {
    let scale = dpi as f64 / POINTS_PER_INCH;
    let longest = width.max(height);
    if longest <= 0.0 {
        return scale;
    }
    scale.min(max_pixels as f64 / longest)
}

/// Cut `region` (PDF points, y up) out of `image` (pixels, y down).
fn crop_region(image: &DynamicImage, page_width: f64, page_height: f64, region: &Rect) -> Option<DynamicImage> {
    if page_width <= 0.0 || page_height <= 0.0 {
        return None;
    }
    let (img_w, img_h) = (image.width() as f64, image.height() as f64);
    let sx = img_w / page_width;
    let sy = img_h / page_height;

    let left = (region.x0 * sx).floor().clamp(0.0, img_w);
    let right = (region.x1 * sx).ceil().clamp(0.0, img_w);
    let top = ((page_height - region.y1) * sy).floor().clamp(0.0, img_h);
    let bottom = ((page_height - region.y0) * sy).ceil().clamp(0.0, img_h);

    if right <= left || bottom <= top {
        return None;
    }
    Some(image.crop_imm(
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2MdError> {
    let pdfium = bind()?;
    let document = open(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
