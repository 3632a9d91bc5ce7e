//! End-to-end tests against real PDFs and a live model.
//!
//! Gated behind `E2E_ENABLED` and the presence of the sample files in
//! `./test_cases/`, so a plain `cargo test` skips them.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use layout_pdf2md::{
    convert, convert_from_bytes, convert_to_file, inspect, ConversionConfig, PageSelection,
    PageSeparator, Pdf2MdError, RenderMode,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED is set and the PDF at `path` exists.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn assert_markdown_quality(md: &str, context: &str) {
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    assert!(md.ends_with('\n'), "[{context}] Markdown must end with a newline");
    assert!(
        !md.lines().next().unwrap_or("").starts_with("```"),
        "[{context}] Output must not start with a code fence"
    );
    assert!(!md.contains("\n\n\n"), "[{context}] Output has runs of blank lines");
    println!("[{context}] ✓  {} bytes", md.len());
}

fn paper() -> PathBuf {
    test_cases_dir().join("attention_is_all_you_need.pdf")
}

// ── Input errors (no pdfium, no model) ───────────────────────────────────────

#[tokio::test]
async fn missing_file_is_reported() {
    let err = convert("/definitely/not/a/real/file.pdf", &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::FileNotFound { .. }));
}

#[tokio::test]
async fn non_pdf_bytes_are_rejected() {
    let err = convert_from_bytes(b"hello, world", &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::NotAPdf { .. }));
}

// ── Live ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn inspect_reports_page_count() {
    let path = e2e_skip_unless_ready!(paper());
    let meta = inspect(path.to_str().unwrap()).await.expect("inspect should succeed");
    assert_eq!(meta.page_count, 15);
    assert!(!meta.pdf_version.is_empty());
}

#[tokio::test]
async fn full_page_conversion_of_first_pages() {
    let path = e2e_skip_unless_ready!(paper());
    let config = ConversionConfig::builder()
        .pages(PageSelection::Range(1, 2))
        .page_separator(PageSeparator::HorizontalRule)
        .build()
        .unwrap();

    let out = convert(path.to_str().unwrap(), &config).await.expect("conversion");

    assert_markdown_quality(&out.markdown, "full-page");
    assert_eq!(out.stats.total_pages, 2);
    assert!(out.markdown.contains("---"));
    assert!(out.markdown.lines().any(|l| l.starts_with('#')));
}

#[tokio::test]
async fn region_conversion_writes_referenced_images() {
    let path = e2e_skip_unless_ready!(paper());
    let dir = tempfile::tempdir().unwrap();
    let md_path = dir.path().join("paper.md");
    let config = ConversionConfig::builder()
        .render_mode(RenderMode::Regions)
        .image_dir(dir.path())
        .pages(PageSelection::Single(3))
        .build()
        .unwrap();

    let out = convert_to_file(path.to_str().unwrap(), &md_path, &config)
        .await
        .expect("conversion");

    assert_markdown_quality(&out.markdown, "regions");
    assert_eq!(std::fs::read_to_string(&md_path).unwrap(), out.markdown);
    for name in out.pages.iter().flat_map(|p| &p.images) {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }
    println!("[regions] {} regions detected", out.stats.total_regions);
}
