//! CLI binary for layout-pdf2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, drives a progress bar from the progress events and
//! prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use layout_pdf2md::{
    convert, convert_to_file, inspect, CancelHandle, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, PageSelection, PageSeparator, ProgressCallback, ProgressState,
    RenderMode, TaskStatus,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress bar fed by ProgressState events ─────────────────────────────────

/// Spinner until `Starting` arrives, then a page counter. `Running` moves
/// the bar; `Finished` clears it.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }
}

impl ConversionProgressCallback for CliProgress {
    fn on_progress(&self, state: ProgressState) {
        match state.task_status {
            TaskStatus::Starting => {
                self.activate_bar(state.total);
                self.bar.println(format!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!("Starting conversion of {} pages…", state.total))
                ));
            }
            TaskStatus::Running => {
                self.bar.set_position(state.current as u64);
                if state.current == state.total {
                    self.bar.set_prefix("Headings");
                }
            }
            TaskStatus::Finished => self.bar.finish_and_clear(),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (stdout)
  pdf2md document.pdf

  # Convert to file
  pdf2md document.pdf -o output.md

  # Crop figures and tables into separate images next to the Markdown
  pdf2md --mode regions paper.pdf -o out/paper.md

  # Specific pages, no heading correction
  pdf2md --pages 1-5 --no-heading-fix paper.pdf -o paper.md

  # Use a specific model
  pdf2md --model gpt-4.1 --provider openai document.pdf

  # Convert from URL
  pdf2md https://arxiv.org/pdf/1706.03762 -o attention.md

  # Inspect PDF metadata (no API key needed)
  pdf2md --inspect-only document.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Convert PDF files and URLs to Markdown using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md",
    version,
    about = "Convert PDF files and URLs to Markdown using Vision LLMs",
    long_about = "Convert PDF documents (local files or URLs) to Markdown using Vision Language \
Models, either page by page or with figures and tables cropped into separate images. Heading \
levels are reconciled across the whole document after all pages are converted.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "PDF2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// full: one image per page. regions: crop figures/tables to files.
    #[arg(long, env = "PDF2MD_MODE", value_enum, default_value = "full")]
    mode: ModeArg,

    /// Directory for region images. Default: next to --output, else ".".
    #[arg(long, env = "PDF2MD_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// Skip the document-wide heading level correction.
    #[arg(long, env = "PDF2MD_NO_HEADING_FIX")]
    no_heading_fix: bool,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2MD_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of concurrent VLM API calls.
    #[arg(short, long, env = "PDF2MD_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2MD_PAGES", default_value = "all")]
    pages: String,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, env = "PDF2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2MD_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom page prompt.
    #[arg(long, env = "PDF2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "PDF2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "PDF2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page LLM call timeout in seconds (0 disables).
    #[arg(long, env = "PDF2MD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Full,
    Regions,
}

impl From<ModeArg> for RenderMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Full => RenderMode::FullPage,
            ModeArg::Regions => RenderMode::Regions,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    ensure_pdfium(cli.quiet)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let cancel = CancelHandle::new();
    let config = build_config(&cli, progress, cancel.clone()).await?;

    // Ctrl-C stops scheduling new pages and drops in-flight calls.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} cancelling…", cyan("◆"));
            cancel.cancel();
        }
    });

    // ── Run conversion ───────────────────────────────────────────────────
    let output = match &cli.output {
        Some(path) => convert_to_file(&cli.input, path, &config).await,
        None => convert(&cli.input, &config).await,
    }
    .context("Conversion failed")?;

    if cli.output.is_none() {
        if cli.json {
            let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let mut handle = io::stdout().lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet {
        print_summary(&output, cli.output.as_deref());
    }
    Ok(())
}

/// Make sure libpdfium is available, downloading it with a progress bar on
/// first use.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                bar.set_length(t);
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn print_summary(output: &ConversionOutput, written_to: Option<&Path>) {
    let stats = &output.stats;
    for err in output.page_errors() {
        eprintln!("  {} {}", red("✗"), err);
    }
    eprintln!(
        "{}  {}/{} pages  {} regions  {}ms{}",
        if stats.failed_pages == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.processed_pages,
        stats.total_pages,
        stats.total_regions,
        stats.total_duration_ms,
        written_to
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default(),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out  {}",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
        if stats.headings_corrected {
            dim("headings corrected")
        } else {
            String::new()
        },
    );
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelHandle,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .render_mode(cli.mode.into())
        .correct_headings(!cli.no_heading_fix)
        .pages(parse_pages(&cli.pages)?)
        .page_separator(parse_separator(&cli.separator))
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .cancel(cancel);

    if let Some(dir) = image_dir(cli) {
        builder = builder.image_dir(dir);
    }
    if let Some(path) = &cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(password) = &cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Region images go where the Markdown refers to them by bare name.
fn image_dir(cli: &Cli) -> Option<PathBuf> {
    if let Some(dir) = &cli.image_dir {
        return Some(dir.clone());
    }
    if !matches!(cli.mode, ModeArg::Regions) {
        return None;
    }
    let beside_output = cli
        .output
        .as_deref()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty());
    Some(beside_output.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")))
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();
    if s == "all" {
        return Ok(PageSelection::All);
    }

    let page_num = |p: &str| -> Result<usize> {
        let n: usize = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
        if n < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", n);
        }
        Ok(n)
    };

    if let Some((start, end)) = s.split_once('-') {
        let (start, end) = (page_num(start)?, page_num(end)?);
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }
    if s.contains(',') {
        let pages = s.split(',').map(page_num).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }
    Ok(PageSelection::Single(page_num(&s)?))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_parse() {
        assert!(matches!(parse_pages("all").unwrap(), PageSelection::All));
        assert!(matches!(parse_pages("5").unwrap(), PageSelection::Single(5)));
        assert!(matches!(parse_pages("3-15").unwrap(), PageSelection::Range(3, 15)));
        match parse_pages("1, 3,5").unwrap() {
            PageSelection::Set(v) => assert_eq!(v, vec![1, 3, 5]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("9-2").is_err());
        assert!(parse_pages("x").is_err());
    }

    #[test]
    fn separator_parse_keeps_custom_case() {
        assert!(matches!(parse_separator("HR"), PageSeparator::HorizontalRule));
        match parse_separator("<Page>") {
            PageSeparator::Custom(s) => assert_eq!(s, "<Page>"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn region_images_default_next_to_output() {
        let cli = Cli::parse_from(["pdf2md", "--mode", "regions", "-o", "out/doc.md", "in.pdf"]);
        assert_eq!(image_dir(&cli), Some(PathBuf::from("out")));
        let cli = Cli::parse_from(["pdf2md", "--mode", "regions", "in.pdf"]);
        assert_eq!(image_dir(&cli), Some(PathBuf::from(".")));
        let cli = Cli::parse_from(["pdf2md", "in.pdf"]);
        assert_eq!(image_dir(&cli), None);
    }
}
