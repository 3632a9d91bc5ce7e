//! Input resolution: turn a path, URL or byte buffer into a local PDF file.
//!
//! pdfium opens documents from the file system, so downloads and in-memory
//! buffers are spilled to a temp directory that lives as long as the
//! [`ResolvedInput`]. The `%PDF` magic is checked up front so a wrong file
//! fails with [`Pdf2MdError::NotAPdf`] instead of a pdfium parse error.

use crate::error::Pdf2MdError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A local PDF file, possibly backed by a temp directory.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// Downloaded or spilled bytes; the directory is removed on drop.
    Temporary { path: PathBuf, _dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Temporary { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or HTTP(S) URL to a local PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2MdError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Write `bytes` to a temp file after checking the PDF magic.
pub async fn spill_bytes(bytes: &[u8]) -> Result<ResolvedInput, Pdf2MdError> {
    let dir = TempDir::new().map_err(|e| Pdf2MdError::Internal(format!("tempdir: {e}")))?;
    let path = dir.path().join("input.pdf");
    check_magic(&path, bytes)?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Pdf2MdError::Internal(format!("Failed to write temp file: {}", e)))?;
    Ok(ResolvedInput::Temporary { path, _dir: dir })
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2MdError> {
    let path = path.to_path_buf();
    if !path.exists() {
        return Err(Pdf2MdError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2MdError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2MdError::FileNotFound { path }),
    };

    let mut head = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|e| Pdf2MdError::Internal(format!("read {}: {e}", path.display())))?;
    check_magic(&path, &head)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Fails unless `head` starts with `%PDF`. Empty files fail too.
fn check_magic(path: &Path, head: &[u8]) -> Result<(), Pdf2MdError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(Pdf2MdError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2MdError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| Pdf2MdError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let dir = TempDir::new().map_err(|e| Pdf2MdError::Internal(e.to_string()))?;
    let path = dir.path().join(filename_from_url(url));
    check_magic(&path, &bytes)?;
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| Pdf2MdError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Temporary { path, _dir: dir })
}

/// Last path segment when it looks like a file name, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_comes_from_last_segment() {
        assert_eq!(filename_from_url("https://x.org/papers/2401.pdf"), "2401.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = resolve_local(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2MdError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected_with_magic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04zip").unwrap();
        match resolve_local(f.path()).unwrap_err() {
            Pdf2MdError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_not_a_pdf() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            resolve_local(f.path()).unwrap_err(),
            Pdf2MdError::NotAPdf { magic: [0, 0, 0, 0], .. }
        ));
    }

    #[test]
    fn pdf_header_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        let resolved = resolve_local(f.path()).unwrap();
        assert_eq!(resolved.path(), f.path());
    }

    #[tokio::test]
    async fn spilled_bytes_live_until_drop() {
        let resolved = spill_bytes(b"%PDF-1.4\n%%EOF").await.unwrap();
        let path = resolved.path().to_path_buf();
        assert!(path.exists());
        drop(resolved);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn spilling_garbage_fails() {
        assert!(spill_bytes(b"hello").await.is_err());
    }
}
