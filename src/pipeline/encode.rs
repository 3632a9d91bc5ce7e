//! Image encoding: PNG bytes for region files, base64 `ImageData` for the
//! model request.
//!
//! PNG is lossless; JPEG artefacts around rendered glyphs hurt recognition
//! far more than the larger payload costs. `detail: "high"` lets GPT-4-class
//! models tile the image instead of downscaling it to a single 512 px tile.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Base64 PNG ready to attach to a vision request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(encode_png(img)?);
    debug!("Encoded {}x{} image → {} bytes base64", img.width(), img.height(), b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Write `img` as a PNG file at `path`.
pub async fn save_png(img: &DynamicImage, path: &Path) -> std::io::Result<()> {
    let bytes = encode_png(img).map_err(std::io::Error::other)?;
    tokio::fs::write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_page_is_base64_png() {
        let data = encode_page(&red(10, 10)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn saved_png_round_trips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crop.png");
        save_png(&red(7, 3), &path).await.unwrap();
        let loaded = image::open(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (7, 3));
    }
}
