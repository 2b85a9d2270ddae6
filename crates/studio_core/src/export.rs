use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageFormat;
use tracing::info;

use crate::types::GeneratedImage;

/// File name every downloaded result is saved under.
pub const RESULT_FILE_NAME: &str = "perfectframe-ai-result.jpg";

const JPEG_QUALITY: u8 = 90;

/// Encodes the full-resolution result as JPEG. JPEG sources pass through untouched.
pub fn encode_result_jpeg(result: &GeneratedImage) -> Result<Vec<u8>> {
    if matches!(image::guess_format(&result.raw), Ok(ImageFormat::Jpeg)) {
        return Ok(result.raw.to_vec());
    }

    let decoded = image::load_from_memory(&result.raw)
        .with_context(|| format!("failed to decode result '{}'", result.file_name))?;
    // JPEG has no alpha channel.
    let rgb = decoded.to_rgb8();

    let mut out = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .context("failed to encode result as JPEG")?;
    Ok(out.into_inner())
}

/// Writes the result into `dir` under [`RESULT_FILE_NAME`], replacing any previous export.
pub async fn export_result(result: &GeneratedImage, dir: &Path) -> Result<PathBuf> {
    let source = result.clone();
    let bytes = tokio::task::spawn_blocking(move || encode_result_jpeg(&source))
        .await
        .context("result encoding task aborted")??;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create export directory '{}'", dir.display()))?;

    let path = dir.join(RESULT_FILE_NAME);
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("failed to write result to '{}'", path.display()))?;
    info!(path = %path.display(), size_bytes = bytes.len(), "exported generation result");
    Ok(path)
}
