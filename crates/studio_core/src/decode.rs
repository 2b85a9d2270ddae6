use std::sync::Arc;

use async_trait::async_trait;
use shared::error::WorkspaceError;
use tracing::debug;

use crate::types::PreviewImage;

pub const DEFAULT_PREVIEW_MAX_DIMENSION: u32 = 1024;

#[async_trait]
pub trait ImageDecoder: Send + Sync {
    async fn decode(&self, file_name: &str, bytes: Arc<[u8]>)
        -> Result<PreviewImage, WorkspaceError>;
}

/// Decodes with the `image` crate on the blocking pool.
pub struct ImageCrateDecoder {
    max_dimension: u32,
}

impl ImageCrateDecoder {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl Default for ImageCrateDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_MAX_DIMENSION)
    }
}

#[async_trait]
impl ImageDecoder for ImageCrateDecoder {
    async fn decode(
        &self,
        file_name: &str,
        bytes: Arc<[u8]>,
    ) -> Result<PreviewImage, WorkspaceError> {
        let max_dimension = self.max_dimension;
        let decoded =
            tokio::task::spawn_blocking(move || decode_preview_image(&bytes, max_dimension))
                .await
                .map_err(|err| WorkspaceError::Decode {
                    file_name: file_name.to_string(),
                    reason: format!("decode task aborted: {err}"),
                })?;

        let preview = decoded.map_err(|reason| WorkspaceError::Decode {
            file_name: file_name.to_string(),
            reason,
        })?;
        debug!(
            file_name,
            width = preview.width,
            height = preview.height,
            "decoded upload preview"
        );
        Ok(preview)
    }
}

pub fn decode_preview_image(bytes: &[u8], max_dimension: u32) -> Result<PreviewImage, String> {
    let dynamic = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let resized = if dynamic.width() > max_dimension || dynamic.height() > max_dimension {
        dynamic.thumbnail(max_dimension, max_dimension)
    } else {
        dynamic
    };
    let rgba = resized.to_rgba8();
    Ok(PreviewImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}
