//! Fixtures shared by unit tests across modules.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{domain::FilePayload, error::WorkspaceError};

use crate::{decode::ImageDecoder, types::PreviewImage};

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub(crate) fn png_payload(name: &str) -> FilePayload {
    FilePayload::new(name, Some("image/png".to_string()), png_bytes(2, 2))
}

pub(crate) fn text_payload(name: &str) -> FilePayload {
    FilePayload::new(name, Some("text/plain".to_string()), b"hello".to_vec())
}

/// Decoder that never touches the blocking pool, so paused-clock tests stay
/// deterministic. Payloads whose first byte is `0xFF` fail to decode.
pub(crate) struct InstantDecoder;

#[async_trait]
impl ImageDecoder for InstantDecoder {
    async fn decode(
        &self,
        file_name: &str,
        bytes: Arc<[u8]>,
    ) -> Result<PreviewImage, WorkspaceError> {
        if bytes.first() == Some(&0xFF) {
            return Err(WorkspaceError::Decode {
                file_name: file_name.to_string(),
                reason: "corrupt header".to_string(),
            });
        }
        Ok(PreviewImage {
            width: 1,
            height: 1,
            rgba: vec![bytes.len() as u8, 0, 0, 255],
        })
    }
}
