use std::time::Duration;

use async_trait::async_trait;
use shared::{domain::MessageId, error::WorkspaceError};
use tracing::info;

use crate::types::{GeneratedImage, UploadedImage};

pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: MessageId,
    pub prompt: String,
    pub images: Vec<UploadedImage>,
}

/// Image completion service. Each call must resolve to exactly one result or
/// one failure; the controller handles cancellation by dropping the future.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImage, WorkspaceError>;
}

/// Stand-in backend: waits a fixed latency and echoes the first submitted image,
/// original bytes included.
pub struct SimulatedBackend {
    latency: Duration,
}

impl SimulatedBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETION_DELAY)
    }
}

#[async_trait]
impl GenerationBackend for SimulatedBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImage, WorkspaceError> {
        tokio::time::sleep(self.latency).await;
        let first = request.images.first().ok_or_else(|| {
            WorkspaceError::Backend("request contained no images".to_string())
        })?;
        info!(
            request_id = %request.request_id,
            image_count = request.images.len(),
            prompt_len = request.prompt.len(),
            "simulated generation finished"
        );
        Ok(GeneratedImage::from(first))
    }
}
