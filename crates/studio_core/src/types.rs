use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use shared::domain::{ImageId, MessageId, MessageRole};

/// Decoded, display-ready pixels (RGBA8, row-major).
#[derive(Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rgba_len", &self.rgba.len())
            .finish()
    }
}

/// Shared handle to a decoded preview. Cloning never copies pixels.
pub type PreviewHandle = Arc<PreviewImage>;

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub id: ImageId,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub raw: Arc<[u8]>,
    pub preview: PreviewHandle,
}

/// A finished generation. `raw` is the full-resolution encoded image used for
/// export; `preview` is only for display.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub file_name: String,
    pub raw: Arc<[u8]>,
    pub preview: PreviewHandle,
}

impl From<&UploadedImage> for GeneratedImage {
    fn from(image: &UploadedImage) -> Self {
        Self {
            file_name: image.file_name.clone(),
            raw: Arc::clone(&image.raw),
            preview: Arc::clone(&image.preview),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: MessageRole,
    pub prompt: Option<String>,
    pub images: Vec<UploadedImage>,
    pub result: Option<GeneratedImage>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub(crate) fn user(prompt: String, images: Vec<UploadedImage>) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::User,
            prompt: Some(prompt),
            images,
            result: None,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn ai(result: GeneratedImage) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Ai,
            prompt: None,
            images: Vec::new(),
            result: Some(result),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspacePhase {
    Idle,
    Composing,
    Generating,
}

/// Which top-level panel a front-end should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceView {
    Welcome,
    Chat,
}

/// Point-in-time copy of the workspace for rendering.
#[derive(Debug, Clone)]
pub struct WorkspaceSnapshot {
    pub phase: WorkspacePhase,
    pub view: WorkspaceView,
    pub upload_buffer: Vec<UploadedImage>,
    pub prompt: String,
    pub generating: bool,
    pub progress: f32,
    pub history: Vec<ChatMessage>,
    pub project_started: bool,
}

impl WorkspaceSnapshot {
    pub fn progress_percent(&self) -> u8 {
        self.progress.round().clamp(0.0, 100.0) as u8
    }

    pub fn latest_result(&self) -> Option<&GeneratedImage> {
        self.history
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Ai)
            .and_then(|message| message.result.as_ref())
    }
}
