use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ImageId, MessageId},
    error::Notice,
};

/// State-change notifications published by the workspace controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkspaceEvent {
    ImageAdded {
        image_id: ImageId,
        file_name: String,
    },
    ImageRemoved {
        image_id: ImageId,
    },
    PromptChanged,
    GenerationStarted {
        message_id: MessageId,
        image_count: usize,
    },
    ProgressUpdated {
        percent: f32,
    },
    GenerationCompleted {
        request_id: MessageId,
        message_id: MessageId,
        completed_at: DateTime<Utc>,
    },
    GenerationFailed {
        request_id: MessageId,
        reason: String,
    },
    WorkspaceReset,
    Notice(Notice),
}

impl WorkspaceEvent {
    /// True for the events that end a generation cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::GenerationCompleted { .. } | Self::GenerationFailed { .. }
        )
    }
}
