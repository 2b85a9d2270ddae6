use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Busy,
    Decode,
    Backend,
    Picker,
    Storage,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("'{file_name}' is not an image file")]
    NonImageFile {
        file_name: String,
        mime_type: Option<String>,
    },
    #[error("upload at least one image before generating")]
    EmptyBuffer,
    #[error("enter a description prompt before generating")]
    EmptyPrompt,
    #[error("a generation is already in progress")]
    AlreadyGenerating,
    #[error("failed to decode '{file_name}': {reason}")]
    Decode { file_name: String, reason: String },
    #[error("generation failed: {0}")]
    Backend(String),
    #[error("file picker failed: {0}")]
    Picker(String),
}

impl WorkspaceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NonImageFile { .. } | Self::EmptyBuffer | Self::EmptyPrompt => {
                ErrorCode::Validation
            }
            Self::AlreadyGenerating => ErrorCode::Busy,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::Backend(_) => ErrorCode::Backend,
            Self::Picker(_) => ErrorCode::Picker,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A transient user-visible notification. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            code: None,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            code: None,
            message: message.into(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl From<&WorkspaceError> for Notice {
    fn from(value: &WorkspaceError) -> Self {
        Self::error(value.code(), value.to_string())
    }
}

impl From<WorkspaceError> for Notice {
    fn from(value: WorkspaceError) -> Self {
        Self::from(&value)
    }
}
