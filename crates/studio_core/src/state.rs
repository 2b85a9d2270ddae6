//! The workspace state machine: upload buffer, prompt, generation flag and chat history.
//!
//! Everything here is synchronous. The controller applies these transitions under its
//! lock, and the tokens below let late async callbacks detect that the state moved on.

use shared::{
    domain::{ImageId, MessageId},
    error::WorkspaceError,
};

use crate::types::{
    ChatMessage, GeneratedImage, UploadedImage, WorkspacePhase, WorkspaceSnapshot, WorkspaceView,
};

/// Identifies one generation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobToken(u64);

/// Work handed to the generation task when a submission is accepted.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub token: JobToken,
    pub request_id: MessageId,
    pub prompt: String,
    pub images: Vec<UploadedImage>,
}

#[derive(Debug, Default)]
pub struct WorkspaceState {
    upload_buffer: Vec<UploadedImage>,
    prompt: String,
    generating: bool,
    progress: f32,
    history: Vec<ChatMessage>,
    project_started: bool,
    session: u64,
    next_job: u64,
    active_job: Option<JobToken>,
}

impl WorkspaceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped by every reset; async intake tagged with an older value is stale.
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn upload_buffer(&self) -> &[UploadedImage] {
        &self.upload_buffer
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn project_started(&self) -> bool {
        self.project_started
    }

    pub fn mark_project_started(&mut self) {
        self.project_started = true;
    }

    pub fn push_image(&mut self, image: UploadedImage) {
        self.project_started = true;
        self.upload_buffer.push(image);
    }

    pub fn remove_image(&mut self, id: ImageId) -> bool {
        let before = self.upload_buffer.len();
        self.upload_buffer.retain(|image| image.id != id);
        self.upload_buffer.len() != before
    }

    pub fn set_prompt(&mut self, text: impl Into<String>) {
        self.prompt = text.into();
    }

    pub fn begin_generation(&mut self) -> Result<GenerationJob, WorkspaceError> {
        if self.generating {
            return Err(WorkspaceError::AlreadyGenerating);
        }
        if self.upload_buffer.is_empty() {
            return Err(WorkspaceError::EmptyBuffer);
        }
        if self.prompt.trim().is_empty() {
            return Err(WorkspaceError::EmptyPrompt);
        }

        let prompt = std::mem::take(&mut self.prompt);
        let images = std::mem::take(&mut self.upload_buffer);
        let message = ChatMessage::user(prompt.clone(), images.clone());
        let request_id = message.id;
        self.history.push(message);

        self.next_job += 1;
        let token = JobToken(self.next_job);
        self.active_job = Some(token);
        self.generating = true;
        self.progress = 0.0;
        self.project_started = true;

        Ok(GenerationJob {
            token,
            request_id,
            prompt,
            images,
        })
    }

    /// Raises progress for the active job. Returns the new value, or `None` when
    /// the job is stale or the value would not move progress forward.
    pub fn apply_progress(&mut self, job: JobToken, value: f32) -> Option<f32> {
        if self.active_job != Some(job) {
            return None;
        }
        let next = value.clamp(0.0, 100.0);
        if next <= self.progress {
            return None;
        }
        self.progress = next;
        Some(next)
    }

    pub fn complete_generation(
        &mut self,
        job: JobToken,
        result: GeneratedImage,
    ) -> Option<MessageId> {
        if self.active_job != Some(job) {
            return None;
        }
        let message = ChatMessage::ai(result);
        let id = message.id;
        self.history.push(message);
        self.finish_job();
        Some(id)
    }

    pub fn fail_generation(&mut self, job: JobToken) -> bool {
        if self.active_job != Some(job) {
            return false;
        }
        self.finish_job();
        true
    }

    fn finish_job(&mut self) {
        self.active_job = None;
        self.generating = false;
        self.progress = 0.0;
    }

    pub fn reset(&mut self) {
        let session = self.session.wrapping_add(1);
        let next_job = self.next_job;
        *self = Self {
            session,
            next_job,
            ..Self::default()
        };
    }

    pub fn view(&self) -> WorkspaceView {
        if !self.project_started && self.history.is_empty() {
            WorkspaceView::Welcome
        } else {
            WorkspaceView::Chat
        }
    }

    pub fn phase(&self) -> WorkspacePhase {
        if self.generating {
            WorkspacePhase::Generating
        } else if !self.project_started
            && self.history.is_empty()
            && self.upload_buffer.is_empty()
            && self.prompt.is_empty()
        {
            WorkspacePhase::Idle
        } else {
            WorkspacePhase::Composing
        }
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            phase: self.phase(),
            view: self.view(),
            upload_buffer: self.upload_buffer.clone(),
            prompt: self.prompt.clone(),
            generating: self.generating,
            progress: self.progress,
            history: self.history.clone(),
            project_started: self.project_started,
        }
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
