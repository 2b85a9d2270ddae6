use std::{sync::Arc, time::Duration};

use shared::{
    domain::{FilePayload, ImageId, MessageId},
    error::{Notice, WorkspaceError},
    protocol::WorkspaceEvent,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::{AbortHandle, JoinHandle},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod backend;
pub mod config;
pub mod decode;
pub mod export;
pub mod picker;
pub mod progress;
pub mod state;
pub mod theme;
pub mod types;

#[cfg(test)]
mod test_support;

use backend::{GenerationBackend, GenerationRequest, SimulatedBackend};
use config::StudioSettings;
use decode::{ImageCrateDecoder, ImageDecoder};
use picker::{FilePicker, NoFilePicker};
use progress::{ProgressCurve, ProgressSimulator};
use state::{GenerationJob, JobToken, WorkspaceState};
use types::{UploadedImage, WorkspacePhase, WorkspaceSnapshot, WorkspaceView};

/// Outcome of one `add_images` call. Decodes keep running in the background;
/// `settled` waits for all of them.
#[derive(Debug, Default)]
pub struct IntakeBatch {
    pub accepted: Vec<ImageId>,
    pub rejected: Vec<WorkspaceError>,
    tasks: Vec<JoinHandle<()>>,
}

impl IntakeBatch {
    fn failed(err: WorkspaceError) -> Self {
        Self {
            rejected: vec![err],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty()
    }

    pub async fn settled(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!("image intake task ended abnormally: {err}");
            }
        }
    }
}

struct ActiveGeneration {
    token: JobToken,
    cancel: CancellationToken,
    abort: AbortHandle,
}

/// Owns the workspace state and drives intake, generation and reset.
pub struct WorkspaceController {
    decoder: Arc<dyn ImageDecoder>,
    backend: Arc<dyn GenerationBackend>,
    picker: Arc<dyn FilePicker>,
    curve: ProgressCurve,
    finalize_delay: Duration,
    progress_seed: Option<u64>,
    inner: Mutex<WorkspaceState>,
    active_generation: Mutex<Option<ActiveGeneration>>,
    events: broadcast::Sender<WorkspaceEvent>,
}

impl WorkspaceController {
    pub fn new(settings: &StudioSettings) -> Arc<Self> {
        Self::new_with_picker(settings, Arc::new(NoFilePicker))
    }

    pub fn new_with_picker(settings: &StudioSettings, picker: Arc<dyn FilePicker>) -> Arc<Self> {
        Self::new_with_dependencies(
            settings,
            Arc::new(ImageCrateDecoder::new(settings.preview_max_dimension)),
            Arc::new(SimulatedBackend::new(settings.completion_delay())),
            picker,
        )
    }

    pub fn new_with_dependencies(
        settings: &StudioSettings,
        decoder: Arc<dyn ImageDecoder>,
        backend: Arc<dyn GenerationBackend>,
        picker: Arc<dyn FilePicker>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Arc::new(Self {
            decoder,
            backend,
            picker,
            curve: settings.progress_curve(),
            finalize_delay: settings.finalize_delay(),
            progress_seed: settings.progress_seed,
            inner: Mutex::new(WorkspaceState::new()),
            active_generation: Mutex::new(None),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WorkspaceSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn view(&self) -> WorkspaceView {
        self.inner.lock().await.view()
    }

    pub async fn phase(&self) -> WorkspacePhase {
        self.inner.lock().await.phase()
    }

    /// Validates and starts decoding each payload. Non-image payloads are
    /// reported and skipped; accepted ones land in the buffer in the order their
    /// decodes finish.
    pub async fn add_images(self: &Arc<Self>, files: Vec<FilePayload>) -> IntakeBatch {
        let mut batch = IntakeBatch::default();
        let mut accepted = Vec::with_capacity(files.len());
        for file in files {
            if file.is_image() {
                accepted.push(file);
                continue;
            }
            let err = WorkspaceError::NonImageFile {
                file_name: file.file_name,
                mime_type: file.mime_type,
            };
            debug!("rejected upload: {err}");
            self.notify(Notice::from(&err));
            batch.rejected.push(err);
        }

        if accepted.is_empty() {
            return batch;
        }

        let session = {
            let mut state = self.inner.lock().await;
            state.mark_project_started();
            state.session()
        };

        for file in accepted {
            let image_id = ImageId::new();
            batch.accepted.push(image_id);
            let controller = Arc::clone(self);
            batch.tasks.push(tokio::spawn(async move {
                controller.finish_intake(session, image_id, file).await;
            }));
        }
        batch
    }

    pub async fn pick_images(self: &Arc<Self>) -> IntakeBatch {
        match self.picker.pick_files().await {
            Ok(files) => self.add_images(files).await,
            Err(err) => {
                warn!("file picker failed: {err}");
                self.notify(Notice::from(&err));
                IntakeBatch::failed(err)
            }
        }
    }

    async fn finish_intake(&self, session: u64, image_id: ImageId, file: FilePayload) {
        let FilePayload {
            file_name,
            mime_type,
            bytes,
        } = file;
        let raw: Arc<[u8]> = Arc::from(bytes);

        let decoded = self.decoder.decode(&file_name, Arc::clone(&raw)).await;
        let mut state = self.inner.lock().await;
        if state.session() != session {
            debug!(%image_id, file_name = %file_name, "dropping decode from a reset workspace");
            return;
        }

        match decoded {
            Ok(preview) => {
                state.push_image(UploadedImage {
                    id: image_id,
                    file_name: file_name.clone(),
                    mime_type,
                    raw,
                    preview: Arc::new(preview),
                });
                drop(state);
                info!(%image_id, file_name = %file_name, "image added to upload buffer");
                self.emit(WorkspaceEvent::ImageAdded {
                    image_id,
                    file_name,
                });
                self.notify(Notice::success("Image uploaded successfully"));
            }
            Err(err) => {
                drop(state);
                warn!(%image_id, "image decode failed: {err}");
                self.notify(Notice::from(&err));
            }
        }
    }

    pub async fn remove_image(&self, image_id: ImageId) -> bool {
        let removed = self.inner.lock().await.remove_image(image_id);
        if removed {
            self.emit(WorkspaceEvent::ImageRemoved { image_id });
        }
        removed
    }

    pub async fn set_prompt(&self, text: impl Into<String>) {
        self.inner.lock().await.set_prompt(text);
        self.emit(WorkspaceEvent::PromptChanged);
    }

    /// Submits the current prompt and upload buffer. Returns the id of the
    /// recorded user message; the result arrives later as events.
    pub async fn generate(self: &Arc<Self>) -> Result<MessageId, WorkspaceError> {
        let mut active = self.active_generation.lock().await;
        let started = self.inner.lock().await.begin_generation();
        let job = match started {
            Ok(job) => job,
            Err(err) => {
                debug!("generate rejected: {err}");
                self.notify(Notice::from(&err));
                return Err(err);
            }
        };

        let request_id = job.request_id;
        info!(
            %request_id,
            image_count = job.images.len(),
            "generation started"
        );
        self.emit(WorkspaceEvent::GenerationStarted {
            message_id: request_id,
            image_count: job.images.len(),
        });

        let token = job.token;
        let cancel = CancellationToken::new();
        let controller = Arc::clone(self);
        let worker = tokio::spawn({
            let cancel = cancel.clone();
            async move { controller.run_generation(job, cancel).await }
        });
        *active = Some(ActiveGeneration {
            token,
            cancel,
            abort: worker.abort_handle(),
        });
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.supervise_generation(token, request_id, worker).await;
        });
        Ok(request_id)
    }

    /// A generation task that dies without reporting still owes one failure.
    async fn supervise_generation(
        &self,
        token: JobToken,
        request_id: MessageId,
        worker: JoinHandle<()>,
    ) {
        let Err(err) = worker.await else {
            return;
        };
        if err.is_panic() {
            error!(%request_id, "generation task panicked");
            let failure = WorkspaceError::Backend("generation task panicked".to_string());
            self.fail_job(token, request_id, &failure).await;
        }
        self.release_job(token).await;
    }

    async fn run_generation(&self, job: GenerationJob, cancel: CancellationToken) {
        let GenerationJob {
            token,
            request_id,
            prompt,
            images,
        } = job;

        let mut simulator = ProgressSimulator::new(self.curve, self.progress_seed);
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.curve.tick_interval,
            self.curve.tick_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let generation = self.backend.generate(GenerationRequest {
            request_id,
            prompt,
            images,
        });
        tokio::pin!(generation);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%request_id, "generation cancelled");
                    return;
                }
                outcome = &mut generation => break outcome,
                _ = ticker.tick(), if !simulator.is_holding() => {
                    let value = simulator.tick();
                    self.publish_progress(token, value).await;
                }
            }
        };

        match outcome {
            Ok(result) => {
                self.publish_progress(token, 100.0).await;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(%request_id, "generation cancelled before result was recorded");
                        return;
                    }
                    _ = tokio::time::sleep(self.finalize_delay) => {}
                }

                let completed = self.inner.lock().await.complete_generation(token, result);
                if let Some(message_id) = completed {
                    info!(%request_id, %message_id, "generation completed");
                    self.emit(WorkspaceEvent::GenerationCompleted {
                        request_id,
                        message_id,
                        completed_at: chrono::Utc::now(),
                    });
                    self.notify(Notice::success("Image generation completed!"));
                }
            }
            Err(err) => {
                warn!(%request_id, "generation failed: {err}");
                self.fail_job(token, request_id, &err).await;
            }
        }

        self.release_job(token).await;
    }

    async fn fail_job(&self, token: JobToken, request_id: MessageId, err: &WorkspaceError) {
        let failed = self.inner.lock().await.fail_generation(token);
        if failed {
            self.emit(WorkspaceEvent::GenerationFailed {
                request_id,
                reason: err.to_string(),
            });
            self.notify(Notice::from(err));
        }
    }

    async fn release_job(&self, token: JobToken) {
        let mut active = self.active_generation.lock().await;
        if active.as_ref().map(|a| a.token) == Some(token) {
            *active = None;
        }
    }

    async fn publish_progress(&self, token: JobToken, value: f32) {
        let applied = self.inner.lock().await.apply_progress(token, value);
        if let Some(percent) = applied {
            self.emit(WorkspaceEvent::ProgressUpdated { percent });
        }
    }

    /// Cancels any in-flight generation and returns to the empty welcome state.
    pub async fn reset(&self) {
        let mut active = self.active_generation.lock().await;
        if let Some(generation) = active.take() {
            generation.cancel.cancel();
            generation.abort.abort();
        }
        self.inner.lock().await.reset();
        drop(active);

        info!("workspace reset");
        self.emit(WorkspaceEvent::WorkspaceReset);
        self.notify(Notice::info("Workspace cleared"));
    }

    fn emit(&self, event: WorkspaceEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, notice: Notice) {
        self.emit(WorkspaceEvent::Notice(notice));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
