use super::*;
use crate::test_support::{png_payload, text_payload, InstantDecoder};
use crate::types::GeneratedImage;
use async_trait::async_trait;
use shared::{domain::MessageRole, error::ErrorCode};
use tokio::sync::broadcast::error::TryRecvError;

fn test_settings() -> StudioSettings {
    StudioSettings {
        database_url: "sqlite::memory:".to_string(),
        progress_seed: Some(11),
        ..StudioSettings::default()
    }
}

fn controller_with_backend(backend: Arc<dyn GenerationBackend>) -> Arc<WorkspaceController> {
    WorkspaceController::new_with_dependencies(
        &test_settings(),
        Arc::new(InstantDecoder),
        backend,
        Arc::new(NoFilePicker),
    )
}

fn simulated_controller() -> Arc<WorkspaceController> {
    controller_with_backend(Arc::new(SimulatedBackend::new(
        test_settings().completion_delay(),
    )))
}

struct FailingBackend;

#[async_trait]
impl GenerationBackend for FailingBackend {
    async fn generate(&self, _request: GenerationRequest) -> Result<GeneratedImage, WorkspaceError> {
        tokio::time::sleep(Duration::from_millis(700)).await;
        Err(WorkspaceError::Backend("model unavailable".to_string()))
    }
}

struct PanickingBackend;

#[async_trait]
impl GenerationBackend for PanickingBackend {
    async fn generate(&self, _request: GenerationRequest) -> Result<GeneratedImage, WorkspaceError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        panic!("model crashed");
    }
}

struct SlowDecoder;

#[async_trait]
impl ImageDecoder for SlowDecoder {
    async fn decode(
        &self,
        file_name: &str,
        bytes: Arc<[u8]>,
    ) -> Result<types::PreviewImage, WorkspaceError> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        InstantDecoder.decode(file_name, bytes).await
    }
}

struct BrokenPicker;

#[async_trait]
impl FilePicker for BrokenPicker {
    async fn pick_files(&self) -> Result<Vec<FilePayload>, WorkspaceError> {
        Err(WorkspaceError::Picker("dialog closed unexpectedly".to_string()))
    }
}

fn drain(rx: &mut broadcast::Receiver<WorkspaceEvent>) -> Vec<WorkspaceEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

async fn collect_until_terminal(rx: &mut broadcast::Receiver<WorkspaceEvent>) -> Vec<WorkspaceEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv().await.expect("event stream open");
        let done = event.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

fn error_notices(events: &[WorkspaceEvent]) -> Vec<&Notice> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkspaceEvent::Notice(notice) if notice.is_error() => Some(notice),
            _ => None,
        })
        .collect()
}

async fn add_one(controller: &Arc<WorkspaceController>, name: &str) -> ImageId {
    let batch = controller.add_images(vec![png_payload(name)]).await;
    let id = batch.accepted[0];
    batch.settled().await;
    id
}

#[tokio::test(start_paused = true)]
async fn starts_idle_with_welcome_view() {
    let controller = simulated_controller();
    assert_eq!(controller.phase().await, WorkspacePhase::Idle);
    assert_eq!(controller.view().await, WorkspaceView::Welcome);
}

#[tokio::test(start_paused = true)]
async fn non_image_upload_is_reported_without_state_change() {
    let controller = simulated_controller();
    let mut rx = controller.subscribe_events();

    let batch = controller.add_images(vec![text_payload("notes.txt")]).await;
    assert!(batch.accepted.is_empty());
    assert_eq!(batch.rejected.len(), 1);
    batch.settled().await;

    let snapshot = controller.snapshot().await;
    assert!(snapshot.upload_buffer.is_empty());
    assert!(!snapshot.project_started);
    assert_eq!(snapshot.view, WorkspaceView::Welcome);

    let events = drain(&mut rx);
    let errors = error_notices(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, Some(ErrorCode::Validation));
}

#[tokio::test(start_paused = true)]
async fn empty_file_list_is_ignored() {
    let controller = simulated_controller();
    let mut rx = controller.subscribe_events();
    let batch = controller.add_images(Vec::new()).await;
    assert!(batch.is_empty());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(controller.phase().await, WorkspacePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn accepted_images_start_the_project() {
    let controller = simulated_controller();
    let mut rx = controller.subscribe_events();

    let batch = controller
        .add_images(vec![png_payload("a.png"), text_payload("b.txt"), png_payload("c.png")])
        .await;
    assert_eq!(batch.accepted.len(), 2);
    assert_eq!(batch.rejected.len(), 1);
    batch.settled().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.upload_buffer.len(), 2);
    assert!(snapshot.project_started);
    assert_eq!(snapshot.view, WorkspaceView::Chat);
    assert_eq!(snapshot.phase, WorkspacePhase::Composing);

    let added = drain(&mut rx)
        .into_iter()
        .filter(|event| matches!(event, WorkspaceEvent::ImageAdded { .. }))
        .count();
    assert_eq!(added, 2);
}

#[tokio::test(start_paused = true)]
async fn decode_failure_is_reported_and_buffer_stays_empty() {
    let controller = simulated_controller();
    let mut rx = controller.subscribe_events();
    let corrupt = FilePayload::new("bad.png", Some("image/png".into()), vec![0xFF, 0x00]);

    controller.add_images(vec![corrupt]).await.settled().await;

    assert!(controller.snapshot().await.upload_buffer.is_empty());
    let events = drain(&mut rx);
    let errors = error_notices(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, Some(ErrorCode::Decode));
}

#[tokio::test(start_paused = true)]
async fn remove_image_drops_matching_entry_only() {
    let controller = simulated_controller();
    let keep = add_one(&controller, "keep.png").await;
    let drop_id = add_one(&controller, "drop.png").await;

    assert!(controller.remove_image(drop_id).await);
    assert!(!controller.remove_image(drop_id).await);

    let buffer = controller.snapshot().await.upload_buffer;
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer[0].id, keep);
}

#[tokio::test(start_paused = true)]
async fn full_cycle_appends_ai_message_with_first_image() {
    let controller = simulated_controller();
    let image_a = add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    let uploaded_a = controller.snapshot().await.upload_buffer[0].clone();

    let mut rx = controller.subscribe_events();
    let request_id = controller.generate().await.expect("generation accepted");

    let during = controller.snapshot().await;
    assert!(during.generating);
    assert_eq!(during.phase, WorkspacePhase::Generating);
    assert!(during.prompt.is_empty());
    assert!(during.upload_buffer.is_empty());
    assert_eq!(during.history.len(), 1);
    assert_eq!(during.history[0].id, request_id);
    assert_eq!(during.history[0].role, MessageRole::User);
    assert_eq!(during.history[0].prompt.as_deref(), Some("enhance"));
    assert_eq!(during.history[0].images.len(), 1);
    assert_eq!(during.history[0].images[0].id, image_a);

    let events = collect_until_terminal(&mut rx).await;

    let progress: Vec<f32> = events
        .iter()
        .filter_map(|event| match event {
            WorkspaceEvent::ProgressUpdated { percent } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(progress.last().copied(), Some(100.0));
    assert!(progress[..progress.len() - 1].iter().all(|p| *p <= 90.0));

    let Some(WorkspaceEvent::GenerationCompleted {
        request_id: completed_request,
        message_id,
        ..
    }) = events.last()
    else {
        panic!("expected completion as final event");
    };
    assert_eq!(*completed_request, request_id);

    let after = controller.snapshot().await;
    assert!(!after.generating);
    assert_eq!(after.progress, 0.0);
    assert_eq!(after.phase, WorkspacePhase::Composing);
    assert_eq!(after.history.len(), 2);
    let ai = &after.history[1];
    assert_eq!(ai.id, *message_id);
    assert_eq!(ai.role, MessageRole::Ai);
    let result = ai.result.as_ref().expect("result handle");
    assert!(Arc::ptr_eq(&result.preview, &uploaded_a.preview));
    assert!(Arc::ptr_eq(&result.raw, &uploaded_a.raw));
    let latest = after.latest_result().expect("latest");
    assert!(Arc::ptr_eq(&latest.preview, &uploaded_a.preview));
}

#[tokio::test(start_paused = true)]
async fn generate_with_empty_buffer_reports_once_and_changes_nothing() {
    let controller = simulated_controller();
    controller.set_prompt("x").await;
    let mut rx = controller.subscribe_events();

    let err = controller.generate().await.expect_err("empty buffer");
    assert_eq!(err, WorkspaceError::EmptyBuffer);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.prompt, "x");
    assert!(snapshot.history.is_empty());
    assert!(!snapshot.generating);
    assert_eq!(error_notices(&drain(&mut rx)).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn generate_with_blank_prompt_keeps_buffer() {
    let controller = simulated_controller();
    add_one(&controller, "a.png").await;
    controller.set_prompt("  ").await;

    let err = controller.generate().await.expect_err("blank prompt");
    assert_eq!(err, WorkspaceError::EmptyPrompt);
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.upload_buffer.len(), 1);
    assert!(snapshot.history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_generate_while_busy_is_rejected() {
    let controller = simulated_controller();
    add_one(&controller, "a.png").await;
    controller.set_prompt("first").await;
    controller.generate().await.expect("first accepted");

    add_one(&controller, "b.png").await;
    controller.set_prompt("second").await;
    let mut rx = controller.subscribe_events();

    let err = controller.generate().await.expect_err("busy");
    assert_eq!(err, WorkspaceError::AlreadyGenerating);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.upload_buffer.len(), 1);
    assert_eq!(snapshot.prompt, "second");
    let events = drain(&mut rx);
    let errors = error_notices(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, Some(ErrorCode::Busy));
}

#[tokio::test(start_paused = true)]
async fn reset_during_generation_commits_no_result() {
    let controller = simulated_controller();
    add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    controller.generate().await.expect("accepted");

    tokio::time::sleep(Duration::from_millis(1000)).await;
    controller.reset().await;
    let mut rx = controller.subscribe_events();

    tokio::time::sleep(Duration::from_secs(10)).await;

    let snapshot = controller.snapshot().await;
    assert!(!snapshot.generating);
    assert_eq!(snapshot.progress, 0.0);
    assert!(snapshot.history.is_empty());
    assert!(snapshot.upload_buffer.is_empty());
    assert!(snapshot.prompt.is_empty());
    assert!(!snapshot.project_started);
    assert_eq!(snapshot.phase, WorkspacePhase::Idle);
    assert_eq!(snapshot.view, WorkspaceView::Welcome);
    assert!(drain(&mut rx).is_empty(), "cancelled job must stay silent");
}

#[tokio::test(start_paused = true)]
async fn reset_during_finalize_delay_commits_no_result() {
    let controller = simulated_controller();
    add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    let mut rx = controller.subscribe_events();
    controller.generate().await.expect("accepted");

    tokio::time::sleep(Duration::from_millis(3200)).await;
    let before_reset = drain(&mut rx);
    let last_progress = before_reset.iter().rev().find_map(|event| match event {
        WorkspaceEvent::ProgressUpdated { percent } => Some(*percent),
        _ => None,
    });
    assert_eq!(last_progress, Some(100.0));
    assert!(!before_reset
        .iter()
        .any(|event| matches!(event, WorkspaceEvent::GenerationCompleted { .. })));

    controller.reset().await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let after_reset = drain(&mut rx);
    assert!(!after_reset.iter().any(|event| matches!(
        event,
        WorkspaceEvent::GenerationCompleted { .. } | WorkspaceEvent::ProgressUpdated { .. }
    )));
    let snapshot = controller.snapshot().await;
    assert!(snapshot.history.is_empty());
    assert!(!snapshot.generating);
    assert_eq!(snapshot.progress, 0.0);
}

#[tokio::test(start_paused = true)]
async fn reset_emits_cleared_notice() {
    let controller = simulated_controller();
    let mut rx = controller.subscribe_events();
    controller.reset().await;
    let events = drain(&mut rx);
    assert_eq!(events[0], WorkspaceEvent::WorkspaceReset);
    assert_eq!(
        events[1],
        WorkspaceEvent::Notice(Notice::info("Workspace cleared"))
    );
}

#[tokio::test(start_paused = true)]
async fn decode_finishing_after_reset_is_dropped() {
    let controller = WorkspaceController::new_with_dependencies(
        &test_settings(),
        Arc::new(SlowDecoder),
        Arc::new(SimulatedBackend::default()),
        Arc::new(NoFilePicker),
    );

    let batch = controller.add_images(vec![png_payload("late.png")]).await;
    controller.reset().await;
    batch.settled().await;

    let snapshot = controller.snapshot().await;
    assert!(snapshot.upload_buffer.is_empty());
    assert!(!snapshot.project_started);
}

#[tokio::test(start_paused = true)]
async fn backend_failure_returns_to_composing_without_ai_message() {
    let controller = controller_with_backend(Arc::new(FailingBackend));
    add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    let mut rx = controller.subscribe_events();

    let request_id = controller.generate().await.expect("accepted");
    let events = collect_until_terminal(&mut rx).await;

    assert!(matches!(
        events.last(),
        Some(WorkspaceEvent::GenerationFailed { request_id: failed, .. }) if *failed == request_id
    ));
    let snapshot = controller.snapshot().await;
    assert!(!snapshot.generating);
    assert_eq!(snapshot.progress, 0.0);
    assert_eq!(snapshot.phase, WorkspacePhase::Composing);
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.history[0].role, MessageRole::User);

    let trailing = drain(&mut rx);
    let errors = error_notices(&trailing);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, Some(ErrorCode::Backend));
}

#[tokio::test(start_paused = true)]
async fn progress_holds_at_ceiling_while_backend_is_slow() {
    let controller = controller_with_backend(Arc::new(SimulatedBackend::new(Duration::from_secs(60))));
    add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    controller.generate().await.expect("accepted");

    tokio::time::sleep(Duration::from_secs(20)).await;
    let snapshot = controller.snapshot().await;
    assert!(snapshot.generating);
    assert_eq!(snapshot.progress, 90.0);
    assert_eq!(snapshot.progress_percent(), 90);
}

#[tokio::test(start_paused = true)]
async fn project_stays_started_after_generation_cycle() {
    let controller = simulated_controller();
    add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    let mut rx = controller.subscribe_events();
    controller.generate().await.expect("accepted");
    collect_until_terminal(&mut rx).await;

    let snapshot = controller.snapshot().await;
    assert!(snapshot.project_started);
    assert_eq!(snapshot.view, WorkspaceView::Chat);
}

#[tokio::test(start_paused = true)]
async fn picker_failure_is_reported() {
    let controller = WorkspaceController::new_with_dependencies(
        &test_settings(),
        Arc::new(InstantDecoder),
        Arc::new(SimulatedBackend::default()),
        Arc::new(BrokenPicker),
    );
    let mut rx = controller.subscribe_events();

    let batch = controller.pick_images().await;
    assert!(batch.accepted.is_empty());
    assert!(matches!(batch.rejected[0], WorkspaceError::Picker(_)));
    let events = drain(&mut rx);
    assert_eq!(error_notices(&events)[0].code, Some(ErrorCode::Picker));
}

#[tokio::test(start_paused = true)]
async fn empty_picker_selection_is_ignored() {
    let controller = simulated_controller();
    let batch = controller.pick_images().await;
    assert!(batch.is_empty());
    assert_eq!(controller.phase().await, WorkspacePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn panicking_backend_fails_the_job_and_frees_the_workspace() {
    let controller = controller_with_backend(Arc::new(PanickingBackend));
    add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    let mut rx = controller.subscribe_events();

    let request_id = controller.generate().await.expect("accepted");
    let events = collect_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(WorkspaceEvent::GenerationFailed { request_id: failed, .. }) if *failed == request_id
    ));

    let snapshot = controller.snapshot().await;
    assert!(!snapshot.generating);
    assert_eq!(snapshot.phase, WorkspacePhase::Composing);
    assert_eq!(snapshot.history.len(), 1);
    let errors = drain(&mut rx);
    assert_eq!(error_notices(&errors)[0].code, Some(ErrorCode::Backend));

    add_one(&controller, "b.png").await;
    controller.set_prompt("again").await;
    controller
        .generate()
        .await
        .expect("workspace accepts a new submission");
}

#[tokio::test(start_paused = true)]
async fn infinite_increment_setting_still_completes() {
    let settings = StudioSettings {
        max_increment: f32::INFINITY,
        ..test_settings()
    };
    let controller = WorkspaceController::new_with_dependencies(
        &settings,
        Arc::new(InstantDecoder),
        Arc::new(SimulatedBackend::new(settings.completion_delay())),
        Arc::new(NoFilePicker),
    );
    add_one(&controller, "a.png").await;
    controller.set_prompt("enhance").await;
    let mut rx = controller.subscribe_events();
    controller.generate().await.expect("accepted");

    let events = collect_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(WorkspaceEvent::GenerationCompleted { .. })
    ));
    let snapshot = controller.snapshot().await;
    assert!(!snapshot.generating);
    assert_eq!(snapshot.history.len(), 2);
}
