use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::ThemeMode,
    error::{Notice, NoticeLevel},
    protocol::WorkspaceEvent,
};
use storage::Storage;
use studio_core::{
    config::{load_settings, StudioSettings},
    export::export_result,
    picker::PathFilePicker,
    theme::ThemePreferences,
    WorkspaceController,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "perfectframe", about = "Headless PerfectFrame studio")]
struct Cli {
    /// Settings file; defaults to ./perfectframe.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit images with a prompt and save the result.
    Generate {
        #[arg(long = "image", required = true)]
        images: Vec<PathBuf>,
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Print every workspace event as a JSON line.
        #[arg(long)]
        json: bool,
    },
    Theme {
        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
}

#[derive(Subcommand, Debug)]
enum ThemeAction {
    Show,
    Toggle,
    Set { mode: ThemeMode },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    match cli.command {
        Command::Generate {
            images,
            prompt,
            out,
            json,
        } => run_generate(&settings, images, prompt, out, json).await,
        Command::Theme { action } => {
            run_theme(&settings, action.unwrap_or(ThemeAction::Show)).await
        }
    }
}

async fn run_generate(
    settings: &StudioSettings,
    images: Vec<PathBuf>,
    prompt: String,
    out: PathBuf,
    json: bool,
) -> Result<()> {
    let controller =
        WorkspaceController::new_with_picker(settings, Arc::new(PathFilePicker::new(images)));
    let mut events = controller.subscribe_events();

    let batch = controller.pick_images().await;
    let rejected = batch.rejected.len();
    batch.settled().await;
    if controller.snapshot().await.upload_buffer.is_empty() {
        drain_pending(&mut events, json)?;
        bail!("no usable images to submit ({rejected} rejected)");
    }

    controller.set_prompt(prompt).await;
    let request_id = controller.generate().await?;
    info!(%request_id, "waiting for generation");

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event reader fell behind");
                continue;
            }
            Err(RecvError::Closed) => bail!("workspace event stream closed"),
        };
        report(&event, json)?;
        match event {
            WorkspaceEvent::GenerationCompleted { request_id: id, .. } if id == request_id => break,
            WorkspaceEvent::GenerationFailed {
                request_id: id,
                reason,
            } if id == request_id => bail!("generation failed: {reason}"),
            _ => {}
        }
    }

    let snapshot = controller.snapshot().await;
    let result = snapshot
        .latest_result()
        .context("generation finished without a result")?;
    let path = export_result(result, &out).await?;
    println!("saved {}", path.display());
    Ok(())
}

fn drain_pending(
    events: &mut tokio::sync::broadcast::Receiver<WorkspaceEvent>,
    json: bool,
) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        report(&event, json)?;
    }
    Ok(())
}

fn report(event: &WorkspaceEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        WorkspaceEvent::ImageAdded { file_name, .. } => println!("added {file_name}"),
        WorkspaceEvent::GenerationStarted { image_count, .. } => {
            println!("generating from {image_count} image(s)")
        }
        WorkspaceEvent::ProgressUpdated { percent } => println!("progress {percent:.0}%"),
        WorkspaceEvent::Notice(notice) => print_notice(notice),
        _ => {}
    }
    Ok(())
}

fn print_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Error => eprintln!("error: {}", notice.message),
        NoticeLevel::Info | NoticeLevel::Success => println!("{}", notice.message),
    }
}

async fn run_theme(settings: &StudioSettings, action: ThemeAction) -> Result<()> {
    let storage = Storage::new(&settings.database_url).await?;
    storage
        .health_check()
        .await
        .context("preference database is not usable")?;
    let prefs = ThemePreferences::init(Arc::new(storage)).await?;
    let mode = match action {
        ThemeAction::Show => prefs.current().await,
        ThemeAction::Toggle => prefs.toggle().await?,
        ThemeAction::Set { mode } => {
            prefs.set(mode).await?;
            mode
        }
    };
    println!("theme={mode}");
    Ok(())
}
