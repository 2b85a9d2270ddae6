use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

use crate::{decode::DEFAULT_PREVIEW_MAX_DIMENSION, progress::ProgressCurve};

pub const DEFAULT_CONFIG_FILE: &str = "perfectframe.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StudioSettings {
    pub database_url: String,
    pub tick_interval_ms: u64,
    pub max_increment: f32,
    pub hold_at: f32,
    pub completion_delay_ms: u64,
    pub finalize_delay_ms: u64,
    pub preview_max_dimension: u32,
    pub event_capacity: usize,
    pub progress_seed: Option<u64>,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            tick_interval_ms: 200,
            max_increment: 15.0,
            hold_at: 90.0,
            completion_delay_ms: 3000,
            finalize_delay_ms: 500,
            preview_max_dimension: DEFAULT_PREVIEW_MAX_DIMENSION,
            event_capacity: 256,
            progress_seed: None,
        }
    }
}

impl StudioSettings {
    /// Out-of-range values are clamped; non-finite ones fall back to the defaults.
    pub fn progress_curve(&self) -> ProgressCurve {
        let defaults = ProgressCurve::default();
        ProgressCurve {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            max_increment: finite_or(self.max_increment, defaults.max_increment).max(0.0),
            hold_at: finite_or(self.hold_at, defaults.hold_at).clamp(0.0, 100.0),
        }
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn finalize_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_delay_ms)
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn default_database_url() -> String {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    let path = base.join("perfectframe").join("preferences.db");
    format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
}

/// Defaults, then the TOML file (if present), then `APP__*` environment overrides.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<StudioSettings> {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<StudioSettings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && config_path.is_none() => {
            StudioSettings::default()
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    };

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn apply_env_overrides(settings: &mut StudioSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__TICK_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.tick_interval_ms = v;
    }
    if let Some(v) = var("APP__MAX_INCREMENT").and_then(|v| v.parse().ok()) {
        settings.max_increment = v;
    }
    if let Some(v) = var("APP__HOLD_AT").and_then(|v| v.parse().ok()) {
        settings.hold_at = v;
    }
    if let Some(v) = var("APP__COMPLETION_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.completion_delay_ms = v;
    }
    if let Some(v) = var("APP__FINALIZE_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.finalize_delay_ms = v;
    }
    if let Some(v) = var("APP__PREVIEW_MAX_DIMENSION").and_then(|v| v.parse().ok()) {
        settings.preview_max_dimension = v;
    }
    if let Some(v) = var("APP__EVENT_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.event_capacity = v;
    }
    if let Some(v) = var("APP__PROGRESS_SEED").and_then(|v| v.parse().ok()) {
        settings.progress_seed = Some(v);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
