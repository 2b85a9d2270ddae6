use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::ThemeMode;
use storage::Storage;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub const THEME_PREFERENCE_KEY: &str = "theme";

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl PreferenceStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_preference(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_preference(key, value).await
    }
}

/// Process-local store, for tests and hosts without a data directory.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The theme flag: read once at startup, persisted on every change.
pub struct ThemePreferences {
    store: Arc<dyn PreferenceStore>,
    current: RwLock<ThemeMode>,
}

impl ThemePreferences {
    pub async fn init(store: Arc<dyn PreferenceStore>) -> Result<Self> {
        let stored = store.get(THEME_PREFERENCE_KEY).await?;
        let mode = ThemeMode::from_stored(stored.as_deref());
        info!(theme = %mode, persisted = stored.is_some(), "theme preference loaded");
        Ok(Self {
            store,
            current: RwLock::new(mode),
        })
    }

    pub async fn current(&self) -> ThemeMode {
        *self.current.read().await
    }

    pub async fn toggle(&self) -> Result<ThemeMode> {
        let mut guard = self.current.write().await;
        let next = guard.toggled();
        self.store.set(THEME_PREFERENCE_KEY, next.as_str()).await?;
        *guard = next;
        info!(theme = %next, "theme toggled");
        Ok(next)
    }

    pub async fn set(&self, mode: ThemeMode) -> Result<()> {
        let mut guard = self.current.write().await;
        self.store.set(THEME_PREFERENCE_KEY, mode.as_str()).await?;
        *guard = mode;
        Ok(())
    }
}
