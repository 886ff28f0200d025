use std::sync::Arc;

use anyhow::{Context, Result};
use geoloc_logic::KeyValueStore;
use serde_json::Value;
use tauri::{AppHandle, Runtime};
use tauri_plugin_store::{Store, StoreExt};

const STORE_NAME: &str = "location.json";

/// [KeyValueStore] persisted to disk through `tauri-plugin-store`
pub struct TauriStore<R: Runtime>(Arc<Store<R>>);

impl<R: Runtime> TauriStore<R> {
    pub fn open(app: &AppHandle<R>) -> Result<Self> {
        app.store(STORE_NAME)
            .map(Self)
            .context("Failed to open location store")
    }
}

impl<R: Runtime> KeyValueStore for TauriStore<R> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        // Anything that isn't a string gets handed back as raw JSON and fails to decode upstream
        Ok(self.0.get(key).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        }))
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.0.set(key, Value::String(value));
        self.0.save().context("Failed to save location store")
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.0.delete(key);
        self.0.save().context("Failed to save location store")
    }
}
