use anyhow::Result;
use geoloc_logic::{
    LocationReading, LocationWatcher, Observer, PartialSubscriptionOptions, create_watcher,
    observer,
};
use log::error;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Wry};
use tauri_specta::Event;

use crate::{location::TauriLocation, store::TauriStore};

/// A new location was received, contains it and the location before it
#[derive(Serialize, Deserialize, Clone, Debug, specta::Type, tauri_specta::Event)]
pub struct LocationUpdate {
    pub current: LocationReading,
    pub previous: Option<LocationReading>,
}

pub type AppWatcher = LocationWatcher<TauriLocation<Wry>, TauriStore<Wry>>;

/// Managed state, the app's watcher and the observer that forwards readings to the UI
pub struct AppLocation {
    watcher: AppWatcher,
    ui_observer: Observer,
}

impl AppLocation {
    pub fn new(app: &AppHandle, options: PartialSubscriptionOptions) -> Result<Self> {
        let store = TauriStore::open(app)?;
        let watcher = create_watcher(TauriLocation::new(app.clone()), store, options);

        let ui_observer = observer({
            let app = app.clone();
            move |current, previous| {
                let update = LocationUpdate {
                    current: *current,
                    previous: previous.copied(),
                };
                if let Err(why) = update.emit(&app) {
                    error!("Error sending location update to UI: {why:?}");
                }
            }
        });

        Ok(Self {
            watcher,
            ui_observer,
        })
    }

    /// The underlying watcher, Rust code in the host app can subscribe its own observers here
    pub fn watcher(&self) -> &AppWatcher {
        &self.watcher
    }

    pub fn start_ui_updates(&self) {
        self.watcher.subscribe(&self.ui_observer);
    }

    pub fn stop_ui_updates(&self) {
        self.watcher.unsubscribe(&self.ui_observer);
    }
}
