mod location;
mod state;
mod store;

use geoloc_logic::{LocationReading, PartialSubscriptionOptions, SubscriptionOptions};
use log::LevelFilter;
use tauri::{Manager, State, Wry};
use tauri_specta::{ErrorHandlingMode, collect_commands, collect_events};

use std::result::Result as StdResult;

pub use location::TauriLocation;
pub use state::{AppLocation, AppWatcher, LocationUpdate};
pub use store::TauriStore;

type Result<T = (), E = String> = StdResult<T, E>;

#[tauri::command]
#[specta::specta]
/// Get the most recent location, this may have been saved by a previous run of the app
fn get_saved_location(state: State<'_, AppLocation>) -> Option<LocationReading> {
    state.watcher().saved_location()
}

#[tauri::command]
#[specta::specta]
/// Get the location received right before the one returned by `get_saved_location`
fn get_previous_location(state: State<'_, AppLocation>) -> Option<LocationReading> {
    state.watcher().previous_location()
}

#[tauri::command]
#[specta::specta]
/// Check if the device's location is currently being watched
fn is_watching(state: State<'_, AppLocation>) -> bool {
    state.watcher().watching()
}

#[tauri::command]
#[specta::specta]
/// Get the options passed to the OS when watching location
fn get_subscription_options(state: State<'_, AppLocation>) -> SubscriptionOptions {
    state.watcher().options()
}

#[tauri::command]
#[specta::specta]
/// Set the options used the next time location watching starts, unset keys use their defaults
fn configure(state: State<'_, AppLocation>, options: PartialSubscriptionOptions) {
    state.watcher().configure(options);
}

#[tauri::command]
#[specta::specta]
/// Start receiving [LocationUpdate] events, does nothing if they're already being sent
fn start_location_updates(state: State<'_, AppLocation>) {
    state.start_ui_updates();
}

#[tauri::command]
#[specta::specta]
/// Stop receiving [LocationUpdate] events, location watching stops if nothing else needs it
fn stop_location_updates(state: State<'_, AppLocation>) {
    state.stop_ui_updates();
}

#[tauri::command]
#[specta::specta]
/// Remove the saved location from storage
fn forget_saved_location(state: State<'_, AppLocation>) -> Result {
    state
        .watcher()
        .forget_saved_location()
        .map_err(|err| err.to_string())
}

pub fn mk_specta() -> tauri_specta::Builder {
    tauri_specta::Builder::<Wry>::new()
        .error_handling(ErrorHandlingMode::Throw)
        .commands(collect_commands![
            get_saved_location,
            get_previous_location,
            is_watching,
            get_subscription_options,
            configure,
            start_location_updates,
            stop_location_updates,
            forget_saved_location,
        ])
        .events(collect_events![LocationUpdate])
}

/// Add the plugins, commands and managed [AppLocation] to `builder`. This takes the builder's
/// setup hook. `options` are merged over [SubscriptionOptions::default].
pub fn register(
    builder: tauri::Builder<Wry>,
    options: PartialSubscriptionOptions,
) -> tauri::Builder<Wry> {
    let specta = mk_specta();

    builder
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(LevelFilter::Debug)
                .build(),
        )
        .plugin(tauri_plugin_geolocation::init())
        .plugin(tauri_plugin_store::Builder::default().build())
        .invoke_handler(specta.invoke_handler())
        .setup(move |app| {
            specta.mount_events(app);

            let location = AppLocation::new(app.handle(), options)?;
            app.manage(location);
            Ok(())
        })
}
