use anyhow::{Context, Result};
use geoloc_logic::{
    Coordinates, LocationError, LocationReading, LocationSource, SubscriptionOptions, WatchEvent,
    WatchHandle, WatchSink,
};
use tauri::{AppHandle, Runtime};
use tauri_plugin_geolocation::{GeolocationExt, Position, PositionOptions};

/// [LocationSource] backed by the OS through `tauri-plugin-geolocation`
pub struct TauriLocation<R: Runtime>(AppHandle<R>);

impl<R: Runtime> TauriLocation<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self(app)
    }
}

fn to_reading(pos: Position) -> LocationReading {
    let coords = pos.coords;
    LocationReading {
        timestamp: pos.timestamp,
        coords: Coordinates {
            latitude: coords.latitude,
            longitude: coords.longitude,
            accuracy: coords.accuracy,
            speed: coords.speed,
            heading: coords.heading,
            altitude: coords.altitude,
            altitude_accuracy: coords.altitude_accuracy,
        },
    }
}

impl<R: Runtime> LocationSource for TauriLocation<R> {
    fn watch(&self, options: SubscriptionOptions, sink: WatchSink) -> Result<WatchHandle> {
        let options = PositionOptions {
            enable_high_accuracy: options.enable_high_accuracy,
            timeout: options.timeout,
            maximum_age: options.maximum_age,
        };

        let id = self
            .0
            .geolocation()
            .watch_position(options, move |event| match event {
                tauri_plugin_geolocation::WatchEvent::Position(pos) => {
                    sink(WatchEvent::Reading(to_reading(pos)))
                }
                // The plugin only hands us the message
                tauri_plugin_geolocation::WatchEvent::Error(msg) => {
                    sink(WatchEvent::Error(LocationError::classify(msg)))
                }
            })
            .context("Failed to start watching position")?;

        Ok(WatchHandle(id))
    }

    fn clear_watch(&self, handle: WatchHandle) -> Result<()> {
        self.0
            .geolocation()
            .clear_watch(handle.0)
            .context("Failed to clear position watch")
    }
}
