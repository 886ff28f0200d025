use crate::{options::SubscriptionOptions, prelude::*, reading::LocationReading};

/// Opaque identifier of a platform watch, only meaningful to the source that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u32);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
/// Failure reported by the platform location source
pub enum LocationError {
    /// The user or OS refused access to location, the watch is useless until permission changes
    #[error("Unable to get location, permission denied: {0}")]
    PermissionDenied(String),
    /// The platform couldn't determine a position this time around
    #[error("Unable to get location: {0}")]
    PositionUnavailable(String),
    /// A single fix took longer than the configured timeout
    #[error("Location fetch timed out: {0}")]
    Timeout(String),
    #[error("Unknown location error (code {code:?}): {message}")]
    Unknown { code: Option<i32>, message: String },
}

impl LocationError {
    pub const PERMISSION_DENIED: i32 = 1;
    pub const POSITION_UNAVAILABLE: i32 = 2;
    pub const TIMEOUT: i32 = 3;

    /// Map a W3C `GeolocationPositionError` code
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Self::PERMISSION_DENIED => Self::PermissionDenied(message),
            Self::POSITION_UNAVAILABLE => Self::PositionUnavailable(message),
            Self::TIMEOUT => Self::Timeout(message),
            code => Self::Unknown {
                code: Some(code),
                message,
            },
        }
    }

    /// Best effort classification for platforms that only report a message
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") {
            Self::PermissionDenied(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(message)
        } else if lower.contains("unavailable") {
            Self::PositionUnavailable(message)
        } else {
            Self::Unknown {
                code: None,
                message,
            }
        }
    }

    /// Whether this error should tear down the active watch
    pub fn stops_watch(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Reading(LocationReading),
    Error(LocationError),
}

impl From<LocationReading> for WatchEvent {
    fn from(v: LocationReading) -> Self {
        Self::Reading(v)
    }
}

impl From<LocationError> for WatchEvent {
    fn from(v: LocationError) -> Self {
        Self::Error(v)
    }
}

/// Where a source pushes events for one watch. May be called from any thread.
pub type WatchSink = Box<dyn Fn(WatchEvent) + Send + Sync>;

pub trait LocationSource: Send + Sync {
    /// Begin continuous reporting, every fix and failure gets pushed to `sink` until
    /// [LocationSource::clear_watch] is called with the returned handle.
    fn watch(&self, options: SubscriptionOptions, sink: WatchSink) -> Result<WatchHandle>;
    /// Stop a watch, calling this on a handle that was already cleared should do nothing
    fn clear_watch(&self, handle: WatchHandle) -> Result;
}

impl<S: LocationSource + ?Sized> LocationSource for std::sync::Arc<S> {
    fn watch(&self, options: SubscriptionOptions, sink: WatchSink) -> Result<WatchHandle> {
        (**self).watch(options, sink)
    }

    fn clear_watch(&self, handle: WatchHandle) -> Result {
        (**self).clear_watch(handle)
    }
}
