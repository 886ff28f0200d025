mod options;
mod reading;
mod record;
mod source;
mod storage;
#[cfg(test)]
mod tests;
mod watcher;

pub use options::{PartialSubscriptionOptions, SubscriptionOptions};
pub use reading::{Coordinates, LocationReading, UtcDT};
pub use record::{RecordError, decode_record, encode_record};
pub use source::{LocationError, LocationSource, WatchEvent, WatchHandle, WatchSink};
pub use storage::{KeyValueStore, MemoryStore};
pub use watcher::{LocationWatcher, Observer, STORAGE_KEY, create_watcher, observer};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
