use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        mpsc::{self, Receiver, Sender},
    },
};

use anyhow::bail;

use crate::{
    Coordinates, KeyValueStore, LocationError, LocationReading, LocationSource, MemoryStore,
    Observer, SubscriptionOptions, WatchEvent, WatchHandle, WatchSink, decode_record, observer,
    prelude::*,
};

type SharedSink = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Location source that records every call and lets tests push events by hand
#[derive(Default)]
pub struct MockSource {
    next_id: AtomicU32,
    watch_calls: AtomicU32,
    clear_calls: AtomicU32,
    fail_watch: AtomicBool,
    deny_on_watch: AtomicBool,
    last_options: Mutex<Option<SubscriptionOptions>>,
    active: Mutex<HashMap<u32, SharedSink>>,
    retired: Mutex<HashMap<u32, SharedSink>>,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next call to `watch` fail
    pub fn fail_next_watch(&self) {
        self.fail_watch.store(true, Ordering::SeqCst);
    }

    /// Report permission denied from inside the next call to `watch`, before it returns
    pub fn deny_on_watch(&self) {
        self.deny_on_watch.store(true, Ordering::SeqCst);
    }

    pub fn watch_calls(&self) -> u32 {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> u32 {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn active_watches(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub fn last_options(&self) -> Option<SubscriptionOptions> {
        *self.last_options.lock().unwrap()
    }

    /// Push an event to every running watch
    pub fn push(&self, event: impl Into<WatchEvent>) {
        let event = event.into();
        let sinks = self.active.lock().unwrap().values().cloned().collect::<Vec<_>>();
        for sink in sinks {
            sink(event.clone());
        }
    }

    /// Push an event through watches that were already cleared, like a platform that's slow to
    /// stop would
    pub fn push_stale(&self, event: impl Into<WatchEvent>) {
        let event = event.into();
        let sinks = self.retired.lock().unwrap().values().cloned().collect::<Vec<_>>();
        for sink in sinks {
            sink(event.clone());
        }
    }
}

impl LocationSource for MockSource {
    fn watch(&self, options: SubscriptionOptions, sink: WatchSink) -> Result<WatchHandle> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options);

        if self.fail_watch.swap(false, Ordering::SeqCst) {
            bail!("Mock watch failure");
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sink: SharedSink = Arc::from(sink);
        self.active.lock().unwrap().insert(id, sink.clone());

        if self.deny_on_watch.swap(false, Ordering::SeqCst) {
            sink(LocationError::PermissionDenied("Denied on start".to_string()).into());
        }

        Ok(WatchHandle(id))
    }

    fn clear_watch(&self, handle: WatchHandle) -> Result {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = self.active.lock().unwrap().remove(&handle.0) {
            self.retired.lock().unwrap().insert(handle.0, sink);
        }
        Ok(())
    }
}

/// Wraps [MockSource], the first call to `watch` registers the watch and then blocks until
/// released. Tracks the most watches that were ever running at once.
pub struct GatedSource {
    pub mock: Arc<MockSource>,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    max_active: AtomicUsize,
}

impl GatedSource {
    /// Returns the source, a receiver that fires once `watch` is blocked, and the sender that
    /// lets it return
    pub fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let source = Self {
            mock: MockSource::new(),
            gate: Mutex::new(Some((entered_tx, release_rx))),
            max_active: AtomicUsize::new(0),
        };
        (Arc::new(source), entered_rx, release_tx)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl LocationSource for GatedSource {
    fn watch(&self, options: SubscriptionOptions, sink: WatchSink) -> Result<WatchHandle> {
        let handle = self.mock.watch(options, sink)?;
        self.max_active.fetch_max(self.mock.active_watches(), Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }

        Ok(handle)
    }

    fn clear_watch(&self, handle: WatchHandle) -> Result {
        self.mock.clear_watch(handle)
    }
}

/// [MemoryStore] that also keeps every value it was ever given, in order
#[derive(Default)]
pub struct RecordingStore {
    store: MemoryStore,
    writes: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn written_readings(&self) -> Vec<LocationReading> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|raw| decode_record(raw).unwrap())
            .collect()
    }
}

impl KeyValueStore for RecordingStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key)
    }

    fn set(&self, key: &str, value: String) -> Result {
        self.writes.lock().unwrap().push(value.clone());
        self.store.set(key, value)
    }

    fn remove(&self, key: &str) -> Result {
        self.store.remove(key)
    }
}

/// Store where every operation fails
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        bail!("Mock store can't read")
    }

    fn set(&self, _key: &str, _value: String) -> Result {
        bail!("Mock store can't write")
    }

    fn remove(&self, _key: &str) -> Result {
        bail!("Mock store can't remove")
    }
}

pub type Calls = Arc<Mutex<Vec<(LocationReading, Option<LocationReading>)>>>;

/// Observer that remembers everything it was called with
pub fn recorder() -> (Observer, Calls) {
    let calls = Calls::default();
    let obs = observer({
        let calls = calls.clone();
        move |current, previous| {
            calls.lock().unwrap().push((*current, previous.copied()));
        }
    });
    (obs, calls)
}

pub fn reading(timestamp: u64, lat: f64, long: f64, accuracy: f64) -> LocationReading {
    LocationReading::new(timestamp, Coordinates::new(lat, long, accuracy))
}
