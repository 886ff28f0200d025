use std::{
    mem,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, error, warn};

use crate::{
    options::{PartialSubscriptionOptions, SubscriptionOptions},
    prelude::*,
    reading::LocationReading,
    record::{decode_record, encode_record},
    source::{LocationError, LocationSource, WatchEvent, WatchHandle, WatchSink},
    storage::KeyValueStore,
};

/// Key the latest reading is persisted under, the rest of the store isn't ours
pub const STORAGE_KEY: &str = "pos";

/// Callback notified with `(current, previous)` on every new reading. Two observers are the same
/// observer only if they point to the same allocation.
pub type Observer = Arc<dyn Fn(&LocationReading, Option<&LocationReading>) + Send + Sync>;

pub fn observer(
    f: impl Fn(&LocationReading, Option<&LocationReading>) + Send + Sync + 'static,
) -> Observer {
    Arc::new(f)
}

/// What to do with a watch once the source hands back its handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterStart {
    Activate,
    /// Every observer left while starting
    Clear,
    /// Permission was denied while starting
    Deny,
    /// Denied while starting, then a new observer showed up
    Restart,
}

impl AfterStart {
    fn subscribed(self) -> Self {
        match self {
            Self::Clear => Self::Activate,
            Self::Deny => Self::Restart,
            other => other,
        }
    }

    fn unsubscribed(self) -> Self {
        match self {
            Self::Activate => Self::Clear,
            Self::Restart => Self::Deny,
            other => other,
        }
    }

    fn denied(self) -> Self {
        match self {
            Self::Activate => Self::Deny,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Idle,
    /// Asked the source for a watch, waiting on it to hand back a handle. Only one watch is ever
    /// starting, anything that happens meanwhile is folded into `next`.
    Starting { generation: u64, next: AfterStart },
    Active { generation: u64, handle: WatchHandle },
}

struct WatcherState {
    last_location: Option<LocationReading>,
    previous_location: Option<LocationReading>,
    observers: Vec<Observer>,
    options: SubscriptionOptions,
    watch: WatchState,
    next_generation: u64,
}

impl WatcherState {
    fn position(&self, observer: &Observer) -> Option<usize> {
        self.observers.iter().position(|o| Arc::ptr_eq(o, observer))
    }

    /// Whether events from watch `generation` should still be delivered
    fn is_current(&self, generation: u64) -> bool {
        match self.watch {
            WatchState::Active { generation: g, .. }
            | WatchState::Starting {
                generation: g,
                next: AfterStart::Activate,
            } => g == generation,
            _ => false,
        }
    }

    fn starting(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.watch = WatchState::Starting {
            generation,
            next: AfterStart::Activate,
        };
        generation
    }

    /// A new observer wants readings, returns the generation of the new watch if one should be
    /// started.
    fn begin_watch(&mut self) -> Option<u64> {
        if self.watch == WatchState::Idle {
            return Some(self.starting());
        }
        if let WatchState::Starting { next, .. } = &mut self.watch {
            *next = next.subscribed();
        }
        None
    }

    /// Stop watching, returns the handle that needs clearing if a watch was running
    fn end_watch(&mut self, denied: bool) -> Option<WatchHandle> {
        if let WatchState::Starting { next, .. } = &mut self.watch {
            *next = if denied {
                next.denied()
            } else {
                next.unsubscribed()
            };
            return None;
        }

        match mem::replace(&mut self.watch, WatchState::Idle) {
            WatchState::Active { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

struct WatcherInner<S: LocationSource, K: KeyValueStore> {
    source: S,
    store: K,
    state: Mutex<WatcherState>,
}

/// Keeps at most one platform watch alive for as long as anyone is observing, fans readings out
/// to observers and persists the latest one to [KeyValueStore] so it survives restarts.
///
/// Cloning gives another handle to the same watcher.
pub struct LocationWatcher<S: LocationSource, K: KeyValueStore> {
    inner: Arc<WatcherInner<S, K>>,
}

impl<S: LocationSource, K: KeyValueStore> Clone for LocationWatcher<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Create a watcher, `options` are merged over [SubscriptionOptions::default]
pub fn create_watcher<S: LocationSource + 'static, K: KeyValueStore + 'static>(
    source: S,
    store: K,
    options: PartialSubscriptionOptions,
) -> LocationWatcher<S, K> {
    LocationWatcher::new(source, store, options.into())
}

fn load_saved(store: &impl KeyValueStore) -> Option<LocationReading> {
    let raw = match store.get(STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(why) => {
            error!("Unable to read saved location: {why:?}");
            return None;
        }
    };

    match decode_record(&raw) {
        Ok(reading) => Some(reading),
        Err(why) => {
            error!("Unable to parse saved location {raw:?}: {why}");
            None
        }
    }
}

fn notify(observers: &[Observer], current: &LocationReading, previous: Option<&LocationReading>) {
    for observer in observers {
        let res = panic::catch_unwind(AssertUnwindSafe(|| observer(current, previous)));
        if res.is_err() {
            error!("Location observer panicked, continuing with the remaining observers");
        }
    }
}

impl<S: LocationSource + 'static, K: KeyValueStore + 'static> WatcherInner<S, K> {
    fn state(&self) -> MutexGuard<'_, WatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(self: &Arc<Self>, generation: u64) -> WatchSink {
        let inner = Arc::downgrade(self);
        Box::new(move |event| {
            if let Some(inner) = inner.upgrade() {
                inner.handle_event(generation, event);
            }
        })
    }

    fn start_watch(self: &Arc<Self>, mut generation: u64) {
        loop {
            let options = self.state().options;
            debug!("Starting location watch #{generation}");

            // The lock isn't held here, sources are free to report synchronously from `watch`
            let res = self.source.watch(options, self.sink(generation));

            let mut state = self.state();
            let next = match state.watch {
                WatchState::Starting {
                    generation: g,
                    next,
                } if g == generation => next,
                _ => AfterStart::Clear,
            };

            match (res, next) {
                (Ok(handle), AfterStart::Activate) => {
                    state.watch = WatchState::Active { generation, handle };
                    return;
                }
                (res, AfterStart::Restart) => {
                    // The old watch goes away before the new one is asked for
                    generation = state.starting();
                    drop(state);
                    match res {
                        Ok(handle) => self.clear(handle),
                        Err(why) => error!("Failed to start watching location: {why:?}"),
                    }
                }
                (res, _) => {
                    let ours = matches!(
                        state.watch,
                        WatchState::Starting { generation: g, .. } if g == generation
                    );
                    if ours {
                        state.watch = WatchState::Idle;
                    }
                    drop(state);
                    match res {
                        // Stopped while the source was still starting up
                        Ok(handle) => self.clear(handle),
                        Err(why) => error!("Failed to start watching location: {why:?}"),
                    }
                    return;
                }
            }
        }
    }

    fn clear(&self, handle: WatchHandle) {
        debug!("Stopping location watch {handle:?}");
        if let Err(why) = self.source.clear_watch(handle) {
            warn!("Failed to clear location watch {handle:?}: {why:?}");
        }
    }

    fn handle_event(&self, generation: u64, event: WatchEvent) {
        match event {
            WatchEvent::Reading(reading) => self.on_reading(generation, reading),
            WatchEvent::Error(err) => self.on_error(generation, err),
        }
    }

    fn on_reading(&self, generation: u64, reading: LocationReading) {
        let mut state = self.state();

        if !state.is_current(generation) {
            debug!("Dropping reading from stale watch #{generation}");
            return;
        }

        debug!("Received location {reading:?}");

        if state
            .last_location
            .is_some_and(|last| reading.timestamp < last.timestamp)
        {
            warn!("Received a location older than the last one, keeping it anyway");
        }

        state.previous_location = state.last_location.replace(reading);

        // Written while holding the lock so the store sees readings in arrival order
        self.persist(&reading);

        let observers = state.observers.clone();
        let previous = state.previous_location;
        drop(state);

        notify(&observers, &reading, previous.as_ref());
    }

    fn persist(&self, reading: &LocationReading) {
        let res = encode_record(reading).and_then(|raw| self.store.set(STORAGE_KEY, raw));
        if let Err(why) = res {
            error!("Failed to save location: {why:?}");
        }
    }

    fn on_error(&self, generation: u64, err: LocationError) {
        let mut state = self.state();

        if !state.is_current(generation) {
            debug!("Dropping error from stale watch #{generation}: {err}");
            return;
        }

        let handle = if err.stops_watch() {
            state.end_watch(true)
        } else {
            None
        };
        drop(state);

        match &err {
            LocationError::Timeout(_) => warn!("{err}"),
            _ => error!("{err}"),
        }

        if let Some(handle) = handle {
            self.clear(handle);
        }
    }
}

impl<S: LocationSource, K: KeyValueStore> Drop for WatcherInner<S, K> {
    fn drop(&mut self) {
        let handle = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .end_watch(false);

        if let Some(handle) = handle {
            if let Err(why) = self.source.clear_watch(handle) {
                warn!("Failed to clear location watch {handle:?} on drop: {why:?}");
            }
        }
    }
}

impl<S: LocationSource + 'static, K: KeyValueStore + 'static> LocationWatcher<S, K> {
    /// Create a watcher, reading back the last saved location from `store`. Nothing is asked of
    /// `source` until the first observer subscribes.
    pub fn new(source: S, store: K, options: SubscriptionOptions) -> Self {
        let last_location = load_saved(&store);

        let state = WatcherState {
            last_location,
            previous_location: None,
            observers: Vec::new(),
            options,
            watch: WatchState::Idle,
            next_generation: 0,
        };

        Self {
            inner: Arc::new(WatcherInner {
                source,
                store,
                state: Mutex::new(state),
            }),
        }
    }

    /// Register an observer, starting the platform watch if none is running. Does nothing if the
    /// observer is already registered.
    pub fn subscribe(&self, observer: &Observer) {
        let generation = {
            let mut state = self.inner.state();
            if state.position(observer).is_some() {
                debug!("Observer already subscribed");
                return;
            }
            debug!("Adding location observer");
            state.observers.push(observer.clone());
            state.begin_watch()
        };

        if let Some(generation) = generation {
            self.inner.start_watch(generation);
        }
    }

    /// Remove an observer, stopping the platform watch once nobody is left. Does nothing if the
    /// observer isn't registered.
    pub fn unsubscribe(&self, observer: &Observer) {
        let handle = {
            let mut state = self.inner.state();
            let Some(idx) = state.position(observer) else {
                return;
            };
            debug!("Removing location observer");
            state.observers.remove(idx);
            if state.observers.is_empty() {
                state.end_watch(false)
            } else {
                None
            }
        };

        if let Some(handle) = handle {
            self.inner.clear(handle);
        }
    }

    /// Whether a platform watch is currently running
    pub fn watching(&self) -> bool {
        matches!(self.inner.state().watch, WatchState::Active { .. })
    }

    /// The most recent reading, possibly one saved by a previous run
    pub fn saved_location(&self) -> Option<LocationReading> {
        self.inner.state().last_location
    }

    /// The reading right before [LocationWatcher::saved_location]
    pub fn previous_location(&self) -> Option<LocationReading> {
        self.inner.state().previous_location
    }

    pub fn observer_count(&self) -> usize {
        self.inner.state().observers.len()
    }

    /// Options the next platform watch will be started with
    pub fn options(&self) -> SubscriptionOptions {
        self.inner.state().options
    }

    /// Replace the options, merged over [SubscriptionOptions::default]. A watch that's already
    /// running keeps the options it was started with.
    pub fn configure(&self, options: PartialSubscriptionOptions) {
        let options = options.merge_over_defaults();
        debug!("Location options set to {options:?}");
        self.inner.state().options = options;
    }

    /// Forget the saved location, both in memory and in the store. Only our own key is removed.
    pub fn forget_saved_location(&self) -> Result {
        let mut state = self.inner.state();
        self.inner
            .store
            .remove(STORAGE_KEY)
            .context("Failed to remove saved location")?;
        state.last_location = None;
        state.previous_location = None;
        debug!("Saved location removed from storage");
        Ok(())
    }
}
