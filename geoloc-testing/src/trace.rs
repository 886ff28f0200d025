use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use geoloc_logic::{
    LocationError, LocationReading, LocationSource, SubscriptionOptions, WatchEvent, WatchHandle,
    WatchSink,
};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, sync::Notify};
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// The device got a fix
    Reading(LocationReading),
    /// The device failed to get a fix, `code` is a W3C `GeolocationPositionError` code
    Error { code: i32, message: String },
}

impl From<TraceEvent> for WatchEvent {
    fn from(v: TraceEvent) -> Self {
        match v {
            TraceEvent::Reading(reading) => WatchEvent::Reading(reading),
            TraceEvent::Error { code, message } => {
                WatchEvent::Error(LocationError::from_code(code, message))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// One step of a recorded trace
pub struct TraceStep {
    /// How long after the previous step this one happens
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// [LocationSource] that replays a recorded trace on the tokio runtime. Every watch replays the
/// trace from the start.
///
/// A step that takes longer than [SubscriptionOptions::timeout] produces a timeout error first,
/// the same way a real device gives up on a fix.
pub struct TraceSource {
    steps: Arc<[TraceStep]>,
    runtime: Handle,
    next_id: AtomicU32,
    watches: Mutex<HashMap<u32, CancellationToken>>,
    finished: Arc<Notify>,
}

/// Sleep unless cancelled first, returns whether the sleep completed
async fn wait(cancel: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

async fn replay(
    steps: Arc<[TraceStep]>,
    options: SubscriptionOptions,
    sink: WatchSink,
    cancel: CancellationToken,
) {
    let timeout = Duration::from_millis(options.timeout.into());

    for step in steps.iter() {
        let mut remaining = Duration::from_millis(step.delay_ms);

        if remaining > timeout {
            if !wait(&cancel, timeout).await {
                return;
            }
            sink(WatchEvent::Error(LocationError::Timeout(format!(
                "No fix within {}ms",
                options.timeout
            ))));
            remaining -= timeout;
        }

        if !wait(&cancel, remaining).await {
            return;
        }

        sink(step.event.clone().into());
    }
}

impl TraceSource {
    /// Create a source that replays on the current tokio runtime
    pub fn new(steps: Vec<TraceStep>) -> Self {
        Self::with_runtime(steps, Handle::current())
    }

    pub fn with_runtime(steps: Vec<TraceStep>, runtime: Handle) -> Self {
        Self {
            steps: steps.into(),
            runtime,
            next_id: AtomicU32::new(0),
            watches: Mutex::new(HashMap::new()),
            finished: Arc::new(Notify::new()),
        }
    }

    /// Load a trace from a JSON file containing a list of [TraceStep]s
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read trace {}", path.display()))?;
        let steps = serde_json::from_str::<Vec<TraceStep>>(&data)
            .with_context(|| format!("Failed to parse trace {}", path.display()))?;
        Ok(Self::new(steps))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn active_watches(&self) -> usize {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait for a replay to run to the end of the trace or be cleared
    pub async fn wait_finished(&self) {
        self.finished.notified().await;
    }
}

impl LocationSource for TraceSource {
    fn watch(&self, options: SubscriptionOptions, sink: WatchSink) -> Result<WatchHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cancel.clone());

        debug!("Replaying {} trace steps for watch {id}", self.steps.len());

        let steps = self.steps.clone();
        let finished = self.finished.clone();
        self.runtime.spawn(async move {
            replay(steps, options, sink, cancel).await;
            finished.notify_one();
        });

        Ok(WatchHandle(id))
    }

    fn clear_watch(&self, handle: WatchHandle) -> Result {
        let cancel = self
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        Ok(())
    }
}
