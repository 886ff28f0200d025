use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use geoloc_logic::{LocationReading, PartialSubscriptionOptions, create_watcher, observer};
use geoloc_test_shared::{FileStore, TraceSource, prelude::*};
use log::info;

#[derive(Parser)]
/// Replay a recorded location trace through a watcher backed by a file store
struct Cli {
    /// Path to a JSON trace, a list of steps
    trace: PathBuf,

    /// File the latest location is persisted to between runs
    #[arg(long, default_value = "geoloc-store.json")]
    store: PathBuf,

    /// Max milliseconds to wait for a single fix
    #[arg(long)]
    timeout: Option<u32>,

    /// Max age in milliseconds of a cached fix
    #[arg(long)]
    maximum_age: Option<u32>,

    /// Don't ask for a high accuracy fix
    #[arg(long)]
    low_accuracy: bool,

    /// Number of observers to subscribe
    #[arg(long, default_value_t = 1)]
    observers: u32,

    /// Forget the saved location before replaying
    #[arg(long)]
    forget: bool,
}

fn describe(reading: &LocationReading) -> String {
    let when = reading
        .captured_at()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| reading.timestamp.to_string());
    let coords = &reading.coords;
    format!(
        "{:.6}, {:.6} (±{}m) at {when}",
        coords.latitude, coords.longitude, coords.accuracy
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();

    let source = Arc::new(TraceSource::load(&cli.trace)?);
    let store = FileStore::open(&cli.store)?;
    let options = PartialSubscriptionOptions {
        timeout: cli.timeout,
        maximum_age: cli.maximum_age,
        enable_high_accuracy: cli.low_accuracy.then_some(false),
    };

    let watcher = create_watcher(source.clone(), store, options);

    if cli.forget {
        watcher.forget_saved_location()?;
    }

    match watcher.saved_location() {
        Some(reading) => info!("Saved location from last run: {}", describe(&reading)),
        None => info!("No saved location"),
    }

    let observers = (0..cli.observers)
        .map(|i| {
            observer(move |current, previous| {
                let previous = previous.map(describe);
                println!(
                    "[observer {i}] {} (previous: {})",
                    describe(current),
                    previous.as_deref().unwrap_or("none")
                );
            })
        })
        .collect::<Vec<_>>();

    info!("Replaying {} steps", source.len());

    for obs in observers.iter() {
        watcher.subscribe(obs);
    }

    if watcher.watching() {
        source.wait_finished().await;
    }

    for obs in observers.iter() {
        watcher.unsubscribe(obs);
    }

    match watcher.saved_location() {
        Some(reading) => info!("Saved {}", describe(&reading)),
        None => info!("Nothing saved"),
    }

    Ok(())
}
