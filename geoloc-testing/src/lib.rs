mod file_store;
mod trace;

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use file_store::FileStore;
pub use prelude::*;
pub use trace::{TraceEvent, TraceSource, TraceStep};
