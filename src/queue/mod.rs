//! Offline mutation queue.
//!
//! Mutations that fail while offline are appended to a named logical queue
//! and replayed against that queue's endpoint on the next reconnect signal.
//! A record is only removed once its replay succeeds.

mod store;
mod sync;

pub use store::{QueueRecord, QueueStore, SqliteQueueStore, UnavailableQueueStore};
pub use sync::{ReplaySummary, SyncCoordinator};
