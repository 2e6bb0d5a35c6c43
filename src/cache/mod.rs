//! Versioned cache tiers.
//!
//! This module provides the three request-keyed tiers (static, dynamic, api):
//! - Entries are captured 2xx responses keyed by normalized GET identity
//! - Tier names embed the cache version; activation deletes every tier
//!   outside the current valid set
//! - Storage is SQLite, or a no-op backend when no durable storage exists

pub mod lifecycle;
mod storage;
mod traits;

pub use storage::{NoopTierStore, SqliteTierStore, TierStore};
pub use traits::{CachedEntry, RequestKey, TierKind, TierNames};
