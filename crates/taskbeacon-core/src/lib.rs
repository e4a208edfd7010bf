//! # taskbeacon-core
//!
//! Core traits and types shared by the taskbeacon daemon and its providers.
//!
//! This crate provides:
//! - [`ConfigEntry`] - one configured integration instance and its credentials
//! - [`EntryStore`] - storage seam for config entries, with [`MemoryEntryStore`]
//! - [`Entity`] - the contract every polled sensor implements
//! - [`Throttle`] - minimum-interval gate used by data sources

pub mod entity;
pub mod entry;
pub mod error;
pub mod store;
pub mod throttle;

pub use entity::{Entity, EntitySnapshot};
pub use entry::{
    ConfigEntry, EntryData, EntryId, EntryOptions, TokenPair, MAX_SCAN_INTERVAL_MINUTES,
};
pub use error::{EntryError, Result};
pub use store::{EntryStore, MemoryEntryStore};
pub use throttle::Throttle;

/// Commonly used items, for glob import.
pub mod prelude {
    pub use crate::entity::{Entity, EntitySnapshot};
    pub use crate::entry::{ConfigEntry, EntryData, EntryId, EntryOptions, TokenPair};
    pub use crate::error::{EntryError, Result};
    pub use crate::store::{EntryStore, MemoryEntryStore};
    pub use crate::throttle::Throttle;
}
