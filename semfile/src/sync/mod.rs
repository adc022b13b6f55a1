//! The synchronization set shared by the receiver and its senders.
//!
//! Three counting objects coordinate access to the shared file:
//! `availability` counts records written but not yet read and is bounded by
//! the capacity, `consumption` counts slots the consumer has freed, and the
//! binary `mutex` serializes every access to the file. A fourth, transient
//! `start` signal drives the startup handshake.

use std::time::Duration;

use log::error;

use crate::errors::Result;

pub mod memory;
pub mod posix;

pub use memory::{MemoryBackend, MemorySet, MemoryStart};
pub use posix::{NamedSemaphore, PosixBackend, PosixSet};

pub trait SyncSet {
    /// Maximum number of posted but unread records.
    fn capacity(&self) -> u32;

    /// Blocks while no record is available.
    fn acquire_availability(&self, timeout: Option<Duration>) -> Result<()>;

    /// Publishes one record. Fails with `CapacityExhausted` when `capacity`
    /// records are already outstanding. Producers call it while holding the
    /// file mutex, so the bound check and the post happen as one step.
    fn release_availability(&self) -> Result<()>;

    /// Blocks until the consumer has freed a slot.
    fn acquire_consumption(&self, timeout: Option<Duration>) -> Result<()>;

    fn release_consumption(&self) -> Result<()>;

    fn acquire_mutex(&self, timeout: Option<Duration>) -> Result<()>;

    fn release_mutex(&self) -> Result<()>;

    fn is_shutdown(&self) -> bool;

    fn request_shutdown(&self);

    /// Producers that have joined and not yet closed their handles.
    fn producers(&self) -> u32;

    fn lock(&self, timeout: Option<Duration>) -> Result<FileLock<'_, Self>>
    where
        Self: Sized,
    {
        self.acquire_mutex(timeout)?;
        Ok(FileLock { set: self })
    }
}

/// Holds the file mutex until dropped.
pub struct FileLock<'a, S: SyncSet> {
    set: &'a S,
}

impl<'a, S: SyncSet> Drop for FileLock<'a, S> {
    fn drop(&mut self) {
        if let Err(e) = self.set.release_mutex() {
            error!("Failed to release the file mutex: {}", e);
        }
    }
}

pub trait StartSignal {
    fn wait(&self, timeout: Option<Duration>) -> Result<()>;

    fn post(&self) -> Result<()>;
}

/// Creates, opens and removes the named objects of one run.
pub trait SyncBackend {
    type Set: SyncSet;
    type Start: StartSignal;

    /// Removes objects left behind by a crashed run.
    fn clear_stale(&self);

    fn create_start(&self) -> Result<Self::Start>;

    fn open_start(&self) -> Result<Self::Start>;

    fn create(&self, capacity: u32) -> Result<Self::Set>;

    fn open_existing(&self) -> Result<Self::Set>;

    /// Removes every named object. Open handles stay usable until dropped.
    /// Calling it again, or from a process that did not create the objects,
    /// does nothing.
    fn destroy(&self);
}
