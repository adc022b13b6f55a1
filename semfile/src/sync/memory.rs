//! In-process synchronization set built on mutex/condvar counters.
//!
//! Lets the protocol run between threads instead of processes. Objects live
//! in a registry shared by every clone of a [`MemoryBackend`], the same way
//! named objects live in the kernel.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use super::{StartSignal, SyncBackend, SyncSet};
use crate::errors::{Result, SemfileError};

struct Counter {
    name: &'static str,
    count: Mutex<u32>,
    cond: Condvar,
    max: Option<u32>,
}

impl Counter {
    fn new(name: &'static str, initial: u32, max: Option<u32>) -> Counter {
        Counter {
            name,
            count: Mutex::new(initial),
            cond: Condvar::new(),
            max,
        }
    }

    fn acquire(&self, timeout: Option<Duration>) -> Result<()> {
        let mut count = self.count.lock()?;
        match timeout {
            None => {
                while *count == 0 {
                    count = self.cond.wait(count)?;
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *count == 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(SemfileError::Timeout(self.name));
                    }
                    count = self.cond.wait_timeout(count, deadline - now)?.0;
                }
            }
        }
        *count -= 1;
        Ok(())
    }

    /// Returns false when the counter is already at its maximum.
    fn release(&self) -> Result<bool> {
        let mut count = self.count.lock()?;
        if let Some(max) = self.max {
            if *count >= max {
                return Ok(false);
            }
        }
        *count += 1;
        self.cond.notify_one();
        Ok(true)
    }

    fn value(&self) -> Result<u32> {
        Ok(*self.count.lock()?)
    }
}

struct Shared {
    capacity: u32,
    availability: Counter,
    consumption: Counter,
    mutex: Counter,
    shutdown: AtomicBool,
    producers: AtomicU32,
}

pub struct MemorySet {
    shared: Arc<Shared>,
    joined: bool,
}

impl MemorySet {
    /// Records posted but not yet read.
    pub fn outstanding(&self) -> Result<u32> {
        self.shared.availability.value()
    }
}

impl SyncSet for MemorySet {
    fn capacity(&self) -> u32 {
        self.shared.capacity
    }

    fn acquire_availability(&self, timeout: Option<Duration>) -> Result<()> {
        self.shared.availability.acquire(timeout)
    }

    fn release_availability(&self) -> Result<()> {
        if self.shared.availability.release()? {
            Ok(())
        } else {
            Err(SemfileError::CapacityExhausted {
                capacity: self.shared.capacity,
            })
        }
    }

    fn acquire_consumption(&self, timeout: Option<Duration>) -> Result<()> {
        self.shared.consumption.acquire(timeout)
    }

    fn release_consumption(&self) -> Result<()> {
        self.shared.consumption.release()?;
        Ok(())
    }

    fn acquire_mutex(&self, timeout: Option<Duration>) -> Result<()> {
        self.shared.mutex.acquire(timeout)
    }

    fn release_mutex(&self) -> Result<()> {
        if self.shared.mutex.release()? {
            Ok(())
        } else {
            Err(SemfileError::Logic("file mutex released while unlocked".to_string()))
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    fn producers(&self) -> u32 {
        self.shared.producers.load(Ordering::SeqCst)
    }
}

impl Drop for MemorySet {
    fn drop(&mut self) {
        if self.joined {
            self.shared.producers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct MemoryStart {
    counter: Arc<Counter>,
}

impl StartSignal for MemoryStart {
    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.counter.acquire(timeout)
    }

    fn post(&self) -> Result<()> {
        self.counter.release()?;
        Ok(())
    }
}

#[derive(Default)]
struct Registry {
    start: Option<Arc<Counter>>,
    set: Option<Arc<Shared>>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        Default::default()
    }

    /// Whether any object is still registered.
    pub fn is_live(&self) -> bool {
        match self.registry.lock() {
            Ok(registry) => registry.start.is_some() || registry.set.is_some(),
            Err(_) => false,
        }
    }
}

fn exists(name: &str) -> SemfileError {
    SemfileError::ResourceInit {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::AlreadyExists, "object already exists"),
    }
}

fn missing(name: &str) -> SemfileError {
    SemfileError::ResourceNotFound {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "object does not exist"),
    }
}

impl SyncBackend for MemoryBackend {
    type Set = MemorySet;
    type Start = MemoryStart;

    fn clear_stale(&self) {
        self.destroy()
    }

    fn create_start(&self) -> Result<MemoryStart> {
        let mut registry = self.registry.lock()?;
        if registry.start.is_some() {
            return Err(exists("start"));
        }
        let counter = Arc::new(Counter::new("start", 0, None));
        registry.start = Some(counter.clone());
        Ok(MemoryStart { counter })
    }

    fn open_start(&self) -> Result<MemoryStart> {
        let registry = self.registry.lock()?;
        let counter = registry.start.clone().ok_or_else(|| missing("start"))?;
        Ok(MemoryStart { counter })
    }

    fn create(&self, capacity: u32) -> Result<MemorySet> {
        let mut registry = self.registry.lock()?;
        if registry.set.is_some() {
            return Err(exists("availability"));
        }
        let shared = Arc::new(Shared {
            capacity,
            availability: Counter::new("availability", 0, Some(capacity)),
            consumption: Counter::new("consumption", 0, None),
            mutex: Counter::new("mutex", 1, Some(1)),
            shutdown: AtomicBool::new(false),
            producers: AtomicU32::new(0),
        });
        registry.set = Some(shared.clone());
        debug!("Created in-memory synchronization set, capacity {}", capacity);
        Ok(MemorySet { shared, joined: false })
    }

    fn open_existing(&self) -> Result<MemorySet> {
        let registry = self.registry.lock()?;
        let shared = registry.set.clone().ok_or_else(|| missing("availability"))?;
        shared.producers.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySet { shared, joined: true })
    }

    fn destroy(&self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.start = None;
            registry.set = None;
        }
    }
}
