use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::console::Console;
use crate::errors::Result;
use crate::handshake;
use crate::launcher::ProcessLauncher;
use crate::producer::Producer;
use crate::sync::{MemoryBackend, MemorySet, SyncSet};

mod property_tests;

pub const PATIENCE: Option<Duration> = Some(Duration::from_secs(10));

pub type ScriptedConsole = Console<Cursor<Vec<u8>>, Vec<u8>>;

pub fn scripted(input: &str) -> ScriptedConsole {
    Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

pub fn transcript(console: ScriptedConsole) -> String {
    String::from_utf8_lossy(&console.into_output()).into_owned()
}

/// Stands in for process spawning: each launch runs a scripted producer on a
/// thread that joins through the handshake like a real sender would.
pub struct ThreadLauncher {
    backend: MemoryBackend,
    scripts: Vec<String>,
    pub handles: Vec<JoinHandle<std::result::Result<String, String>>>,
}

impl ThreadLauncher {
    pub fn new(backend: &MemoryBackend, scripts: &[&str]) -> ThreadLauncher {
        ThreadLauncher {
            backend: backend.clone(),
            scripts: scripts.iter().rev().map(|s| s.to_string()).collect(),
            handles: Vec::new(),
        }
    }

    pub fn join_all(&mut self) -> Vec<std::result::Result<String, String>> {
        self.handles
            .drain(..)
            .map(|h| h.join().unwrap_or_else(|_| Err("producer panicked".to_string())))
            .collect()
    }
}

impl ProcessLauncher for ThreadLauncher {
    fn launch(&mut self, path: &Path) -> Result<()> {
        let backend = self.backend.clone();
        let script = self.scripts.pop().unwrap_or_default();
        let path = path.to_path_buf();
        self.handles.push(thread::spawn(move || {
            let run = || -> Result<String> {
                let set = handshake::join(&backend, PATIENCE)?;
                let mut console = scripted(&script);
                Producer::new(set, &path, PATIENCE).run(&mut console)?;
                Ok(transcript(console))
            };
            run().map_err(|e| e.to_string())
        }));
        Ok(())
    }
}

#[derive(Default)]
pub struct Stats {
    holders: AtomicUsize,
    pub max_holders: AtomicUsize,
    pub max_outstanding: AtomicUsize,
    pub exhausted: AtomicUsize,
}

/// Wraps a set and records how many holders the mutex ever had at once and
/// the highest unread count seen after each publish.
pub struct Instrumented {
    inner: MemorySet,
    pub stats: Arc<Stats>,
}

impl Instrumented {
    pub fn new(inner: MemorySet, stats: &Arc<Stats>) -> Instrumented {
        Instrumented {
            inner,
            stats: stats.clone(),
        }
    }
}

impl SyncSet for Instrumented {
    fn capacity(&self) -> u32 {
        self.inner.capacity()
    }

    fn acquire_availability(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.acquire_availability(timeout)
    }

    fn release_availability(&self) -> Result<()> {
        let result = self.inner.release_availability();
        match &result {
            Ok(()) => {
                let outstanding = self.inner.outstanding()? as usize;
                self.stats.max_outstanding.fetch_max(outstanding, Ordering::SeqCst);
            }
            Err(_) => {
                self.stats.exhausted.fetch_add(1, Ordering::SeqCst);
            }
        }
        result
    }

    fn acquire_consumption(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.acquire_consumption(timeout)
    }

    fn release_consumption(&self) -> Result<()> {
        self.inner.release_consumption()
    }

    fn acquire_mutex(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.acquire_mutex(timeout)?;
        let holders = self.stats.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_holders.fetch_max(holders, Ordering::SeqCst);
        // Widen the window a second holder would need to be caught.
        thread::yield_now();
        Ok(())
    }

    fn release_mutex(&self) -> Result<()> {
        self.stats.holders.fetch_sub(1, Ordering::SeqCst);
        self.inner.release_mutex()
    }

    fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    fn request_shutdown(&self) {
        self.inner.request_shutdown()
    }

    fn producers(&self) -> u32 {
        self.inner.producers()
    }
}
