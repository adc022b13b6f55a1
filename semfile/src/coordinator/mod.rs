use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info};

use crate::console::Console;
use crate::consumer::Consumer;
use crate::errors::{Result, SemfileError};
use crate::handshake::ReadyFlag;
use crate::launcher::ProcessLauncher;
use crate::sync::{SyncBackend, SyncSet};

/// What the operator chose at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub path: PathBuf,
    pub capacity: u32,
    pub senders: usize,
}

impl Session {
    /// Prompts for whatever was not given on the command line.
    pub fn prompt<R: BufRead, W: Write>(
        console: &mut Console<R, W>,
        path: Option<PathBuf>,
        capacity: Option<u32>,
        senders: Option<usize>,
    ) -> Result<Session> {
        let path = match path {
            Some(p) => p,
            None => console.ask("Enter binary file name: ", |_: &PathBuf| true)?,
        };
        let capacity = match capacity {
            Some(n) if n > 0 => n,
            Some(_) => return Err(SemfileError::Logic("capacity must be greater than zero".to_string())),
            None => console.ask("Enter number of notes: ", |n: &u32| *n > 0)?,
        };
        let senders = match senders {
            Some(n) => n,
            None => console.ask("Enter number of Sender Processes: ", |_: &usize| true)?,
        };
        Ok(Session { path, capacity, senders })
    }
}

/// Owns the named objects and the shared file for one run, launches the
/// producers and then acts as the consumer.
pub struct Coordinator<B: SyncBackend, L: ProcessLauncher> {
    backend: B,
    launcher: L,
    timeout: Option<Duration>,
}

impl<B: SyncBackend, L: ProcessLauncher> Coordinator<B, L> {
    pub fn new(backend: B, launcher: L, timeout: Option<Duration>) -> Coordinator<B, L> {
        Coordinator {
            backend,
            launcher,
            timeout,
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn launcher_mut(&mut self) -> &mut L {
        &mut self.launcher
    }

    /// Creates the file and the synchronization objects, raises the start
    /// flag and launches the producers. Nothing is left behind on failure.
    pub fn setup(&mut self, session: &Session) -> Result<B::Set> {
        self.backend.clear_stale();
        File::create(&session.path)?;

        let start = self.backend.create_start().map_err(|e| {
            self.backend.destroy();
            e
        })?;
        let set = match self.backend.create(session.capacity) {
            Ok(set) => set,
            Err(e) => {
                drop(start);
                self.backend.destroy();
                return Err(e);
            }
        };
        if let Err(e) = ReadyFlag::new(start).raise() {
            self.teardown(set);
            return Err(e);
        }

        for n in 0..session.senders {
            if let Err(e) = self.launcher.launch(&session.path) {
                error!("Failed to start sender {}: {}", n + 1, e);
                self.teardown(set);
                return Err(e);
            }
        }
        info!(
            "Channel {} ready: capacity {}, {} sender(s)",
            session.path.display(),
            session.capacity,
            session.senders
        );
        Ok(set)
    }

    /// Stops the producers and removes every named object. The shared file
    /// itself stays.
    pub fn teardown(&mut self, set: B::Set) {
        set.request_shutdown();
        let producers = set.producers();
        debug!("Waking {} joined producer(s)", producers);
        for _ in 0..producers {
            if let Err(e) = set.release_consumption() {
                error!("Failed to wake a producer: {}", e);
                break;
            }
        }
        drop(set);
        self.backend.destroy();
        self.launcher.abandon();
    }

    /// Runs a whole session: setup, the interactive consumer loop, teardown.
    /// Returns the number of records read.
    pub fn run<R: BufRead, W: Write>(&mut self, session: &Session, console: &mut Console<R, W>) -> Result<usize> {
        let set = self.setup(session)?;
        let result = Consumer::open(&set, &session.path, self.timeout).and_then(|mut consumer| consumer.run(console));
        self.teardown(set);
        result
    }
}
