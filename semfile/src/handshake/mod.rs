//! Startup handshake between the receiver and late-joining senders.
//!
//! The start signal is used as a sticky ready flag: the receiver raises it
//! once every other object exists, and each sender that passes through puts
//! the token straight back for the next one.

use std::time::Duration;

use log::debug;

use crate::errors::Result;
use crate::sync::{StartSignal, SyncBackend};

pub struct ReadyFlag<S: StartSignal> {
    signal: S,
}

impl<S: StartSignal> ReadyFlag<S> {
    pub fn new(signal: S) -> ReadyFlag<S> {
        ReadyFlag { signal }
    }

    /// Called once by the receiver after the synchronization set exists.
    pub fn raise(&self) -> Result<()> {
        self.signal.post()
    }

    /// Blocks until the flag is raised, leaving it raised.
    pub fn pass_through(&self, timeout: Option<Duration>) -> Result<()> {
        self.signal.wait(timeout)?;
        self.signal.post()
    }
}

/// The sender side of the handshake: wait for the receiver, then open the set.
pub fn join<B: SyncBackend>(backend: &B, timeout: Option<Duration>) -> Result<B::Set> {
    let flag = ReadyFlag::new(backend.open_start()?);
    debug!("Waiting for the receiver to raise the start flag");
    flag.pass_through(timeout)?;
    backend.open_existing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SemfileError;
    use crate::sync::{MemoryBackend, SyncSet};

    const SHORT: Option<Duration> = Some(Duration::from_millis(20));

    #[test]
    fn flag_stays_raised_for_every_sender() -> Result<()> {
        let backend = MemoryBackend::new();
        let start = ReadyFlag::new(backend.create_start()?);
        let _set = backend.create(2)?;
        start.raise()?;
        for _ in 0..5 {
            let set = join(&backend, SHORT)?;
            assert_eq!(set.capacity(), 2);
        }
        Ok(())
    }

    #[test]
    fn join_times_out_until_raised() -> Result<()> {
        let backend = MemoryBackend::new();
        let _start = backend.create_start()?;
        assert!(matches!(join(&backend, SHORT), Err(SemfileError::Timeout("start"))));
        Ok(())
    }

    #[test]
    fn join_without_receiver_is_not_found() {
        assert!(matches!(
            join(&MemoryBackend::new(), SHORT),
            Err(SemfileError::ResourceNotFound { .. })
        ));
    }
}
