use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SemfileError>;

#[derive(Debug, Error)]
pub enum SemfileError {
    /// The coordinator could not create a synchronization object.
    #[error("Cannot create synchronization object {name}: {source}")]
    ResourceInit {
        name: String,
        #[source]
        source: io::Error,
    },
    /// A producer could not find an object the coordinator should have created.
    #[error("Synchronization object {name} not found: {source}")]
    ResourceNotFound {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Exceeded number of messages (capacity {capacity})")]
    CapacityExhausted { capacity: u32 },
    #[error("Invalid input {0:?}, expected 1 or 0")]
    InvalidOperatorInput(String),
    #[error("Message is {len} bytes, a record holds at most {max}")]
    Truncation { len: usize, max: usize },
    #[error("Message must not contain NUL or newline bytes")]
    InvalidContent,
    #[error("Malformed record: {0}")]
    MalformedRecord(&'static str),
    #[error("Timed out waiting on {0}")]
    Timeout(&'static str),
    #[error("Channel is shutting down")]
    Shutdown,
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] shared_memory::ShmemError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Signal handling error: {0}")]
    SignalHook(#[source] io::Error),
    #[error("Mutex was poisoned")]
    PoisonedLock,
    #[error("Logic error: {0}")]
    Logic(String),
}

impl SemfileError {
    /// Errors the steady-state loops handle locally instead of propagating.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SemfileError::CapacityExhausted { .. }
                | SemfileError::InvalidOperatorInput(_)
                | SemfileError::Truncation { .. }
                | SemfileError::InvalidContent
                | SemfileError::Timeout(_)
        )
    }
}

// A panicking holder leaves the in-process counters unusable.
impl<T> From<std::sync::PoisonError<T>> for SemfileError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        SemfileError::PoisonedLock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn poisoned_lock_is_not_recoverable() {
        let lock = Arc::new(Mutex::new(0u32));
        let holder = lock.clone();
        let _ = thread::spawn(move || {
            let _guard = holder.lock();
            panic!("holder died");
        })
        .join();
        let err: SemfileError = match lock.lock() {
            Ok(_) => panic!("lock should be poisoned"),
            Err(e) => e.into(),
        };
        assert!(matches!(err, SemfileError::PoisonedLock));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn operator_mistakes_are_recoverable() {
        assert!(SemfileError::Truncation { len: 21, max: 20 }.is_recoverable());
        assert!(SemfileError::Timeout("mutex").is_recoverable());
        assert!(!SemfileError::Shutdown.is_recoverable());
    }
}
