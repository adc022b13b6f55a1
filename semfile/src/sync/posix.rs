use std::ffi::CString;
use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ::shared_memory::{Shmem, ShmemConf, ShmemError};
use log::{debug, info, warn};

use super::{StartSignal, SyncBackend, SyncSet};
use crate::core::SyncNames;
use crate::errors::{Result, SemfileError};

/// Owner only, the same access `shared_memory` gives the control block, so a
/// run is confined to the user who started the receiver.
const SEM_MODE: libc::c_uint = 0o600;

/// A POSIX named semaphore handle. Dropping it closes the handle only; the
/// object lives until [`NamedSemaphore::unlink`].
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: String,
}

// sem_* calls are thread safe on a shared handle.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn deadline(timeout: Duration) -> io::Result<libc::timespec> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let at = now + timeout;
    let mut ts: libc::timespec = unsafe { mem::zeroed() };
    ts.tv_sec = at.as_secs() as libc::time_t;
    ts.tv_nsec = at.subsec_nanos() as libc::c_long;
    Ok(ts)
}

impl NamedSemaphore {
    /// Creates a new semaphore, failing if the name is taken.
    pub fn create(name: &str, value: u32) -> io::Result<NamedSemaphore> {
        let c = c_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                c.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                SEM_MODE,
                value as libc::c_uint,
            )
        };
        NamedSemaphore::from_raw(sem, name)
    }

    pub fn open(name: &str) -> io::Result<NamedSemaphore> {
        let c = c_name(name)?;
        let sem = unsafe { libc::sem_open(c.as_ptr(), 0) };
        NamedSemaphore::from_raw(sem, name)
    }

    fn from_raw(sem: *mut libc::sem_t, name: &str) -> io::Result<NamedSemaphore> {
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(NamedSemaphore {
            sem,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post(&self) -> io::Result<()> {
        if unsafe { libc::sem_post(self.sem) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Returns false if the timeout expired first.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let ts = match timeout {
            Some(t) => Some(deadline(t)?),
            None => None,
        };
        loop {
            let rc = match &ts {
                None => unsafe { libc::sem_wait(self.sem) },
                Some(ts) => unsafe { libc::sem_timedwait(self.sem, ts) },
            };
            if rc == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    pub fn value(&self) -> io::Result<u32> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem, &mut value) } == -1 {
            return Err(io::Error::last_os_error());
        }
        // Linux reports 0 rather than a negative waiter count.
        Ok(value.max(0) as u32)
    }

    /// Removes the name. A missing name is not an error.
    pub fn unlink(name: &str) -> io::Result<()> {
        let c = c_name(name)?;
        if unsafe { libc::sem_unlink(c.as_ptr()) } == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn acquire(&self, role: &'static str, timeout: Option<Duration>) -> Result<()> {
        if self.wait(timeout)? {
            Ok(())
        } else {
            Err(SemfileError::Timeout(role))
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

#[repr(C)]
struct ControlBlock {
    capacity: AtomicU32,
    producers: AtomicU32,
    shutdown: AtomicBool,
}

/// Run-wide state that does not fit in a semaphore.
struct Control {
    shmem: Shmem,
}

impl Control {
    fn create(name: &str, capacity: u32) -> Result<Control> {
        let mut shmem = ShmemConf::new()
            .size(mem::size_of::<ControlBlock>())
            .os_id(name)
            .create()
            .map_err(|e| {
                let kind = match e {
                    ShmemError::MappingIdExists => io::ErrorKind::AlreadyExists,
                    _ => io::ErrorKind::Other,
                };
                SemfileError::ResourceInit {
                    name: name.to_string(),
                    source: io::Error::new(kind, e.to_string()),
                }
            })?;
        // PosixBackend::destroy unlinks by name.
        shmem.set_owner(false);
        let control = Control { shmem };
        let block = control.block();
        block.capacity.store(capacity, Ordering::SeqCst);
        block.producers.store(0, Ordering::SeqCst);
        block.shutdown.store(false, Ordering::SeqCst);
        Ok(control)
    }

    fn open(name: &str) -> Result<Control> {
        let shmem = ShmemConf::new().os_id(name).open().map_err(|e| SemfileError::ResourceNotFound {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
        })?;
        if shmem.len() < mem::size_of::<ControlBlock>() {
            return Err(SemfileError::Logic(format!("control block {} is truncated", name)));
        }
        Ok(Control { shmem })
    }

    fn unlink(name: &str) {
        if let Ok(mut stale) = ShmemConf::new().os_id(name).open() {
            // The owner unlinks the mapping when dropped.
            stale.set_owner(true);
        }
    }

    #[inline]
    fn block(&self) -> &ControlBlock {
        unsafe { &*(self.shmem.as_ptr() as *const ControlBlock) }
    }
}

pub struct PosixSet {
    availability: NamedSemaphore,
    consumption: NamedSemaphore,
    mutex: NamedSemaphore,
    control: Control,
    capacity: u32,
    joined: bool,
}

impl SyncSet for PosixSet {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn acquire_availability(&self, timeout: Option<Duration>) -> Result<()> {
        self.availability.acquire("availability", timeout)
    }

    fn release_availability(&self) -> Result<()> {
        if self.availability.value()? >= self.capacity {
            return Err(SemfileError::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        self.availability.post()?;
        Ok(())
    }

    fn acquire_consumption(&self, timeout: Option<Duration>) -> Result<()> {
        self.consumption.acquire("consumption", timeout)
    }

    fn release_consumption(&self) -> Result<()> {
        self.consumption.post()?;
        Ok(())
    }

    fn acquire_mutex(&self, timeout: Option<Duration>) -> Result<()> {
        self.mutex.acquire("mutex", timeout)
    }

    fn release_mutex(&self) -> Result<()> {
        self.mutex.post()?;
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.control.block().shutdown.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        self.control.block().shutdown.store(true, Ordering::SeqCst);
    }

    fn producers(&self) -> u32 {
        self.control.block().producers.load(Ordering::SeqCst)
    }
}

impl Drop for PosixSet {
    fn drop(&mut self) {
        if self.joined {
            self.control.block().producers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct PosixStart {
    sem: NamedSemaphore,
}

impl StartSignal for PosixStart {
    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.sem.acquire("start", timeout)
    }

    fn post(&self) -> Result<()> {
        self.sem.post()?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PosixBackend {
    names: SyncNames,
}

fn init_error(name: &str) -> impl FnOnce(io::Error) -> SemfileError + '_ {
    move |source| SemfileError::ResourceInit {
        name: name.to_string(),
        source,
    }
}

fn not_found(name: &str) -> impl FnOnce(io::Error) -> SemfileError + '_ {
    move |source| SemfileError::ResourceNotFound {
        name: name.to_string(),
        source,
    }
}

impl PosixBackend {
    pub fn new(names: SyncNames) -> PosixBackend {
        PosixBackend { names }
    }

    pub fn names(&self) -> &SyncNames {
        &self.names
    }

    /// Tells joined senders to stop and removes every name, without needing
    /// the receiver's own handles. Used from the signal thread.
    pub fn abort(&self) {
        if let Ok(control) = Control::open(&self.names.control) {
            control.block().shutdown.store(true, Ordering::SeqCst);
            let producers = control.block().producers.load(Ordering::SeqCst);
            if let Ok(consumption) = NamedSemaphore::open(&self.names.consumption) {
                for _ in 0..producers {
                    let _ = consumption.post();
                }
            }
        }
        self.destroy();
    }
}

impl SyncBackend for PosixBackend {
    type Set = PosixSet;
    type Start = PosixStart;

    fn clear_stale(&self) {
        debug!("Clearing stale objects for {}", self.names.control);
        self.destroy();
    }

    fn create_start(&self) -> Result<PosixStart> {
        let sem = NamedSemaphore::create(&self.names.start, 0).map_err(init_error(&self.names.start))?;
        Ok(PosixStart { sem })
    }

    fn open_start(&self) -> Result<PosixStart> {
        let sem = NamedSemaphore::open(&self.names.start).map_err(not_found(&self.names.start))?;
        Ok(PosixStart { sem })
    }

    fn create(&self, capacity: u32) -> Result<PosixSet> {
        let names = &self.names;
        let control = Control::create(&names.control, capacity)?;
        let availability =
            NamedSemaphore::create(&names.availability, 0).map_err(init_error(&names.availability))?;
        let consumption =
            NamedSemaphore::create(&names.consumption, 0).map_err(init_error(&names.consumption))?;
        let mutex = NamedSemaphore::create(&names.mutex, 1).map_err(init_error(&names.mutex))?;
        info!("Created synchronization set {} with capacity {}", names.control, capacity);
        Ok(PosixSet {
            availability,
            consumption,
            mutex,
            control,
            capacity,
            joined: false,
        })
    }

    fn open_existing(&self) -> Result<PosixSet> {
        let names = &self.names;
        let control = Control::open(&names.control)?;
        let availability = NamedSemaphore::open(&names.availability).map_err(not_found(&names.availability))?;
        let consumption = NamedSemaphore::open(&names.consumption).map_err(not_found(&names.consumption))?;
        let mutex = NamedSemaphore::open(&names.mutex).map_err(not_found(&names.mutex))?;
        let block = control.block();
        let capacity = block.capacity.load(Ordering::SeqCst);
        block.producers.fetch_add(1, Ordering::SeqCst);
        debug!("Joined synchronization set {} (capacity {})", names.control, capacity);
        Ok(PosixSet {
            availability,
            consumption,
            mutex,
            control,
            capacity,
            joined: true,
        })
    }

    fn destroy(&self) {
        for name in self.names.semaphores().iter() {
            if let Err(e) = NamedSemaphore::unlink(name) {
                warn!("Failed to unlink {}: {}", name, e);
            }
        }
        Control::unlink(&self.names.control);
    }
}
