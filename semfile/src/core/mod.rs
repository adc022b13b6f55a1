use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

pub static DEFAULT_NAMESPACE: &'static str = "semfile";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Prefix of every named object of a run.
    pub namespace: String,
    /// Upper bound for every blocking wait. Waits forever when unset.
    pub wait_timeout_ms: Option<u64>,
    /// Sender executable. Defaults to `sender` next to the running binary.
    pub sender_path: Option<String>,
    /// Command prefix used to give each sender its own terminal, e.g. `["xterm", "-e"]`.
    pub terminal: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            namespace: DEFAULT_NAMESPACE.to_string(),
            wait_timeout_ms: None,
            sender_path: None,
            terminal: Vec::new(),
        }
    }
}

impl ChannelConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

/// Names of the objects shared by one receiver and its senders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncNames {
    pub availability: String,
    pub consumption: String,
    pub mutex: String,
    pub start: String,
    pub control: String,
}

impl SyncNames {
    /// Derives the names from the absolute path of the shared file, so the
    /// path alone is enough for a sender to find its receiver's objects.
    pub fn for_file(namespace: &str, path: &Path) -> io::Result<SyncNames> {
        let absolute = absolute_path(path)?;
        let key = format!("{:016x}", fnv1a(absolute.as_os_str().as_bytes()));
        Ok(SyncNames::with_key(namespace, &key))
    }

    pub fn with_key(namespace: &str, key: &str) -> SyncNames {
        let name = |role: &str| format!("/{}-{}-{}", namespace, key, role);
        SyncNames {
            availability: name("avail"),
            consumption: name("consume"),
            mutex: name("mutex"),
            start: name("start"),
            control: name("control"),
        }
    }

    pub fn semaphores(&self) -> [&str; 4] {
        [&self.availability, &self.consumption, &self.mutex, &self.start]
    }
}

// The file may not exist yet when the receiver derives its names.
fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        return fs::canonicalize(path);
    }
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{} is not a file path", path.display()))
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => fs::canonicalize(p)?,
        _ => std::env::current_dir()?,
    };
    Ok(parent.join(file_name))
}

#[inline]
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(FNV_PRIME))
}
