pub mod core;
pub mod errors;
pub mod record;
pub mod sync;
pub mod handshake;
pub mod producer;
pub mod consumer;
pub mod coordinator;
pub mod launcher;
pub mod console;
pub mod signals;

#[cfg(test)]
mod tests;

pub use crate::core::{ChannelConfig, SyncNames};
pub use errors::{Result, SemfileError};
pub use record::{Record, RECORD_LEN, CONTENT_LEN};

pub const DEFAULT_CONFIG_FILE: &str = "semfile.toml";
pub const CONFIG_ENV: &str = "SEMFILE_CONFIG";
