use std::process;
use std::thread;

use log::warn;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::errors::{Result, SemfileError};

/// Runs `on_killed` on a background thread when the process is asked to
/// terminate, then exits.
pub fn on_termination<F>(on_killed: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let mut signals = Signals::new(&[SIGHUP, SIGINT, SIGQUIT, SIGTERM]).map_err(SemfileError::SignalHook)?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            warn!("Received signal {}, shutting down", signal);
            on_killed();
            println!("The process has been killed.");
            process::exit(128 + signal);
        }
    });
    Ok(())
}
