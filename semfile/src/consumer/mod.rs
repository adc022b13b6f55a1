use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};

use crate::console::{Command, Console};
use crate::errors::{Result, SemfileError};
use crate::record::{Record, RECORD_LEN};
use crate::sync::SyncSet;

pub const READ_MENU: &str = "Enter 1 to read message;\nEnter 0 to exit";

enum State {
    AwaitingCommand,
    Reading,
}

/// Reads records in file order, one per availability signal.
pub struct Consumer<'a, S: SyncSet> {
    set: &'a S,
    file: File,
    timeout: Option<Duration>,
    /// An availability credit taken by an attempt that then timed out on the
    /// mutex. The next attempt reads with it instead of taking another.
    claimed: bool,
}

impl<'a, S: SyncSet> Consumer<'a, S> {
    pub fn open<P: AsRef<Path>>(set: &'a S, path: P, timeout: Option<Duration>) -> Result<Consumer<'a, S>> {
        let file = File::open(path)?;
        Ok(Consumer {
            set,
            file,
            timeout,
            claimed: false,
        })
    }

    /// Blocks until a record is published, then reads it.
    pub fn receive(&mut self) -> Result<String> {
        let set = self.set;
        if !self.claimed {
            set.acquire_availability(self.timeout)?;
            self.claimed = true;
        }
        let bytes = {
            let _lock = set.lock(self.timeout)?;
            let bytes = self.read_raw()?;
            self.claimed = false;
            bytes
        };
        set.release_consumption()?;
        Record::decode(&bytes)
    }

    fn read_raw(&mut self) -> Result<[u8; RECORD_LEN]> {
        let mut buf = [0u8; RECORD_LEN];
        self.file.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => SemfileError::MalformedRecord("partial record"),
            _ => SemfileError::Io(e),
        })?;
        Ok(buf)
    }

    /// Runs the interactive read loop. Returns the number of records read.
    pub fn run<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<usize> {
        let mut state = State::AwaitingCommand;
        let mut received = 0;
        console.say(format_args!("\n{}", READ_MENU))?;
        loop {
            state = match state {
                State::AwaitingCommand => match console.read_command() {
                    Ok(Command::Work) => State::Reading,
                    Ok(Command::Quit) => break,
                    Err(SemfileError::InvalidOperatorInput(token)) => {
                        debug!("Ignoring operator input {:?}", token);
                        console.say(format_args!("\nValue Error!\n{}", READ_MENU))?;
                        State::AwaitingCommand
                    }
                    Err(e) => return Err(e),
                },
                State::Reading => {
                    match self.receive() {
                        Ok(text) => {
                            received += 1;
                            console.say(text)?;
                        }
                        Err(SemfileError::Timeout("availability")) => {
                            warn!("No message arrived within {:?}", self.timeout);
                            console.say("No message available.")?;
                        }
                        Err(SemfileError::Timeout(role)) => {
                            warn!("Gave up waiting on {} after {:?}", role, self.timeout);
                            console.say("The file is busy, try again.")?;
                        }
                        Err(e) => return Err(e),
                    }
                    console.say(format_args!("\n{}", READ_MENU))?;
                    State::AwaitingCommand
                }
            };
        }
        info!("Consumer done after {} message(s)", received);
        console.say("Process ended.")?;
        Ok(received)
    }
}
