use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::console::{Command, Console};
use crate::errors::{Result, SemfileError};
use crate::record::Record;
use crate::sync::SyncSet;

pub const WRITE_MENU: &str = "Input 1 to write message;\nInput 0 to exit process";

/// How a record got published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Immediate,
    /// The channel was full and the producer waited for the consumer.
    AfterWait,
}

enum State {
    AwaitingCommand,
    Writing,
}

pub struct Producer<S: SyncSet> {
    set: S,
    path: PathBuf,
    timeout: Option<Duration>,
}

fn append(path: &Path, record: &Record) -> Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(record.as_bytes())?;
    Ok(())
}

impl<S: SyncSet> Producer<S> {
    pub fn new<P: AsRef<Path>>(set: S, path: P, timeout: Option<Duration>) -> Producer<S> {
        Producer {
            set,
            path: path.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub fn set(&self) -> &S {
        &self.set
    }

    /// Appends `record` and publishes it.
    ///
    /// The append happens under the file mutex and strictly before the
    /// availability post, so the consumer is never woken for bytes that are
    /// not in the file yet. When the channel is full the record stays
    /// appended but unpublished; `on_exhausted` is told once, the mutex is
    /// given up and the producer blocks until the consumer frees a slot.
    ///
    /// Only the first lock is bounded by the timeout. Once the record is in
    /// the file the producer keeps waiting until it is published or the
    /// channel shuts down.
    pub fn send<F: FnMut(u32)>(&self, record: &Record, mut on_exhausted: F) -> Result<Delivery> {
        let mut lock = Some(self.set.lock(self.timeout)?);
        append(&self.path, record)?;
        let mut delivery = Delivery::Immediate;
        loop {
            match self.set.release_availability() {
                Ok(()) => {
                    debug!("Published record ({:?})", delivery);
                    return Ok(delivery);
                }
                Err(SemfileError::CapacityExhausted { capacity }) => {
                    lock.take();
                    if delivery == Delivery::Immediate {
                        warn!("Channel is full ({} unread), waiting for the receiver", capacity);
                        on_exhausted(capacity);
                        delivery = Delivery::AfterWait;
                    }
                    self.outlast(|| self.set.acquire_consumption(self.timeout))?;
                    if self.set.is_shutdown() {
                        return Err(SemfileError::Shutdown);
                    }
                    lock = Some(self.outlast(|| self.set.lock(self.timeout))?);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Retries `wait` across timeouts, checking the shutdown flag at every
    /// expiry.
    fn outlast<T, F: FnMut() -> Result<T>>(&self, mut wait: F) -> Result<T> {
        loop {
            match wait() {
                Err(SemfileError::Timeout(role)) => {
                    if self.set.is_shutdown() {
                        return Err(SemfileError::Shutdown);
                    }
                    debug!("Still waiting on {} with an unpublished record", role);
                }
                other => return other,
            }
        }
    }

    /// Runs the interactive write loop. Returns the number of records sent.
    pub fn run<R: BufRead, W: Write>(&self, console: &mut Console<R, W>) -> Result<usize> {
        let mut state = State::AwaitingCommand;
        let mut sent = 0;
        console.say(WRITE_MENU)?;
        loop {
            state = match state {
                State::AwaitingCommand => {
                    if self.set.is_shutdown() {
                        console.say("Receiver has closed the channel.")?;
                        break;
                    }
                    match console.read_command() {
                        Ok(Command::Work) => State::Writing,
                        Ok(Command::Quit) => break,
                        Err(SemfileError::InvalidOperatorInput(token)) => {
                            debug!("Ignoring operator input {:?}", token);
                            console.say("\nIncorrect value!")?;
                            console.say(WRITE_MENU)?;
                            State::AwaitingCommand
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Writing => {
                    if self.set.is_shutdown() {
                        console.say("Receiver has closed the channel.")?;
                        break;
                    }
                    console.prompt("Type in message: ")?;
                    let text = match console.next_token()? {
                        Some(text) => text,
                        None => break,
                    };
                    let delivered = match Record::encode(&text) {
                        Ok(record) => self.send(&record, |_| {
                            let _ = console.say("You have exceeded the number of messages!");
                        }),
                        Err(e) => Err(e),
                    };
                    match delivered {
                        Ok(_) => sent += 1,
                        Err(SemfileError::Shutdown) => {
                            console.say("Receiver has closed the channel.")?;
                            break;
                        }
                        Err(e) if e.is_recoverable() => console.say(&e)?,
                        Err(e) => return Err(e),
                    }
                    console.say(format_args!("\n{}", WRITE_MENU))?;
                    State::AwaitingCommand
                }
            };
        }
        info!("Producer done after {} message(s)", sent);
        console.say("Process ended.")?;
        Ok(sent)
    }
}
