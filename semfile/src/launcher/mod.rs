use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use log::{debug, info, warn};

use crate::errors::Result;
use crate::CONFIG_ENV;

pub const SENDER_BIN: &str = "sender";

/// Starts producer instances that will try to join the channel.
pub trait ProcessLauncher {
    fn launch(&mut self, path: &Path) -> Result<()>;

    /// Called after teardown. Producers still running are left to notice the
    /// shutdown flag on their own.
    fn abandon(&mut self) {}
}

/// Launches the sender executable once per producer, passing the shared file
/// path as its only argument.
pub struct CommandLauncher {
    program: PathBuf,
    terminal: Vec<String>,
    config: Option<PathBuf>,
    children: Vec<Child>,
}

impl CommandLauncher {
    pub fn new<P: Into<PathBuf>>(program: P, terminal: Vec<String>) -> CommandLauncher {
        CommandLauncher {
            program: program.into(),
            terminal,
            config: None,
            children: Vec::new(),
        }
    }

    /// `name` in the directory of the running executable.
    pub fn sibling(name: &str) -> io::Result<PathBuf> {
        let exe = env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))?;
        Ok(dir.join(name))
    }

    /// Config file handed down to the senders.
    pub fn with_config<P: Into<PathBuf>>(mut self, config: P) -> CommandLauncher {
        self.config = Some(config.into());
        self
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = match self.terminal.split_first() {
            Some((head, rest)) => {
                let mut cmd = Command::new(head);
                cmd.args(rest).arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.arg(path);
        if let Some(config) = &self.config {
            cmd.env(CONFIG_ENV, config);
        }
        cmd
    }

    pub fn running(&mut self) -> usize {
        self.children
            .iter_mut()
            .filter_map(|child| child.try_wait().ok())
            .filter(Option::is_none)
            .count()
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&mut self, path: &Path) -> Result<()> {
        let child = self.command(path).spawn()?;
        info!("Started sender process {}", child.id());
        self.children.push(child);
        Ok(())
    }

    fn abandon(&mut self) {
        for child in self.children.iter_mut() {
            match child.try_wait() {
                Ok(Some(status)) => debug!("Sender {} exited with {}", child.id(), status),
                Ok(None) => info!("Sender {} is still running", child.id()),
                Err(e) => warn!("Cannot query sender {}: {}", child.id(), e),
            }
        }
    }
}
