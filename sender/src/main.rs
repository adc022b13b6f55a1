use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::debug;

use semfile::console::Console;
use semfile::handshake;
use semfile::producer::Producer;
use semfile::sync::PosixBackend;
use semfile::{ChannelConfig, SemfileError, SyncNames, CONFIG_ENV, DEFAULT_CONFIG_FILE};

#[derive(clap::Parser)]
#[clap(about = "Joins a running receiver and writes messages to it")]
struct Opts {
    /// Shared file the receiver created.
    file: PathBuf,
    #[clap(short = 'c', long = "config", env = CONFIG_ENV, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{}", e);
        if receiver_missing(e.as_ref()) {
            eprintln!("Open event failed.");
        }
        process::exit(1);
    }
}

/// No receiver has created the channel for this file.
fn receiver_missing(e: &(dyn Error + 'static)) -> bool {
    matches!(e.downcast_ref::<SemfileError>(), Some(SemfileError::ResourceNotFound { .. }))
}

fn run() -> Result<(), Box<dyn Error>> {
    let opts: Opts = Opts::parse();
    let cfg: ChannelConfig = confy::load_path(&opts.config)?;
    let names = SyncNames::for_file(&cfg.namespace, &opts.file)?;
    debug!("Joining {:?}", names);

    let backend = PosixBackend::new(names);
    let set = handshake::join(&backend, cfg.wait_timeout())?;

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout());
    console.say("Event was started")?;
    Producer::new(set, &opts.file, cfg.wait_timeout()).run(&mut console)?;
    Ok(())
}
