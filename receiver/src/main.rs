use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::info;

use semfile::console::Console;
use semfile::coordinator::{Coordinator, Session};
use semfile::launcher::{CommandLauncher, SENDER_BIN};
use semfile::sync::PosixBackend;
use semfile::{signals, ChannelConfig, SyncNames, CONFIG_ENV, DEFAULT_CONFIG_FILE};

#[derive(clap::Parser)]
#[clap(about = "Creates the channel, starts the senders and reads their messages")]
struct Opts {
    #[clap(short = 'c', long = "config", env = CONFIG_ENV, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Shared file. Asked interactively when omitted.
    #[clap(short = 'f', long = "file")]
    file: Option<PathBuf>,
    /// Maximum number of unread messages.
    #[clap(short = 'n', long = "capacity")]
    capacity: Option<u32>,
    /// Number of sender processes to start.
    #[clap(short = 's', long = "senders")]
    senders: Option<usize>,
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let opts: Opts = Opts::parse();
    let cfg: ChannelConfig = confy::load_path(&opts.config)?;

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout());
    let session = Session::prompt(&mut console, opts.file, opts.capacity, opts.senders)?;

    let names = SyncNames::for_file(&cfg.namespace, &session.path)?;
    let backend = PosixBackend::new(names);
    let on_killed = backend.clone();
    signals::on_termination(move || on_killed.abort())?;

    let program = match &cfg.sender_path {
        Some(path) => PathBuf::from(path),
        None => CommandLauncher::sibling(SENDER_BIN)?,
    };
    let launcher = CommandLauncher::new(program, cfg.terminal.clone()).with_config(&opts.config);

    let mut coordinator = Coordinator::new(backend, launcher, cfg.wait_timeout());
    let received = coordinator.run(&session, &mut console)?;
    info!("Read {} message(s) from {}", received, session.path.display());
    let running = coordinator.launcher_mut().running();
    if running > 0 {
        console.say(format_args!("{} sender(s) still running will stop at their next prompt.", running))?;
    }
    Ok(())
}
