use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tempfile::Builder;

const READ_PROMPT: &str = "Enter 1 to read message;";

fn bin_dir() -> PathBuf {
    match env::var("SEMFILE_BIN_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../target/debug"),
    }
}

fn failed(reason: String) -> Box<dyn std::error::Error> {
    Box::new(std::io::Error::new(std::io::ErrorKind::Other, reason))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Starting receiver/sender run against the built binaries...");

    let temp_dir = Builder::new().prefix("semfile_integration").tempdir()?;
    let config_path = temp_dir.path().join("semfile.toml");
    let notes_path = temp_dir.path().join("notes.bin");
    let mut config = File::create(&config_path)?;
    write!(
        config,
        "namespace = \"semfile-it-{}\"\nwait_timeout_ms = 10000\nterminal = []\n",
        std::process::id()
    )?;
    drop(config);

    let bins = bin_dir();
    let mut receiver = Command::new(bins.join("receiver"))
        .arg("--config")
        .arg(&config_path)
        .arg("--file")
        .arg(&notes_path)
        .arg("--capacity")
        .arg("2")
        .arg("--senders")
        .arg("0")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let stdout = receiver.stdout.take().ok_or_else(|| failed("receiver stdout not piped".to_string()))?;
    let (tx, rx) = mpsc::channel();
    let pump = thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => {
                    println!("[Receiver] {}", line);
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    loop {
        let line = rx.recv_timeout(Duration::from_secs(10))?;
        if line.starts_with(READ_PROMPT) {
            break;
        }
    }

    let mut sender = Command::new(bins.join("sender"))
        .arg(&notes_path)
        .arg("--config")
        .arg(&config_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = sender.stdin.take() {
        stdin.write_all(b"1\nhi\n0\n")?;
    }
    let sender_output = sender.wait_with_output()?;
    let sender_text = String::from_utf8_lossy(&sender_output.stdout);
    for line in sender_text.lines() {
        println!("[Sender] {}", line);
    }
    if !sender_output.status.success() || !sender_text.contains("Process ended.") {
        return Err(failed(format!("sender failed: {}", sender_output.status)));
    }

    if let Some(mut stdin) = receiver.stdin.take() {
        stdin.write_all(b"1\n0\n")?;
    }
    let status = receiver.wait()?;
    let _ = pump.join();
    let lines: Vec<String> = rx.try_iter().collect();
    if !status.success() {
        return Err(failed(format!("receiver exited with {}", status)));
    }
    if !lines.iter().any(|line| line == "hi") {
        return Err(failed("receiver never printed the message".to_string()));
    }
    if std::fs::metadata(&notes_path)?.len() != 21 {
        return Err(failed("shared file does not hold exactly one record".to_string()));
    }

    println!("\nRun successful! The message crossed from sender to receiver.");
    Ok(())
}
