//! The operator-facing prompt/response surface of both roles.

use std::collections::VecDeque;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::str::FromStr;

use crate::errors::{Result, SemfileError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// `1`: write or read one message.
    Work,
    /// `0`: leave the loop.
    Quit,
}

impl FromStr for Command {
    type Err = SemfileError;

    fn from_str(token: &str) -> Result<Command> {
        match token {
            "1" => Ok(Command::Work),
            "0" => Ok(Command::Quit),
            other => Err(SemfileError::InvalidOperatorInput(other.to_string())),
        }
    }
}

/// Reads whitespace separated tokens from the operator and writes prompts back.
pub struct Console<R, W> {
    input: R,
    output: W,
    pending: VecDeque<String>,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Console<R, W> {
        Console {
            input,
            output,
            pending: VecDeque::new(),
        }
    }

    /// Next token, or `None` once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Option<String>> {
        while self.pending.is_empty() {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending.extend(line.split_whitespace().map(str::to_string));
        }
        Ok(self.pending.pop_front())
    }

    /// End of input counts as `0`.
    pub fn read_command(&mut self) -> Result<Command> {
        match self.next_token()? {
            Some(token) => token.parse(),
            None => Ok(Command::Quit),
        }
    }

    /// Asks until the answer parses and passes `accept`.
    pub fn ask<T, F>(&mut self, question: &str, accept: F) -> Result<T>
    where
        T: FromStr,
        F: Fn(&T) -> bool,
    {
        loop {
            self.prompt(question)?;
            let token = self.next_token()?.ok_or_else(|| {
                SemfileError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("no answer to {:?}", question.trim()),
                ))
            })?;
            match token.parse::<T>() {
                Ok(value) if accept(&value) => return Ok(value),
                _ => self.say(format_args!("Incorrect value {:?}!", token))?,
            }
        }
    }

    pub fn prompt(&mut self, text: &str) -> Result<()> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;
        Ok(())
    }

    pub fn say<D: Display>(&mut self, line: D) -> Result<()> {
        writeln!(self.output, "{}", line)?;
        self.output.flush()?;
        Ok(())
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
