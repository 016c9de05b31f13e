//! services/app/src/screens/mod.rs
//!
//! Terminal screens. Each screen reads commands line by line from a `Console`
//! and renders through pure functions, so the drivers can be exercised with
//! in-memory input and output.

pub mod auth;
pub mod chat;
pub mod daily;
pub mod journey;
pub mod state;
pub mod thought;

use std::fmt::Display;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::error::AppError;

pub use state::AppState;

/// Line-oriented terminal I/O.
pub struct Console<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R: AsyncBufRead + Unpin, W: Write> Console<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self {
            lines: input.lines(),
            out,
        }
    }

    /// The next input line, or `None` at end of input. Cancel safe.
    pub async fn read_line(&mut self) -> Result<Option<String>, AppError> {
        Ok(self.lines.next_line().await?)
    }

    pub async fn prompt(&mut self, label: &str) -> Result<Option<String>, AppError> {
        write!(self.out, "{} ", label)?;
        self.out.flush()?;
        self.read_line().await
    }

    pub fn say(&mut self, text: impl Display) -> Result<(), AppError> {
        writeln!(self.out, "{}", text)?;
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

/// The process's stdin and stdout.
pub fn stdio() -> Console<BufReader<Stdin>, std::io::Stdout> {
    Console::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
}

/// Whether a line asks to leave the current screen.
pub(crate) fn is_quit(line: &str) -> bool {
    matches!(line.trim(), "q" | "quit" | "/quit" | "exit" | "/exit")
}
