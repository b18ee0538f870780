//! Subcommand implementations.

mod history;
mod measure;
mod profile;
mod scan;

pub use history::cmd_history;
pub use measure::{MeasureOptions, cmd_measure};
pub use profile::cmd_profile;
pub use scan::cmd_scan;

use std::io::{self, BufRead, Write};

use anyhow::Result;

/// Prompt on stdout and read a trimmed line from stdin.
pub(crate) fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Ask a yes/no question; empty input means no.
pub(crate) fn confirm_prompt(message: &str) -> Result<bool> {
    let answer = prompt(&format!("{message} [y/N]: "))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}
