//! Interactive confirmation for destructive commands.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Result, bail};

/// Ask `message` on stderr and wait for a yes/no answer on stdin.
///
/// `force` skips the question. Without a terminal there is nobody to ask, so
/// the command fails and points at `--force`.
pub fn confirm(message: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Cannot ask for confirmation without a terminal. Use --force to proceed.");
  }

  ask(message, io::stdin().lock(), io::stderr())
}

fn ask<R: BufRead, W: Write>(message: &str, mut input: R, mut output: W) -> Result<bool> {
  write!(output, "{} [y/N] ", message)?;
  output.flush()?;

  let mut answer = String::new();
  input.read_line(&mut answer)?;

  Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn force_skips_the_question() {
    assert!(confirm("Delete t?", true).unwrap());
  }

  #[test]
  fn accepts_yes_in_any_case() {
    for answer in ["y\n", "YES\n", " yes \n"] {
      let mut prompt = Vec::new();
      assert!(ask("Delete t?", answer.as_bytes(), &mut prompt).unwrap());
      assert_eq!(String::from_utf8(prompt).unwrap(), "Delete t? [y/N] ");
    }
  }

  #[test]
  fn anything_else_declines() {
    for answer in ["\n", "n\n", "nope\n", ""] {
      assert!(!ask("Delete t?", answer.as_bytes(), Vec::new()).unwrap());
    }
  }
}
