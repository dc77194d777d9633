//! Terminal output and confirmation prompts

use std::{
    cell::RefCell,
    fmt::Display,
    io::{self, BufRead, Write},
};

use anyhow::{Context, Result};
use colored::Colorize;

/// Binary name used in hints
pub const BIN_NAME: &str = "odm";

pub fn header() {
    println!();
    println!("{}", "=".repeat(50).blue());
    println!("{}", "  Odoo Docker Manager".blue().bold());
    println!("{}", "=".repeat(50).blue());
    println!();
}

pub fn info(message: impl Display) {
    println!("{} {}", "ℹ".blue(), message);
}

pub fn success(message: impl Display) {
    println!("{} {}", "✓".green(), message);
}

pub fn warn(message: impl Display) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn error(message: impl Display) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn section(title: &str) {
    println!("{}", title.blue());
}

/// Numbered step line, e.g. `[2/5] Checking containers...`
pub fn step(current: usize, total: usize, message: &str) {
    println!("{}", format!("[{}/{}] {}", current, total, message).blue());
}

/// Prompt source for confirmations
pub struct Console {
    assume_yes: bool,
    input: RefCell<Box<dyn BufRead>>,
}

impl Console {
    /// Console reading answers from stdin
    pub fn stdin(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            input: RefCell::new(Box::new(io::stdin().lock())),
        }
    }

    /// Console answering prompts from a fixed script, one answer per line
    #[cfg(test)]
    pub fn scripted(answers: &str) -> Self {
        Self {
            assume_yes: false,
            input: RefCell::new(Box::new(io::Cursor::new(answers.to_string().into_bytes()))),
        }
    }

    /// Console that accepts every prompt
    #[cfg(test)]
    pub fn yes() -> Self {
        Self {
            assume_yes: true,
            input: RefCell::new(Box::new(io::empty())),
        }
    }

    /// Ask a y/N question. Anything but `y`/`yes` (including EOF) is a no.
    pub fn confirm(&self, message: &str) -> Result<bool> {
        if self.assume_yes {
            println!("{} {} [y/N]: {}", "?".bright_yellow(), message, "yes".green());
            return Ok(true);
        }

        print!("{} {} [y/N]: ", "?".bright_yellow(), message.yellow());
        io::stdout().flush()?;

        let mut answer = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut answer)
            .context("Failed to read answer")?;

        if read == 0 {
            println!();
            return Ok(false);
        }

        Ok(is_affirmative(&answer))
    }
}

/// `y` or `yes` in any case, surrounding whitespace ignored
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("  YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("yep"));
    }

    #[test]
    fn test_scripted_answers_in_order() {
        let console = Console::scripted("yes\nno\n");

        assert!(console.confirm("first?").unwrap());
        assert!(!console.confirm("second?").unwrap());
        // EOF declines
        assert!(!console.confirm("third?").unwrap());
    }

    #[test]
    fn test_assume_yes_skips_input() {
        assert!(Console::yes().confirm("really?").unwrap());
    }
}
