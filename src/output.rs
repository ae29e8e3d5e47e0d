//! User-facing terminal messages
//!
//! Plain colored lines on stderr, without the timestamps and module paths
//! of the log output.

use owo_colors::OwoColorize;

/// Yellow message with a blank line before and after
///
/// # Example
/// ```ignore
/// output::warn("3 files could not be read and were skipped.");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

/// Red message with a blank line before and after
///
/// # Example
/// ```ignore
/// output::error("No store found. Run 'mdx scan' first.");
/// ```
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

pub fn info(message: &str) {
    eprintln!("\n{}\n", message);
}
