//! Operator-facing progress output.
//!
//! Everything here goes to stdout so the run reads as a transcript; the
//! `log` facade carries the detail.

pub const RED: &str = "\x1b[0;31m";
pub const GREEN: &str = "\x1b[0;32m";
pub const YELLOW: &str = "\x1b[0;33m";
pub const BLUE: &str = "\x1b[0;34m";
pub const CYAN: &str = "\x1b[0;36m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const NC: &str = "\x1b[0m";

pub fn banner(title: &str) {
    println!();
    println!("{}{}══════════════════════════════════════{}", BOLD, CYAN, NC);
    println!("{}{}  {}{}", BOLD, CYAN, title, NC);
    println!("{}{}══════════════════════════════════════{}", BOLD, CYAN, NC);
    println!();
}

pub fn step(n: usize, total: usize, title: &str) {
    println!("{}{}[{}/{}]{} {}", BOLD, BLUE, n, total, NC, title);
}

pub fn ok(msg: &str) {
    println!("  {}✓{} {}", GREEN, NC, msg);
}

pub fn warn(msg: &str) {
    println!("  {}!{} {}", YELLOW, NC, msg);
}

pub fn fail(msg: &str) {
    println!("  {}✗{} {}", RED, NC, msg);
}

pub fn note(msg: &str) {
    println!("  {}{}{}", DIM, msg, NC);
}
