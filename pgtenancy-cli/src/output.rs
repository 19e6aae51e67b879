//! Console output helpers.

use colored::Colorize;

pub fn success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn warn(msg: &str) {
    println!("  {} {}", "⚠".yellow().bold(), msg.yellow());
}

pub fn info(msg: &str) {
    println!("  {} {}", "→".cyan(), msg);
}

/// Print a step indicator for multi-step processes.
pub fn step(num: usize, total: usize, msg: &str) {
    println!(
        "  {} {}",
        format!("[{}/{}]", num, total).dimmed(),
        msg.bright_white()
    );
}

/// Print a labelled value, aligned under other fields.
pub fn field(label: &str, value: &str) {
    println!("    {:<10} {}", format!("{}:", label).dimmed(), value);
}
