use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::ledger::format_units;

/// Format a coin amount for the console, with color.
pub fn format_coins(units: u64) -> String {
    format!("{} coins", format_units(units)).yellow().to_string()
}

/// Format a card code truncated for display. Codes are arbitrary user input,
/// so truncation counts characters, never bytes.
pub fn format_card(card_code: &str) -> String {
    let chars: Vec<char> = card_code.chars().collect();
    if chars.len() <= 16 {
        card_code.to_string()
    } else {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Format timestamp in human-readable format
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Human-friendly "how long ago", for card listings.
pub fn format_relative_time(time: Option<DateTime<Utc>>) -> String {
    let time = match time {
        Some(time) => time,
        None => return "never".to_string(),
    };
    let elapsed = Utc::now() - time;
    if elapsed < chrono::Duration::zero() {
        return format_timestamp(&time);
    }
    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if elapsed.num_minutes() < 60 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_hours() < 48 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    let mut row = String::new();
    for (i, col) in columns.iter().enumerate() {
        if i < widths.len() {
            row.push_str(&format!("{:<width$}  ", col, width = widths[i]));
        }
    }
    println!("{}", row.trim_end());
}
