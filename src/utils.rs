//! Utility functions for dates, logging and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Date stamps for history directories and documents
//! - String truncation for logging model output
//! - JSON error detection for handling truncated model responses
//! - File system validation for output directories

use chrono::{Local, NaiveDate};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// `YYYY-MM-DD`, the naming scheme of history directories.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Today's local date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Format a date as a history directory name.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Whether `name` is a history directory name (`YYYY-MM-DD`).
pub fn is_date_key(name: &str) -> bool {
    name.len() == 10 && NaiveDate::parse_from_str(name, DATE_FORMAT).is_ok()
}

/// Local timestamp with seconds, used for the history index.
pub fn timestamp_seconds() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Local timestamp with minutes, stamped into generated JSON documents.
pub fn timestamp_minutes() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the model's response is cut off (e.g., due to token limits), the
/// resulting JSON will fail to parse with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and immediately
/// deletes a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    fs::write(&probe_path, b"").await?;
    let _ = fs::remove_file(&probe_path).await;
    info!("Output directory is writable");
    Ok(())
}
