//! History index generation.
//!
//! `history_index.json` lists every dated directory under `history/`,
//! newest first, plus the time it was generated. It is rebuilt from a
//! directory listing on every run and never patched in place, so an
//! interrupted earlier run cannot leave it inconsistent.

use super::HistoryLayout;
use crate::models::HistoryIndex;
use crate::utils::{is_date_key, timestamp_seconds};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Dated directory names under `history_dir`, sorted newest first.
///
/// A missing history directory yields an empty list. Entries that are not
/// directories or not named `YYYY-MM-DD` are ignored.
pub async fn available_dates(history_dir: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    if !fs::try_exists(history_dir).await? {
        return Ok(Vec::new());
    }

    let mut dates = Vec::new();
    let mut entries = fs::read_dir(history_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_date_key(&name) {
            dates.push(name);
        } else {
            debug!(name, "Ignoring non-date entry in history");
        }
    }

    // YYYY-MM-DD sorts lexicographically in chronological order
    dates.sort_unstable_by(|a, b| b.cmp(a));
    Ok(dates)
}

/// Regenerate `history_index.json` in full and return what was written.
///
/// # Arguments
///
/// * `layout` - Locates both the history tree and the index file
///
/// # Returns
///
/// The [`HistoryIndex`] with every dated directory, newest first, and the
/// current local time as `last_updated`.
#[instrument(level = "info", skip_all, fields(root = %layout.root().display()))]
pub async fn refresh_history_index(layout: &HistoryLayout) -> Result<HistoryIndex, Box<dyn Error>> {
    let index = HistoryIndex {
        dates: available_dates(&layout.history_dir()).await?,
        last_updated: timestamp_seconds(),
    };

    let path = layout.index_path();
    let mut json = serde_json::to_string_pretty(&index)?;
    json.push('\n');
    fs::write(&path, json).await?;
    info!(path = %path.display(), dates = index.dates.len(), "Updated history index");
    Ok(index)
}
