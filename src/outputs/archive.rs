//! Daily archival of raw snapshot files.
//!
//! Each run copies the crawler's per-sector files into
//! `history/<YYYY-MM-DD>/` under their original names. Copies within a day
//! overwrite each other; different days never collide.

use super::HistoryLayout;
use chrono::NaiveDate;
use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Copies raw inputs into the dated history tree.
#[derive(Debug, Clone)]
pub struct SnapshotArchiver {
    layout: HistoryLayout,
}

impl SnapshotArchiver {
    pub fn new(layout: HistoryLayout) -> Self {
        Self { layout }
    }

    /// Archive every existing file in `raw_files` for `as_of`.
    ///
    /// # Arguments
    ///
    /// * `raw_files` - Sector input files; each is copied under its base name
    /// * `as_of` - Day whose `history/<YYYY-MM-DD>/` directory receives the copies
    ///
    /// # Returns
    ///
    /// The archived paths. Missing inputs are skipped quietly; inputs that
    /// exist but cannot be read or copied are logged and skipped, leaving
    /// the sector itself to report "no data".
    ///
    /// # Errors
    ///
    /// Fails only if the dated directory cannot be created.
    #[instrument(level = "info", skip_all, fields(date = %as_of, files = raw_files.len()))]
    pub async fn archive<P: AsRef<Path>>(
        &self,
        raw_files: &[P],
        as_of: NaiveDate,
    ) -> Result<Vec<PathBuf>, Box<dyn Error>> {
        let target_dir = self.layout.day_dir(as_of);
        fs::create_dir_all(&target_dir).await?;

        let mut archived = Vec::new();
        for source in raw_files {
            let source = source.as_ref();
            match fs::metadata(source).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    warn!(path = %source.display(), "Input is not a regular file; skipping");
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %source.display(), "No raw data to archive");
                    continue;
                }
                Err(e) => {
                    warn!(path = %source.display(), error = %e, "Cannot stat input; skipping");
                    continue;
                }
            }
            let Some(file_name) = source.file_name() else {
                debug!(path = %source.display(), "Input has no file name; skipping");
                continue;
            };

            let target = target_dir.join(file_name);
            if let Err(e) = copy_preserving(source, &target).await {
                warn!(path = %source.display(), error = %e, "Failed to archive input; skipping");
                continue;
            }
            debug!(from = %source.display(), to = %target.display(), "Archived snapshot");
            archived.push(target);
        }

        info!(dir = %target_dir.display(), archived = archived.len(), "Archived raw snapshots");
        Ok(archived)
    }
}

/// Copy content and permissions, then carry over the modification time.
async fn copy_preserving(source: &Path, target: &Path) -> Result<(), Box<dyn Error>> {
    fs::copy(source, target).await?;
    let modified = fs::metadata(source).await?.modified()?;
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&target)?
            .set_modified(modified)
    })
    .await??;
    Ok(())
}
