//! Generated artifact persistence.
//!
//! Every artifact is written twice:
//! 1. a permanent record at `history/<date>/reports/<file>`, which is never
//!    skipped: failure to write it is returned to the caller
//! 2. the latest copy at `<root>/<file>`, overwritten on every save
//!
//! The history index is a projection of the history tree and is rebuilt by
//! [`ArtifactStore::refresh_index`].

use super::{indexes, ArtifactKind, HistoryLayout};
use crate::models::HistoryIndex;
use chrono::NaiveDate;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Writes dated and latest copies of generated artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: HistoryLayout,
}

impl ArtifactStore {
    pub fn new(layout: HistoryLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &HistoryLayout {
        &self.layout
    }

    /// Persist `content` for `sector` on `as_of`.
    ///
    /// # Arguments
    ///
    /// * `kind` - Which artifact this is; decides the file name
    /// * `sector` - Sector key the file name is built from
    /// * `content` - Text written to both copies
    /// * `as_of` - Day of the permanent record
    ///
    /// # Returns
    ///
    /// The path of the permanent record under `history/<date>/reports/`.
    /// A second save on the same day replaces both copies.
    ///
    /// # Errors
    ///
    /// Fails if the dated directory cannot be created or either copy cannot
    /// be written. The permanent record is written first.
    #[instrument(level = "info", skip_all, fields(sector = %sector, kind = ?kind, date = %as_of))]
    pub async fn save(
        &self,
        kind: ArtifactKind,
        sector: &str,
        content: &str,
        as_of: NaiveDate,
    ) -> Result<PathBuf, Box<dyn Error>> {
        let reports_dir = self.layout.reports_dir(as_of);
        if let Err(e) = fs::create_dir_all(&reports_dir).await {
            error!(dir = %reports_dir.display(), error = %e, "Failed to create reports dir");
            return Err(e.into());
        }

        let permanent = self.layout.dated_artifact(kind, sector, as_of);
        fs::write(&permanent, content).await?;
        info!(path = %permanent.display(), bytes = content.len(), "Wrote dated artifact");

        let latest = self.layout.latest_artifact(kind, sector);
        fs::write(&latest, content).await?;
        info!(path = %latest.display(), "Updated latest artifact");

        Ok(permanent)
    }

    /// Rebuild `history_index.json` from the dated directories on disk.
    ///
    /// # Returns
    ///
    /// The index as written, dates newest first.
    pub async fn refresh_index(&self) -> Result<HistoryIndex, Box<dyn Error>> {
        indexes::refresh_history_index(&self.layout).await
    }
}
