//! Persistence of raw snapshots, generated artifacts and the history index.
//!
//! # Submodules
//!
//! - [`archive`]: copies the run's raw snapshot files into the dated history tree
//! - [`artifacts`]: writes each generated artifact to a dated record and a latest slot
//! - [`indexes`]: rebuilds `history_index.json` from the history tree
//!
//! Only these modules write under `history/`; [`HistoryLayout`] is the single
//! place paths are derived.
//!
//! # Output Structure
//!
//! ```text
//! root/
//! ├── history/
//! │   └── 2025-05-06/
//! │       ├── data_finance.json          # archived raw snapshot
//! │       └── reports/
//! │           ├── finance_strategy.md    # permanent artifact
//! │           ├── analysis_finance.json
//! │           └── comments_finance.json
//! ├── finance_strategy.md                # latest pointer
//! ├── analysis_finance.json
//! ├── comments_finance.json
//! └── history_index.json
//! ```

pub mod archive;
pub mod artifacts;
pub mod indexes;

use crate::utils::date_key;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

const HISTORY_DIR: &str = "history";
const REPORTS_DIR: &str = "reports";
const INDEX_FILE: &str = "history_index.json";

/// What kind of artifact a job produces; decides the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Boardroom strategy report (Markdown).
    Strategy,
    /// Editor analysis (JSON).
    Analysis,
    /// Persona comments (JSON).
    Comments,
}

impl ArtifactKind {
    pub fn file_name(self, sector: &str) -> String {
        match self {
            ArtifactKind::Strategy => format!("{sector}_strategy.md"),
            ArtifactKind::Analysis => format!("analysis_{sector}.json"),
            ArtifactKind::Comments => format!("comments_{sector}.json"),
        }
    }
}

/// Path scheme of the output tree rooted at `root`.
#[derive(Debug, Clone)]
pub struct HistoryLayout {
    root: PathBuf,
}

impl HistoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join(HISTORY_DIR)
    }

    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.history_dir().join(date_key(date))
    }

    pub fn reports_dir(&self, date: NaiveDate) -> PathBuf {
        self.day_dir(date).join(REPORTS_DIR)
    }

    pub fn dated_artifact(&self, kind: ArtifactKind, sector: &str, date: NaiveDate) -> PathBuf {
        self.reports_dir(date).join(kind.file_name(sector))
    }

    pub fn latest_artifact(&self, kind: ArtifactKind, sector: &str) -> PathBuf {
        self.root.join(kind.file_name(sector))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }
}
