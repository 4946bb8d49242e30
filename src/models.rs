//! Data models shared across the pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`PlatformSnapshot`] / [`SnapshotItem`]: raw crawler output for one sector
//! - [`Sector`]: a named partition of the crawl with its input file and credential slot
//! - [`Credential`]: one secret quota allotment for the generation service
//! - [`HistoryIndex`], [`CommentsPage`], [`PersonaComment`]: documents written to disk

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One platform record in a sector snapshot file.
///
/// Crawler output is a JSON array of these. Only `items[*].title` is
/// required; everything else is tolerated when missing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformSnapshot {
    /// Aggregator identifier of the platform (e.g. `"hackernews"`).
    #[serde(default)]
    pub id: Option<String>,
    /// Headlines collected from the platform.
    #[serde(default)]
    pub items: Vec<SnapshotItem>,
}

/// A single headline in a [`PlatformSnapshot`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A named partition of ingested content.
///
/// A sector whose `input_path` is missing or unreadable is skipped for the
/// run, never failed.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Sector {
    /// Short key used in file names (`finance`, `tech`, ...).
    pub key: String,
    /// Raw snapshot produced by the crawler for this sector.
    pub input_path: PathBuf,
    /// Human readable name used in prompts.
    pub display_name: String,
    /// Environment variable holding the sector's dedicated credential.
    pub credential_slot: String,
}

/// Where a [`Credential`] was resolved from.
///
/// Carried for diagnostics only: logs show the slot, never the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSlot {
    /// The sector's dedicated variable.
    Sector(String),
    /// The generic fallback variable.
    Fallback(String),
    /// One of the indexed pool variables.
    Pool(String),
}

impl CredentialSlot {
    pub fn name(&self) -> &str {
        match self {
            CredentialSlot::Sector(name)
            | CredentialSlot::Fallback(name)
            | CredentialSlot::Pool(name) => name,
        }
    }
}

impl fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSlot::Sector(name) => write!(f, "sector:{name}"),
            CredentialSlot::Fallback(name) => write!(f, "fallback:{name}"),
            CredentialSlot::Pool(name) => write!(f, "pool:{name}"),
        }
    }
}

/// A secret identifying one quota allotment of the generation service.
///
/// Never persisted and never mutated. The `Debug` impl redacts the value so
/// a stray `?credential` in a log line cannot leak it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    source_tag: CredentialSlot,
}

impl Credential {
    pub fn new(value: impl Into<String>, source_tag: CredentialSlot) -> Self {
        Self {
            value: value.into(),
            source_tag,
        }
    }

    /// The raw secret. Only the HTTP client should call this.
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn source_tag(&self) -> &CredentialSlot {
        &self.source_tag
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("source_tag", &self.source_tag)
            .finish()
    }
}

/// Manifest of every dated history directory, newest first.
///
/// Written to `history_index.json` and always regenerated in full.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct HistoryIndex {
    pub dates: Vec<String>,
    pub last_updated: String,
}

/// One simulated reader comment produced by the comments job.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PersonaComment {
    /// Persona the model was asked to play.
    #[serde(default)]
    pub role: String,
    /// Screen name invented by the model.
    #[serde(default)]
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub emotion: String,
}

/// The per-sector comments document.
#[derive(Debug, Deserialize, Serialize)]
pub struct CommentsPage {
    /// Local timestamp in `YYYY-MM-DD HH:MM` format.
    pub date: String,
    /// Sector key.
    pub category: String,
    pub comments: Vec<PersonaComment>,
}
