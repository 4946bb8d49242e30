//! Loading sector snapshots written by the crawler.
//!
//! A snapshot is a JSON array of [`PlatformSnapshot`] records. A missing
//! file means the sector has no data this cycle; an unreadable or malformed
//! one is treated the same way after a warning.

use crate::models::PlatformSnapshot;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Headlines prepared for an editor prompt, with their source links.
#[derive(Debug, Default)]
pub struct TaggedDigest {
    /// One `[platform]title` line per headline.
    pub lines: Vec<String>,
    /// `(title, url)` pairs in snapshot order, for link back-filling.
    pub links: Vec<(String, String)>,
}

impl TaggedDigest {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// URL of the first snapshot headline that contains `title` or is
    /// contained in it.
    pub fn find_url(&self, title: &str) -> Option<&str> {
        if title.is_empty() {
            return None;
        }
        self.links
            .iter()
            .find(|(raw, _)| raw.contains(title) || title.contains(raw.as_str()))
            .map(|(_, url)| url.as_str())
    }
}

/// Read and parse a sector snapshot. `None` means "no data for this sector".
pub async fn load_snapshot(path: &Path) -> Option<Vec<PlatformSnapshot>> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Snapshot file not found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Snapshot file unreadable");
            return None;
        }
    };

    match serde_json::from_str::<Vec<PlatformSnapshot>>(&raw) {
        Ok(platforms) => Some(platforms),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Snapshot file is not a platform list");
            None
        }
    }
}

fn titles(platforms: &[PlatformSnapshot]) -> impl Iterator<Item = (&PlatformSnapshot, &str, Option<&str>)> {
    platforms.iter().flat_map(|p| {
        p.items
            .iter()
            .map(move |item| (p, item.title.trim(), item.url.as_deref()))
            .filter(|(_, title, _)| !title.is_empty())
    })
}

/// `- title` bullet lines for at most `limit` non-empty headlines.
pub fn headline_digest(platforms: &[PlatformSnapshot], limit: usize) -> Vec<String> {
    titles(platforms)
        .take(limit)
        .map(|(_, title, _)| format!("- {title}"))
        .collect()
}

/// `[platform]title` lines for at most `cap` headlines, plus their links.
pub fn tagged_digest(platforms: &[PlatformSnapshot], cap: usize) -> TaggedDigest {
    let mut digest = TaggedDigest::default();
    for (platform, title, url) in titles(platforms).take(cap) {
        let site = platform.id.as_deref().unwrap_or("unknown");
        digest.lines.push(format!("[{site}]{title}"));
        digest
            .links
            .push((title.to_string(), url.unwrap_or_default().to_string()));
    }
    info!(count = digest.lines.len(), cap, "Built tagged digest");
    digest
}
