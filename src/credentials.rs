//! Credential candidate selection.
//!
//! For each sector the pool produces an ordered, de-duplicated list of
//! credentials for the dispatcher to walk through:
//!
//! 1. the sector's dedicated slot (e.g. `KEY_TECH`)
//! 2. the generic fallback (e.g. `GOOGLE_API_KEY`)
//! 3. the indexed pool `KEY_1..=KEY_N`, in ascending order
//!
//! A value that appears in several slots is kept only at its first
//! (highest-priority) position.

use crate::config::{CredentialLayout, CredentialSource};
use crate::models::{Credential, CredentialSlot};
use itertools::Itertools;
use tracing::debug;

/// Builds credential candidates from an injected [`CredentialSource`].
#[derive(Debug, Clone)]
pub struct CredentialPool {
    source: CredentialSource,
    layout: CredentialLayout,
}

impl CredentialPool {
    pub fn new(source: CredentialSource, layout: CredentialLayout) -> Self {
        Self { source, layout }
    }

    /// Ordered candidates for the sector whose dedicated variable is `sector_slot`.
    ///
    /// # Arguments
    ///
    /// * `sector_slot` - Name of the sector's own variable, e.g. `KEY_TECH`
    ///
    /// # Returns
    ///
    /// Credentials in priority order: the sector slot, the fallback, then
    /// the pool in ascending index order. Each value appears once, at its
    /// first position. An empty result means no credential resolved from
    /// any slot; that is not an error here, the dispatcher reports it as
    /// "no candidates".
    pub fn build_candidates(&self, sector_slot: &str) -> Vec<Credential> {
        let sector = std::iter::once(CredentialSlot::Sector(sector_slot.to_string()));
        let fallback = std::iter::once(CredentialSlot::Fallback(self.layout.fallback_var.clone()));
        let pool = (1..=self.layout.pool_size)
            .map(|i| CredentialSlot::Pool(format!("{}{}", self.layout.pool_prefix, i)));

        let candidates: Vec<Credential> = sector
            .chain(fallback)
            .chain(pool)
            .filter_map(|slot| {
                self.source
                    .get(slot.name())
                    .map(|value| Credential::new(value, slot.clone()))
            })
            .unique_by(|c| c.expose().to_string())
            .collect();

        debug!(
            sector_slot,
            count = candidates.len(),
            slots = %candidates.iter().map(|c| c.source_tag().to_string()).join(","),
            "Built credential candidates"
        );
        candidates
    }
}
