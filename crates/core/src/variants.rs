//! In-memory variant grid and selection tracking for one fan-out stage.
//!
//! Each fan-out stage owns a [`VariantGrid`]: generated candidates per
//! combination key plus the user's single selection per key. Population
//! replaces whole cells (a re-run overwrites prior results); selection
//! overwrites any prior choice for the key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{CombinationKey, Variant};

/// Keyed collection of generated variants with single-selection per key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantGrid {
    variants: BTreeMap<CombinationKey, Vec<Variant>>,
    selections: BTreeMap<CombinationKey, String>,
}

impl VariantGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the variant sequence for `key`. Last write wins; a failed
    /// regeneration may legitimately write an empty sequence.
    pub fn add_variants(&mut self, key: CombinationKey, variants: Vec<Variant>) {
        self.variants.insert(key, variants);
        // A rewrite invalidates any selection pointing at the old cell
        // only if the chosen URL is gone; the permissive contract keeps
        // the recorded URL either way.
    }

    /// Record `image_url` as the chosen variant for `key`, overwriting
    /// any previous choice. Deliberately permissive: the URL is not
    /// required to exist in the cell.
    pub fn select(&mut self, key: CombinationKey, image_url: impl Into<String>) {
        let image_url = image_url.into();
        if let Some(cell) = self.variants.get_mut(&key) {
            for variant in cell.iter_mut() {
                variant.selected = variant.image_url == image_url;
            }
        }
        self.selections.insert(key, image_url);
    }

    /// The generated variants for `key`, if any were recorded.
    pub fn variants(&self, key: &CombinationKey) -> Option<&[Variant]> {
        self.variants.get(key).map(Vec::as_slice)
    }

    /// The chosen URL for `key`, if one was selected.
    pub fn selection(&self, key: &CombinationKey) -> Option<&str> {
        self.selections.get(key).map(String::as_str)
    }

    /// All recorded selections in key order.
    pub fn selections(&self) -> impl Iterator<Item = (CombinationKey, &str)> {
        self.selections.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Keys that have been populated (possibly with an empty sequence).
    pub fn populated_keys(&self) -> impl Iterator<Item = CombinationKey> + '_ {
        self.variants.keys().copied()
    }

    /// Keys carrying at least one variant, i.e. the keys a selection
    /// stage can actually complete.
    pub fn selectable_keys(&self) -> Vec<CombinationKey> {
        self.variants
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| *k)
            .collect()
    }

    /// True iff every key in `required` has a recorded selection.
    pub fn is_complete<'a>(&self, required: impl IntoIterator<Item = &'a CombinationKey>) -> bool {
        required
            .into_iter()
            .all(|key| self.selections.contains_key(key))
    }

    /// True iff every key in `required` has a non-empty variant
    /// sequence. Gates entry into a selection stage UI.
    pub fn all_generated<'a>(&self, required: impl IntoIterator<Item = &'a CombinationKey>) -> bool {
        required
            .into_iter()
            .all(|key| self.variants.get(key).is_some_and(|v| !v.is_empty()))
    }

    /// True iff no key produced any variant — the hard-failure condition
    /// for a fan-out stage.
    pub fn all_empty(&self) -> bool {
        self.variants.values().all(Vec::is_empty)
    }

    pub fn selection_count(&self) -> usize {
        self.selections.len()
    }

    pub fn total_variant_count(&self) -> usize {
        self.variants.values().map(Vec::len).sum()
    }

    /// Discard everything (pipeline reset or stage re-run).
    pub fn clear(&mut self) {
        self.variants.clear();
        self.selections.clear();
    }
}
