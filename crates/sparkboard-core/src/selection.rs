//! Transient selection state for items on the open board.

use crate::items::ItemId;
use std::collections::HashSet;

/// Set of selected items.
///
/// Selection is UI state: it is never persisted and never captured in
/// history snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: HashSet<ItemId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a single item (clears other selections).
    pub fn select(&mut self, id: &ItemId) {
        self.selected.clear();
        self.selected.insert(id.clone());
    }

    /// Flip an item's membership. Returns whether it is now selected.
    pub fn toggle(&mut self, id: &ItemId) -> bool {
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.clone());
            true
        }
    }

    /// Remove an item from the selection.
    pub fn deselect(&mut self, id: &ItemId) -> bool {
        self.selected.remove(id)
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Drop ids for which `keep` returns false, e.g. items no longer on the board.
    pub fn retain(&mut self, mut keep: impl FnMut(&ItemId) -> bool) {
        self.selected.retain(|id| keep(id));
    }

    pub fn is_selected(&self, id: &ItemId) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
