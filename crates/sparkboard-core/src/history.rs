//! Linear undo/redo over snapshots of a board's item collection.
//!
//! A snapshot holds shared pointers to items. The live collection is
//! copy-on-write (`Arc::make_mut`), so editing an item after a snapshot was
//! taken clones that one item and leaves the stored snapshot untouched.

use crate::items::Item;
use std::sync::Arc;

/// Maximum number of snapshots to keep.
pub const MAX_UNDO_HISTORY: usize = 50;

/// Immutable copy of the item collection at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    items: Vec<Arc<Item>>,
}

impl Snapshot {
    /// Capture a collection.
    pub fn capture(items: &[Arc<Item>]) -> Self {
        Self {
            items: items.to_vec(),
        }
    }

    /// Items in collection order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().map(Arc::as_ref)
    }

    /// Shared handles, for restoring into a live collection.
    pub fn shared_items(&self) -> &[Arc<Item>] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the snapshot holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Snapshot stack with a cursor.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Snapshot>,
    /// Index of the current snapshot; `None` while empty.
    cursor: Option<usize>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// Create an empty history with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_UNDO_HISTORY)
    }

    /// Create an empty history keeping at most `capacity` snapshots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            capacity: capacity.max(1),
        }
    }

    /// Record a new current state, discarding anything redoable.
    pub fn push(&mut self, snapshot: Snapshot) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push(snapshot);

        // Limit history size
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Step back, returning the snapshot that is now current.
    pub fn undo(&mut self) -> Option<Snapshot> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        self.cursor = Some(cursor - 1);
        self.entries.get(cursor - 1).cloned()
    }

    /// Step forward, returning the snapshot that is now current.
    pub fn redo(&mut self) -> Option<Snapshot> {
        let cursor = self.cursor?;
        if cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor = Some(cursor + 1);
        self.entries.get(cursor + 1).cloned()
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    /// The current snapshot.
    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.cursor?)
    }

    /// Cursor index, `None` while empty.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no snapshot has been pushed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}
