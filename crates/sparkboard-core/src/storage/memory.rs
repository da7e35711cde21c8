//! In-memory item store.

use super::{BoxFuture, ItemStore, StoreError, StoreResult, new_item_id};
use crate::items::{ItemRecord, NewItem};
use kurbo::{Point, Size};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory store for tests and ephemeral boards.
///
/// Failures can be injected per operation, and every call is counted, so
/// tests can assert what the canvas did and did not send.
#[derive(Default)]
pub struct MemoryStore {
    boards: RwLock<HashMap<String, Vec<ItemRecord>>>,
    fail_loads: AtomicBool,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    load_calls: AtomicUsize,
    create_calls: AtomicUsize,
    position_writes: AtomicUsize,
    size_writes: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the counters.
    pub fn insert(&self, record: ItemRecord) {
        if let Ok(mut boards) = self.boards.write() {
            boards.entry(record.board_id.clone()).or_default().push(record);
        }
    }

    /// Current records of a board.
    pub fn records(&self, board_id: &str) -> Vec<ItemRecord> {
        self.boards
            .read()
            .ok()
            .and_then(|boards| boards.get(board_id).cloned())
            .unwrap_or_default()
    }

    /// Look up one record across all boards.
    pub fn record(&self, id: &str) -> Option<ItemRecord> {
        let boards = self.boards.read().ok()?;
        boards.values().flatten().find(|r| r.id == id).cloned()
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Make position and size writes fail.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn position_writes(&self) -> usize {
        self.position_writes.load(Ordering::SeqCst)
    }

    pub fn size_writes(&self) -> usize {
        self.size_writes.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn lock_error(e: impl std::fmt::Display) -> StoreError {
        StoreError::Other(format!("Lock error: {}", e))
    }

    fn update<F>(&self, id: &str, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut ItemRecord),
    {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Io("injected update failure".to_string()));
        }
        let mut boards = self.boards.write().map_err(Self::lock_error)?;
        let record = boards
            .values_mut()
            .flatten()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply(record);
        Ok(())
    }
}

impl ItemStore for MemoryStore {
    fn load_items(&self, board_id: &str) -> BoxFuture<'_, StoreResult<Vec<ItemRecord>>> {
        let board_id = board_id.to_string();
        Box::pin(async move {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(StoreError::Io("injected load failure".to_string()));
            }
            let boards = self.boards.read().map_err(Self::lock_error)?;
            Ok(boards.get(&board_id).cloned().unwrap_or_default())
        })
    }

    fn create_item(&self, board_id: &str, draft: &NewItem) -> BoxFuture<'_, StoreResult<ItemRecord>> {
        let board_id = board_id.to_string();
        let draft = draft.clone();
        Box::pin(async move {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_creates.load(Ordering::SeqCst) {
                return Err(StoreError::Io("injected create failure".to_string()));
            }
            let record = draft
                .to_record(new_item_id(), board_id.clone())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let mut boards = self.boards.write().map_err(Self::lock_error)?;
            boards.entry(board_id).or_default().push(record.clone());
            Ok(record)
        })
    }

    fn update_item_position(&self, id: &str, position: Point) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.position_writes.fetch_add(1, Ordering::SeqCst);
            self.update(&id, |r| {
                r.x = position.x;
                r.y = position.y;
            })
        })
    }

    fn update_item_size(&self, id: &str, size: Size) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.size_writes.fetch_add(1, Ordering::SeqCst);
            self.update(&id, |r| {
                r.width = size.width;
                r.height = size.height;
            })
        })
    }

    fn delete_item(&self, id: &str) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(StoreError::Io("injected delete failure".to_string()));
            }
            let mut boards = self.boards.write().map_err(Self::lock_error)?;
            for records in boards.values_mut() {
                if let Some(index) = records.iter().position(|r| r.id == id) {
                    records.remove(index);
                    return Ok(());
                }
            }
            Err(StoreError::NotFound(id))
        })
    }
}
