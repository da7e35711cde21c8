//! The item store collaborator and its implementations.
//!
//! The canvas never talks to a backend directly. Every read and write goes
//! through [`ItemStore`], whose methods return boxed futures so a backend
//! can be a remote table store, a local file, or memory.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::items::{ItemRecord, NewItem};
use kurbo::{Point, Size};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Rejected by store: {0}")]
    Rejected(String),
    #[error("Store error: {0}")]
    Other(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Backend holding the items of every board.
///
/// Board and item ids are opaque strings owned by the store. Implementations
/// must be `Send + Sync`: the canvas hands the store to a persistence
/// worker thread.
pub trait ItemStore: Send + Sync {
    /// Fetch all items of a board. An unknown board has no items.
    fn load_items(&self, board_id: &str) -> BoxFuture<'_, StoreResult<Vec<ItemRecord>>>;

    /// Persist a new item, returning the stored record with its assigned id.
    fn create_item(&self, board_id: &str, draft: &NewItem) -> BoxFuture<'_, StoreResult<ItemRecord>>;

    /// Move an item.
    fn update_item_position(&self, id: &str, position: Point) -> BoxFuture<'_, StoreResult<()>>;

    /// Resize an item.
    fn update_item_size(&self, id: &str, size: Size) -> BoxFuture<'_, StoreResult<()>>;

    /// Remove an item.
    fn delete_item(&self, id: &str) -> BoxFuture<'_, StoreResult<()>>;
}

/// Generate an id for a newly created item.
pub(crate) fn new_item_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
