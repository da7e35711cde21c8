//! Sparkboard Core Library
//!
//! Platform-agnostic spatial canvas engine for Sparkboard mood boards:
//! the item model, pointer gesture classification, undo/redo history,
//! automatic layout, and the canvas controller that ties them to an
//! asynchronous item store.

pub mod camera;
pub mod canvas;
pub mod config;
pub mod gesture;
pub mod history;
pub mod items;
pub mod layout;
pub mod persist;
pub mod selection;
pub mod storage;
pub mod uploads;

pub use camera::Camera;
pub use canvas::{Canvas, CanvasError, CanvasEvent, TapAction};
pub use config::{CanvasConfig, ConfigError};
pub use gesture::{GestureClassifier, GestureConfig, GestureEvent};
pub use history::{History, Snapshot};
pub use items::{BaseKind, BoardId, Content, FileMetadata, Item, ItemId, ItemKind, ItemRecord, MusicMetadata, NewItem};
pub use layout::{LayoutPolicy, Placement, RemoteLayoutError, arrange};
pub use selection::Selection;
pub use storage::{FileStore, ItemStore, MemoryStore, StoreError, StoreResult};
pub use uploads::{UploadEvent, UploadNotifier};
