//! Item definitions for the board canvas.

mod metadata;

pub use metadata::{DEFAULT_DISPLAY_MODE, FileMetadata, MusicMetadata};

use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier for an item, assigned by the item store.
pub type ItemId = String;

/// Opaque identifier for a board, assigned by the item store.
pub type BoardId = String;

/// The kind an item is persisted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseKind {
    Image,
    Note,
    Audio,
}

/// The kind an item is presented as.
///
/// `Music` and `File` are refinements of `Audio` and `Image`, derived from
/// the metadata payload; they are never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Image,
    Note,
    Audio,
    Music,
    File,
}

impl ItemKind {
    /// The persisted kind this presentation kind refines.
    pub fn base(self) -> BaseKind {
        match self {
            ItemKind::Image | ItemKind::File => BaseKind::Image,
            ItemKind::Note => BaseKind::Note,
            ItemKind::Audio | ItemKind::Music => BaseKind::Audio,
        }
    }

    /// Size given to a newly added item when none is requested.
    pub fn default_size(self) -> Size {
        match self {
            ItemKind::Image => Size::new(160.0, 160.0),
            ItemKind::File => Size::new(160.0, 100.0),
            ItemKind::Note => Size::new(160.0, 120.0),
            ItemKind::Audio => Size::new(160.0, 80.0),
            ItemKind::Music => Size::new(200.0, 80.0),
        }
    }

    /// Whether a tap on this kind toggles playback.
    pub fn is_playable(self) -> bool {
        matches!(self, ItemKind::Audio | ItemKind::Music)
    }
}

/// Errors raised while turning store records into items.
#[derive(Debug, Error, PartialEq)]
pub enum ItemError {
    #[error("Item {id} has non-finite geometry")]
    NonFiniteGeometry { id: ItemId },
    #[error("Failed to encode metadata: {0}")]
    Metadata(String),
}

/// Kind-specific payload of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Image { url: String },
    File { url: String, file: FileMetadata },
    Note { text: String, title: Option<String> },
    Audio { url: String },
    Music { url: String, music: MusicMetadata },
}

impl Content {
    /// Build content from the persisted fields, deriving the presentation kind.
    pub fn from_fields(
        kind: BaseKind,
        content: String,
        title: Option<String>,
        metadata: Option<&str>,
    ) -> Self {
        match kind {
            BaseKind::Note => Content::Note { text: content, title },
            BaseKind::Image => match metadata.and_then(FileMetadata::parse) {
                Some(file) => Content::File { url: content, file },
                None => Content::Image { url: content },
            },
            BaseKind::Audio => match metadata.and_then(MusicMetadata::parse) {
                Some(music) => Content::Music { url: content, music },
                None => Content::Audio { url: content },
            },
        }
    }

    /// Presentation kind of this content.
    pub fn kind(&self) -> ItemKind {
        match self {
            Content::Image { .. } => ItemKind::Image,
            Content::File { .. } => ItemKind::File,
            Content::Note { .. } => ItemKind::Note,
            Content::Audio { .. } => ItemKind::Audio,
            Content::Music { .. } => ItemKind::Music,
        }
    }

    /// Media URL, for kinds that have one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Content::Image { url }
            | Content::File { url, .. }
            | Content::Audio { url }
            | Content::Music { url, .. } => Some(url),
            Content::Note { .. } => None,
        }
    }

    /// Split into the persisted `(kind, content, title, metadata)` fields.
    pub fn to_fields(&self) -> Result<(BaseKind, String, Option<String>, Option<String>), ItemError> {
        let encode = |r: Result<String, serde_json::Error>| r.map_err(|e| ItemError::Metadata(e.to_string()));
        Ok(match self {
            Content::Image { url } => (BaseKind::Image, url.clone(), None, None),
            Content::File { url, file } => (BaseKind::Image, url.clone(), None, Some(encode(file.to_payload())?)),
            Content::Note { text, title } => (BaseKind::Note, text.clone(), title.clone(), None),
            Content::Audio { url } => (BaseKind::Audio, url.clone(), None, None),
            Content::Music { url, music } => (BaseKind::Audio, url.clone(), None, Some(encode(music.to_payload())?)),
        })
    }
}

/// An item as stored by the item store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub board_id: BoardId,
    pub kind: BaseKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// URL for media kinds, body text for notes.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Presentation metadata payload (JSON text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// A request to add an item to a board. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub content: Content,
    pub position: Point,
    /// Requested size; the kind's default is used when absent.
    pub size: Option<Size>,
}

impl NewItem {
    /// Create a draft at a board position.
    pub fn new(content: Content, position: Point) -> Self {
        Self { content, position, size: None }
    }

    /// Request an explicit size.
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    /// Size the item will be created with.
    pub fn effective_size(&self) -> Size {
        self.size.unwrap_or_else(|| self.content.kind().default_size())
    }

    /// Whether position and size are finite and the size is positive.
    pub fn is_valid(&self) -> bool {
        let size = self.effective_size();
        self.position.is_finite() && size.is_finite() && size.width > 0.0 && size.height > 0.0
    }

    /// Build the record a store persists for this draft.
    pub fn to_record(&self, id: ItemId, board_id: BoardId) -> Result<ItemRecord, ItemError> {
        let (kind, content, title, metadata) = self.content.to_fields()?;
        let size = self.effective_size();
        Ok(ItemRecord {
            id,
            board_id,
            kind,
            x: self.position.x,
            y: self.position.y,
            width: size.width,
            height: size.height,
            content,
            title,
            metadata,
        })
    }
}

/// An item placed on a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub(crate) id: ItemId,
    /// Top-left corner in board space.
    pub position: Point,
    /// Width and height in board space.
    pub size: Size,
    /// Kind-specific payload.
    pub content: Content,
}

impl Item {
    /// Create an item with an explicit id.
    pub fn new(id: impl Into<ItemId>, content: Content, position: Point, size: Size) -> Self {
        Self {
            id: id.into(),
            position,
            size,
            content,
        }
    }

    /// Ingest a store record, parsing its metadata once.
    ///
    /// Non-finite geometry is rejected. A non-positive size is replaced by
    /// the kind's default size.
    pub fn from_record(record: ItemRecord) -> Result<Self, ItemError> {
        let finite = [record.x, record.y, record.width, record.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ItemError::NonFiniteGeometry { id: record.id });
        }

        let content = Content::from_fields(
            record.kind,
            record.content,
            record.title,
            record.metadata.as_deref(),
        );
        let mut size = Size::new(record.width, record.height);
        if size.width <= 0.0 || size.height <= 0.0 {
            log::warn!("Item {} has degenerate size {:?}, using default", record.id, size);
            size = content.kind().default_size();
        }

        Ok(Self {
            id: record.id,
            position: Point::new(record.x, record.y),
            size,
            content,
        })
    }

    /// Convert back into a store record.
    pub fn to_record(&self, board_id: &str) -> Result<ItemRecord, ItemError> {
        let (kind, content, title, metadata) = self.content.to_fields()?;
        Ok(ItemRecord {
            id: self.id.clone(),
            board_id: board_id.to_string(),
            kind,
            x: self.position.x,
            y: self.position.y,
            width: self.size.width,
            height: self.size.height,
            content,
            title,
            metadata,
        })
    }

    /// Get the unique identifier.
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Presentation kind.
    pub fn kind(&self) -> ItemKind {
        self.content.kind()
    }

    /// Persisted kind.
    pub fn base_kind(&self) -> BaseKind {
        self.kind().base()
    }

    /// Bounding box in board space.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    /// Check if a board-space point hits this item.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.bounds().inflate(tolerance, tolerance).contains(point)
    }
}
