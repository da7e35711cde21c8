//! File-backed item store.

use super::{BoxFuture, ItemStore, StoreError, StoreResult, new_item_id};
use crate::items::{BoardId, ItemRecord, NewItem};
use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk layout of one board.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BoardFile {
    board_id: BoardId,
    #[serde(default)]
    items: Vec<ItemRecord>,
}

/// Stores each board as a JSON file in a directory.
///
/// Item-level writes locate the owning board by scanning the board files,
/// so ids only need to be unique across the directory.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: PathBuf) -> StoreResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StoreError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Create a store in the default location.
    ///
    /// On Linux: `~/.local/share/sparkboard/boards/`
    /// On Windows: `%LOCALAPPDATA%\sparkboard\boards\`
    pub fn default_location() -> StoreResult<Self> {
        Self::new(Self::default_path()?)
    }

    /// The default board directory.
    pub fn default_path() -> StoreResult<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StoreError::Io("Could not determine home directory".to_string()))?;
        Ok(base.join("sparkboard").join("boards"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Ids of every board with a file in the store.
    pub fn list_boards(&self) -> StoreResult<Vec<BoardId>> {
        let mut boards = Vec::new();
        for path in self.board_paths()? {
            boards.push(read_board(&path)?.board_id);
        }
        boards.sort();
        Ok(boards)
    }

    fn board_path(&self, board_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", file_stem(board_id)))
    }

    fn board_paths(&self) -> StoreResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.base_path)
            .map_err(|e| StoreError::Io(format!("Failed to read directory: {}", e)))?;
        Ok(entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect())
    }

    /// Apply `edit` to the board file holding item `id`.
    fn edit_item<F>(&self, id: &str, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<ItemRecord>, usize),
    {
        for path in self.board_paths()? {
            let mut board = read_board(&path)?;
            if let Some(index) = board.items.iter().position(|r| r.id == id) {
                edit(&mut board.items, index);
                return write_board(&path, &board);
            }
        }
        Err(StoreError::NotFound(id.to_string()))
    }
}

/// Reversible file name for a board id. Alphanumerics and `-` are kept,
/// every other byte becomes `_XX` hex, so distinct ids never share a file.
fn file_stem(board_id: &str) -> String {
    let mut stem = String::with_capacity(board_id.len());
    for c in board_id.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            stem.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                stem.push_str(&format!("_{:02X}", byte));
            }
        }
    }
    stem
}

/// Read a board file, refusing one that belongs to another board.
fn read_owned_board(path: &Path, board_id: &str) -> StoreResult<BoardFile> {
    let board = read_board(path)?;
    if board.board_id != board_id {
        return Err(StoreError::Rejected(format!(
            "{} holds board {}, not {}",
            path.display(),
            board.board_id,
            board_id
        )));
    }
    Ok(board)
}

fn read_board(path: &Path) -> StoreResult<BoardFile> {
    let json = fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&json)
        .map_err(|e| StoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e)))
}

fn write_board(path: &Path, board: &BoardFile) -> StoreResult<()> {
    let json = serde_json::to_string_pretty(board).map_err(|e| StoreError::Serialization(e.to_string()))?;
    fs::write(path, json).map_err(|e| StoreError::Io(format!("Failed to write {}: {}", path.display(), e)))
}

impl ItemStore for FileStore {
    fn load_items(&self, board_id: &str) -> BoxFuture<'_, StoreResult<Vec<ItemRecord>>> {
        let path = self.board_path(board_id);
        let board_id = board_id.to_string();
        Box::pin(async move {
            if !path.exists() {
                return Ok(Vec::new());
            }
            Ok(read_owned_board(&path, &board_id)?.items)
        })
    }

    fn create_item(&self, board_id: &str, draft: &NewItem) -> BoxFuture<'_, StoreResult<ItemRecord>> {
        let path = self.board_path(board_id);
        let record = draft
            .to_record(new_item_id(), board_id.to_string())
            .map_err(|e| StoreError::Serialization(e.to_string()));
        let board_id = board_id.to_string();

        Box::pin(async move {
            let record = record?;
            let mut board = if path.exists() {
                read_owned_board(&path, &board_id)?
            } else {
                BoardFile {
                    board_id,
                    items: Vec::new(),
                }
            };
            board.items.push(record.clone());
            write_board(&path, &board)?;
            Ok(record)
        })
    }

    fn update_item_position(&self, id: &str, position: Point) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.edit_item(&id, |items, i| {
                items[i].x = position.x;
                items[i].y = position.y;
            })
        })
    }

    fn update_item_size(&self, id: &str, size: Size) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.edit_item(&id, |items, i| {
                items[i].width = size.width;
                items[i].height = size.height;
            })
        })
    }

    fn delete_item(&self, id: &str) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.edit_item(&id, |items, i| {
                items.remove(i);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{Content, MusicMetadata};
    use pollster::block_on;
    use tempfile::tempdir;

    fn image_at(x: f64, y: f64) -> NewItem {
        NewItem::new(Content::Image { url: "https://cdn/a.png".to_string() }, Point::new(x, y))
    }

    #[test]
    fn test_create_and_load() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        let record = block_on(store.create_item("moodboard", &image_at(10.0, 20.0))).unwrap();
        let loaded = block_on(store.load_items("moodboard")).unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn test_missing_board_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert!(block_on(store.load_items("nothing")).unwrap().is_empty());
    }

    #[test]
    fn test_updates_survive_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = FileStore::new(dir.path().to_path_buf()).unwrap();
            let record = block_on(store.create_item("b", &image_at(0.0, 0.0))).unwrap();
            block_on(store.update_item_position(&record.id, Point::new(40.0, 50.0))).unwrap();
            block_on(store.update_item_size(&record.id, Size::new(90.0, 60.0))).unwrap();
            record.id
        };

        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let loaded = block_on(store.load_items("b")).unwrap();
        assert_eq!(loaded[0].id, id);
        assert_eq!((loaded[0].x, loaded[0].y), (40.0, 50.0));
        assert_eq!((loaded[0].width, loaded[0].height), (90.0, 60.0));
    }

    #[test]
    fn test_music_metadata_persists() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let mut music = MusicMetadata::new("spotify:track:42");
        music.artists = vec!["Stereolab".to_string()];
        let draft = NewItem::new(
            Content::Music { url: "https://cdn/p.mp3".to_string(), music: music.clone() },
            Point::ZERO,
        );

        block_on(store.create_item("b", &draft)).unwrap();
        let loaded = block_on(store.load_items("b")).unwrap();
        let meta = loaded[0].metadata.as_deref().and_then(MusicMetadata::parse);
        assert_eq!(meta, Some(music));
    }

    #[test]
    fn test_delete_and_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let record = block_on(store.create_item("b", &image_at(0.0, 0.0))).unwrap();

        block_on(store.delete_item(&record.id)).unwrap();
        assert!(block_on(store.load_items("b")).unwrap().is_empty());
        assert!(matches!(block_on(store.delete_item(&record.id)), Err(StoreError::NotFound(_))));
        assert!(matches!(
            block_on(store.update_item_position(&record.id, Point::ZERO)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_boards_and_sanitized_ids() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        block_on(store.create_item("trip/2024:spring", &image_at(0.0, 0.0))).unwrap();
        block_on(store.create_item("studio", &image_at(0.0, 0.0))).unwrap();

        assert_eq!(store.list_boards().unwrap(), vec!["studio".to_string(), "trip/2024:spring".to_string()]);
        assert_eq!(block_on(store.load_items("trip/2024:spring")).unwrap().len(), 1);
    }

    #[test]
    fn test_similar_ids_use_separate_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let slash = block_on(store.create_item("trip/2024", &image_at(0.0, 0.0))).unwrap();
        let underscore = block_on(store.create_item("trip_2024", &image_at(5.0, 5.0))).unwrap();

        assert_eq!(block_on(store.load_items("trip/2024")).unwrap(), vec![slash]);
        assert_eq!(block_on(store.load_items("trip_2024")).unwrap(), vec![underscore]);
        assert_eq!(store.list_boards().unwrap().len(), 2);
    }

    #[test]
    fn test_file_of_another_board_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        block_on(store.create_item("studio", &image_at(0.0, 0.0))).unwrap();
        fs::rename(dir.path().join("studio.json"), dir.path().join("lab.json")).unwrap();

        assert!(matches!(block_on(store.load_items("lab")), Err(StoreError::Rejected(_))));
        assert!(matches!(
            block_on(store.create_item("lab", &image_at(0.0, 0.0))),
            Err(StoreError::Rejected(_))
        ));
    }

    #[test]
    fn test_corrupt_board_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(matches!(block_on(store.load_items("broken")), Err(StoreError::Serialization(_))));
    }
}
