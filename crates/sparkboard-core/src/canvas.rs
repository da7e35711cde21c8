//! The canvas controller: owner of the open board's item collection.
//!
//! Every mutation path goes through [`Canvas`]: drags, resizes, deletes,
//! additions, organize passes, undo and redo. Mutations are applied to the
//! in-memory collection first, snapshotted into history, then queued to the
//! persistence worker. Completions come back through [`Canvas::poll_events`].

use crate::camera::Camera;
use crate::config::CanvasConfig;
use crate::gesture::{GestureClassifier, GestureEvent};
use crate::history::{History, Snapshot};
use crate::items::{BoardId, Item, ItemId, ItemKind, ItemRecord, NewItem};
use crate::layout::{self, LayoutPolicy, Placement, RemoteLayoutError};
use crate::persist::{PersistCommand, PersistEvent, PersistWorker, WorkerGone};
use crate::selection::Selection;
use crate::storage::{ItemStore, StoreResult};
use crate::uploads::{UploadEvent, UploadNotifier, UploadReceiver, upload_channel};
use kurbo::{Point, Rect, Size, Vec2};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors returned by canvas operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CanvasError {
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),
    #[error("Invalid geometry for item {0}")]
    InvalidGeometry(ItemId),
    #[error("Cannot organize while an item is being dragged")]
    DragInProgress,
    #[error("No board is open")]
    NoBoard,
    #[error(transparent)]
    RemoteLayout(#[from] RemoteLayoutError),
    #[error("Persistence worker is not running")]
    WorkerGone,
}

impl From<WorkerGone> for CanvasError {
    fn from(_: WorkerGone) -> Self {
        CanvasError::WorkerGone
    }
}

/// What a tap on an item means, by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapAction {
    /// Images and notes: the canvas toggled the item's selection.
    ToggleSelection,
    /// Audio and music: the host should start or stop playback.
    TogglePlayback,
    /// Files: the host should open the file externally.
    OpenExternal { url: String },
}

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// A board load finished and replaced the collection.
    Loaded { board_id: BoardId, count: usize },
    /// A board load failed; the collection is unchanged.
    LoadFailed { board_id: BoardId, message: String },
    /// A new item was stored and appended.
    ItemAdded { id: ItemId },
    /// The store refused a new item.
    AddFailed { message: String },
    Tapped { id: ItemId, action: TapAction },
    /// Long press: the host may show item details.
    DetailRequested { id: ItemId },
    /// A drag started; canvas panning is suspended until it ends.
    PanningSuspended { id: ItemId },
    /// Live drag position, for rendering only.
    DragPreview { id: ItemId, position: Point },
    /// A drag was committed.
    ItemMoved { id: ItemId, position: Point },
    /// The drag ended; panning resumes.
    PanningResumed { id: ItemId },
    /// The store refused a move, resize or delete. The local state is kept,
    /// except for deletes, which trigger a reload.
    WriteFailed { id: ItemId, message: String },
    /// An upload for the open board failed.
    UploadFailed { board_id: BoardId, message: String },
}

/// Controller for one open board.
pub struct Canvas {
    config: CanvasConfig,
    board_id: Option<BoardId>,
    /// Live collection. Items are copy-on-write so history snapshots share them.
    items: Vec<Arc<Item>>,
    history: History,
    selection: Selection,
    gesture: GestureClassifier,
    camera: Camera,
    worker: PersistWorker,
    uploads: UploadReceiver,
    notifier: UploadNotifier,
    /// Generation of the most recent load request.
    load_generation: u64,
    /// Value of `edits` when that load was requested.
    load_edits: u64,
    /// Count of local mutations since the canvas was created.
    edits: u64,
    reload_deferred: bool,
    outbox: Vec<CanvasEvent>,
}

impl Canvas {
    /// Create a canvas persisting through `store`.
    pub fn new(store: Arc<dyn ItemStore>, config: CanvasConfig) -> Self {
        let (notifier, uploads) = upload_channel();
        Self {
            history: History::with_capacity(config.history_capacity),
            gesture: GestureClassifier::new(config.gesture()),
            config,
            board_id: None,
            items: Vec::new(),
            selection: Selection::new(),
            camera: Camera::new(),
            worker: PersistWorker::spawn(store),
            uploads,
            notifier,
            load_generation: 0,
            load_edits: 0,
            edits: 0,
            reload_deferred: false,
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// The open board, if any.
    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    /// Items in collection order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().map(Arc::as_ref)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items().find(|item| item.id() == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.is_selected(&id.to_string())
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Whether an item is being dragged.
    pub fn is_dragging(&self) -> bool {
        self.gesture.is_dragging()
    }

    /// A sender for upload completions affecting this canvas.
    pub fn upload_notifier(&self) -> UploadNotifier {
        self.notifier.clone()
    }

    /// Board-space region visible through a viewport.
    pub fn visible_region(&self, viewport: Size) -> Rect {
        self.camera.visible_region(viewport)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    fn snapshot(&mut self) {
        self.history.push(Snapshot::capture(&self.items));
    }

    fn persist(&mut self, command: PersistCommand) -> Result<(), CanvasError> {
        self.worker.submit(command).map_err(|e| {
            log::error!("Persistence worker is gone, write dropped");
            CanvasError::from(e)
        })
    }

    // --- Loading ---

    /// Open a board and fetch its items.
    ///
    /// Switching boards clears the collection, history and selection. The
    /// fetched items arrive through [`Canvas::poll_events`] or
    /// [`Canvas::flush`]; the first load of a board seeds history.
    pub fn load(&mut self, board_id: impl Into<BoardId>) -> Result<(), CanvasError> {
        let board_id = board_id.into();
        if self.board_id.as_ref() != Some(&board_id) {
            self.reload_deferred = false;
            let events = self.gesture.cancel();
            let translated = self.dispatch(events);
            self.outbox.extend(translated);

            self.items.clear();
            self.history.clear();
            self.selection.clear();
            log::info!("Opening board {}", board_id);
            self.board_id = Some(board_id);
        }
        self.request_load()
    }

    /// Re-fetch the open board. Deferred until drag-end while dragging.
    pub fn reload(&mut self) -> Result<(), CanvasError> {
        self.request_load()
    }

    fn request_load(&mut self) -> Result<(), CanvasError> {
        let board_id = self.board_id.clone().ok_or(CanvasError::NoBoard)?;
        if self.gesture.is_dragging() {
            log::info!("Deferring reload of {} until the drag ends", board_id);
            self.reload_deferred = true;
            return Ok(());
        }
        self.reload_deferred = false;
        self.load_generation += 1;
        self.load_edits = self.edits;
        self.persist(PersistCommand::Load {
            board_id,
            generation: self.load_generation,
        })
    }

    fn finish_load(&mut self, board_id: BoardId, generation: u64, result: StoreResult<Vec<ItemRecord>>) {
        if self.board_id.as_ref() != Some(&board_id) || generation != self.load_generation {
            log::debug!("Discarding stale load of {} (generation {})", board_id, generation);
            return;
        }
        if self.gesture.is_dragging() {
            log::info!("Load of {} arrived mid-drag, reloading after the drag", board_id);
            self.reload_deferred = true;
            return;
        }
        if self.edits != self.load_edits {
            // Local edits were queued after this load; fetch again so they are included.
            log::debug!("Load of {} predates local edits, reloading", board_id);
            if let Err(e) = self.request_load() {
                log::error!("Failed to reload {}: {}", board_id, e);
            }
            return;
        }

        match result {
            Ok(records) => {
                self.items = records
                    .into_iter()
                    .filter_map(|record| match Item::from_record(record) {
                        Ok(item) => Some(Arc::new(item)),
                        Err(e) => {
                            log::warn!("Skipping stored item: {}", e);
                            None
                        }
                    })
                    .collect();
                let items = &self.items;
                self.selection.retain(|id| items.iter().any(|item| item.id() == id));
                if self.history.is_empty() {
                    self.snapshot();
                }
                log::info!("Loaded {} items for board {}", self.items.len(), board_id);
                self.outbox.push(CanvasEvent::Loaded {
                    board_id,
                    count: self.items.len(),
                });
            }
            Err(e) => {
                log::error!("Failed to load board {}: {}", board_id, e);
                self.outbox.push(CanvasEvent::LoadFailed {
                    board_id,
                    message: e.to_string(),
                });
            }
        }
    }

    // --- Mutations ---

    /// Move an item. Non-finite coordinates are rejected without touching
    /// the item or the store.
    pub fn apply_move(&mut self, id: &str, position: Point) -> Result<(), CanvasError> {
        if !position.is_finite() {
            log::warn!("Rejected non-finite move of {} to {:?}", id, position);
            return Err(CanvasError::InvalidGeometry(id.to_string()));
        }
        let index = self.index_of(id).ok_or_else(|| CanvasError::UnknownItem(id.to_string()))?;

        Arc::make_mut(&mut self.items[index]).position = position;
        self.edits += 1;
        self.snapshot();
        self.persist(PersistCommand::UpdatePosition {
            id: id.to_string(),
            position,
        })
    }

    /// Resize an item. Each edge is clamped to the configured minimum.
    pub fn apply_resize(&mut self, id: &str, size: Size) -> Result<(), CanvasError> {
        if !size.is_finite() || size.width <= 0.0 || size.height <= 0.0 {
            log::warn!("Rejected invalid resize of {} to {:?}", id, size);
            return Err(CanvasError::InvalidGeometry(id.to_string()));
        }
        let index = self.index_of(id).ok_or_else(|| CanvasError::UnknownItem(id.to_string()))?;
        let min = self.config.min_item_size;
        let size = Size::new(size.width.max(min), size.height.max(min));

        Arc::make_mut(&mut self.items[index]).size = size;
        self.edits += 1;
        self.snapshot();
        self.persist(PersistCommand::UpdateSize {
            id: id.to_string(),
            size,
        })
    }

    /// Remove an item. If the store refuses, the board is reloaded.
    pub fn apply_delete(&mut self, id: &str) -> Result<(), CanvasError> {
        let index = self.index_of(id).ok_or_else(|| CanvasError::UnknownItem(id.to_string()))?;

        let removed = self.items.remove(index);
        self.selection.deselect(removed.id());
        self.edits += 1;
        self.snapshot();
        self.persist(PersistCommand::Delete { id: id.to_string() })
    }

    /// Apply many positions as one undoable step.
    ///
    /// Ids not on the board and non-finite positions are skipped. Returns
    /// how many items moved; nothing is recorded when none did.
    pub fn apply_bulk_positions(&mut self, placements: Vec<Placement>) -> Result<usize, CanvasError> {
        let mut writes = Vec::new();
        for placement in placements {
            if !placement.position.is_finite() {
                log::warn!("Skipping non-finite placement for {}", placement.id);
                continue;
            }
            let Some(index) = self.index_of(&placement.id) else {
                log::debug!("Skipping placement for missing item {}", placement.id);
                continue;
            };
            Arc::make_mut(&mut self.items[index]).position = placement.position;
            writes.push(PersistCommand::UpdatePosition {
                id: placement.id,
                position: placement.position,
            });
        }

        if writes.is_empty() {
            return Ok(0);
        }
        let moved = writes.len();
        self.edits += 1;
        self.snapshot();
        for command in writes {
            self.persist(command)?;
        }
        Ok(moved)
    }

    /// Ask the store to create an item on the open board.
    ///
    /// The item is appended once the store returns it with its id.
    pub fn add_item(&mut self, draft: NewItem) -> Result<(), CanvasError> {
        let board_id = self.board_id.clone().ok_or(CanvasError::NoBoard)?;
        if !draft.is_valid() {
            log::warn!("Rejected new item with invalid geometry");
            return Err(CanvasError::InvalidGeometry(String::new()));
        }
        self.persist(PersistCommand::Create { board_id, draft })
    }

    fn finish_create(&mut self, board_id: BoardId, result: StoreResult<ItemRecord>) {
        if self.board_id.as_ref() != Some(&board_id) {
            log::debug!("Created item belongs to a board that is no longer open");
            return;
        }
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::error!("Failed to create item on {}: {}", board_id, e);
                self.outbox.push(CanvasEvent::AddFailed { message: e.to_string() });
                return;
            }
        };
        if self.index_of(&record.id).is_some() {
            // A reload already brought it in.
            return;
        }
        match Item::from_record(record) {
            Ok(item) => {
                let id = item.id().clone();
                self.items.push(Arc::new(item));
                self.edits += 1;
                self.snapshot();
                self.outbox.push(CanvasEvent::ItemAdded { id });
            }
            Err(e) => {
                log::error!("Store returned an unusable item: {}", e);
                self.outbox.push(CanvasEvent::AddFailed { message: e.to_string() });
            }
        }
    }

    // --- History ---

    /// Step back one change. Every item in the restored state is written
    /// back to the store.
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Step forward one change.
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let events = self.gesture.cancel();
        let translated = self.dispatch(events);
        self.outbox.extend(translated);

        self.items = snapshot.shared_items().to_vec();
        let items = &self.items;
        self.selection.retain(|id| items.iter().any(|item| item.id() == id));
        self.edits += 1;

        let writes: Vec<PersistCommand> = self
            .items
            .iter()
            .flat_map(|item| {
                [
                    PersistCommand::UpdatePosition {
                        id: item.id().clone(),
                        position: item.position,
                    },
                    PersistCommand::UpdateSize {
                        id: item.id().clone(),
                        size: item.size,
                    },
                ]
            })
            .collect();
        for command in writes {
            if self.persist(command).is_err() {
                break;
            }
        }
    }

    // --- Selection ---

    /// Select a single item.
    pub fn select(&mut self, id: &str) -> Result<(), CanvasError> {
        let index = self.index_of(id).ok_or_else(|| CanvasError::UnknownItem(id.to_string()))?;
        let id = self.items[index].id().clone();
        self.selection.select(&id);
        Ok(())
    }

    /// Flip an item's selection. Returns whether it is now selected.
    pub fn toggle_select(&mut self, id: &str) -> Result<bool, CanvasError> {
        let index = self.index_of(id).ok_or_else(|| CanvasError::UnknownItem(id.to_string()))?;
        let id = self.items[index].id().clone();
        Ok(self.selection.toggle(&id))
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // --- Layout ---

    /// Rearrange every item inside `region` as one undoable step.
    pub fn organize(&mut self, policy: LayoutPolicy, region: Rect) -> Result<usize, CanvasError> {
        if self.gesture.is_dragging() {
            return Err(CanvasError::DragInProgress);
        }
        let placements = layout::arrange(
            self.items.iter().map(Arc::as_ref),
            region,
            policy,
            self.config.layout_padding,
        );
        log::info!("Organizing {} items with {}", placements.len(), policy.name());
        self.apply_bulk_positions(placements)
    }

    /// Apply the outcome of a remote organize call.
    ///
    /// Quota, billing and rate-limit failures fall back to the grid policy;
    /// other failures are returned to the caller.
    pub fn organize_with_remote(
        &mut self,
        result: Result<Vec<Placement>, RemoteLayoutError>,
        region: Rect,
    ) -> Result<usize, CanvasError> {
        if self.gesture.is_dragging() {
            return Err(CanvasError::DragInProgress);
        }
        match result {
            Ok(placements) => {
                let placements = layout::sanitize_remote(placements, self.items.iter().map(Arc::as_ref), region);
                self.apply_bulk_positions(placements)
            }
            Err(e) if e.falls_back_to_grid() => {
                log::warn!("{}, falling back to grid", e);
                self.organize(LayoutPolicy::Grid, region)
            }
            Err(e) => Err(CanvasError::RemoteLayout(e)),
        }
    }

    // --- Pointer input ---

    /// Pointer pressed on an item at a screen position.
    pub fn pointer_down(&mut self, id: &str, pointer: Point, now: Instant) -> Vec<CanvasEvent> {
        let Some(item) = self.item(id) else {
            log::debug!("Pointer down on unknown item {}", id);
            return Vec::new();
        };
        let (id, origin) = (item.id().clone(), item.position);
        let events = self.gesture.press(id, pointer, origin, self.camera.zoom, now);
        self.dispatch(events)
    }

    pub fn pointer_move(&mut self, pointer: Point, now: Instant) -> Vec<CanvasEvent> {
        let events = self.gesture.pointer_move(pointer, now);
        self.dispatch(events)
    }

    pub fn pointer_up(&mut self, pointer: Point, now: Instant) -> Vec<CanvasEvent> {
        let events = self.gesture.release(pointer, now);
        self.dispatch(events)
    }

    /// Fire gesture timers that are due.
    pub fn tick(&mut self, now: Instant) -> Vec<CanvasEvent> {
        let events = self.gesture.tick(now);
        self.dispatch(events)
    }

    /// When [`Canvas::tick`] next needs to run, if a timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.gesture.long_press_deadline()
    }

    /// Pointer capture lost: abort the gesture without committing.
    pub fn cancel_gesture(&mut self) -> Vec<CanvasEvent> {
        let events = self.gesture.cancel();
        self.dispatch(events)
    }

    /// Where an item should be drawn: the live drag position while it is
    /// dragged, its stored position otherwise.
    pub fn rendered_position(&self, id: &str) -> Option<Point> {
        if let Some((dragged, position)) = self.gesture.live_position() {
            if dragged == id {
                return Some(position);
            }
        }
        self.item(id).map(|item| item.position)
    }

    /// Topmost item under a screen position.
    pub fn item_at(&self, screen_point: Point) -> Option<&Item> {
        let point = self.camera.screen_to_board(screen_point);
        self.items.iter().rev().map(Arc::as_ref).find(|item| item.hit_test(point, 0.0))
    }

    /// Pan the view. Ignored while an item is dragged.
    pub fn pan(&mut self, delta: Vec2) -> bool {
        if self.gesture.is_dragging() {
            log::trace!("Pan suspended during drag");
            return false;
        }
        self.camera.pan(delta);
        true
    }

    /// Zoom the view around a screen point.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        self.camera.zoom_at(screen_point, factor);
    }

    fn tap_action(&self, id: &str) -> Option<TapAction> {
        let item = self.item(id)?;
        let kind = item.kind();
        Some(if kind.is_playable() {
            TapAction::TogglePlayback
        } else if kind == ItemKind::File {
            TapAction::OpenExternal {
                url: item.content.url().unwrap_or_default().to_string(),
            }
        } else {
            TapAction::ToggleSelection
        })
    }

    fn dispatch(&mut self, events: Vec<GestureEvent>) -> Vec<CanvasEvent> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            match event {
                GestureEvent::Tap { id } => {
                    let Some(action) = self.tap_action(&id) else {
                        continue;
                    };
                    if action == TapAction::ToggleSelection {
                        self.selection.toggle(&id);
                    }
                    out.push(CanvasEvent::Tapped { id, action });
                }
                GestureEvent::LongPress { id } => out.push(CanvasEvent::DetailRequested { id }),
                GestureEvent::DragStart { id } => out.push(CanvasEvent::PanningSuspended { id }),
                GestureEvent::DragMove { id, position } => out.push(CanvasEvent::DragPreview { id, position }),
                GestureEvent::MoveEnd { id, position } => {
                    let position = Point::new(position.x.round(), position.y.round());
                    match self.apply_move(&id, position) {
                        Ok(()) => out.push(CanvasEvent::ItemMoved { id, position }),
                        Err(e) => log::warn!("Dropping drag of {}: {}", id, e),
                    }
                }
                GestureEvent::DragEnd { id } => {
                    out.push(CanvasEvent::PanningResumed { id });
                    if self.reload_deferred {
                        if let Err(e) = self.request_load() {
                            log::error!("Deferred reload failed: {}", e);
                        }
                    }
                }
            }
        }
        out
    }

    // --- Completions ---

    fn handle_persist(&mut self, event: PersistEvent) {
        match event {
            PersistEvent::Loaded {
                board_id,
                generation,
                result,
            } => self.finish_load(board_id, generation, result),
            PersistEvent::Created { board_id, result } => self.finish_create(board_id, result),
            PersistEvent::PositionWritten { id, result: Err(e) } => {
                log::warn!("Failed to persist position of {}: {}", id, e);
                self.outbox.push(CanvasEvent::WriteFailed { id, message: e.to_string() });
            }
            PersistEvent::SizeWritten { id, result: Err(e) } => {
                log::warn!("Failed to persist size of {}: {}", id, e);
                self.outbox.push(CanvasEvent::WriteFailed { id, message: e.to_string() });
            }
            PersistEvent::Deleted { id, result: Err(e) } => {
                log::error!("Failed to delete {}: {}, resynchronizing", id, e);
                self.outbox.push(CanvasEvent::WriteFailed { id, message: e.to_string() });
                if let Err(e) = self.request_load() {
                    log::error!("Resynchronization failed: {}", e);
                }
            }
            PersistEvent::PositionWritten { .. } | PersistEvent::SizeWritten { .. } | PersistEvent::Deleted { .. } => {}
        }
    }

    fn handle_upload(&mut self, event: UploadEvent) {
        if self.board_id.as_deref() != Some(event.board_id()) {
            return;
        }
        match event {
            UploadEvent::Completed { board_id } => {
                log::info!("Upload finished for {}, reloading", board_id);
                if let Err(e) = self.request_load() {
                    log::error!("Reload after upload failed: {}", e);
                }
            }
            UploadEvent::Failed { board_id, message } => {
                log::warn!("Upload for {} failed: {}", board_id, message);
                self.outbox.push(CanvasEvent::UploadFailed { board_id, message });
            }
        }
    }

    /// Process finished writes, loads and upload notifications (non-blocking).
    pub fn poll_events(&mut self) -> Vec<CanvasEvent> {
        for event in self.worker.poll() {
            self.handle_persist(event);
        }
        for event in self.uploads.drain() {
            self.handle_upload(event);
        }
        std::mem::take(&mut self.outbox)
    }

    /// Block until every queued write and load has completed, or `timeout`
    /// elapses. Returns whether the queue drained. Events produced while
    /// waiting are kept for the next [`Canvas::poll_events`].
    pub fn flush(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        for event in self.uploads.drain() {
            self.handle_upload(event);
        }
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            for event in self.worker.wait(remaining) {
                self.handle_persist(event);
            }
            if self.worker.in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{BaseKind, Content, FileMetadata};
    use crate::storage::MemoryStore;

    const WAIT: Duration = Duration::from_secs(5);
    const BOARD: &str = "board";

    fn record(id: &str, kind: BaseKind, x: f64, y: f64) -> ItemRecord {
        ItemRecord {
            id: id.to_string(),
            board_id: BOARD.to_string(),
            kind,
            x,
            y,
            width: 80.0,
            height: 80.0,
            content: format!("https://cdn/{id}"),
            title: None,
            metadata: None,
        }
    }

    /// A canvas over a store holding images `a`, `b`, `c`, loaded and settled.
    fn setup() -> (Arc<MemoryStore>, Canvas) {
        let store = Arc::new(MemoryStore::new());
        store.insert(record("a", BaseKind::Image, 0.0, 0.0));
        store.insert(record("b", BaseKind::Image, 100.0, 0.0));
        store.insert(record("c", BaseKind::Image, 200.0, 0.0));
        let mut canvas = Canvas::new(store.clone(), CanvasConfig::default());
        canvas.load(BOARD).unwrap();
        assert!(canvas.flush(WAIT));
        (store, canvas)
    }

    fn pos(canvas: &Canvas, id: &str) -> Point {
        canvas.item(id).unwrap().position
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_load_seeds_history_once() {
        let (store, mut canvas) = setup();
        assert_eq!(canvas.len(), 3);
        assert_eq!(canvas.history().len(), 1);
        assert_eq!(
            canvas.poll_events(),
            vec![CanvasEvent::Loaded { board_id: BOARD.to_string(), count: 3 }]
        );

        canvas.reload().unwrap();
        assert!(canvas.flush(WAIT));
        assert_eq!(canvas.history().len(), 1);
        assert_eq!(store.load_calls(), 2);
    }

    #[test]
    fn test_load_requested_before_local_edit_is_refetched() {
        let (store, mut canvas) = setup();
        canvas.poll_events();

        canvas.reload().unwrap();
        canvas.apply_move("a", Point::new(40.0, 50.0)).unwrap();
        assert!(canvas.flush(WAIT));

        assert_eq!(store.load_calls(), 3);
        assert_eq!(pos(&canvas, "a"), Point::new(40.0, 50.0));
        assert_eq!(canvas.history().len(), 2);
        assert_eq!(
            canvas.poll_events(),
            vec![CanvasEvent::Loaded { board_id: BOARD.to_string(), count: 3 }]
        );
    }

    #[test]
    fn test_superseded_load_is_dropped() {
        let (store, mut canvas) = setup();
        canvas.poll_events();

        canvas.reload().unwrap();
        canvas.reload().unwrap();
        assert!(canvas.flush(WAIT));
        assert_eq!(store.load_calls(), 3);
        assert_eq!(canvas.poll_events().len(), 1);

        let ghost = record("ghost", BaseKind::Image, 0.0, 0.0);
        canvas.finish_load(BOARD.to_string(), 1, Ok(vec![ghost.clone()]));
        canvas.finish_load("other".to_string(), canvas.load_generation, Ok(vec![ghost]));
        assert!(canvas.item("ghost").is_none());
        assert_eq!(canvas.len(), 3);
        assert!(canvas.poll_events().is_empty());
    }

    #[test]
    fn test_item_at_follows_camera_and_stacking() {
        let (_store, mut canvas) = setup();
        assert_eq!(canvas.item_at(Point::new(150.0, 40.0)).map(|i| i.id().as_str()), Some("b"));
        assert!(canvas.item_at(Point::new(90.0, 40.0)).is_none());

        canvas.apply_move("c", Point::new(120.0, 0.0)).unwrap();
        assert_eq!(canvas.item_at(Point::new(150.0, 40.0)).map(|i| i.id().as_str()), Some("c"));

        canvas.zoom_at(Point::ZERO, 2.0);
        assert_eq!(canvas.item_at(Point::new(100.0, 80.0)).map(|i| i.id().as_str()), Some("a"));
    }

    #[test]
    fn test_load_failure_keeps_collection() {
        let (store, mut canvas) = setup();
        canvas.poll_events();
        store.fail_loads(true);
        canvas.reload().unwrap();
        assert!(canvas.flush(WAIT));
        assert_eq!(canvas.len(), 3);
        assert!(matches!(&canvas.poll_events()[..], [CanvasEvent::LoadFailed { .. }]));
    }

    #[test]
    fn test_move_applies_and_persists() {
        let (store, mut canvas) = setup();
        canvas.apply_move("a", Point::new(40.0, 50.0)).unwrap();
        assert_eq!(pos(&canvas, "a"), Point::new(40.0, 50.0));
        assert_eq!(canvas.history().len(), 2);

        assert!(canvas.flush(WAIT));
        let stored = store.record("a").unwrap();
        assert_eq!((stored.x, stored.y), (40.0, 50.0));
    }

    #[test]
    fn test_non_finite_move_is_rejected() {
        let (store, mut canvas) = setup();
        assert_eq!(
            canvas.apply_move("a", Point::new(f64::NAN, 5.0)),
            Err(CanvasError::InvalidGeometry("a".to_string()))
        );
        assert!(canvas.flush(WAIT));
        assert_eq!(pos(&canvas, "a"), Point::ZERO);
        assert_eq!(store.position_writes(), 0);
        assert_eq!(canvas.history().len(), 1);
    }

    #[test]
    fn test_unknown_item() {
        let (_store, mut canvas) = setup();
        assert_eq!(
            canvas.apply_move("zzz", Point::ZERO),
            Err(CanvasError::UnknownItem("zzz".to_string()))
        );
        assert!(canvas.apply_delete("zzz").is_err());
    }

    #[test]
    fn test_failed_move_is_not_rolled_back() {
        let (store, mut canvas) = setup();
        store.fail_updates(true);
        canvas.apply_move("b", Point::new(9.0, 9.0)).unwrap();
        assert!(canvas.flush(WAIT));
        assert_eq!(pos(&canvas, "b"), Point::new(9.0, 9.0));
        assert_eq!(store.record("b").unwrap().x, 100.0);
        assert!(
            canvas
                .poll_events()
                .iter()
                .any(|e| matches!(e, CanvasEvent::WriteFailed { id, .. } if id == "b"))
        );
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let (store, mut canvas) = setup();
        canvas.apply_resize("a", Size::new(10.0, 300.0)).unwrap();
        assert_eq!(canvas.item("a").unwrap().size, Size::new(40.0, 300.0));
        assert!(canvas.apply_resize("a", Size::new(0.0, 10.0)).is_err());
        assert!(canvas.flush(WAIT));
        assert_eq!(store.record("a").unwrap().width, 40.0);
    }

    #[test]
    fn test_delete_failure_resynchronizes() {
        let (store, mut canvas) = setup();
        store.fail_deletes(true);
        canvas.apply_delete("a").unwrap();
        assert!(canvas.item("a").is_none());

        assert!(canvas.flush(WAIT));
        assert!(canvas.item("a").is_some());
        assert_eq!(store.load_calls(), 2);
    }

    #[test]
    fn test_delete_prunes_selection() {
        let (store, mut canvas) = setup();
        canvas.select("a").unwrap();
        canvas.apply_delete("a").unwrap();
        assert!(!canvas.is_selected("a"));
        assert!(canvas.flush(WAIT));
        assert!(store.record("a").is_none());
    }

    #[test]
    fn test_history_linearity() {
        let (_store, mut canvas) = setup();
        let mut states = vec![canvas.items().cloned().collect::<Vec<_>>()];
        for i in 1..=5 {
            canvas.apply_move("a", Point::new(i as f64 * 10.0, 0.0)).unwrap();
            states.push(canvas.items().cloned().collect());
        }

        for k in 1..=3 {
            assert!(canvas.undo());
            assert_eq!(canvas.items().cloned().collect::<Vec<_>>(), states[5 - k]);
        }
        for _ in 0..3 {
            assert!(canvas.redo());
        }
        assert_eq!(canvas.items().cloned().collect::<Vec<_>>(), states[5]);
        assert!(!canvas.redo());
    }

    #[test]
    fn test_undo_restores_deleted_item_locally() {
        let (_store, mut canvas) = setup();
        canvas.apply_delete("b").unwrap();
        assert!(canvas.undo());
        assert!(canvas.item("b").is_some());
        assert!(!canvas.undo());
    }

    #[test]
    fn test_undo_repersists_every_item() {
        let (store, mut canvas) = setup();
        canvas.apply_move("a", Point::new(50.0, 50.0)).unwrap();
        assert!(canvas.flush(WAIT));
        let before = store.position_writes();

        assert!(canvas.undo());
        assert!(canvas.flush(WAIT));
        assert_eq!(store.position_writes(), before + 3);
        assert_eq!(store.size_writes(), 3);
        assert_eq!(store.record("a").unwrap().x, 0.0);
    }

    #[test]
    fn test_new_change_after_undo_truncates_redo() {
        let (_store, mut canvas) = setup();
        for i in 1..=3 {
            canvas.apply_move("a", Point::new(i as f64, 0.0)).unwrap();
        }
        canvas.undo();
        canvas.undo();
        canvas.apply_move("b", Point::new(7.0, 7.0)).unwrap();
        assert!(!canvas.can_redo());
        assert!(!canvas.redo());
    }

    #[test]
    fn test_add_item_appends_after_store_confirms() {
        let (store, mut canvas) = setup();
        canvas.poll_events();
        let draft = NewItem::new(
            Content::Note { text: "palette ideas".to_string(), title: Some("Colors".to_string()) },
            Point::new(300.0, 300.0),
        );
        canvas.add_item(draft).unwrap();
        assert_eq!(canvas.len(), 3);

        assert!(canvas.flush(WAIT));
        assert_eq!(canvas.len(), 4);
        assert_eq!(canvas.history().len(), 2);
        let events = canvas.poll_events();
        let id = match &events[..] {
            [CanvasEvent::ItemAdded { id }] => id.clone(),
            other => panic!("unexpected events {:?}", other),
        };
        assert_eq!(canvas.item(&id).unwrap().kind(), ItemKind::Note);
        assert_eq!(store.records(BOARD).len(), 4);
    }

    #[test]
    fn test_add_item_requires_board_and_valid_geometry() {
        let store = Arc::new(MemoryStore::new());
        let mut canvas = Canvas::new(store.clone(), CanvasConfig::default());
        let draft = NewItem::new(Content::Image { url: "u".to_string() }, Point::ZERO);
        assert_eq!(canvas.add_item(draft), Err(CanvasError::NoBoard));

        canvas.load(BOARD).unwrap();
        let bad = NewItem::new(Content::Image { url: "u".to_string() }, Point::new(f64::NAN, 0.0));
        assert!(matches!(canvas.add_item(bad), Err(CanvasError::InvalidGeometry(_))));
        assert!(canvas.flush(WAIT));
        assert_eq!(store.create_calls(), 0);
    }

    #[test]
    fn test_bulk_positions_single_snapshot_and_skips_missing() {
        let (store, mut canvas) = setup();
        let moved = canvas
            .apply_bulk_positions(vec![
                Placement::new("a", Point::new(1.0, 1.0)),
                Placement::new("ghost", Point::new(2.0, 2.0)),
                Placement::new("c", Point::new(3.0, 3.0)),
            ])
            .unwrap();
        assert_eq!(moved, 2);
        assert_eq!(canvas.history().len(), 2);
        assert!(canvas.flush(WAIT));
        assert_eq!(store.position_writes(), 2);

        assert_eq!(canvas.apply_bulk_positions(vec![Placement::new("ghost", Point::ZERO)]), Ok(0));
        assert_eq!(canvas.history().len(), 2);
    }

    #[test]
    fn test_organize_is_one_undo_step() {
        let (_store, mut canvas) = setup();
        let before: Vec<Point> = canvas.items().map(|i| i.position).collect();
        let moved = canvas.organize(LayoutPolicy::Grid, Rect::new(0.0, 0.0, 600.0, 600.0)).unwrap();
        assert_eq!(moved, 3);
        assert_ne!(canvas.items().map(|i| i.position).collect::<Vec<_>>(), before);

        assert!(canvas.undo());
        assert_eq!(canvas.items().map(|i| i.position).collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_tap_actions_by_kind() {
        let store = Arc::new(MemoryStore::new());
        store.insert(record("img", BaseKind::Image, 0.0, 0.0));
        store.insert(record("clip", BaseKind::Audio, 200.0, 0.0));
        let mut file = record("doc", BaseKind::Image, 400.0, 0.0);
        file.metadata = Some(FileMetadata::new("brief.pdf").to_payload().unwrap());
        store.insert(file);
        let mut canvas = Canvas::new(store, CanvasConfig::default());
        canvas.load(BOARD).unwrap();
        assert!(canvas.flush(WAIT));

        let t0 = Instant::now();
        let tap = |canvas: &mut Canvas, id: &str| {
            canvas.pointer_down(id, Point::new(10.0, 10.0), t0);
            canvas.pointer_up(Point::new(10.0, 10.0), t0 + ms(100))
        };

        assert_eq!(
            tap(&mut canvas, "img"),
            vec![CanvasEvent::Tapped { id: "img".to_string(), action: TapAction::ToggleSelection }]
        );
        assert!(canvas.is_selected("img"));
        assert_eq!(
            tap(&mut canvas, "clip"),
            vec![CanvasEvent::Tapped { id: "clip".to_string(), action: TapAction::TogglePlayback }]
        );
        assert_eq!(
            tap(&mut canvas, "doc"),
            vec![CanvasEvent::Tapped {
                id: "doc".to_string(),
                action: TapAction::OpenExternal { url: "https://cdn/doc".to_string() },
            }]
        );
        assert!(!canvas.is_selected("clip"));
    }

    #[test]
    fn test_drag_commits_once_and_suspends_panning() {
        let (store, mut canvas) = setup();
        let t0 = Instant::now();

        assert!(canvas.pointer_down("b", Point::new(500.0, 500.0), t0).is_empty());
        let events = canvas.pointer_move(Point::new(530.0, 510.0), t0 + ms(50));
        assert_eq!(events[0], CanvasEvent::PanningSuspended { id: "b".to_string() });
        assert!(canvas.is_dragging());
        assert_eq!(canvas.rendered_position("b"), Some(Point::new(130.0, 10.0)));
        assert_eq!(pos(&canvas, "b"), Point::new(100.0, 0.0));

        assert!(!canvas.pan(Vec2::new(50.0, 50.0)));
        assert_eq!(canvas.camera().offset, Vec2::ZERO);

        canvas.pointer_move(Point::new(560.0, 540.0), t0 + ms(80));
        assert_eq!(canvas.history().len(), 1);

        let events = canvas.pointer_up(Point::new(565.0, 545.0), t0 + ms(120));
        assert_eq!(
            events,
            vec![
                CanvasEvent::ItemMoved { id: "b".to_string(), position: Point::new(165.0, 45.0) },
                CanvasEvent::PanningResumed { id: "b".to_string() },
            ]
        );
        assert_eq!(pos(&canvas, "b"), Point::new(165.0, 45.0));
        assert_eq!(canvas.history().len(), 2);
        assert!(canvas.pan(Vec2::new(5.0, 0.0)));

        assert!(canvas.flush(WAIT));
        assert_eq!(store.position_writes(), 1);
    }

    #[test]
    fn test_drag_delta_scales_with_zoom() {
        let (_store, mut canvas) = setup();
        canvas.zoom_at(Point::ZERO, 2.0);
        let t0 = Instant::now();
        canvas.pointer_down("a", Point::new(100.0, 100.0), t0);
        canvas.pointer_move(Point::new(140.0, 100.0), t0 + ms(10));
        canvas.pointer_up(Point::new(160.0, 120.0), t0 + ms(20));
        assert_eq!(pos(&canvas, "a"), Point::new(30.0, 10.0));
    }

    #[test]
    fn test_long_press_then_drag() {
        let (_store, mut canvas) = setup();
        let t0 = Instant::now();
        canvas.pointer_down("a", Point::new(0.0, 0.0), t0);
        assert_eq!(canvas.next_deadline(), Some(t0 + ms(500)));
        assert_eq!(
            canvas.tick(t0 + ms(600)),
            vec![CanvasEvent::DetailRequested { id: "a".to_string() }]
        );
        canvas.pointer_move(Point::new(50.0, 0.0), t0 + ms(700));
        let events = canvas.pointer_up(Point::new(50.0, 0.0), t0 + ms(800));
        assert!(events.contains(&CanvasEvent::ItemMoved { id: "a".to_string(), position: Point::new(50.0, 0.0) }));
        assert!(!events.iter().any(|e| matches!(e, CanvasEvent::Tapped { .. })));
    }

    #[test]
    fn test_cancelled_drag_does_not_commit() {
        let (store, mut canvas) = setup();
        let t0 = Instant::now();
        canvas.pointer_down("a", Point::ZERO, t0);
        canvas.pointer_move(Point::new(100.0, 100.0), t0 + ms(10));
        assert_eq!(
            canvas.cancel_gesture(),
            vec![CanvasEvent::PanningResumed { id: "a".to_string() }]
        );
        assert_eq!(pos(&canvas, "a"), Point::ZERO);
        assert!(canvas.flush(WAIT));
        assert_eq!(store.position_writes(), 0);
    }

    #[test]
    fn test_organize_refused_during_drag() {
        let (_store, mut canvas) = setup();
        let t0 = Instant::now();
        canvas.pointer_down("a", Point::ZERO, t0);
        canvas.pointer_move(Point::new(30.0, 0.0), t0 + ms(10));

        let region = Rect::new(0.0, 0.0, 800.0, 800.0);
        assert_eq!(canvas.organize(LayoutPolicy::Grid, region), Err(CanvasError::DragInProgress));
        assert_eq!(
            canvas.organize_with_remote(Ok(Vec::new()), region),
            Err(CanvasError::DragInProgress)
        );
        assert_eq!(canvas.history().len(), 1);
    }

    #[test]
    fn test_upload_reload_deferred_until_drag_ends() {
        let (store, mut canvas) = setup();
        let notifier = canvas.upload_notifier();
        let t0 = Instant::now();

        canvas.pointer_down("a", Point::ZERO, t0);
        canvas.pointer_move(Point::new(30.0, 0.0), t0 + ms(10));

        store.insert(record("uploaded", BaseKind::Image, 500.0, 500.0));
        assert!(notifier.completed(BOARD));
        canvas.poll_events();
        assert!(canvas.flush(WAIT));
        assert_eq!(store.load_calls(), 1);
        assert!(canvas.item("uploaded").is_none());

        canvas.pointer_up(Point::new(30.0, 0.0), t0 + ms(20));
        assert!(canvas.flush(WAIT));
        assert_eq!(store.load_calls(), 2);
        assert!(canvas.item("uploaded").is_some());
        assert_eq!(pos(&canvas, "a"), Point::new(30.0, 0.0));
    }

    #[test]
    fn test_upload_for_other_board_is_ignored() {
        let (store, mut canvas) = setup();
        canvas.upload_notifier().completed("elsewhere");
        canvas.upload_notifier().failed(BOARD, "file too large");
        let events = canvas.poll_events();
        assert!(events.contains(&CanvasEvent::UploadFailed {
            board_id: BOARD.to_string(),
            message: "file too large".to_string(),
        }));
        assert!(canvas.flush(WAIT));
        assert_eq!(store.load_calls(), 1);
    }

    #[test]
    fn test_remote_organize_quota_falls_back_to_grid() {
        let (_store, mut canvas) = setup();
        let region = Rect::new(0.0, 0.0, 600.0, 600.0);
        let moved = canvas
            .organize_with_remote(Err(RemoteLayoutError::Quota), region)
            .unwrap();
        assert_eq!(moved, 3);

        let expected = layout::arrange(
            &[
                Item::from_record(record("a", BaseKind::Image, 0.0, 0.0)).unwrap(),
                Item::from_record(record("b", BaseKind::Image, 100.0, 0.0)).unwrap(),
                Item::from_record(record("c", BaseKind::Image, 200.0, 0.0)).unwrap(),
            ],
            region,
            LayoutPolicy::Grid,
            canvas.config().layout_padding,
        );
        for placement in expected {
            assert_eq!(pos(&canvas, &placement.id), placement.position);
        }
    }

    #[test]
    fn test_remote_organize_other_error_surfaces() {
        let (_store, mut canvas) = setup();
        let result = canvas.organize_with_remote(
            Err(RemoteLayoutError::Other("bad response".to_string())),
            Rect::new(0.0, 0.0, 600.0, 600.0),
        );
        assert_eq!(
            result,
            Err(CanvasError::RemoteLayout(RemoteLayoutError::Other("bad response".to_string())))
        );
        assert_eq!(canvas.history().len(), 1);
    }

    #[test]
    fn test_remote_organize_result_is_sanitized() {
        let (store, mut canvas) = setup();
        let moved = canvas
            .organize_with_remote(
                Ok(vec![
                    Placement::new("a", Point::new(12.4, 900.0)),
                    Placement::new("b", Point::new(-5.0, 33.6)),
                ]),
                Rect::new(0.0, 0.0, 400.0, 400.0),
            )
            .unwrap();
        assert_eq!(moved, 2);
        assert_eq!(pos(&canvas, "a"), Point::new(12.0, 320.0));
        assert_eq!(pos(&canvas, "b"), Point::new(0.0, 34.0));
        assert!(canvas.flush(WAIT));
        assert_eq!(store.record("a").unwrap().y, 320.0);
    }

    #[test]
    fn test_switching_boards_resets_state() {
        let (store, mut canvas) = setup();
        canvas.apply_move("a", Point::new(1.0, 1.0)).unwrap();
        canvas.select("b").unwrap();
        let mut other = record("z", BaseKind::Note, 0.0, 0.0);
        other.board_id = "other".to_string();
        store.insert(other);

        canvas.load("other").unwrap();
        assert!(canvas.flush(WAIT));
        assert_eq!(canvas.board_id(), Some("other"));
        assert_eq!(canvas.len(), 1);
        assert_eq!(canvas.history().len(), 1);
        assert!(canvas.selection().is_empty());
    }
}
