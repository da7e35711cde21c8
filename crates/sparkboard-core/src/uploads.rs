//! Notifications from media uploads running outside the canvas.
//!
//! An uploader holds an [`UploadNotifier`] and reports when a board gained
//! new items server-side. The canvas drains these on poll and reloads the
//! board, deferring the reload while a drag is in progress.

use crate::items::BoardId;
use std::sync::mpsc::{Receiver, Sender, channel};

/// Something an uploader reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// An upload finished and its item now exists in the store.
    Completed { board_id: BoardId },
    /// An upload failed; nothing changed in the store.
    Failed { board_id: BoardId, message: String },
}

impl UploadEvent {
    pub fn board_id(&self) -> &str {
        match self {
            UploadEvent::Completed { board_id } | UploadEvent::Failed { board_id, .. } => board_id,
        }
    }
}

/// Sending half, cloned into each uploader.
#[derive(Debug, Clone)]
pub struct UploadNotifier {
    tx: Sender<UploadEvent>,
}

impl UploadNotifier {
    /// Report a finished upload. Returns false if the canvas is gone.
    pub fn completed(&self, board_id: impl Into<BoardId>) -> bool {
        self.send(UploadEvent::Completed { board_id: board_id.into() })
    }

    /// Report a failed upload. Returns false if the canvas is gone.
    pub fn failed(&self, board_id: impl Into<BoardId>, message: impl Into<String>) -> bool {
        self.send(UploadEvent::Failed {
            board_id: board_id.into(),
            message: message.into(),
        })
    }

    fn send(&self, event: UploadEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Receiving half, owned by the canvas.
#[derive(Debug)]
pub struct UploadReceiver {
    rx: Receiver<UploadEvent>,
}

impl UploadReceiver {
    /// Drain pending notifications (non-blocking).
    pub fn drain(&self) -> Vec<UploadEvent> {
        self.rx.try_iter().collect()
    }
}

/// Create a connected notifier/receiver pair.
pub fn upload_channel() -> (UploadNotifier, UploadReceiver) {
    let (tx, rx) = channel();
    (UploadNotifier { tx }, UploadReceiver { rx })
}
