//! Background persistence worker.
//!
//! The canvas never waits on the item store. Writes are queued to a
//! dedicated thread that drives each store future to completion and sends
//! the outcome back over a channel, which the canvas drains when it polls.

use crate::items::{BoardId, ItemId, ItemRecord, NewItem};
use crate::storage::{ItemStore, StoreResult};
use kurbo::{Point, Size};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Work for the persistence thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistCommand {
    /// Fetch a board. `generation` lets the canvas discard stale loads.
    Load { board_id: BoardId, generation: u64 },
    Create { board_id: BoardId, draft: NewItem },
    UpdatePosition { id: ItemId, position: Point },
    UpdateSize { id: ItemId, size: Size },
    Delete { id: ItemId },
}

/// Outcome of one [`PersistCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum PersistEvent {
    Loaded {
        board_id: BoardId,
        generation: u64,
        result: StoreResult<Vec<ItemRecord>>,
    },
    Created {
        board_id: BoardId,
        result: StoreResult<ItemRecord>,
    },
    PositionWritten { id: ItemId, result: StoreResult<()> },
    SizeWritten { id: ItemId, result: StoreResult<()> },
    Deleted { id: ItemId, result: StoreResult<()> },
}

/// Returned when the worker thread is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerGone;

fn execute(store: &dyn ItemStore, command: PersistCommand) -> PersistEvent {
    match command {
        PersistCommand::Load { board_id, generation } => {
            let result = pollster::block_on(store.load_items(&board_id));
            PersistEvent::Loaded { board_id, generation, result }
        }
        PersistCommand::Create { board_id, draft } => {
            let result = pollster::block_on(store.create_item(&board_id, &draft));
            PersistEvent::Created { board_id, result }
        }
        PersistCommand::UpdatePosition { id, position } => {
            let result = pollster::block_on(store.update_item_position(&id, position));
            PersistEvent::PositionWritten { id, result }
        }
        PersistCommand::UpdateSize { id, size } => {
            let result = pollster::block_on(store.update_item_size(&id, size));
            PersistEvent::SizeWritten { id, result }
        }
        PersistCommand::Delete { id } => {
            let result = pollster::block_on(store.delete_item(&id));
            PersistEvent::Deleted { id, result }
        }
    }
}

/// Handle to the persistence thread.
///
/// Commands run in submission order. Dropping the handle lets the thread
/// finish whatever is queued, then joins it.
pub struct PersistWorker {
    cmd_tx: Option<Sender<PersistCommand>>,
    event_rx: Receiver<PersistEvent>,
    /// Commands submitted whose outcome has not been received yet.
    in_flight: usize,
    thread: Option<JoinHandle<()>>,
}

impl PersistWorker {
    /// Start a worker over `store`.
    pub fn spawn(store: Arc<dyn ItemStore>) -> Self {
        let (cmd_tx, cmd_rx) = channel::<PersistCommand>();
        let (event_tx, event_rx) = channel::<PersistEvent>();

        let thread = thread::Builder::new()
            .name("sparkboard-persist".to_string())
            .spawn(move || {
                log::debug!("Persist thread started");
                while let Ok(command) = cmd_rx.recv() {
                    let event = execute(store.as_ref(), command);
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                log::debug!("Persist thread exiting");
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to start persist thread: {}", e);
                None
            }
        };

        Self {
            cmd_tx: thread.as_ref().map(|_| cmd_tx),
            event_rx,
            in_flight: 0,
            thread,
        }
    }

    /// Queue a command. Never blocks.
    pub fn submit(&mut self, command: PersistCommand) -> Result<(), WorkerGone> {
        let tx = self.cmd_tx.as_ref().ok_or(WorkerGone)?;
        tx.send(command).map_err(|_| WorkerGone)?;
        self.in_flight += 1;
        Ok(())
    }

    /// Number of submitted commands without an outcome yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Drain completed outcomes (non-blocking).
    pub fn poll(&mut self) -> Vec<PersistEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        self.in_flight = self.in_flight.saturating_sub(events.len());
        events
    }

    /// Block until every submitted command completed or `timeout` elapsed.
    ///
    /// Returns the outcomes received while waiting.
    pub fn wait(&mut self, timeout: Duration) -> Vec<PersistEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll();
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.event_rx.recv_timeout(remaining) {
                Ok(event) => {
                    self.in_flight -= 1;
                    events.push(event);
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("Timed out with {} writes still in flight", self.in_flight);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!("Persist thread disconnected with {} writes in flight", self.in_flight);
                    self.in_flight = 0;
                    break;
                }
            }
        }
        events
    }
}

impl Drop for PersistWorker {
    fn drop(&mut self) {
        self.cmd_tx = None;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Persist thread panicked");
            }
        }
    }
}
