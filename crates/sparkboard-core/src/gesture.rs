//! Gesture classification for pointer input on a single item.
//!
//! A press/move/release stream targeting one item is turned into discrete
//! outcomes: a tap, a long-press notification, or a drag that ends in a
//! committed move. Time is supplied by the caller so the state machine does
//! not depend on a wall clock; the long-press timer is a deadline that the
//! host fires through [`GestureClassifier::tick`].

use crate::items::ItemId;
use kurbo::{Point, Vec2};
use std::time::{Duration, Instant};

/// Delay before a stationary press counts as a long press.
pub const LONG_PRESS_MS: u64 = 500;
/// Longest press that still counts as a tap.
pub const TAP_MAX_MS: u64 = 300;
/// Pointer travel along either axis, in screen pixels, that starts a drag.
pub const DRAG_THRESHOLD_PX: f64 = 10.0;

/// Timing and distance thresholds for classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    pub long_press: Duration,
    pub tap_max: Duration,
    pub drag_threshold: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press: Duration::from_millis(LONG_PRESS_MS),
            tap_max: Duration::from_millis(TAP_MAX_MS),
            drag_threshold: DRAG_THRESHOLD_PX,
        }
    }
}

/// Discrete outcome of a gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    /// Short press without movement.
    Tap { id: ItemId },
    /// Press held without movement past the long-press delay.
    LongPress { id: ItemId },
    /// Movement crossed the drag threshold.
    DragStart { id: ItemId },
    /// Live board-space position of the dragged item.
    DragMove { id: ItemId, position: Point },
    /// Final board-space position on release: origin plus total gesture delta.
    MoveEnd { id: ItemId, position: Point },
    /// Drag finished or was cancelled.
    DragEnd { id: ItemId },
}

/// State of the active gesture.
#[derive(Debug, Clone, Default)]
pub enum GesturePhase {
    /// No pointer is down.
    #[default]
    Idle,
    /// Pointer is down and has not travelled past the threshold.
    Pressed {
        id: ItemId,
        /// Screen-space pointer position at press.
        start_pointer: Point,
        /// Board-space item position at press.
        origin: Point,
        /// Camera zoom captured at press.
        zoom: f64,
        started_at: Instant,
        /// Pending long-press deadline; cleared once fired.
        long_press_at: Option<Instant>,
        long_press_fired: bool,
    },
    /// Pointer travelled past the threshold; the item follows it.
    Dragging {
        id: ItemId,
        start_pointer: Point,
        origin: Point,
        zoom: f64,
        /// Current board-space item position.
        current: Point,
    },
}

/// Per-item pointer state machine.
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    config: GestureConfig,
    phase: GesturePhase,
}

impl GestureClassifier {
    /// Create a classifier with the given thresholds.
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            phase: GesturePhase::Idle,
        }
    }

    /// Current thresholds.
    pub fn config(&self) -> GestureConfig {
        self.config
    }

    /// Current phase.
    pub fn phase(&self) -> &GesturePhase {
        &self.phase
    }

    /// Whether a drag is in progress.
    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, GesturePhase::Dragging { .. })
    }

    /// Live position of the dragged item.
    pub fn live_position(&self) -> Option<(&ItemId, Point)> {
        match &self.phase {
            GesturePhase::Dragging { id, current, .. } => Some((id, *current)),
            _ => None,
        }
    }

    /// When the pending long-press timer fires, if one is armed.
    pub fn long_press_deadline(&self) -> Option<Instant> {
        match &self.phase {
            GesturePhase::Pressed { long_press_at, .. } => *long_press_at,
            _ => None,
        }
    }

    /// Begin a gesture on an item whose board-space position is `origin`.
    ///
    /// An unfinished gesture is cancelled first.
    pub fn press(&mut self, id: ItemId, pointer: Point, origin: Point, zoom: f64, now: Instant) -> Vec<GestureEvent> {
        let events = self.cancel();
        if !pointer.is_finite() || !origin.is_finite() {
            log::warn!("Ignoring press on {} with non-finite coordinates", id);
            return events;
        }
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };

        log::trace!("Gesture press on {} at {:?}", id, pointer);
        self.phase = GesturePhase::Pressed {
            id,
            start_pointer: pointer,
            origin,
            zoom,
            started_at: now,
            long_press_at: Some(now + self.config.long_press),
            long_press_fired: false,
        };
        events
    }

    /// Feed a pointer move.
    pub fn pointer_move(&mut self, pointer: Point, now: Instant) -> Vec<GestureEvent> {
        if !pointer.is_finite() {
            log::warn!("Ignoring non-finite pointer move {:?}", pointer);
            return Vec::new();
        }

        let mut events = self.tick(now);
        let threshold = self.config.drag_threshold;

        let next = match &mut self.phase {
            GesturePhase::Idle => None,
            GesturePhase::Pressed {
                id,
                start_pointer,
                origin,
                zoom,
                ..
            } => {
                let delta = pointer - *start_pointer;
                if delta.x.abs() > threshold || delta.y.abs() > threshold {
                    let current = board_position(*origin, delta, *zoom);
                    log::debug!("Drag started on {}", id);
                    events.push(GestureEvent::DragStart { id: id.clone() });
                    events.push(GestureEvent::DragMove {
                        id: id.clone(),
                        position: current,
                    });
                    // Leaving Pressed drops the pending long-press deadline.
                    Some(GesturePhase::Dragging {
                        id: id.clone(),
                        start_pointer: *start_pointer,
                        origin: *origin,
                        zoom: *zoom,
                        current,
                    })
                } else {
                    None
                }
            }
            GesturePhase::Dragging {
                id,
                start_pointer,
                origin,
                zoom,
                current,
            } => {
                *current = board_position(*origin, pointer - *start_pointer, *zoom);
                events.push(GestureEvent::DragMove {
                    id: id.clone(),
                    position: *current,
                });
                None
            }
        };

        if let Some(phase) = next {
            self.phase = phase;
        }
        events
    }

    /// Feed the pointer release, finishing the gesture.
    pub fn release(&mut self, pointer: Point, now: Instant) -> Vec<GestureEvent> {
        let mut events = self.tick(now);

        match std::mem::take(&mut self.phase) {
            GesturePhase::Idle => {}
            GesturePhase::Pressed {
                id,
                started_at,
                long_press_fired,
                ..
            } => {
                let held = now.saturating_duration_since(started_at);
                if !long_press_fired && held < self.config.tap_max {
                    events.push(GestureEvent::Tap { id });
                } else {
                    log::trace!("Press on {} released after {:?} without a tap", id, held);
                }
            }
            GesturePhase::Dragging {
                id,
                start_pointer,
                origin,
                zoom,
                current,
            } => {
                let position = if pointer.is_finite() {
                    board_position(origin, pointer - start_pointer, zoom)
                } else {
                    log::warn!("Non-finite release for {}, using last drag position", id);
                    current
                };
                events.push(GestureEvent::MoveEnd {
                    id: id.clone(),
                    position,
                });
                events.push(GestureEvent::DragEnd { id });
            }
        }
        events
    }

    /// Fire the long-press timer if its deadline has passed.
    pub fn tick(&mut self, now: Instant) -> Vec<GestureEvent> {
        if let GesturePhase::Pressed {
            id,
            long_press_at,
            long_press_fired,
            ..
        } = &mut self.phase
        {
            if let Some(deadline) = *long_press_at {
                if now >= deadline {
                    *long_press_at = None;
                    *long_press_fired = true;
                    log::debug!("Long press on {}", id);
                    return vec![GestureEvent::LongPress { id: id.clone() }];
                }
            }
        }
        Vec::new()
    }

    /// Abort the active gesture without committing a move.
    pub fn cancel(&mut self) -> Vec<GestureEvent> {
        match std::mem::take(&mut self.phase) {
            GesturePhase::Dragging { id, .. } => vec![GestureEvent::DragEnd { id }],
            _ => Vec::new(),
        }
    }
}

/// Board-space item position for a screen-space pointer delta.
fn board_position(origin: Point, screen_delta: Vec2, zoom: f64) -> Point {
    origin + screen_delta / zoom
}
