//! Automatic arrangement of items inside a target region.
//!
//! Everything here is pure: the same items, region and policy always give
//! the same placements. Items are never mutated; the canvas applies the
//! result as one bulk operation.

use crate::items::{BaseKind, Item, ItemId};
use kurbo::{Point, Rect, Size};
use std::collections::HashMap;
use thiserror::Error;

/// Gap between items and around the region edge.
pub const DEFAULT_PADDING: f64 = 20.0;

/// Arrangement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayoutPolicy {
    /// One grid holding every item.
    #[default]
    Grid,
    /// One grid per persisted kind, stacked vertically.
    ByType,
    /// Row packing in rough left-to-right order, removing overlaps.
    SmartSpacing,
}

impl LayoutPolicy {
    /// Parse a policy name as typed by a user.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "grid" => Some(LayoutPolicy::Grid),
            "by-type" | "bytype" | "type" => Some(LayoutPolicy::ByType),
            "smart" | "smart-spacing" | "spacing" => Some(LayoutPolicy::SmartSpacing),
            _ => None,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            LayoutPolicy::Grid => "grid",
            LayoutPolicy::ByType => "by-type",
            LayoutPolicy::SmartSpacing => "smart",
        }
    }
}

/// New top-left corner for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub id: ItemId,
    pub position: Point,
}

impl Placement {
    pub fn new(id: impl Into<ItemId>, position: Point) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }
}

/// The geometry the engine needs from an item.
#[derive(Debug, Clone, Copy)]
struct Footprint<'a> {
    id: &'a ItemId,
    kind: BaseKind,
    position: Point,
    size: Size,
}

impl<'a> From<&'a Item> for Footprint<'a> {
    fn from(item: &'a Item) -> Self {
        Self {
            id: item.id(),
            kind: item.base_kind(),
            position: item.position,
            size: item.size,
        }
    }
}

/// Compute placements for `items` inside `region`.
///
/// Items are placed on whole board pixels: cells and cursor advances are
/// rounded up, so fractional sizes never cause overlaps. An empty input
/// gives an empty result. A single item goes to the region's top-left, inset by
/// `padding`, whatever the policy.
pub fn arrange<'a, I>(items: I, region: Rect, policy: LayoutPolicy, padding: f64) -> Vec<Placement>
where
    I: IntoIterator<Item = &'a Item>,
{
    let items: Vec<Footprint<'_>> = items.into_iter().map(Footprint::from).collect();
    let padding = if padding.is_finite() && padding >= 0.0 { padding } else { DEFAULT_PADDING };

    match items.as_slice() {
        [] => Vec::new(),
        [only] => vec![Placement::new(
            only.id.clone(),
            Point::new((region.x0 + padding).ceil(), (region.y0 + padding).ceil()),
        )],
        _ => match policy {
            LayoutPolicy::Grid => {
                let mut out = Vec::with_capacity(items.len());
                place_grid(&items, region, padding, region.y0 + padding, &mut out);
                out
            }
            LayoutPolicy::ByType => place_by_type(&items, region, padding),
            LayoutPolicy::SmartSpacing => place_smart(&items, region, padding),
        },
    }
}

fn round_point(p: Point) -> Point {
    Point::new(p.x.round(), p.y.round())
}

/// Lay `items` out as one grid whose first row starts at `top`.
/// Returns the grid's block height.
fn place_grid(items: &[Footprint<'_>], region: Rect, padding: f64, top: f64, out: &mut Vec<Placement>) -> f64 {
    if items.is_empty() {
        return 0.0;
    }

    let (max_w, max_h) = items.iter().fold((0.0_f64, 0.0_f64), |(w, h), item| {
        (w.max(item.size.width), h.max(item.size.height))
    });
    let cell = Size::new((max_w + padding).ceil(), (max_h + padding).ceil());
    let cols = (items.len() as f64).sqrt().ceil() as usize;
    let rows = items.len().div_ceil(cols);
    let top = top.ceil();

    let grid_width = cols as f64 * cell.width;
    let left = if grid_width < region.width() {
        region.x0 + (region.width() - grid_width) / 2.0
    } else {
        region.x0 + padding
    }
    .ceil();

    for (index, item) in items.iter().enumerate() {
        let (row, col) = (index / cols, index % cols);
        let cell_origin = Point::new(left + col as f64 * cell.width, top + row as f64 * cell.height);
        out.push(Placement::new(
            item.id.clone(),
            Point::new(
                cell_origin.x + ((cell.width - item.size.width) / 2.0).floor(),
                cell_origin.y + ((cell.height - item.size.height) / 2.0).floor(),
            ),
        ));
    }

    rows as f64 * cell.height
}

fn place_by_type(items: &[Footprint<'_>], region: Rect, padding: f64) -> Vec<Placement> {
    // Groups in order of first appearance.
    let mut order: Vec<BaseKind> = Vec::new();
    let mut groups: HashMap<BaseKind, Vec<Footprint<'_>>> = HashMap::new();
    for item in items {
        groups
            .entry(item.kind)
            .or_insert_with(|| {
                order.push(item.kind);
                Vec::new()
            })
            .push(*item);
    }

    let mut out = Vec::with_capacity(items.len());
    let mut top = region.y0 + padding;
    for kind in order {
        if let Some(group) = groups.get(&kind) {
            let height = place_grid(group, region, padding, top, &mut out);
            top += height + padding;
        }
    }
    out
}

fn place_smart(items: &[Footprint<'_>], region: Rect, padding: f64) -> Vec<Placement> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        a.position
            .x
            .total_cmp(&b.position.x)
            .then(a.position.y.total_cmp(&b.position.y))
    });

    let left = (region.x0 + padding).ceil();
    let mut cursor = Point::new(left, (region.y0 + padding).ceil());
    let mut row_height = 0.0_f64;
    let mut row_len = 0usize;
    let mut out = Vec::with_capacity(sorted.len());

    for item in sorted {
        if row_len > 0 && cursor.x + item.size.width > region.x1 {
            cursor = Point::new(left, (cursor.y + row_height + padding).ceil());
            row_height = 0.0;
            row_len = 0;
        }
        out.push(Placement::new(item.id.clone(), cursor));
        cursor.x = (cursor.x + item.size.width + padding).ceil();
        row_height = row_height.max(item.size.height);
        row_len += 1;
    }
    out
}

/// Failure reported by a remote (assisted) organize call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteLayoutError {
    #[error("Organize quota exhausted")]
    Quota,
    #[error("Organize billing problem")]
    Billing,
    #[error("Organize rate limited")]
    RateLimited,
    #[error("Organize failed: {0}")]
    Other(String),
}

impl RemoteLayoutError {
    /// Classify a raw failure message from the remote service.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("quota") {
            RemoteLayoutError::Quota
        } else if lower.contains("billing") || lower.contains("payment") {
            RemoteLayoutError::Billing
        } else if lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("429") {
            RemoteLayoutError::RateLimited
        } else {
            RemoteLayoutError::Other(message.to_string())
        }
    }

    /// Whether the caller should fall back to the grid policy instead of failing.
    pub fn falls_back_to_grid(&self) -> bool {
        !matches!(self, RemoteLayoutError::Other(_))
    }
}

/// Clean up remotely computed placements.
///
/// Unknown ids and non-finite coordinates are dropped. Coordinates are
/// rounded, then clamped so each item's box starts inside
/// `[x0, x1 - width] x [y0, y1 - height]` of the region. An item larger
/// than the region is pinned to the region's top-left.
pub fn sanitize_remote<'a, I>(placements: Vec<Placement>, items: I, region: Rect) -> Vec<Placement>
where
    I: IntoIterator<Item = &'a Item>,
{
    let sizes: HashMap<&ItemId, Size> = items.into_iter().map(|item| (item.id(), item.size)).collect();

    placements
        .into_iter()
        .filter_map(|placement| {
            let Some(size) = sizes.get(&placement.id) else {
                log::debug!("Dropping remote placement for unknown item {}", placement.id);
                return None;
            };
            if !placement.position.is_finite() {
                log::warn!("Dropping non-finite remote placement for {}", placement.id);
                return None;
            }
            let p = round_point(placement.position);
            let max_x = (region.x1 - size.width).max(region.x0);
            let max_y = (region.y1 - size.height).max(region.y0);
            Some(Placement::new(
                placement.id,
                Point::new(p.x.clamp(region.x0, max_x), p.y.clamp(region.y0, max_y)),
            ))
        })
        .collect()
}
