// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layout Resolver: positions for every visible node.
//!
//! Leaves sit in fixed, evenly spaced slots along the cross axis (`y`), one slot per position
//! of the active order. The principal axis (`x`) runs from the root to the heatmap edge.
//!
//! Slot geometry follows a uniform-extent strip: slot `k` starts at `k * cell_side`, and a
//! leaf is drawn a third of a cell into its slot.

use alloc::vec::Vec;
use kurbo::{Point, Size};

use crate::display::{DisplayId, DisplayTree};
use crate::order::LeafEntry;

/// Geometry of the taxonomy panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Inset of the tree inside the panel. The principal axis spans
    /// `width - 2 * origin.x`.
    pub origin: Point,
    /// Panel width.
    pub width: f64,
    /// Panel height.
    pub height: f64,
    /// Extent of one leaf slot along the cross axis.
    pub cell_side: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin: Point::ZERO,
            width: 200.0,
            height: 600.0,
            cell_side: 20.0,
        }
    }
}

impl LayoutConfig {
    /// Cross-axis coordinate of a (possibly fractional) slot.
    pub fn slot_y(&self, slot: f64) -> f64 {
        self.origin.y + self.cell_side * slot + self.cell_side / 3.0
    }

    /// Slot containing cross-axis coordinate `y`, clamped to `0..len`.
    ///
    /// Returns 0 for an empty strip or a non-positive cell side.
    pub fn slot_at(&self, y: f64, len: usize) -> usize {
        if len == 0 || self.cell_side <= 0.0 {
            return 0;
        }
        let ratio = (y - self.origin.y) / self.cell_side;
        if ratio.is_nan() || ratio < 0.0 {
            return 0;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "Ratio is non-negative and the index is clamped right after the cast."
        )]
        let i = ratio as usize;
        i.min(len - 1)
    }

    fn principal_span(&self) -> f64 {
        (self.width - 2.0 * self.origin.x).max(0.0)
    }
}

/// Cross-axis coordinates in slot units, per display node.
///
/// Loaded leaves take the slot their leaf index holds in the active order. Unloaded leaves
/// follow the loaded block in pre-order. Internal nodes sit at the mean of their children.
#[derive(Clone, Debug)]
pub(crate) struct SlotAxis {
    slots: Vec<f64>,
}

impl SlotAxis {
    pub(crate) fn new(tree: &DisplayTree, leaves: &[LeafEntry], active: &[u32]) -> Self {
        let mut slots = alloc::vec![0.0; tree.len()];
        let mut placed = alloc::vec![false; tree.len()];
        for (slot, &leaf) in active.iter().enumerate() {
            if let Some(entry) = leaves.get(leaf as usize)
                && tree.contains(entry.node)
            {
                slots[entry.node.index()] = to_f64(slot);
                placed[entry.node.index()] = true;
            }
        }
        let mut next = active.len();
        for (id, _) in tree.leaves() {
            if !placed[id.index()] {
                slots[id.index()] = to_f64(next);
                next += 1;
            }
        }
        // Pre-order puts every child after its parent.
        let ids: Vec<_> = tree.iter().map(|(id, _)| id).collect();
        for &id in ids.iter().rev() {
            let children = tree.children_of(id);
            if !children.is_empty() {
                let sum: f64 = children.iter().map(|c| slots[c.index()]).sum();
                slots[id.index()] = sum / to_f64(children.len());
            }
        }
        Self { slots }
    }

    pub(crate) fn get(&self, id: DisplayId) -> f64 {
        self.slots.get(id.index()).copied().unwrap_or(0.0)
    }
}

/// Resolved positions of one display tree under one leaf order.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    positions: Vec<Point>,
    epoch: u32,
    size: Size,
}

impl Layout {
    /// Resolve positions for `tree` with `active` ordering the loaded `leaves`.
    ///
    /// - Loaded leaves are aligned with the heatmap at `x = width - origin.x`, `y` from their
    ///   slot.
    /// - Internal nodes take the mean `y` of their children.
    /// - A branch carrying no loaded leaf is placed at `x` proportional to its depth.
    /// - A loaded-bearing internal node is placed back from the heatmap edge by the distance
    ///   from its depth to its deepest loaded leaf, so the thread to the heatmap stays
    ///   straight.
    ///
    /// Pure: the same inputs always yield the same layout.
    pub fn compute(
        tree: &DisplayTree,
        leaves: &[LeafEntry],
        active: &[u32],
        config: &LayoutConfig,
    ) -> Self {
        let axis = SlotAxis::new(tree, leaves, active);
        let span = config.principal_span();
        let levels = tree.get(tree.root()).map_or(1, |r| r.height.max(1));
        let step = span / f64::from(levels);
        let leaf_x = config.origin.x + span;

        // Deepest loaded leaf below each node, bottom-up over pre-order.
        let mut deepest: Vec<Option<u32>> = alloc::vec![None; tree.len()];
        let ids: Vec<_> = tree.iter().map(|(id, _)| id).collect();
        for &id in ids.iter().rev() {
            let Some(node) = tree.get(id) else { continue };
            deepest[id.index()] = if node.is_leaf() {
                node.is_loaded().then_some(node.depth)
            } else {
                node.children
                    .iter()
                    .filter_map(|c| deepest[c.index()])
                    .max()
            };
        }

        let positions = tree
            .iter()
            .map(|(id, node)| {
                let x = match deepest[id.index()] {
                    Some(d) => leaf_x - f64::from(d - node.depth) * step,
                    None => config.origin.x + f64::from(node.depth) * step,
                };
                Point::new(x, config.slot_y(axis.get(id)))
            })
            .collect();

        let slots = tree.leaves().count().max(active.len());
        let size = Size::new(
            config.width,
            config.height.max(config.origin.y + config.cell_side * to_f64(slots)),
        );
        Self {
            positions,
            epoch: tree.epoch(),
            size,
        }
    }

    /// Position of a node, `None` for ids of another build.
    pub fn get(&self, id: DisplayId) -> Option<Point> {
        if id.epoch() != self.epoch {
            return None;
        }
        self.positions.get(id.index()).copied()
    }

    /// Positions in display-tree pre-order.
    pub fn positions(&self) -> &[Point] {
        &self.positions
    }

    /// Extent needed to draw the tree: the panel, grown to fit every slot.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Epoch of the display tree this layout was resolved for.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "Slot counts stay far below 2^52."
)]
fn to_f64(n: usize) -> f64 {
    n as f64
}
