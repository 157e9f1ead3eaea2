// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drag gesture state machine.
//!
//! ## Usage
//!
//! ```
//! use taxonomy_drag::{DragAxis, DragResult, DragState};
//! use kurbo::Point;
//!
//! // 20px slots stacked vertically.
//! let mut state: DragState<u32> = DragState::new(20.0, DragAxis::Vertical);
//!
//! state.on_start(None, 7, Point::new(100.0, 40.0));
//!
//! // Moves only preview.
//! assert_eq!(state.on_move(None, Point::new(103.0, 69.0)), Some((7, 1)));
//!
//! let result = state.on_end(None, Point::new(90.0, 95.0));
//! assert_eq!(result, DragResult::Commit { target: 7, displacement: 3 });
//! assert!(!state.is_dragging(None));
//! ```
//!
//! ## Rules
//!
//! 1. Only travel along the configured axis counts; the other coordinate is ignored.
//! 2. The displacement rounds half away from zero: 1.5 slots is 2, -1.5 slots is -2.
//! 3. An end without a matching start, or with zero displacement, yields
//!    [`DragResult::Cancelled`].
//! 4. Each pointer is tracked independently.

use alloc::collections::BTreeMap;
use core::num::NonZeroU64;
use kurbo::{Point, Vec2};

/// Pointer identifier for tracking concurrent drags.
pub type PointerId = NonZeroU64;

const PRIMARY_POINTER: PointerId = NonZeroU64::MIN;

/// Axis along which slots are laid out.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DragAxis {
    /// Slots advance with `x`.
    Horizontal,
    /// Slots advance with `y`.
    #[default]
    Vertical,
}

impl DragAxis {
    fn component(self, v: Vec2) -> f64 {
        match self {
            Self::Horizontal => v.x,
            Self::Vertical => v.y,
        }
    }
}

/// An active drag.
#[derive(Clone, Debug)]
pub struct Drag<K> {
    /// Dragged node.
    pub target: K,
    /// Pointer position at the start of the drag.
    pub start: Point,
    /// Last reported pointer position.
    pub current: Point,
}

/// Outcome of a finished drag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DragResult<K> {
    /// Move `target` by `displacement` slots.
    Commit {
        /// Dragged node.
        target: K,
        /// Signed slot count.
        displacement: i32,
    },
    /// Nothing to commit. Carries the dragged node if there was one.
    Cancelled(Option<K>),
}

/// Per-pointer drag tracking.
#[derive(Clone, Debug)]
pub struct DragState<K> {
    drags: BTreeMap<PointerId, Drag<K>>,
    /// Extent of one slot along [`DragState::axis`].
    pub slot_extent: f64,
    /// Axis the slots are laid out along.
    pub axis: DragAxis,
}

impl<K: Clone> DragState<K> {
    /// Create a drag state for slots of `slot_extent` along `axis`.
    pub fn new(slot_extent: f64, axis: DragAxis) -> Self {
        Self {
            drags: BTreeMap::new(),
            slot_extent,
            axis,
        }
    }

    /// Begin dragging `target`. Replaces any drag already held by the pointer.
    pub fn on_start(&mut self, pointer_id: Option<PointerId>, target: K, position: Point) {
        self.drags.insert(
            pointer_id.unwrap_or(PRIMARY_POINTER),
            Drag {
                target,
                start: position,
                current: position,
            },
        );
    }

    /// Track pointer movement.
    ///
    /// Returns the dragged node and the displacement a release here would commit, for
    /// previewing. `None` if the pointer is not dragging.
    pub fn on_move(&mut self, pointer_id: Option<PointerId>, position: Point) -> Option<(K, i32)> {
        let drag = self.drags.get_mut(&pointer_id.unwrap_or(PRIMARY_POINTER))?;
        drag.current = position;
        let travel = self.axis.component(position - drag.start);
        Some((drag.target.clone(), displacement(travel, self.slot_extent)))
    }

    /// Finish the drag held by the pointer.
    pub fn on_end(&mut self, pointer_id: Option<PointerId>, position: Point) -> DragResult<K> {
        let Some(drag) = self.drags.remove(&pointer_id.unwrap_or(PRIMARY_POINTER)) else {
            return DragResult::Cancelled(None);
        };
        let travel = self.axis.component(position - drag.start);
        match displacement(travel, self.slot_extent) {
            0 => DragResult::Cancelled(Some(drag.target)),
            d => {
                tracing::trace!(travel, displacement = d, "drag committed");
                DragResult::Commit {
                    target: drag.target,
                    displacement: d,
                }
            }
        }
    }

    /// Abandon the pointer's drag. Returns the dragged node, if any.
    pub fn cancel(&mut self, pointer_id: Option<PointerId>) -> Option<K> {
        self.drags
            .remove(&pointer_id.unwrap_or(PRIMARY_POINTER))
            .map(|d| d.target)
    }

    /// Whether the pointer is dragging.
    pub fn is_dragging(&self, pointer_id: Option<PointerId>) -> bool {
        self.drags.contains_key(&pointer_id.unwrap_or(PRIMARY_POINTER))
    }

    /// The pointer's active drag.
    pub fn get_drag(&self, pointer_id: PointerId) -> Option<&Drag<K>> {
        self.drags.get(&pointer_id)
    }

    /// Visual offset of the dragged node: the travel along the slot axis only.
    pub fn offset(&self, pointer_id: Option<PointerId>) -> Option<Vec2> {
        let drag = self.drags.get(&pointer_id.unwrap_or(PRIMARY_POINTER))?;
        let delta = drag.current - drag.start;
        Some(match self.axis {
            DragAxis::Horizontal => Vec2::new(delta.x, 0.0),
            DragAxis::Vertical => Vec2::new(0.0, delta.y),
        })
    }

    /// Drop every active drag.
    pub fn clear(&mut self) {
        self.drags.clear();
    }
}

impl<K: Clone> Default for DragState<K> {
    /// 20px vertical slots.
    fn default() -> Self {
        Self::new(20.0, DragAxis::Vertical)
    }
}

/// Slots covered by `travel`, rounded half away from zero.
///
/// Returns 0 for a non-positive or non-finite slot extent, or a non-finite travel. Saturates at
/// the `i32` range.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Float to int casts saturate, which is the documented behavior."
)]
pub fn displacement(travel: f64, slot_extent: f64) -> i32 {
    if !slot_extent.is_finite() || slot_extent <= 0.0 || !travel.is_finite() {
        return 0;
    }
    let slots = travel / slot_extent;
    if slots >= 0.0 {
        (slots + 0.5) as i32
    } else {
        -((-slots + 0.5) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(displacement(0.0, 20.0), 0);
        assert_eq!(displacement(9.9, 20.0), 0);
        assert_eq!(displacement(10.0, 20.0), 1);
        assert_eq!(displacement(-10.0, 20.0), -1);
        assert_eq!(displacement(-9.9, 20.0), 0);
        assert_eq!(displacement(61.0, 20.0), 3);
        assert_eq!(displacement(f64::MAX, 1.0), i32::MAX);
    }

    #[test]
    fn degenerate_inputs_do_not_move() {
        assert_eq!(displacement(100.0, 0.0), 0);
        assert_eq!(displacement(100.0, -5.0), 0);
        assert_eq!(displacement(100.0, f64::NAN), 0);
        assert_eq!(displacement(f64::NAN, 20.0), 0);
        assert_eq!(displacement(f64::INFINITY, 20.0), 0);
    }

    #[test]
    fn moves_preview_without_committing() {
        let mut state: DragState<&str> = DragState::default();
        state.on_start(None, "B", Point::new(0.0, 100.0));
        assert_eq!(state.on_move(None, Point::new(0.0, 130.0)), Some(("B", 2)));
        assert_eq!(state.offset(None), Some(Vec2::new(0.0, 30.0)));
        assert_eq!(state.on_move(None, Point::new(50.0, 100.0)), Some(("B", 0)));
        assert!(state.is_dragging(None));

        assert_eq!(
            state.on_end(None, Point::new(0.0, 100.0)),
            DragResult::Cancelled(Some("B"))
        );
        assert!(!state.is_dragging(None));
    }

    #[test]
    fn end_without_start_is_cancelled() {
        let mut state: DragState<u32> = DragState::default();
        assert_eq!(state.on_move(None, Point::ZERO), None);
        assert_eq!(state.on_end(None, Point::ZERO), DragResult::Cancelled(None));
    }

    #[test]
    fn horizontal_axis_ignores_y() {
        let mut state: DragState<u32> = DragState::new(10.0, DragAxis::Horizontal);
        state.on_start(None, 1, Point::new(0.0, 0.0));
        assert_eq!(state.on_move(None, Point::new(-26.0, 500.0)), Some((1, -3)));
        assert_eq!(state.offset(None), Some(Vec2::new(-26.0, 0.0)));
        assert_eq!(
            state.on_end(None, Point::new(-26.0, 500.0)),
            DragResult::Commit {
                target: 1,
                displacement: -3
            }
        );
    }

    #[test]
    fn pointers_are_independent() {
        let mut state: DragState<u32> = DragState::default();
        let p1 = NonZeroU64::new(1).unwrap();
        let p2 = NonZeroU64::new(2).unwrap();
        state.on_start(Some(p1), 10, Point::new(0.0, 0.0));
        state.on_start(Some(p2), 20, Point::new(0.0, 0.0));

        assert_eq!(state.cancel(Some(p2)), Some(20));
        assert!(state.get_drag(p1).is_some());
        assert!(state.get_drag(p2).is_none());
        assert_eq!(
            state.on_end(Some(p1), Point::new(0.0, -40.0)),
            DragResult::Commit {
                target: 10,
                displacement: -2
            }
        );
        // `None` is the primary pointer.
        state.on_start(Some(p1), 5, Point::ZERO);
        assert!(state.is_dragging(None));
        state.clear();
        assert!(!state.is_dragging(Some(p1)));
    }
}
