// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=taxonomy_drag --heading-base-level=0

//! Taxonomy Drag: pointer drags measured in slots.
//!
//! A node of a heatmap-aligned tree is dragged along the slot axis. This crate tracks the
//! gesture (start → move* → end) per pointer and reports how many slots the pointer travelled:
//! `round((end - start) / slot_extent)` along the configured [`DragAxis`].
//!
//! - [`DragState::on_move`] yields a preview displacement and never commits anything.
//! - [`DragState::on_end`] yields the final [`DragResult`].
//!
//! The crate is agnostic of the tree it drives; targets are any `Clone` key.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod drag;

pub use drag::{DragAxis, DragResult, DragState, PointerId, displacement};
