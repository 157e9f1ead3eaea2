// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=taxonomy_tree --heading-base-level=0

//! Taxonomy Tree: a taxonomic hierarchy drawn beside a comparison heatmap.
//!
//! Taxonomy Tree ingests a nested taxonomy, tracks which organisms are part of the comparison
//! ("loaded"), and derives everything a renderer needs to draw the tree so that its leaves line
//! up with the rows of a heatmap.
//!
//! - A [`Registry`] owns every known taxon, keyed by [`TaxId`].
//! - A [`DisplayTree`] is the pruned, visibility-filtered view, rebuilt from scratch on every
//!   structural change.
//! - An [`OrderManager`] holds the canonical leaf orderings and the active one.
//! - [`Layout`] resolves a [`kurbo::Point`] for every visible node.
//! - [`reorder`] turns a drag into a new active order.
//! - [`Taxonomy`] owns all of the above plus an [`EventBus`] and sequences rebuilds.
//!
//! ## Not a renderer or a network client
//!
//! This crate neither draws nor fetches. Fetching organism data is left to the caller, who
//! answers [`TaxonomyEvent::SpeciesRequested`] with [`Taxonomy::complete_fetch`]. Drag gestures
//! arrive as slot displacements; see the `taxonomy_drag` crate for turning pointer coordinates
//! into those.
//!
//! ## Derivation pipeline
//!
//! Every structural change (loading a hierarchy, loading or unloading an organism, toggling a
//! node, switching view options) runs, to completion:
//!
//! 1. [`DisplayTree::build`]: fold single-child chains, filter collapsed branches down to their
//!    loaded threads, order loaded-bearing branches first, and compute depth and height.
//! 2. [`OrderManager::recompute`]: index the loaded leaves by id, compute the
//!    [`OrderSet`], and reset the active order to [`OrderKey::LineageAsc`] if the number of
//!    loaded leaves changed.
//! 3. [`Layout::compute`]: place leaves in slots and internal nodes between their children.
//!
//! [`DisplayId`]s carry the epoch of the build that produced them, so an id held across a
//! rebuild is recognized as stale and ignored.
//!
//! ## API overview
//!
//! - [`Taxonomy::load_taxonomy`] ingests a [`RawTaxon`] hierarchy.
//! - [`Taxonomy::request_species`] / [`Taxonomy::complete_fetch`] run the fetch lifecycle.
//! - [`Taxonomy::load_organism`] / [`Taxonomy::unload_organism`] edit the comparison set directly.
//! - [`Taxonomy::toggle_expanded`], [`Taxonomy::set_show_tree`], [`Taxonomy::set_collapse_tree`]
//!   change what is visible.
//! - [`Taxonomy::select_order`] and [`Taxonomy::reorder`] change the active order;
//!   [`Taxonomy::preview_layout`] shows a drag without committing it.
//!
//! ## Example
//!
//! ```rust
//! use taxonomy_tree::{OrderKey, RawTaxon, Taxonomy, TaxId};
//!
//! let mut taxonomy = Taxonomy::default();
//! taxonomy
//!     .load_taxonomy(&RawTaxon::clade(1_u64, "A", vec![
//!         RawTaxon::clade(2_u64, "B", vec![
//!             RawTaxon::leaf(11_u64, "leaf1"),
//!             RawTaxon::leaf(12_u64, "leaf2"),
//!         ]),
//!         RawTaxon::clade(3_u64, "C", vec![RawTaxon::leaf(13_u64, "leaf3")]),
//!     ]))
//!     .unwrap();
//! let ids: Vec<TaxId> = [11_u64, 12, 13].into_iter().map(TaxId::from).collect();
//! taxonomy.load_organisms(&ids, false).unwrap();
//! assert_eq!(taxonomy.active_order(), &[0, 1, 2]);
//!
//! // Drag B one slot down: leaf1 and leaf2 pass leaf3 together.
//! assert!(taxonomy.reorder_taxon(&TaxId::from(2_u64), 1));
//! assert_eq!(taxonomy.active_order(), &[2, 0, 1]);
//!
//! assert_eq!(taxonomy.select_order(OrderKey::Name), &[0, 1, 2]);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod display;
mod engine;
mod error;
mod events;
mod layout;
mod order;
mod registry;
mod reorder;
mod types;

pub use display::{DisplayFlags, DisplayId, DisplayNode, DisplayOptions, DisplayTree};
pub use engine::{FetchedOrganism, LabelMode, Taxonomy, TaxonomyOptions};
pub use error::{FetchError, MalformedHierarchy, TaxonomyError};
pub use events::{EventBus, EventKind, ListenerId, TaxonomyEvent};
pub use layout::{Layout, LayoutConfig};
pub use order::{LeafEntry, OrderKey, OrderManager, OrderSet, collect_leaves, is_permutation};
pub use registry::{LoadReport, Registry};
pub use reorder::reorder;
pub use types::{NodeFlags, NodeKey, RawTaxon, TaxId, Taxon};
