// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reorder Engine: move a dragged node by a signed number of slots.
//!
//! ## Semantics
//!
//! - A loaded leaf is removed from its slot and reinserted `displacement` slots away. The
//!   leaves in between shift by one; nothing is swapped.
//! - An internal node moves as a block. Its children are visited in their current
//!   cross-axis order, farthest-first in the direction of travel, and each one is moved by the
//!   same displacement. The leaves under the node keep their relative order and pass over the
//!   leaves outside it.
//! - The displacement is clamped once, at the dragged node, so that every leaf it moves stays
//!   within `0..n`.
//! - Stale ids, unloaded leaves and branches without loaded leaves are ignored.

use alloc::vec::Vec;

use crate::display::{DisplayId, DisplayTree};
use crate::layout::SlotAxis;
use crate::order::LeafEntry;

/// Compute the active order that results from dragging `node` by `displacement` slots.
///
/// Returns `None` when the drag changes nothing: zero (or fully clamped) displacement, a
/// node without loaded leaves, or an id that is not part of `tree`.
///
/// ```rust
/// use taxonomy_tree::{RawTaxon, Taxonomy, TaxId};
///
/// let mut taxonomy = Taxonomy::default();
/// taxonomy
///     .load_taxonomy(&RawTaxon::clade(1_u64, "A", vec![
///         RawTaxon::clade(2_u64, "B", vec![
///             RawTaxon::leaf(11_u64, "leaf1"),
///             RawTaxon::leaf(12_u64, "leaf2"),
///         ]),
///         RawTaxon::clade(3_u64, "C", vec![RawTaxon::leaf(13_u64, "leaf3")]),
///     ]))
///     .unwrap();
/// for id in [11_u64, 12, 13] {
///     taxonomy.load_organism(&TaxId::from(id), false).unwrap();
/// }
///
/// let tree = taxonomy.display_tree().unwrap();
/// let b = tree.find(&TaxId::from(2_u64)).unwrap();
/// let leaves = taxonomy.orders().leaves();
/// let order = taxonomy_tree::reorder(tree, leaves, taxonomy.active_order(), b, 1);
/// assert_eq!(order.as_deref(), Some(&[2, 0, 1][..]));
/// ```
pub fn reorder(
    tree: &DisplayTree,
    leaves: &[LeafEntry],
    active: &[u32],
    node: DisplayId,
    displacement: i32,
) -> Option<Vec<u32>> {
    let Some(dragged) = tree.get(node) else {
        tracing::trace!(?node, "reorder on an id outside the current display tree ignored");
        return None;
    };
    if displacement == 0 || !dragged.has_loaded_descendant() {
        return None;
    }

    let mut leaf_of: Vec<Option<u32>> = alloc::vec![None; tree.len()];
    for (i, entry) in leaves.iter().enumerate() {
        if tree.contains(entry.node) {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Leaf indices are 32-bit by design."
            )]
            let i = i as u32;
            leaf_of[entry.node.index()] = Some(i);
        }
    }

    let mut mover = Mover {
        tree,
        leaves,
        leaf_of,
        order: active.to_vec(),
    };
    let displacement = mover.clamp(node, i64::from(displacement));
    if displacement == 0 {
        return None;
    }
    mover.move_tree(node, displacement);
    (mover.order != active).then_some(mover.order)
}

struct Mover<'a> {
    tree: &'a DisplayTree,
    leaves: &'a [LeafEntry],
    leaf_of: Vec<Option<u32>>,
    order: Vec<u32>,
}

impl Mover<'_> {
    /// Clamp `displacement` so the slots of every loaded leaf under `node` stay in range.
    fn clamp(&self, node: DisplayId, displacement: i64) -> i64 {
        let mut lo = usize::MAX;
        let mut hi = 0;
        let mut stack = alloc::vec![node];
        while let Some(id) = stack.pop() {
            if let Some(slot) = self.leaf_of[id.index()].and_then(|l| self.slot_of(l)) {
                lo = lo.min(slot);
                hi = hi.max(slot);
            }
            stack.extend_from_slice(self.tree.children_of(id));
        }
        if lo == usize::MAX {
            return 0;
        }
        let last = to_i64(self.order.len()) - 1;
        displacement.clamp(-to_i64(lo), last - to_i64(hi))
    }

    fn move_tree(&mut self, id: DisplayId, displacement: i64) {
        let tree = self.tree;
        let children = tree.children_of(id);
        if children.is_empty() {
            if let Some(leaf) = self.leaf_of[id.index()] {
                self.move_leaf(leaf, displacement);
            }
            return;
        }
        let axis = SlotAxis::new(tree, self.leaves, &self.order);
        let mut children = children.to_vec();
        if displacement > 0 {
            children.sort_by(|a, b| axis.get(*b).total_cmp(&axis.get(*a)));
        } else {
            children.sort_by(|a, b| axis.get(*a).total_cmp(&axis.get(*b)));
        }
        for child in children {
            if tree.get(child).is_some_and(|c| c.has_loaded_descendant()) {
                self.move_tree(child, displacement);
            }
        }
    }

    fn move_leaf(&mut self, leaf: u32, displacement: i64) {
        let Some(from) = self.slot_of(leaf) else {
            return;
        };
        let last = to_i64(self.order.len()) - 1;
        let to = (to_i64(from) + displacement).clamp(0, last);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "Target is clamped to 0..n."
        )]
        let to = to as usize;
        if to == from {
            return;
        }
        let moved = self.order.remove(from);
        self.order.insert(to, moved);
        tracing::trace!(leaf, from, to, "leaf moved");
    }

    fn slot_of(&self, leaf: u32) -> Option<usize> {
        self.order.iter().position(|&l| l == leaf)
    }
}

#[allow(
    clippy::cast_possible_wrap,
    reason = "Slot counts stay far below i64::MAX."
)]
fn to_i64(n: usize) -> i64 {
    n as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayOptions;
    use crate::order::{OrderManager, collect_leaves};
    use crate::registry::Registry;
    use crate::types::{RawTaxon, TaxId};
    use alloc::vec;

    struct Fixture {
        tree: DisplayTree,
        orders: OrderManager,
    }

    impl Fixture {
        /// `{A: [B: [leaf1, leaf2], C: [leaf3]]}` plus an unloaded leaf under A.
        fn new() -> Self {
            let mut registry = Registry::new();
            registry
                .load(&RawTaxon::clade(
                    1_u64,
                    "A",
                    vec![
                        RawTaxon::clade(
                            2_u64,
                            "B",
                            vec![
                                RawTaxon::leaf(11_u64, "leaf1"),
                                RawTaxon::leaf(12_u64, "leaf2"),
                            ],
                        ),
                        RawTaxon::clade(3_u64, "C", vec![RawTaxon::leaf(13_u64, "leaf3")]),
                        RawTaxon::leaf(5_u64, "loner"),
                    ],
                ))
                .unwrap();
            for i in [11_u64, 12, 13] {
                registry.set_loaded(&TaxId::from(i), false).unwrap();
            }
            let tree = DisplayTree::build(&registry, DisplayOptions::default(), 0).unwrap();
            let mut orders = OrderManager::new();
            orders.recompute(collect_leaves(&tree, &registry));
            Self { tree, orders }
        }

        fn id(&self, taxid: u64) -> DisplayId {
            self.tree.find(&TaxId::from(taxid)).unwrap()
        }

        fn drag(&mut self, taxid: u64, displacement: i32) -> Option<Vec<u32>> {
            let node = self.id(taxid);
            let out = reorder(
                &self.tree,
                self.orders.leaves(),
                self.orders.active(),
                node,
                displacement,
            );
            if let Some(order) = &out {
                self.orders.replace_active(order.clone());
            }
            out
        }
    }

    #[test]
    fn default_order_is_lineage() {
        let f = Fixture::new();
        assert_eq!(f.orders.active(), &[0, 1, 2]);
    }

    #[test]
    fn leaf_moves_past_its_neighbour() {
        let mut f = Fixture::new();
        assert_eq!(f.drag(11, 1), Some(vec![1, 0, 2]));
    }

    #[test]
    fn leaf_move_inserts_rather_than_swaps() {
        let mut f = Fixture::new();
        assert_eq!(f.drag(11, 2), Some(vec![1, 2, 0]));
    }

    #[test]
    fn internal_node_moves_as_a_block() {
        let mut f = Fixture::new();
        assert_eq!(f.drag(2, 1), Some(vec![2, 0, 1]));
        // And back.
        assert_eq!(f.drag(2, -1), Some(vec![0, 1, 2]));
    }

    #[test]
    fn block_clamp_preserves_relative_order() {
        let mut f = Fixture::new();
        assert_eq!(f.drag(2, 5), Some(vec![2, 0, 1]));
        assert_eq!(f.drag(2, 1), None, "already at the end");
        assert_eq!(f.drag(13, -7), None, "already at the start");
    }

    #[test]
    fn zero_displacement_is_idempotent() {
        let mut f = Fixture::new();
        assert_eq!(f.drag(11, 0), None);
        assert_eq!(f.drag(2, 0), None);
        assert_eq!(f.orders.active(), &[0, 1, 2]);
    }

    #[test]
    fn displacement_and_its_inverse_cancel() {
        let mut f = Fixture::new();
        f.drag(13, -2).unwrap();
        assert_eq!(f.orders.active(), &[2, 0, 1]);
        f.drag(13, 2).unwrap();
        assert_eq!(f.orders.active(), &[0, 1, 2]);
    }

    #[test]
    fn untracked_nodes_are_ignored() {
        let mut f = Fixture::new();
        assert_eq!(f.drag(5, 1), None, "unloaded leaf");

        let stale = f.id(11);
        let registry_free_tree = {
            let mut registry = Registry::new();
            registry.load(&RawTaxon::leaf(1_u64, "solo")).unwrap();
            DisplayTree::build(&registry, DisplayOptions::default(), 7).unwrap()
        };
        assert_eq!(
            reorder(&registry_free_tree, f.orders.leaves(), f.orders.active(), stale, 1),
            None
        );
    }
}
