// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Order Manager: canonical leaf orderings and the active order.
//!
//! Loaded leaves are indexed `0..n` by ascending taxonomic id. An order is a permutation of
//! those indices; the leaf at position `k` of the active order occupies slot `k` of the
//! heatmap axis.

use alloc::string::String;
use alloc::vec::Vec;
use core::str::FromStr;

use crate::display::{DisplayId, DisplayTree};
use crate::error::TaxonomyError;
use crate::registry::Registry;
use crate::types::TaxId;

/// Sort criteria for the leaf order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrderKey {
    /// Taxonomic id, numeric ascending.
    Id,
    /// Display name, case-sensitive lexical ascending.
    Name,
    /// Lineage string ascending. This is the default "tree" order.
    LineageAsc,
    /// Lineage string descending.
    LineageDesc,
}

impl OrderKey {
    /// All keys, in declaration order.
    pub const ALL: [Self; 4] = [Self::Id, Self::Name, Self::LineageAsc, Self::LineageDesc];

    /// Canonical name of the key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::LineageAsc => "lineageAsc",
            Self::LineageDesc => "lineageDesc",
        }
    }
}

impl FromStr for OrderKey {
    type Err = TaxonomyError;

    /// Parses canonical names and the legacy `tax_id`/`org_name`/`tree1`/`tree2` aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" | "tax_id" => Ok(Self::Id),
            "name" | "org_name" => Ok(Self::Name),
            "lineageAsc" | "tree1" => Ok(Self::LineageAsc),
            "lineageDesc" | "tree2" => Ok(Self::LineageDesc),
            _ => Err(TaxonomyError::UnknownOrderKey(s.into())),
        }
    }
}

/// A loaded leaf as seen by the orderings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafEntry {
    /// Position of the leaf in the display tree it was collected from.
    pub node: DisplayId,
    /// Taxonomic id.
    pub taxid: TaxId,
    /// Display name.
    pub name: String,
    /// Lineage string, empty if unknown.
    pub lineage: String,
}

/// Collect the loaded leaves of `tree`, indexed by ascending taxonomic id.
///
/// Ties (equal ids cannot occur within one tree) would keep pre-order.
pub fn collect_leaves(tree: &DisplayTree, registry: &Registry) -> Vec<LeafEntry> {
    let mut leaves: Vec<LeafEntry> = tree
        .loaded_leaves()
        .map(|(id, node)| {
            let lineage = node
                .source
                .and_then(|k| registry.taxon(k))
                .and_then(|t| t.lineage.clone())
                .unwrap_or_default();
            LeafEntry {
                node: id,
                taxid: node.taxid.clone(),
                name: node.label.clone(),
                lineage,
            }
        })
        .collect();
    leaves.sort_by(|a, b| a.taxid.cmp_numeric(&b.taxid));
    leaves
}

/// Every canonical ordering of one set of leaves.
///
/// Each field is a permutation of `0..n`. Sorts are stable, so ties keep input order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderSet {
    /// By taxonomic id, numeric ascending.
    pub by_id: Vec<u32>,
    /// By display name.
    pub by_name: Vec<u32>,
    /// By lineage, ascending.
    pub by_lineage_asc: Vec<u32>,
    /// By lineage, descending.
    pub by_lineage_desc: Vec<u32>,
}

impl OrderSet {
    /// Compute all orderings of `leaves`.
    pub fn compute(leaves: &[LeafEntry]) -> Self {
        let sorted = |cmp: &dyn Fn(&LeafEntry, &LeafEntry) -> core::cmp::Ordering| {
            let mut order = identity(leaves.len());
            order.sort_by(|&a, &b| cmp(&leaves[a as usize], &leaves[b as usize]));
            order
        };
        Self {
            by_id: sorted(&|a, b| a.taxid.cmp_numeric(&b.taxid)),
            by_name: sorted(&|a, b| a.name.cmp(&b.name)),
            by_lineage_asc: sorted(&|a, b| a.lineage.cmp(&b.lineage)),
            by_lineage_desc: sorted(&|a, b| b.lineage.cmp(&a.lineage)),
        }
    }

    /// The ordering for `key`.
    pub fn get(&self, key: OrderKey) -> &[u32] {
        match key {
            OrderKey::Id => &self.by_id,
            OrderKey::Name => &self.by_name,
            OrderKey::LineageAsc => &self.by_lineage_asc,
            OrderKey::LineageDesc => &self.by_lineage_desc,
        }
    }

    /// Number of leaves ordered.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if there are no leaves.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Holds the canonical orderings and the active order.
#[derive(Clone, Debug, Default)]
pub struct OrderManager {
    leaves: Vec<LeafEntry>,
    orders: OrderSet,
    active: Vec<u32>,
}

impl OrderManager {
    /// Create a manager with no leaves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the orderings for a new set of loaded leaves.
    ///
    /// If the number of leaves changed, the active order resets to
    /// [`OrderKey::LineageAsc`]; otherwise it is kept as-is so a manual reorder survives
    /// unrelated rebuilds. Returns `true` if the active order was reset.
    pub fn recompute(&mut self, leaves: Vec<LeafEntry>) -> bool {
        self.orders = OrderSet::compute(&leaves);
        self.leaves = leaves;
        let reset = self.active.len() != self.leaves.len();
        if reset {
            self.active = self.orders.by_lineage_asc.clone();
        }
        debug_assert!(
            is_permutation(&self.active, self.leaves.len()),
            "active order must be a permutation of the loaded leaves"
        );
        reset
    }

    /// Make the ordering for `key` active.
    pub fn select(&mut self, key: OrderKey) -> &[u32] {
        self.active = self.orders.get(key).to_vec();
        &self.active
    }

    /// Make the ordering named `name` active.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::UnknownOrderKey`] for an unrecognized name; the active order is kept.
    pub fn select_named(&mut self, name: &str) -> Result<&[u32], TaxonomyError> {
        let key = name.parse()?;
        Ok(self.select(key))
    }

    /// The active order.
    pub fn active(&self) -> &[u32] {
        &self.active
    }

    /// The canonical orderings.
    pub fn orders(&self) -> &OrderSet {
        &self.orders
    }

    /// Loaded leaves, by leaf index.
    pub fn leaves(&self) -> &[LeafEntry] {
        &self.leaves
    }

    /// Leaf index of a display node, if it is a loaded leaf.
    pub fn leaf_index_of(&self, node: DisplayId) -> Option<usize> {
        self.leaves.iter().position(|l| l.node == node)
    }

    /// Slot currently occupied by a leaf index.
    pub fn slot_of(&self, leaf_index: usize) -> Option<usize> {
        self.active.iter().position(|&i| i as usize == leaf_index)
    }

    /// Slot of every leaf index (the inverse of the active order).
    pub fn slots(&self) -> Vec<usize> {
        let mut slots = alloc::vec![0; self.active.len()];
        for (slot, &leaf) in self.active.iter().enumerate() {
            slots[leaf as usize] = slot;
        }
        slots
    }

    pub(crate) fn replace_active(&mut self, order: Vec<u32>) {
        debug_assert!(
            is_permutation(&order, self.leaves.len()),
            "active order must be a permutation of the loaded leaves"
        );
        self.active = order;
    }
}

/// Whether `order` is a permutation of `0..n`.
pub fn is_permutation(order: &[u32], n: usize) -> bool {
    if order.len() != n {
        return false;
    }
    let mut seen = alloc::vec![false; n];
    for &i in order {
        match seen.get_mut(i as usize) {
            Some(s) if !*s => *s = true,
            _ => return false,
        }
    }
    true
}

fn identity(n: usize) -> Vec<u32> {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Leaf indices are 32-bit by design."
    )]
    let n = n as u32;
    (0..n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn entry(index: u32, taxid: &str, name: &str, lineage: &str) -> LeafEntry {
        LeafEntry {
            node: DisplayId::new(index, 0),
            taxid: TaxId::from(taxid),
            name: name.into(),
            lineage: lineage.into(),
        }
    }

    fn leaves() -> Vec<LeafEntry> {
        vec![
            entry(1, "9", "beta", "Bacteria; Firmicutes"),
            entry(2, "10", "Alpha", "Bacteria; Actinobacteria"),
            entry(3, "100", "alpha", "Archaea"),
            entry(4, "upload", "gamma", "Bacteria; Firmicutes"),
        ]
    }

    #[test]
    fn orderings_follow_their_comparators() {
        let set = OrderSet::compute(&leaves());
        assert_eq!(set.by_id, vec![0, 1, 2, 3]);
        // Case-sensitive: uppercase sorts first.
        assert_eq!(set.by_name, vec![1, 2, 0, 3]);
        assert_eq!(set.by_lineage_asc, vec![2, 1, 0, 3]);
        // Ties keep input order in both directions.
        assert_eq!(set.by_lineage_desc, vec![0, 3, 1, 2]);
        for key in OrderKey::ALL {
            assert!(is_permutation(set.get(key), 4), "{key:?}");
        }
    }

    #[test]
    fn active_order_resets_only_when_leaf_count_changes() {
        let mut manager = OrderManager::new();
        assert!(manager.recompute(leaves()));
        assert_eq!(manager.active(), &[2, 1, 0, 3]);

        manager.replace_active(vec![3, 2, 1, 0]);
        assert!(!manager.recompute(leaves()));
        assert_eq!(manager.active(), &[3, 2, 1, 0], "manual order survives");

        let mut fewer = leaves();
        fewer.pop();
        assert!(manager.recompute(fewer));
        assert_eq!(manager.active(), &[2, 1, 0]);
    }

    #[test]
    fn select_by_key_and_name() {
        let mut manager = OrderManager::new();
        manager.recompute(leaves());
        assert_eq!(manager.select(OrderKey::Name), &[1, 2, 0, 3]);
        assert_eq!(manager.select_named("tree2").unwrap(), &[0, 3, 1, 2]);

        let err = manager.select_named("size").unwrap_err();
        assert_eq!(err, TaxonomyError::UnknownOrderKey("size".into()));
        assert_eq!(manager.active(), &[0, 3, 1, 2], "previous order retained");
    }

    #[test]
    fn key_names_round_trip() {
        for key in OrderKey::ALL {
            assert_eq!(key.as_str().parse::<OrderKey>().unwrap(), key);
        }
        assert_eq!("tax_id".parse::<OrderKey>().unwrap(), OrderKey::Id);
        assert_eq!("org_name".parse::<OrderKey>().unwrap(), OrderKey::Name);
    }

    #[test]
    fn slots_invert_the_active_order() {
        let mut manager = OrderManager::new();
        manager.recompute(leaves());
        manager.replace_active(vec![2, 0, 3, 1]);
        assert_eq!(manager.slots(), vec![1, 3, 0, 2]);
        assert_eq!(manager.slot_of(3), Some(2));
        assert_eq!(manager.slot_of(7), None);
        let node = manager.leaves()[1].node;
        assert_eq!(manager.leaf_index_of(node), Some(1));
    }

    #[test]
    fn permutation_check() {
        assert!(is_permutation(&[], 0));
        assert!(is_permutation(&[1, 0], 2));
        assert!(!is_permutation(&[0, 0], 2));
        assert!(!is_permutation(&[0, 2], 2));
        assert!(!is_permutation(&[0], 2));
    }
}
