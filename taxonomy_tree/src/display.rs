// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display-Tree Builder: the pruned, visibility-filtered tree actually shown.
//!
//! A [`DisplayTree`] is a disposable view derived from a [`Registry`]. It is rebuilt from
//! scratch on every structural change and never mutated afterwards. Its nodes are stored in
//! pre-order, so the root is always the first node.

use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::registry::Registry;
use crate::types::{NodeFlags, NodeKey, TaxId};

/// Identifier of a node in one particular [`DisplayTree`] build.
///
/// Ids carry the epoch of the build that produced them. An id from an older build is stale:
/// lookups return `None` and reorders on it are ignored.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DisplayId {
    index: u32,
    epoch: u32,
}

impl DisplayId {
    pub(crate) const fn new(index: u32, epoch: u32) -> Self {
        Self { index, epoch }
    }

    pub(crate) const fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) const fn epoch(self) -> u32 {
        self.epoch
    }
}

bitflags::bitflags! {
    /// Derived per-node state of a display node.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DisplayFlags: u8 {
        /// The organism is in the comparison set.
        const LOADED                = 0b0000_0001;
        /// Effective expansion: the node's own flag and all of its ancestors' flags are set.
        const EXPANDED              = 0b0000_0010;
        /// The node or one of its hierarchy descendants is loaded.
        const HAS_LOADED_DESCENDANT = 0b0000_0100;
        /// Synthetic root of the flat view shown when the taxonomy is hidden.
        const FAKE_ROOT             = 0b0000_1000;
        /// The organism was loaded from a user-supplied file.
        const FROM_FILE             = 0b0001_0000;
    }
}

/// Options controlling display-tree derivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Show the taxonomy. When `false`, only a flat root over the loaded organisms is shown.
    pub show_tree: bool,
    /// Fold chains of single-child nodes into their surviving descendant.
    pub collapse_tree: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_tree: true,
            collapse_tree: true,
        }
    }
}

/// One visible node.
#[derive(Clone, Debug)]
pub struct DisplayNode {
    /// Registry node whose data this position shows; `None` for the flat view's root.
    pub source: Option<NodeKey>,
    /// Registry nodes folded into this position by single-child pruning, outermost first.
    pub folded: SmallVec<[NodeKey; 2]>,
    /// Taxonomic id of [`DisplayNode::source`].
    pub taxid: TaxId,
    /// Name of the source, falling back to its taxid.
    pub label: String,
    /// Parent position, `None` at the root.
    pub parent: Option<DisplayId>,
    /// Visible children, loaded-bearing branches first.
    pub children: Vec<DisplayId>,
    /// Distance from the root.
    pub depth: u32,
    /// Longest distance to a visible leaf.
    pub height: u32,
    /// Derived state.
    pub flags: DisplayFlags,
    /// Number of children in the pruned hierarchy, before visibility filtering.
    pub hierarchy_children: usize,
}

impl DisplayNode {
    /// Has no visible children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The organism is in the comparison set.
    pub fn is_loaded(&self) -> bool {
        self.flags.contains(DisplayFlags::LOADED)
    }

    /// The node or one of its descendants is loaded.
    pub fn has_loaded_descendant(&self) -> bool {
        self.flags.contains(DisplayFlags::HAS_LOADED_DESCENDANT)
    }

    /// The node is effectively expanded.
    pub fn is_expanded(&self) -> bool {
        self.flags.contains(DisplayFlags::EXPANDED)
    }
}

/// The derived tree actually shown.
#[derive(Clone, Debug)]
pub struct DisplayTree {
    /// pre-order
    nodes: Vec<DisplayNode>,
    epoch: u32,
    by_taxid: HashMap<TaxId, DisplayId>,
}

impl DisplayTree {
    /// Derive the display tree from `registry`.
    ///
    /// 1. With `show_tree` off, a flat root whose children are exactly the loaded organisms.
    /// 2. Otherwise, walk the hierarchy from its root. With `collapse_tree` on, a node with
    ///    exactly one child is replaced by that child, recursively; the surviving node takes the
    ///    folded node's place under its parent and at its depth.
    /// 3. An expanded node shows all children. A collapsed node shows only the children that
    ///    carry loaded descendants, so the thread to every loaded organism stays visible.
    ///    The root is always expanded, and a node below a collapsed ancestor counts as collapsed.
    /// 4. Children with loaded descendants are ordered before those without; ties keep
    ///    hierarchy order.
    /// 5. `depth` counts from the root; `height` is the longest distance to a visible leaf.
    ///
    /// Returns `None` if the registry holds no taxonomy. `epoch` tags the ids of this build.
    pub fn build(registry: &Registry, options: DisplayOptions, epoch: u32) -> Option<Self> {
        let root = registry.root()?;
        let mut builder = Builder {
            registry,
            collapse: options.collapse_tree,
            epoch,
            nodes: Vec::new(),
            by_taxid: HashMap::new(),
        };
        if options.show_tree {
            builder.place(root, None, 0, true);
        } else {
            builder.place_flat();
        }
        tracing::trace!(epoch, nodes = builder.nodes.len(), "display tree built");
        Some(Self {
            nodes: builder.nodes,
            epoch,
            by_taxid: builder.by_taxid,
        })
    }

    /// Epoch of this build.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// The root position.
    pub fn root(&self) -> DisplayId {
        self.id_at(0)
    }

    /// Number of visible nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a built tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` belongs to this build.
    pub fn contains(&self, id: DisplayId) -> bool {
        id.epoch == self.epoch && id.index() < self.nodes.len()
    }

    /// Node data for an id of this build.
    pub fn get(&self, id: DisplayId) -> Option<&DisplayNode> {
        if id.epoch != self.epoch {
            return None;
        }
        self.nodes.get(id.index())
    }

    /// Position showing `taxid`, either as its source or folded into it.
    pub fn find(&self, taxid: &TaxId) -> Option<DisplayId> {
        self.by_taxid.get(taxid).copied()
    }

    /// Visible children of a node, or an empty slice for stale ids.
    pub fn children_of(&self, id: DisplayId) -> &[DisplayId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Parent of a node, `None` for the root or stale ids.
    pub fn parent_of(&self, id: DisplayId) -> Option<DisplayId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// All nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = (DisplayId, &DisplayNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (self.id_at(i), n))
    }

    /// Visible leaves in pre-order.
    pub fn leaves(&self) -> impl Iterator<Item = (DisplayId, &DisplayNode)> + '_ {
        self.iter().filter(|(_, n)| n.is_leaf())
    }

    /// Visible leaves whose organism is loaded, in pre-order.
    pub fn loaded_leaves(&self) -> impl Iterator<Item = (DisplayId, &DisplayNode)> + '_ {
        self.leaves().filter(|(_, n)| n.is_loaded())
    }

    /// Parent → child edges, in pre-order of the child.
    pub fn links(&self) -> impl Iterator<Item = (DisplayId, DisplayId)> + '_ {
        self.iter()
            .filter_map(|(id, n)| n.parent.map(|p| (p, id)))
    }

    fn id_at(&self, index: usize) -> DisplayId {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "DisplayId uses 32-bit indices by design."
        )]
        let index = index as u32;
        DisplayId::new(index, self.epoch)
    }

    /// Check structural consistency: every node is reachable from the root exactly once,
    /// parent links match child lists, and depth/height follow their definitions.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let mut seen = alloc::vec![false; self.nodes.len()];
        let mut stack = alloc::vec![self.root()];
        assert!(self.get(self.root()).unwrap().parent.is_none(), "root has a parent");
        while let Some(id) = stack.pop() {
            assert!(!seen[id.index()], "node reached twice");
            seen[id.index()] = true;
            let node = self.get(id).unwrap();
            let mut height = 0;
            for &child in &node.children {
                let c = self.get(child).expect("child id from another build");
                assert_eq!(c.parent, Some(id), "parent link mismatch");
                assert_eq!(c.depth, node.depth + 1, "depth mismatch");
                height = height.max(c.height + 1);
                stack.push(child);
            }
            assert_eq!(node.height, height, "height mismatch");
        }
        assert!(seen.iter().all(|s| *s), "unreachable display node");
    }
}

struct Builder<'a> {
    registry: &'a Registry,
    collapse: bool,
    epoch: u32,
    nodes: Vec<DisplayNode>,
    by_taxid: HashMap<TaxId, DisplayId>,
}

impl Builder<'_> {
    fn push(&mut self, node: DisplayNode) -> DisplayId {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "DisplayId uses 32-bit indices by design."
        )]
        let id = DisplayId::new(self.nodes.len() as u32, self.epoch);
        self.by_taxid.insert(node.taxid.clone(), id);
        self.nodes.push(node);
        id
    }

    fn place(
        &mut self,
        key: NodeKey,
        parent: Option<DisplayId>,
        depth: u32,
        ancestors_expanded: bool,
    ) -> DisplayId {
        let registry = self.registry;
        let mut folded = SmallVec::new();
        let mut source = key;
        if self.collapse {
            while let [only] = registry.children_of(source) {
                folded.push(source);
                source = *only;
            }
        }
        let (Some(taxon), Some(own)) = (registry.taxon(source), registry.flags(source)) else {
            unreachable!("registry child lists only hold live keys");
        };

        let has_loaded = registry.has_loaded_descendant(source);
        let expanded =
            parent.is_none() || (ancestors_expanded && own.contains(NodeFlags::EXPANDED));
        let mut flags = DisplayFlags::empty();
        flags.set(DisplayFlags::LOADED, own.contains(NodeFlags::LOADED));
        flags.set(DisplayFlags::FROM_FILE, own.contains(NodeFlags::FROM_FILE));
        flags.set(DisplayFlags::EXPANDED, expanded);
        flags.set(DisplayFlags::HAS_LOADED_DESCENDANT, has_loaded);

        let all = registry.children_of(source);
        let mut shown: Vec<NodeKey> = if expanded {
            all.to_vec()
        } else if has_loaded {
            all.iter()
                .copied()
                .filter(|&c| registry.has_loaded_descendant(c))
                .collect()
        } else {
            Vec::new()
        };
        // Stable: loaded-bearing branches first, hierarchy order otherwise.
        shown.sort_by_key(|&c| !registry.has_loaded_descendant(c));

        let id = self.push(DisplayNode {
            source: Some(source),
            folded,
            taxid: taxon.taxid.clone(),
            label: taxon.label().into(),
            parent,
            children: Vec::with_capacity(shown.len()),
            depth,
            height: 0,
            flags,
            hierarchy_children: all.len(),
        });
        for &k in &self.nodes[id.index()].folded {
            if let Some(t) = registry.taxon(k) {
                self.by_taxid.insert(t.taxid.clone(), id);
            }
        }

        let mut height = 0;
        for child in shown {
            let c = self.place(child, Some(id), depth + 1, expanded);
            height = height.max(self.nodes[c.index()].height + 1);
            self.nodes[id.index()].children.push(c);
        }
        self.nodes[id.index()].height = height;
        id
    }

    fn place_flat(&mut self) {
        let registry = self.registry;
        let loaded: Vec<NodeKey> = registry.loaded().collect();
        let mut flags = DisplayFlags::FAKE_ROOT | DisplayFlags::EXPANDED;
        flags.set(DisplayFlags::HAS_LOADED_DESCENDANT, !loaded.is_empty());
        let root = self.push(DisplayNode {
            source: None,
            folded: SmallVec::new(),
            taxid: TaxId::from("root"),
            label: "root".into(),
            parent: None,
            children: Vec::with_capacity(loaded.len()),
            depth: 0,
            height: u32::from(!loaded.is_empty()),
            flags,
            hierarchy_children: loaded.len(),
        });
        for key in loaded {
            let (Some(taxon), Some(own)) = (registry.taxon(key), registry.flags(key)) else {
                continue;
            };
            let mut flags = DisplayFlags::LOADED | DisplayFlags::HAS_LOADED_DESCENDANT;
            flags.set(DisplayFlags::FROM_FILE, own.contains(NodeFlags::FROM_FILE));
            let id = self.push(DisplayNode {
                source: Some(key),
                folded: SmallVec::new(),
                taxid: taxon.taxid.clone(),
                label: taxon.label().into(),
                parent: Some(root),
                children: Vec::new(),
                depth: 1,
                height: 0,
                flags,
                hierarchy_children: 0,
            });
            self.nodes[root.index()].children.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawTaxon;
    use alloc::vec;

    /// `{A: [B: [leaf1, leaf2], C: [leaf3]]}` plus an unloaded sibling branch `D: [leaf4, leaf5]`.
    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .load(&RawTaxon::clade(
                1_u64,
                "A",
                vec![
                    RawTaxon::clade(
                        2_u64,
                        "B",
                        vec![RawTaxon::leaf(11_u64, "leaf1"), RawTaxon::leaf(12_u64, "leaf2")],
                    ),
                    RawTaxon::clade(3_u64, "C", vec![RawTaxon::leaf(13_u64, "leaf3")]),
                    RawTaxon::clade(
                        4_u64,
                        "D",
                        vec![RawTaxon::leaf(14_u64, "leaf4"), RawTaxon::leaf(15_u64, "leaf5")],
                    ),
                ],
            ))
            .unwrap();
        registry
    }

    fn labels(tree: &DisplayTree, id: DisplayId) -> Vec<&str> {
        tree.children_of(id)
            .iter()
            .map(|&c| tree.get(c).unwrap().label.as_str())
            .collect()
    }

    fn load(registry: &mut Registry, ids: &[u64]) {
        for &i in ids {
            registry.set_loaded(&TaxId::from(i), false).unwrap();
        }
    }

    #[test]
    fn nothing_loaded_shows_root_children_only() {
        let registry = registry();
        let tree = DisplayTree::build(&registry, DisplayOptions::default(), 0).unwrap();
        tree.assert_consistent();
        // The root is always expanded; its collapsed children show nothing.
        assert_eq!(labels(&tree, tree.root()), vec!["B", "leaf3", "D"]);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.get(tree.root()).unwrap().height, 1);
    }

    #[test]
    fn collapsed_branches_keep_loaded_threads() {
        let mut registry = registry();
        load(&mut registry, &[11, 12, 13]);
        let tree = DisplayTree::build(&registry, DisplayOptions::default(), 0).unwrap();
        tree.assert_consistent();

        let root = tree.root();
        // D carries nothing loaded and sorts last; it shows as a collapsed leaf.
        assert_eq!(labels(&tree, root), vec!["B", "leaf3", "D"]);
        let b = tree.find(&TaxId::from(2_u64)).unwrap();
        assert!(!tree.get(b).unwrap().is_expanded());
        assert_eq!(labels(&tree, b), vec!["leaf1", "leaf2"]);
        let d = tree.find(&TaxId::from(4_u64)).unwrap();
        assert!(tree.get(d).unwrap().is_leaf());
        assert!(!tree.get(d).unwrap().has_loaded_descendant());

        let loaded: Vec<_> = tree.loaded_leaves().map(|(_, n)| n.label.as_str()).collect();
        assert_eq!(loaded, vec!["leaf1", "leaf2", "leaf3"]);
    }

    #[test]
    fn partial_load_hides_unloaded_siblings_of_collapsed_node() {
        let mut registry = registry();
        load(&mut registry, &[12]);
        let tree = DisplayTree::build(&registry, DisplayOptions::default(), 0).unwrap();
        let b = tree.find(&TaxId::from(2_u64)).unwrap();
        assert_eq!(labels(&tree, b), vec!["leaf2"]);
        assert_eq!(tree.get(b).unwrap().hierarchy_children, 2);

        let mut registry = registry;
        let key = registry.get(&TaxId::from(2_u64)).unwrap();
        registry.set_expanded(key, true);
        let tree = DisplayTree::build(&registry, DisplayOptions::default(), 1).unwrap();
        let b = tree.find(&TaxId::from(2_u64)).unwrap();
        assert_eq!(labels(&tree, b), vec!["leaf2", "leaf1"], "loaded first, stable otherwise");
    }

    #[test]
    fn single_child_chains_fold_into_their_survivor() {
        let mut registry = Registry::new();
        registry
            .load(&RawTaxon::clade(
                1_u64,
                "root",
                vec![
                    RawTaxon::clade(
                        2_u64,
                        "X",
                        vec![RawTaxon::clade(
                            3_u64,
                            "Y",
                            vec![RawTaxon::leaf(31_u64, "a"), RawTaxon::leaf(32_u64, "b")],
                        )],
                    ),
                    RawTaxon::leaf(4_u64, "c"),
                ],
            ))
            .unwrap();
        load(&mut registry, &[31, 4]);
        let tree = DisplayTree::build(&registry, DisplayOptions::default(), 0).unwrap();
        tree.assert_consistent();

        let y = tree.find(&TaxId::from(3_u64)).unwrap();
        assert_eq!(tree.find(&TaxId::from(2_u64)), Some(y), "X folds into Y");
        let node = tree.get(y).unwrap();
        assert_eq!(node.label, "Y");
        assert_eq!(node.depth, 1, "survivor keeps the folded node's depth");
        assert_eq!(node.parent, Some(tree.root()));
        assert_eq!(node.folded.len(), 1);

        let unpruned = DisplayOptions {
            collapse_tree: false,
            ..DisplayOptions::default()
        };
        let tree = DisplayTree::build(&registry, unpruned, 1).unwrap();
        tree.assert_consistent();
        let x = tree.find(&TaxId::from(2_u64)).unwrap();
        assert_eq!(labels(&tree, x), vec!["Y"]);
        assert_eq!(tree.get(tree.root()).unwrap().height, 3);
    }

    #[test]
    fn collapsed_ancestor_collapses_descendants() {
        let mut registry = Registry::new();
        registry
            .load(&RawTaxon::clade(
                1_u64,
                "root",
                vec![
                    RawTaxon::clade(
                        2_u64,
                        "X",
                        vec![
                            RawTaxon::clade(
                                3_u64,
                                "Y",
                                vec![RawTaxon::leaf(31_u64, "a"), RawTaxon::leaf(32_u64, "b")],
                            ),
                            RawTaxon::leaf(33_u64, "c"),
                        ],
                    ),
                    RawTaxon::leaf(4_u64, "d"),
                ],
            ))
            .unwrap();
        load(&mut registry, &[31]);
        let x = registry.get(&TaxId::from(2_u64)).unwrap();
        let y = registry.get(&TaxId::from(3_u64)).unwrap();
        registry.set_expanded(y, true);

        // Y's own flag is set, but X is collapsed, so Y only shows its loaded thread.
        let tree = DisplayTree::build(&registry, DisplayOptions::default(), 0).unwrap();
        let yid = tree.find(&TaxId::from(3_u64)).unwrap();
        assert!(!tree.get(yid).unwrap().is_expanded());
        assert_eq!(labels(&tree, yid), vec!["a"]);

        registry.set_expanded(x, true);
        let tree = DisplayTree::build(&registry, DisplayOptions::default(), 1).unwrap();
        tree.assert_consistent();
        let xid = tree.find(&TaxId::from(2_u64)).unwrap();
        let yid = tree.find(&TaxId::from(3_u64)).unwrap();
        assert_eq!(labels(&tree, xid), vec!["Y", "c"]);
        assert_eq!(labels(&tree, yid), vec!["a", "b"]);
    }

    #[test]
    fn hidden_taxonomy_shows_flat_root() {
        let mut registry = registry();
        load(&mut registry, &[13, 11]);
        registry.set_loaded(&TaxId::from("upload"), true).unwrap();
        let options = DisplayOptions {
            show_tree: false,
            ..DisplayOptions::default()
        };
        let tree = DisplayTree::build(&registry, options, 0).unwrap();
        tree.assert_consistent();
        let root = tree.get(tree.root()).unwrap();
        assert!(root.flags.contains(DisplayFlags::FAKE_ROOT));
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.height, 1);
        let upload = tree.find(&TaxId::from("upload")).unwrap();
        assert!(tree.get(upload).unwrap().flags.contains(DisplayFlags::FROM_FILE));
        assert_eq!(tree.links().count(), 3);
    }

    #[test]
    fn stale_ids_are_rejected() {
        let registry = registry();
        let old = DisplayTree::build(&registry, DisplayOptions::default(), 0).unwrap();
        let new = DisplayTree::build(&registry, DisplayOptions::default(), 1).unwrap();
        assert!(new.get(old.root()).is_none());
        assert!(!new.contains(old.root()));
        assert!(new.children_of(old.root()).is_empty());
    }

    #[test]
    fn empty_registry_builds_nothing() {
        assert!(DisplayTree::build(&Registry::new(), DisplayOptions::default(), 0).is_none());
    }
}
