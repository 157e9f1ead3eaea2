// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node Registry and Hierarchy Loader.
//!
//! The registry is an arena of taxon records keyed by [`TaxId`]. Ownership flows root → children
//! through [`NodeKey`] lists; the parent link is a plain lookup handle used for upward walks.

use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};

use crate::error::{MalformedHierarchy, TaxonomyError};
use crate::types::{NodeFlags, NodeKey, RawTaxon, TaxId, Taxon};

/// Flat mapping from taxon identifier to node record.
///
/// The registry is the single source of truth for node existence and loaded status. It is
/// never mutated by display-tree derivation; see [`DisplayTree::build`](crate::DisplayTree::build).
///
/// ## Example
///
/// ```rust
/// use taxonomy_tree::{RawTaxon, Registry, TaxId};
///
/// let mut registry = Registry::new();
/// registry
///     .load(&RawTaxon::clade(1_u64, "root", vec![
///         RawTaxon::leaf(562_u64, "Escherichia coli"),
///         RawTaxon::leaf(1280_u64, "Staphylococcus aureus"),
///     ]))
///     .unwrap();
///
/// assert_eq!(registry.len(), 3);
/// assert_eq!(registry.known_organisms().len(), 2);
///
/// registry.set_loaded(&TaxId::from(562_u64), false).unwrap();
/// let root = registry.root().unwrap();
/// assert!(registry.has_loaded_descendant(root));
/// ```
pub struct Registry {
    /// slots
    nodes: Vec<Option<Node>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    by_taxid: HashMap<TaxId, NodeKey>,
    root: Option<NodeKey>,
    /// Childless taxa seen by the loader, in load order.
    organisms: Vec<TaxId>,
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("nodes_alive", &self.by_taxid.len())
            .field("free_list", &self.free_list.len())
            .field("root", &self.root)
            .field("organisms", &self.organisms.len())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
struct Node {
    generation: u32,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    taxon: Taxon,
    flags: NodeFlags,
    /// Loaded nodes in this subtree, self included.
    loaded_below: u32,
}

/// Summary of a [`Registry::load`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadReport {
    /// Registry node of the payload root.
    pub root: NodeKey,
    /// Number of nodes that did not exist before the load.
    pub inserted: usize,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            by_taxid: HashMap::new(),
            root: None,
            organisms: Vec::new(),
        }
    }

    /// Ingest a raw nested hierarchy.
    ///
    /// Each node is keyed by its `taxid` (or its `id` when the taxid is absent); its display `id`
    /// falls back to the taxid. Every childless node is recorded as a known organism.
    ///
    /// Identifiers that already exist are left untouched, provided they list the same children.
    /// The payload is validated before anything is inserted, so a failed load leaves the
    /// registry unchanged.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::MalformedHierarchy`] if a node lacks both identifiers, if one identifier
    /// appears with different children lists, or if the payload root does not belong to an
    /// already-loaded taxonomy.
    pub fn load(&mut self, raw: &RawTaxon) -> Result<LoadReport, TaxonomyError> {
        let mut seen: HashMap<&TaxId, Vec<&TaxId>> = HashMap::new();
        self.validate(raw, 0, &mut seen)?;
        let root_key = key_of(raw, 0)?;
        if self.root.is_some() && !self.by_taxid.contains_key(root_key) {
            return Err(MalformedHierarchy::DetachedLineage {
                taxid: root_key.clone(),
            }
            .into());
        }

        let mut inserted = 0;
        let root = self.insert_subtree(raw, None, &mut inserted);
        if self.root.is_none() {
            self.root = Some(root);
        }
        tracing::debug!(root = %root_key, inserted, "hierarchy loaded");
        Ok(LoadReport { root, inserted })
    }

    /// Merge a root → organism lineage path.
    ///
    /// The unknown suffix of `path` is attached beneath its deepest already-known ancestor. An
    /// empty registry adopts the whole path, its first element becoming the root. Returns the
    /// number of inserted nodes; merging a known path is a no-op.
    ///
    /// # Errors
    ///
    /// - [`MalformedHierarchy::MissingIdentifier`] for an element without identifiers.
    /// - [`MalformedHierarchy::ConflictingChildren`] when the path names a taxid twice.
    /// - [`MalformedHierarchy::DetachedLineage`] when no element of a non-empty path is known
    ///   to a registry that already holds a taxonomy.
    ///
    /// The registry is unchanged in every error case.
    pub fn merge_lineage(&mut self, path: &[RawTaxon]) -> Result<usize, TaxonomyError> {
        let keys = path
            .iter()
            .enumerate()
            .map(|(depth, raw)| key_of(raw, depth))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(first) = keys.first() else {
            return Ok(0);
        };
        let mut distinct = HashSet::with_capacity(keys.len());
        if let Some(repeated) = keys.iter().find(|&&k| !distinct.insert(k)) {
            return Err(conflict(repeated));
        }

        let (mut parent, start) = if self.root.is_none() {
            (None, 0)
        } else {
            match keys.iter().rposition(|k| self.by_taxid.contains_key(*k)) {
                Some(i) => (self.by_taxid.get(keys[i]).copied(), i + 1),
                None => {
                    return Err(MalformedHierarchy::DetachedLineage {
                        taxid: (*first).clone(),
                    }
                    .into());
                }
            }
        };

        if let Some(p) = parent
            && start < path.len()
        {
            // A known organism that gains descendants is no longer a leaf.
            let taxid = self.node(p).taxon.taxid.clone();
            if let Some(pos) = self.organisms.iter().position(|o| *o == taxid) {
                self.organisms.remove(pos);
            }
        }

        for (raw, key) in path[start..].iter().zip(&keys[start..]) {
            let id = self.alloc(raw.to_taxon(key), NodeFlags::MERGED);
            if let Some(p) = parent {
                self.link_parent(id, p);
            }
            if self.root.is_none() {
                self.root = Some(id);
            }
            parent = Some(id);
        }
        if start < path.len()
            && let Some(last) = keys.last()
        {
            self.organisms.push((*last).clone());
        }
        let inserted = path.len() - start;
        tracing::debug!(organism = %keys[keys.len() - 1], inserted, "lineage merged");
        Ok(inserted)
    }

    /// Mark an organism as loaded.
    ///
    /// An unknown taxid is synthesized as a leaf named after its id and appended to the root's
    /// children. Returns `false` if the organism was already loaded.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::NoTaxonomy`] if no hierarchy has been ingested yet.
    pub fn set_loaded(&mut self, taxid: &TaxId, from_file: bool) -> Result<bool, TaxonomyError> {
        let root = self.root.ok_or(TaxonomyError::NoTaxonomy)?;
        let key = match self.by_taxid.get(taxid) {
            Some(&key) => {
                let node = self.node_mut(key);
                if node.flags.contains(NodeFlags::LOADED) {
                    return Ok(false);
                }
                node.flags.insert(NodeFlags::LOADED);
                key
            }
            None => {
                let mut flags = NodeFlags::LOADED | NodeFlags::SYNTHETIC;
                flags.set(NodeFlags::FROM_FILE, from_file);
                let taxon = Taxon {
                    id: taxid.clone(),
                    taxid: taxid.clone(),
                    name: Some(taxid.as_str().into()),
                    rank: None,
                    lineage: None,
                };
                let key = self.alloc(taxon, flags);
                self.link_parent(key, root);
                tracing::debug!(%taxid, from_file, "synthesized organism");
                key
            }
        };
        self.adjust_loaded(key, true);
        Ok(true)
    }

    /// Remove an organism from the comparison set.
    ///
    /// Synthetic organisms are detached from their parent and deleted. Returns `false` if the
    /// organism is unknown or not loaded.
    pub fn unload(&mut self, taxid: &TaxId) -> bool {
        let Some(&key) = self.by_taxid.get(taxid) else {
            return false;
        };
        let node = self.node_mut(key);
        if !node.flags.contains(NodeFlags::LOADED) {
            return false;
        }
        node.flags.remove(NodeFlags::LOADED);
        let synthetic = node.flags.contains(NodeFlags::SYNTHETIC);
        self.adjust_loaded(key, false);
        if synthetic {
            self.remove(key);
        }
        true
    }

    /// Set a node's expansion flag. Returns whether it changed.
    pub fn set_expanded(&mut self, key: NodeKey, expanded: bool) -> bool {
        let Some(node) = self.node_opt_mut(key) else {
            return false;
        };
        if node.flags.contains(NodeFlags::EXPANDED) == expanded {
            return false;
        }
        node.flags.set(NodeFlags::EXPANDED, expanded);
        true
    }

    /// Returns true if `key` refers to a live node.
    pub fn is_alive(&self, key: NodeKey) -> bool {
        self.nodes
            .get(key.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == key.1)
            .unwrap_or(false)
    }

    /// Look up a node by taxonomic identifier.
    pub fn get(&self, taxid: &TaxId) -> Option<NodeKey> {
        self.by_taxid.get(taxid).copied()
    }

    /// The root of the ingested taxonomy.
    pub fn root(&self) -> Option<NodeKey> {
        self.root
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.by_taxid.len()
    }

    /// Returns `true` if nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.by_taxid.is_empty()
    }

    /// Descriptive attributes of a live node.
    pub fn taxon(&self, key: NodeKey) -> Option<&Taxon> {
        self.node_opt(key).map(|n| &n.taxon)
    }

    /// State flags of a live node.
    pub fn flags(&self, key: NodeKey) -> Option<NodeFlags> {
        self.node_opt(key).map(|n| n.flags)
    }

    /// Returns the parent of a node, or `None` for the root or stale keys.
    pub fn parent_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.node_opt(key).and_then(|n| n.parent)
    }

    /// Ordered children of a node, or an empty slice if the key is stale.
    pub fn children_of(&self, key: NodeKey) -> &[NodeKey] {
        self.node_opt(key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Whether the node or any of its descendants is loaded.
    pub fn has_loaded_descendant(&self, key: NodeKey) -> bool {
        self.node_opt(key).is_some_and(|n| n.loaded_below > 0)
    }

    /// Number of loaded nodes.
    pub fn loaded_count(&self) -> usize {
        self.root
            .and_then(|r| self.node_opt(r))
            .map_or(0, |n| n.loaded_below as usize)
    }

    /// Childless taxa recorded by the loader, in load order.
    pub fn known_organisms(&self) -> &[TaxId] {
        &self.organisms
    }

    /// Live nodes in slot order.
    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            n.as_ref().map(|n| {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "NodeKey uses 32-bit indices by design."
                )]
                let idx = i as u32;
                NodeKey::new(idx, n.generation)
            })
        })
    }

    /// Loaded nodes in slot order.
    pub fn loaded(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.keys()
            .filter(|&k| self.node(k).flags.contains(NodeFlags::LOADED))
    }

    /// Childless descendants of `key` (or `key` itself if childless), in depth-first order.
    pub fn leaves_under(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        if !self.is_alive(key) {
            return out;
        }
        let mut stack = alloc::vec![key];
        while let Some(k) = stack.pop() {
            let children = &self.node(k).children;
            if children.is_empty() {
                out.push(k);
            }
            stack.extend(children.iter().rev());
        }
        out
    }

    /// `key` and all of its descendants in depth-first order.
    pub fn subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        if !self.is_alive(key) {
            return out;
        }
        let mut stack = alloc::vec![key];
        while let Some(k) = stack.pop() {
            out.push(k);
            stack.extend(self.node(k).children.iter().rev());
        }
        out
    }

    // --- internals ---

    fn validate<'a>(
        &self,
        raw: &'a RawTaxon,
        depth: usize,
        seen: &mut HashMap<&'a TaxId, Vec<&'a TaxId>>,
    ) -> Result<(), TaxonomyError> {
        let key = key_of(raw, depth)?;
        let children = raw
            .children()
            .iter()
            .map(|c| key_of(c, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(previous) = seen.get(key) {
            if *previous != children {
                return Err(conflict(key));
            }
            return Ok(());
        }
        if let Some(&existing) = self.by_taxid.get(key) {
            // Synthesized leaves and lineage merges are additions, not part of the payload.
            let added = NodeFlags::SYNTHETIC | NodeFlags::MERGED;
            let node = self.node(existing);
            let known = node
                .children
                .iter()
                .map(|&c| self.node(c))
                .filter(|c| !c.flags.intersects(added))
                .map(|c| &c.taxon.taxid);
            let listed = children.iter().copied().filter(|t| {
                !self
                    .by_taxid
                    .get(*t)
                    .map(|&c| self.node(c))
                    .is_some_and(|c| c.parent == Some(existing) && c.flags.intersects(added))
            });
            if !known.eq(listed) {
                return Err(conflict(key));
            }
        }
        seen.insert(key, children);
        for child in raw.children() {
            self.validate(child, depth + 1, seen)?;
        }
        Ok(())
    }

    fn insert_subtree(
        &mut self,
        raw: &RawTaxon,
        parent: Option<NodeKey>,
        inserted: &mut usize,
    ) -> NodeKey {
        // Validation guarantees every node has a key.
        let Some(key) = raw.key() else {
            unreachable!("validated payload node without identifier");
        };
        if let Some(&existing) = self.by_taxid.get(key) {
            return existing;
        }
        let id = self.alloc(raw.to_taxon(key), NodeFlags::empty());
        *inserted += 1;
        if let Some(p) = parent {
            self.link_parent(id, p);
        }
        if raw.children().is_empty() {
            self.organisms.push(key.clone());
        }
        for child in raw.children() {
            self.insert_subtree(child, Some(id), inserted);
        }
        id
    }

    fn alloc(&mut self, taxon: Taxon, flags: NodeFlags) -> NodeKey {
        let taxid = taxon.taxid.clone();
        let node = |generation| Node {
            generation,
            parent: None,
            children: Vec::new(),
            taxon,
            flags,
            loaded_below: 0,
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(node(generation));
            (idx, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(node(generation)));
            self.generations.push(generation);
            (self.nodes.len() - 1, generation)
        };
        #[allow(
            clippy::cast_possible_truncation,
            reason = "NodeKey uses 32-bit indices by design."
        )]
        let key = NodeKey::new(idx as u32, generation);
        self.by_taxid.insert(taxid, key);
        key
    }

    /// Delete a childless node. Used for synthetic organisms only.
    fn remove(&mut self, key: NodeKey) {
        if let Some(parent) = self.node(key).parent {
            let p = self.node_mut(parent);
            p.children.retain(|c| *c != key);
        }
        let taxid = self.node(key).taxon.taxid.clone();
        self.by_taxid.remove(&taxid);
        self.nodes[key.idx()] = None;
        self.free_list.push(key.idx());
        tracing::debug!(%taxid, "synthetic organism removed");
    }

    fn adjust_loaded(&mut self, key: NodeKey, loaded: bool) {
        let mut current = Some(key);
        while let Some(k) = current {
            let node = self.node_mut(k);
            node.loaded_below = if loaded {
                node.loaded_below + 1
            } else {
                node.loaded_below.saturating_sub(1)
            };
            current = node.parent;
        }
    }

    fn link_parent(&mut self, id: NodeKey, parent: NodeKey) {
        self.node_mut(parent).children.push(id);
        self.node_mut(id).parent = Some(parent);
    }

    fn node(&self, key: NodeKey) -> &Node {
        self.nodes[key.idx()].as_ref().expect("dangling NodeKey")
    }

    fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        self.nodes[key.idx()].as_mut().expect("dangling NodeKey")
    }

    fn node_opt(&self, key: NodeKey) -> Option<&Node> {
        let n = self.nodes.get(key.idx())?.as_ref()?;
        (n.generation == key.1).then_some(n)
    }

    fn node_opt_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        let n = self.nodes.get_mut(key.idx())?.as_mut()?;
        if n.generation != key.1 {
            return None;
        }
        Some(n)
    }
}

fn key_of(raw: &RawTaxon, depth: usize) -> Result<&TaxId, TaxonomyError> {
    raw.key()
        .ok_or(TaxonomyError::MalformedHierarchy(MalformedHierarchy::MissingIdentifier { depth }))
}

fn conflict(key: &TaxId) -> TaxonomyError {
    MalformedHierarchy::ConflictingChildren {
        taxid: key.clone(),
    }
    .into()
}
