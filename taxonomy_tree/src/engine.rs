// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The [`Taxonomy`] engine: registry, derived views and events behind one owner.
//!
//! Every structural change runs one full rebuild (display tree → orders → layout) before
//! returning, so consumers never observe a half-updated state.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashSet;

use crate::display::{DisplayId, DisplayOptions, DisplayTree};
use crate::error::{FetchError, MalformedHierarchy, TaxonomyError};
use crate::events::{EventBus, EventKind, ListenerId, TaxonomyEvent};
use crate::layout::{Layout, LayoutConfig};
use crate::order::{OrderKey, OrderManager, collect_leaves};
use crate::registry::{LoadReport, Registry};
use crate::reorder::reorder;
use crate::types::{NodeFlags, RawTaxon, TaxId};

/// Text shown for a node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LabelMode {
    /// Scientific name, falling back to the taxid.
    #[default]
    Name,
    /// Taxonomic id.
    Id,
    /// `"taxid: name"`.
    Both,
}

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TaxonomyOptions {
    /// Show the taxonomy rather than a flat list of loaded organisms.
    pub show_tree: bool,
    /// Fold single-child chains.
    pub collapse_tree: bool,
    /// Node label text.
    pub label_mode: LabelMode,
    /// Panel geometry.
    pub layout: LayoutConfig,
}

impl Default for TaxonomyOptions {
    fn default() -> Self {
        Self {
            show_tree: true,
            collapse_tree: true,
            label_mode: LabelMode::Name,
            layout: LayoutConfig::default(),
        }
    }
}

/// Result of a successful organism fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchedOrganism {
    /// Root → organism path. Empty when the source knows no lineage; the organism is then
    /// synthesized under the root.
    pub lineage: Vec<RawTaxon>,
    /// The organism came from a user-supplied file.
    pub from_file: bool,
}

/// Taxonomy tree engine.
///
/// ## Example
///
/// ```rust
/// use taxonomy_tree::{EventKind, RawTaxon, Taxonomy, TaxId, TaxonomyEvent};
///
/// let mut taxonomy = Taxonomy::default();
/// taxonomy.on(EventKind::SpeciesRequested, |event| {
///     if let TaxonomyEvent::SpeciesRequested(taxid) = event {
///         println!("fetch {taxid}");
///     }
/// });
///
/// taxonomy
///     .load_taxonomy(&RawTaxon::clade(2_u64, "Bacteria", vec![
///         RawTaxon::leaf(562_u64, "Escherichia coli"),
///         RawTaxon::leaf(1280_u64, "Staphylococcus aureus"),
///     ]))
///     .unwrap();
///
/// let coli = TaxId::from(562_u64);
/// assert!(taxonomy.request_species(&coli));
/// assert!(taxonomy.complete_fetch(&coli, Ok(Default::default())).unwrap());
/// assert_eq!(taxonomy.tax_list(), vec![coli]);
/// assert_eq!(taxonomy.active_order(), &[0]);
/// ```
#[derive(Debug)]
pub struct Taxonomy {
    registry: Registry,
    options: TaxonomyOptions,
    epoch: u32,
    display: Option<DisplayTree>,
    orders: OrderManager,
    layout: Option<Layout>,
    pending: HashSet<TaxId>,
    events: EventBus,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new(TaxonomyOptions::default())
    }
}

impl Taxonomy {
    /// Create an empty engine.
    pub fn new(options: TaxonomyOptions) -> Self {
        Self {
            registry: Registry::new(),
            options,
            epoch: 0,
            display: None,
            orders: OrderManager::new(),
            layout: None,
            pending: HashSet::new(),
            events: EventBus::new(),
        }
    }

    /// Subscribe to an event. Shorthand for `events_mut().on(..)`.
    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&TaxonomyEvent<'_>) + 'static,
    ) -> ListenerId {
        self.events.on(kind, listener)
    }

    /// The event bus.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    // --- loading ---

    /// Ingest a hierarchy and rebuild.
    ///
    /// Emits [`TaxonomyEvent::TaxonomyLoaded`] when the load inserted anything; reloading a
    /// known hierarchy is silent.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::MalformedHierarchy`]; the engine is left unchanged.
    pub fn load_taxonomy(&mut self, raw: &RawTaxon) -> Result<LoadReport, TaxonomyError> {
        let first = self.registry.root().is_none();
        let report = self.registry.load(raw).inspect_err(|err| {
            tracing::warn!(%err, "hierarchy rejected");
        })?;
        if first {
            self.registry.set_expanded(report.root, true);
        }
        if report.inserted == 0 {
            return Ok(report);
        }
        self.rebuild();
        if let Some(root) = self.display.as_ref().map(DisplayTree::root) {
            self.events.emit(&TaxonomyEvent::TaxonomyLoaded { root });
        }
        Ok(report)
    }

    /// Ask the network collaborator for an organism.
    ///
    /// Emits [`TaxonomyEvent::SpeciesRequested`] and records the fetch as in flight. Returns
    /// `false`, emitting nothing, if the organism is already loaded or already requested.
    pub fn request_species(&mut self, taxid: &TaxId) -> bool {
        if self.is_loaded(taxid) || self.pending.contains(taxid) {
            return false;
        }
        self.pending.insert(taxid.clone());
        self.events.emit(&TaxonomyEvent::SpeciesRequested(taxid));
        true
    }

    /// Finish a fetch: merge the organism's lineage, mark it loaded and rebuild once.
    ///
    /// Returns `false` if the organism was already loaded.
    ///
    /// # Errors
    ///
    /// - [`TaxonomyError::Fetch`] carrying the collaborator's error unchanged.
    /// - [`TaxonomyError::MalformedHierarchy`] if the lineage does not end at `taxid` or cannot
    ///   be merged.
    /// - [`TaxonomyError::NoTaxonomy`] if no hierarchy has been loaded and the fetch carried no
    ///   lineage.
    ///
    /// The loaded set is unchanged in every error case.
    pub fn complete_fetch(
        &mut self,
        taxid: &TaxId,
        result: Result<FetchedOrganism, FetchError>,
    ) -> Result<bool, TaxonomyError> {
        self.pending.remove(taxid);
        let organism = result.map_err(|source| {
            tracing::warn!(%taxid, %source, "organism fetch failed");
            TaxonomyError::Fetch {
                taxid: taxid.clone(),
                source,
            }
        })?;
        if self.is_loaded(taxid) {
            return Ok(false);
        }
        if let Some(last) = organism.lineage.last()
            && last.key() != Some(taxid)
        {
            tracing::warn!(%taxid, "fetched lineage ends at another organism");
            return Err(MalformedHierarchy::MismatchedLineage {
                taxid: taxid.clone(),
            }
            .into());
        }
        let first = self.registry.root().is_none();
        self.registry.merge_lineage(&organism.lineage)?;
        if first && let Some(root) = self.registry.root() {
            self.registry.set_expanded(root, true);
        }
        self.registry.set_loaded(taxid, organism.from_file)?;
        self.rebuild();
        Ok(true)
    }

    /// Mark an organism loaded without a fetch round-trip, then rebuild.
    ///
    /// Returns `false` if it was already loaded.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::NoTaxonomy`] if no hierarchy has been loaded.
    pub fn load_organism(&mut self, taxid: &TaxId, from_file: bool) -> Result<bool, TaxonomyError> {
        let changed = self.registry.set_loaded(taxid, from_file)?;
        if changed {
            self.rebuild();
        }
        Ok(changed)
    }

    /// Mark several organisms loaded with a single rebuild. Returns how many were newly loaded.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::NoTaxonomy`] if no hierarchy has been loaded.
    pub fn load_organisms<'a>(
        &mut self,
        taxids: impl IntoIterator<Item = &'a TaxId>,
        from_file: bool,
    ) -> Result<usize, TaxonomyError> {
        let mut changed = 0;
        for taxid in taxids {
            changed += usize::from(self.registry.set_loaded(taxid, from_file)?);
        }
        if changed > 0 {
            self.rebuild();
        }
        Ok(changed)
    }

    /// Remove an organism from the comparison and rebuild.
    ///
    /// Returns `false` if it was not loaded.
    pub fn unload_organism(&mut self, taxid: &TaxId) -> bool {
        let changed = self.registry.unload(taxid);
        if changed {
            self.rebuild();
        }
        changed
    }

    /// Ask for the removal of a loaded organism by emitting [`TaxonomyEvent::RemoveSpecies`].
    ///
    /// The consumer answers with [`Taxonomy::unload_organism`].
    pub fn request_removal(&mut self, taxid: &TaxId) -> bool {
        if !self.is_loaded(taxid) {
            return false;
        }
        self.events.emit(&TaxonomyEvent::RemoveSpecies(taxid));
        true
    }

    /// Expand everything below `taxid` and request each of its leaves.
    ///
    /// Returns the number of [`TaxonomyEvent::SpeciesRequested`] events emitted.
    pub fn request_subtree(&mut self, taxid: &TaxId) -> usize {
        let Some(key) = self.registry.get(taxid) else {
            return 0;
        };
        let mut changed = false;
        for k in self.registry.subtree(key) {
            if !self.registry.children_of(k).is_empty() {
                changed |= self.registry.set_expanded(k, true);
            }
        }
        if changed {
            self.rebuild();
        }
        let leaves: Vec<TaxId> = self
            .registry
            .leaves_under(key)
            .into_iter()
            .filter_map(|k| self.registry.taxon(k).map(|t| t.taxid.clone()))
            .collect();
        leaves
            .iter()
            .filter(|leaf| self.request_species(leaf))
            .count()
    }

    /// Emit one [`TaxonomyEvent::MultipleSpeciesRequested`] carrying every leaf below
    /// `taxid`, and return those leaves.
    pub fn request_leaves(&mut self, taxid: &TaxId) -> Vec<TaxId> {
        let Some(key) = self.registry.get(taxid) else {
            return Vec::new();
        };
        let leaves: Vec<TaxId> = self
            .registry
            .leaves_under(key)
            .into_iter()
            .filter_map(|k| self.registry.taxon(k).map(|t| t.taxid.clone()))
            .collect();
        self.events
            .emit(&TaxonomyEvent::MultipleSpeciesRequested(&leaves));
        leaves
    }

    // --- view state ---

    /// Flip the shown expansion of a visible node and rebuild.
    ///
    /// An effectively expanded node collapses. Otherwise the node and every ancestor are
    /// expanded, so a node held shut by a collapsed ancestor opens in one click.
    /// The root is always expanded; toggling it, or a stale id, does nothing.
    pub fn toggle_expanded(&mut self, node: DisplayId) -> bool {
        let Some((source, expanded)) = self
            .display
            .as_ref()
            .and_then(|t| t.get(node))
            .filter(|n| n.parent.is_some())
            .and_then(|n| Some((n.source?, n.is_expanded())))
        else {
            return false;
        };
        if expanded {
            self.registry.set_expanded(source, false);
        } else {
            let mut next = Some(source);
            while let Some(key) = next {
                self.registry.set_expanded(key, true);
                next = self.registry.parent_of(key);
            }
        }
        tracing::debug!(expanded = !expanded, "node toggled");
        self.rebuild();
        true
    }

    /// Show or hide the taxonomy.
    pub fn set_show_tree(&mut self, show: bool) {
        if self.options.show_tree != show {
            self.options.show_tree = show;
            self.rebuild();
        }
    }

    /// Enable or disable single-child folding.
    pub fn set_collapse_tree(&mut self, collapse: bool) {
        if self.options.collapse_tree != collapse {
            self.options.collapse_tree = collapse;
            self.rebuild();
        }
    }

    /// Choose the label text.
    pub fn set_label_mode(&mut self, mode: LabelMode) {
        self.options.label_mode = mode;
    }

    /// Replace the panel geometry and re-resolve the layout.
    pub fn set_layout_config(&mut self, config: LayoutConfig) {
        self.options.layout = config;
        self.relayout();
    }

    /// Label of a visible node under the current [`LabelMode`].
    pub fn label(&self, node: DisplayId) -> Option<String> {
        let n = self.display.as_ref()?.get(node)?;
        Some(match self.options.label_mode {
            LabelMode::Name => n.label.clone(),
            LabelMode::Id => String::from(n.taxid.as_str()),
            LabelMode::Both => format!("{}: {}", n.taxid, n.label),
        })
    }

    // --- ordering ---

    /// Make a canonical ordering active, re-resolve the layout and emit
    /// [`TaxonomyEvent::ChangeOrder`].
    pub fn select_order(&mut self, key: OrderKey) -> &[u32] {
        self.orders.select(key);
        tracing::debug!(key = key.as_str(), "order selected");
        self.relayout();
        self.events
            .emit(&TaxonomyEvent::ChangeOrder(self.orders.active()));
        self.orders.active()
    }

    /// [`Taxonomy::select_order`] by name; accepts the legacy aliases.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::UnknownOrderKey`]; the active order is kept.
    pub fn select_order_named(&mut self, name: &str) -> Result<&[u32], TaxonomyError> {
        let key = name.parse()?;
        Ok(self.select_order(key))
    }

    /// Commit a drag of `node` by `displacement` slots.
    ///
    /// Emits [`TaxonomyEvent::ChangeOrder`] and returns `true` if the active order changed.
    /// Ids outside the current display tree are ignored.
    pub fn reorder(&mut self, node: DisplayId, displacement: i32) -> bool {
        let Some(tree) = self.display.as_ref() else {
            return false;
        };
        let Some(order) = reorder(
            tree,
            self.orders.leaves(),
            self.orders.active(),
            node,
            displacement,
        ) else {
            return false;
        };
        self.orders.replace_active(order);
        tracing::debug!(?node, displacement, "reorder committed");
        self.relayout();
        self.events
            .emit(&TaxonomyEvent::ChangeOrder(self.orders.active()));
        true
    }

    /// [`Taxonomy::reorder`] for the position showing `taxid`.
    pub fn reorder_taxon(&mut self, taxid: &TaxId, displacement: i32) -> bool {
        match self.display.as_ref().and_then(|t| t.find(taxid)) {
            Some(node) => self.reorder(node, displacement),
            None => false,
        }
    }

    /// Layout that a drag of `node` by `displacement` would produce, leaving the active order
    /// untouched.
    pub fn preview_layout(&self, node: DisplayId, displacement: i32) -> Option<Layout> {
        let tree = self.display.as_ref()?;
        let order = reorder(
            tree,
            self.orders.leaves(),
            self.orders.active(),
            node,
            displacement,
        );
        let active = order.as_deref().unwrap_or(self.orders.active());
        Some(Layout::compute(
            tree,
            self.orders.leaves(),
            active,
            &self.options.layout,
        ))
    }

    // --- accessors ---

    /// The node registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current options.
    pub fn options(&self) -> &TaxonomyOptions {
        &self.options
    }

    /// Current display tree, `None` before any hierarchy is loaded.
    pub fn display_tree(&self) -> Option<&DisplayTree> {
        self.display.as_ref()
    }

    /// Orderings and loaded leaves.
    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    /// The active order.
    pub fn active_order(&self) -> &[u32] {
        self.orders.active()
    }

    /// Current layout.
    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    /// Taxids of the loaded leaves, by leaf index.
    pub fn tax_list(&self) -> Vec<TaxId> {
        self.orders.leaves().iter().map(|l| l.taxid.clone()).collect()
    }

    /// Whether a fetch for `taxid` is in flight.
    pub fn is_pending(&self, taxid: &TaxId) -> bool {
        self.pending.contains(taxid)
    }

    /// Whether `taxid` is in the comparison set.
    pub fn is_loaded(&self, taxid: &TaxId) -> bool {
        self.registry
            .get(taxid)
            .and_then(|k| self.registry.flags(k))
            .is_some_and(|f| f.contains(NodeFlags::LOADED))
    }

    // --- internals ---

    fn rebuild(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        let options = DisplayOptions {
            show_tree: self.options.show_tree,
            collapse_tree: self.options.collapse_tree,
        };
        self.display = DisplayTree::build(&self.registry, options, self.epoch);
        let leaves = self
            .display
            .as_ref()
            .map(|t| collect_leaves(t, &self.registry))
            .unwrap_or_default();
        let reset = self.orders.recompute(leaves);
        self.relayout();
        tracing::debug!(
            epoch = self.epoch,
            nodes = self.display.as_ref().map_or(0, DisplayTree::len),
            leaves = self.orders.leaves().len(),
            order_reset = reset,
            "taxonomy rebuilt"
        );
    }

    fn relayout(&mut self) {
        self.layout = self.display.as_ref().map(|t| {
            Layout::compute(
                t,
                self.orders.leaves(),
                self.orders.active(),
                &self.options.layout,
            )
        });
    }
}
