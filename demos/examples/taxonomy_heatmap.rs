// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Taxonomy tree beside a heatmap: load, fetch, drag and sort.
//!
//! This example shows how to combine:
//! - `taxonomy_tree` for the hierarchy, display tree, orders and layout,
//! - `taxonomy_drag` for turning pointer travel into slot displacements,
//! - the event bus for answering fetch requests and following order changes.
//!
//! Run:
//! - `cargo run -p taxonomy_demos --example taxonomy_heatmap`
//! - `RUST_LOG=taxonomy_tree=debug cargo run -p taxonomy_demos --example taxonomy_heatmap`

use std::cell::RefCell;
use std::rc::Rc;

use kurbo::{Point, Vec2};
use taxonomy_drag::{DragAxis, DragResult, DragState};
use taxonomy_tree::{
    DisplayId, EventKind, FetchError, FetchedOrganism, LabelMode, OrderKey, RawTaxon,
    TaxId, Taxonomy, TaxonomyEvent,
};

const HIERARCHY: &str = r#"{
  "taxid": 1, "name": "root", "children": [
    {"taxid": 2, "name": "Bacteria", "rank": "superkingdom", "children": [
      {"taxid": 1224, "name": "Proteobacteria", "rank": "phylum", "children": [
        {"taxid": 562, "name": "Escherichia coli", "rank": "species",
         "lineage": "Bacteria; Proteobacteria; Gammaproteobacteria"},
        {"taxid": 287, "name": "Pseudomonas aeruginosa", "rank": "species",
         "lineage": "Bacteria; Proteobacteria; Gammaproteobacteria"}
      ]},
      {"taxid": 1239, "name": "Firmicutes", "rank": "phylum", "children": [
        {"taxid": 1280, "name": "Staphylococcus aureus", "rank": "species",
         "lineage": "Bacteria; Firmicutes; Bacilli"}
      ]}
    ]},
    {"taxid": 2157, "name": "Archaea", "rank": "superkingdom", "children": [
      {"taxid": 2190, "name": "Methanocaldococcus jannaschii", "rank": "species",
       "lineage": "Archaea; Euryarchaeota; Methanococci"}
    ]}
  ]
}"#;

/// Stand-in for the network: every organism resolves except taxid 2190.
fn fetch(taxid: &TaxId) -> Result<FetchedOrganism, FetchError> {
    if taxid.numeric() == Some(2190) {
        return Err(FetchError::new("service unavailable"));
    }
    Ok(FetchedOrganism::default())
}

fn print_tree(taxonomy: &Taxonomy) {
    let (Some(tree), Some(layout)) = (taxonomy.display_tree(), taxonomy.layout()) else {
        println!("  (empty)");
        return;
    };
    for (id, node) in tree.iter() {
        let at = layout.get(id).unwrap_or(Point::ZERO);
        let marker = if node.is_loaded() { "*" } else { " " };
        println!(
            "  {marker} {:indent$}{} @ ({:.1}, {:.1})",
            "",
            taxonomy.label(id).unwrap_or_default(),
            at.x,
            at.y,
            indent = node.depth as usize * 2,
        );
    }
    println!("  order: {:?}", taxonomy.active_order());
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut taxonomy = Taxonomy::default();

    // Fetch requests are queued and answered after the call that raised them returns.
    let requests: Rc<RefCell<Vec<TaxId>>> = Rc::default();
    let queue = requests.clone();
    taxonomy.on(EventKind::SpeciesRequested, move |event| {
        if let TaxonomyEvent::SpeciesRequested(taxid) = event {
            queue.borrow_mut().push((*taxid).clone());
        }
    });
    taxonomy.on(EventKind::ChangeOrder, |event| {
        if let TaxonomyEvent::ChangeOrder(order) = event {
            println!("-> heatmap rows now follow {order:?}");
        }
    });

    let raw: RawTaxon = serde_json::from_str(HIERARCHY).unwrap();
    let report = taxonomy.load_taxonomy(&raw).unwrap();
    println!("== loaded hierarchy: {report:?}");
    print_tree(&taxonomy);

    // Ask for everything below Bacteria and Archaea.
    let asked = taxonomy.request_subtree(&TaxId::from(1_u64));
    println!("== requested {asked} organisms");
    let pending: Vec<TaxId> = requests.borrow_mut().drain(..).collect();
    for taxid in &pending {
        match taxonomy.complete_fetch(taxid, fetch(taxid)) {
            Ok(_) => {}
            Err(err) => println!("  fetch of {taxid} failed: {err}"),
        }
    }
    print_tree(&taxonomy);

    // Drag Proteobacteria down by one slot, previewing on the way.
    let tree = taxonomy.display_tree().unwrap();
    let node: DisplayId = tree.find(&TaxId::from(1224_u64)).unwrap();
    let start = taxonomy.layout().unwrap().get(node).unwrap();
    let cell = taxonomy.options().layout.cell_side;

    let mut drag: DragState<DisplayId> = DragState::new(cell, DragAxis::Vertical);
    drag.on_start(None, node, start);
    if let Some((target, d)) = drag.on_move(None, start + Vec2::new(4.0, 0.6 * cell)) {
        let preview = taxonomy.preview_layout(target, d).unwrap();
        println!(
            "== preview of {d} slot(s): node at {:?}",
            preview.get(target)
        );
    }
    match drag.on_end(None, start + Vec2::new(0.0, 1.2 * cell)) {
        DragResult::Commit {
            target,
            displacement,
        } => {
            taxonomy.reorder(target, displacement);
        }
        DragResult::Cancelled(_) => println!("== drag cancelled"),
    }
    print_tree(&taxonomy);

    // Sort by name through the legacy alias, then show ids.
    taxonomy.select_order_named("org_name").unwrap();
    taxonomy.set_label_mode(LabelMode::Both);
    println!("== sorted by {}", OrderKey::Name.as_str());
    print_tree(&taxonomy);

    // Flat list of loaded organisms.
    taxonomy.set_show_tree(false);
    println!("== flat list");
    print_tree(&taxonomy);
}
