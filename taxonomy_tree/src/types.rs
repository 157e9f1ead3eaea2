// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types: taxon identifiers, registry handles, node flags, and the raw hierarchy payload.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

/// Taxonomic identifier as delivered by the data source.
///
/// Sources deliver either numeric NCBI-style ids or free-form strings (organisms loaded from a
/// user file). Both are kept as text; [`TaxId::cmp_numeric`] gives the ordering used by the
/// `id` sort.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxId(String);

impl TaxId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as an unsigned number, if it is one.
    pub fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Numeric-ascending comparison.
    ///
    /// Two numeric ids compare by value. Numeric ids sort before non-numeric ones, and
    /// non-numeric ids compare lexically.
    pub fn cmp_numeric(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for TaxId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for TaxId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for TaxId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TaxId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TaxIdVisitor;

        impl serde::de::Visitor<'_> for TaxIdVisitor {
            type Value = TaxId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a taxonomic id as a number or a string")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<TaxId, E> {
                Ok(TaxId::from(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<TaxId, E> {
                Ok(TaxId(v.to_string()))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<TaxId, E> {
                Ok(TaxId::from(v))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<TaxId, E> {
                Ok(TaxId(v))
            }
        }

        deserializer.deserialize_any(TaxIdVisitor)
    }
}

/// Handle of a node in the [`Registry`](crate::Registry) (generational).
///
/// Synthetic organisms are deleted from the registry when unloaded; a handle to a deleted node
/// stays stale even if its slot is reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeKey(pub(crate) u32, pub(crate) u32);

impl NodeKey {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// Per-node state kept in the registry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// The organism's genome-properties data is part of the comparison set.
        const LOADED    = 0b0000_0001;
        /// User-controlled expansion. Irrelevant for leaves.
        const EXPANDED  = 0b0000_0010;
        /// Leaf synthesized for an organism outside the known taxonomy.
        const SYNTHETIC = 0b0000_0100;
        /// The organism was loaded from a user-supplied file.
        const FROM_FILE = 0b0000_1000;
        /// Added by a fetched lineage rather than a hierarchy payload.
        const MERGED    = 0b0001_0000;
    }
}

/// Descriptive attributes of a taxon. Informational only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Taxon {
    /// Display identifier; falls back to [`Taxon::taxid`].
    pub id: TaxId,
    /// Taxonomic identifier; the registry key.
    pub taxid: TaxId,
    /// Scientific name.
    pub name: Option<String>,
    /// Taxonomic rank.
    pub rank: Option<String>,
    /// Lineage string, used by the lineage orders.
    pub lineage: Option<String>,
}

impl Taxon {
    /// Name if present, taxid otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.taxid.as_str())
    }
}

/// Raw nested hierarchy as delivered by the data source.
///
/// `children` may be absent, `null`, or empty for leaves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RawTaxon {
    /// Optional display identifier.
    pub id: Option<TaxId>,
    /// Taxonomic identifier.
    pub taxid: Option<TaxId>,
    /// Scientific name.
    pub name: Option<String>,
    /// Taxonomic rank.
    pub rank: Option<String>,
    /// Lineage string.
    pub lineage: Option<String>,
    /// Ordered children.
    pub children: Option<Vec<RawTaxon>>,
}

impl RawTaxon {
    /// A leaf with a taxid and a name.
    pub fn leaf(taxid: impl Into<TaxId>, name: impl Into<String>) -> Self {
        Self {
            taxid: Some(taxid.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// An internal node with a taxid, a name and ordered children.
    pub fn clade(taxid: impl Into<TaxId>, name: impl Into<String>, children: Vec<Self>) -> Self {
        Self {
            taxid: Some(taxid.into()),
            name: Some(name.into()),
            children: Some(children),
            ..Self::default()
        }
    }

    /// Set the lineage string.
    #[must_use]
    pub fn with_lineage(mut self, lineage: impl Into<String>) -> Self {
        self.lineage = Some(lineage.into());
        self
    }

    /// Set the rank.
    #[must_use]
    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = Some(rank.into());
        self
    }

    /// Children as a slice; empty for leaves.
    pub fn children(&self) -> &[Self] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// The registry key: `taxid`, or `id` when the taxid is absent.
    pub fn key(&self) -> Option<&TaxId> {
        self.taxid.as_ref().or(self.id.as_ref())
    }

    pub(crate) fn to_taxon(&self, key: &TaxId) -> Taxon {
        Taxon {
            id: self.id.clone().unwrap_or_else(|| key.clone()),
            taxid: key.clone(),
            name: self.name.clone(),
            rank: self.rank.clone(),
            lineage: self.lineage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_sort_by_value_then_text() {
        let a = TaxId::from(9_u64);
        let b = TaxId::from(10_u64);
        let c = TaxId::from("upload.tsv");
        assert_eq!(a.cmp_numeric(&b), Ordering::Less);
        assert_eq!(b.cmp_numeric(&c), Ordering::Less);
        assert_eq!(c.cmp_numeric(&a), Ordering::Greater);
        // Lexical order would put "10" first.
        assert_eq!(a.cmp(&b), Ordering::Greater);
    }

    #[test]
    fn key_falls_back_to_id() {
        let raw = RawTaxon {
            id: Some(TaxId::from("x")),
            ..RawTaxon::default()
        };
        assert_eq!(raw.key(), Some(&TaxId::from("x")));
        assert_eq!(RawTaxon::default().key(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_numeric_and_string_ids() {
        let raw: RawTaxon = serde_json::from_str(
            r#"{"taxid": 1, "name": "root", "children": [
                {"taxid": "562", "name": "E. coli", "lineage": "Bacteria; Proteobacteria", "children": null},
                {"id": "upload", "children": []}
            ]}"#,
        )
        .unwrap();
        assert_eq!(raw.taxid, Some(TaxId::from(1_u64)));
        assert_eq!(raw.children().len(), 2);
        assert_eq!(raw.children()[0].taxid, Some(TaxId::from("562")));
        assert!(raw.children()[0].children().is_empty());
        assert_eq!(raw.children()[1].key(), Some(&TaxId::from("upload")));
    }
}
