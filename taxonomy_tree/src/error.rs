// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types returned by the taxonomy engine.

use alloc::string::String;
use thiserror::Error;

use crate::types::TaxId;

/// Errors surfaced by fallible taxonomy operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    /// The hierarchy payload could not be ingested. Nothing was inserted.
    #[error("malformed hierarchy: {0}")]
    MalformedHierarchy(#[from] MalformedHierarchy),
    /// A sort criterion name was not recognized. The active order is unchanged.
    #[error("unknown order key `{0}`")]
    UnknownOrderKey(String),
    /// An organism was loaded before any taxonomy was ingested.
    #[error("no taxonomy has been loaded")]
    NoTaxonomy,
    /// Fetching an organism failed upstream. The loaded set is unchanged.
    #[error("fetching organism `{taxid}` failed")]
    Fetch {
        /// Organism whose fetch failed.
        taxid: TaxId,
        /// Failure reported by the network collaborator.
        #[source]
        source: FetchError,
    },
}

/// Reasons a hierarchy payload is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedHierarchy {
    /// A node carries neither `id` nor `taxid`.
    #[error("node at depth {depth} has neither `id` nor `taxid`")]
    MissingIdentifier {
        /// Distance from the payload root.
        depth: usize,
    },
    /// The same identifier appears with structurally different children.
    #[error("`{taxid}` appears with conflicting children")]
    ConflictingChildren {
        /// Identifier of the ambiguous node.
        taxid: TaxId,
    },
    /// A payload root is unknown to a registry that already holds a taxonomy.
    #[error("`{taxid}` does not attach to the loaded taxonomy")]
    DetachedLineage {
        /// Root of the payload or lineage that could not be placed.
        taxid: TaxId,
    },
    /// A fetched lineage ends at an organism other than the one fetched.
    #[error("lineage fetched for `{taxid}` ends at another organism")]
    MismatchedLineage {
        /// Organism that was fetched.
        taxid: TaxId,
    },
}

/// Failure reported by the organism fetch collaborator, passed through as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    /// Human-readable description from the transport layer.
    pub message: String,
}

impl FetchError {
    /// Create a fetch error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
