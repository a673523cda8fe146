//! Unified error hierarchy.
//!
//! - [`DegraphError`] — top-level error type wrapping all component errors.
//! - [`GraphError`] — graph store (C5/C6) errors.
//! - [`BuilderError`] — incremental builder (C8) errors.
//! - [`PersistenceError`] — binary format I/O errors (re-exported from
//!   [`crate::persistence`]).

use thiserror::Error;

use crate::persistence::PersistenceError;

/// Top-level error type for all fallible crate operations.
#[derive(Debug, Error)]
pub enum DegraphError {
    /// I/O error during save/load.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary format errors.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Graph store errors.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Builder errors.
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// Errors raised by the graph store (C5/C6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// `add_vertex` called with a label already present.
    #[error("duplicate label: {0}")]
    DuplicateLabel(u32),

    /// `remove_vertex`, `search`, or an edge primitive referenced an absent label.
    #[error("unknown label: {0}")]
    UnknownLabel(u32),

    /// Graph is already at `capacity()`.
    #[error("capacity exceeded: {capacity}")]
    CapacityExceeded {
        /// Fixed capacity of the graph.
        capacity: usize,
    },

    /// `change_edge` could not find `from` among `neighbors(v)`.
    #[error("vertex {vertex} has no edge to {neighbor}")]
    NeighborNotFound {
        /// Vertex whose neighbor list was searched.
        vertex: u32,
        /// Neighbor index that was not found.
        neighbor: u32,
    },

    /// Feature byte length did not match `dim * sizeof(elem)`.
    #[error("dimension mismatch: expected {expected} bytes, got {actual}")]
    DimensionMismatch {
        /// Expected feature byte length.
        expected: usize,
        /// Actual feature byte length supplied.
        actual: usize,
    },

    /// Construction parameters were invalid (`d == 0`, `d > 255`, `capacity == 0`, ...).
    #[error("invalid graph configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the incremental builder (C8).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// Underlying graph operation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A k-NN search performed during extension returned fewer than `d`
    /// candidates. Per the error-handling design this signals a corrupted
    /// graph and is not locally recoverable.
    #[error("extension search returned {found} candidates, need at least {needed}")]
    InsufficientCandidates {
        /// Candidates actually returned.
        found: usize,
        /// Candidates required (`d`).
        needed: usize,
    },
}
