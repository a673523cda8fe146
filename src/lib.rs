//! # degraph
//!
//! An in-memory approximate nearest-neighbor index built on a Dynamic
//! Exploration Graph (DEG): an undirected, vertex-regular, weighted
//! proximity graph maintained incrementally as vectors are added and
//! removed.
//!
//! ## Layout
//!
//! - [`metric`] — distance kernels and the feature-space descriptor (C1).
//! - [`storage`] — the flat feature-vector repository (C2).
//! - [`visited`] — the pooled visited-list used during graph traversal (C3).
//! - [`filter`] — a label bitset consulted when admitting search results (C4).
//! - [`graph`] — the graph store itself, mutable and read-only variants (C5, C6).
//! - [`search`] — best-first k-NN search, connectivity probing, exploration (C7).
//! - [`builder`] — incremental extension, removal, and edge improvement (C8).
//! - [`analysis`] — invariant checks and descriptive statistics (C9).
//! - [`persistence`] — the on-disk graph format.
//! - [`error`] — the crate's error types.
//!
//! ## Example
//!
//! ```rust
//! use degraph::graph::Graph;
//! use degraph::builder::{Builder, BuilderConfig};
//! use degraph::metric::Metric;
//!
//! let graph = Graph::new(1000, 16, Metric::L2F32, 4).expect("valid graph params");
//! let config = BuilderConfig {
//!     k_ext: 32,
//!     eps_ext: 0.1,
//!     k_opt: 32,
//!     eps_opt: 0.1,
//!     i_opt: 5,
//!     swap_tries: 3,
//!     additional_swap_tries: 3,
//!     use_rng: true,
//! };
//! let mut builder = Builder::new(graph, 42, config);
//! builder.add_entry(1, vec![0u8; 16]);
//! builder.build(|_status, _token| {}, false).expect("build step");
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::pub_underscore_fields)]
#![allow(clippy::too_many_lines)]

/// Unified error handling.
pub mod error;

/// Distance kernels and the feature-space descriptor (C1).
pub mod metric;

/// Flat feature-vector repository (C2).
pub mod storage;

/// Pooled visited-list for graph traversal (C3).
pub mod visited;

/// Label bitset consulted when admitting search results (C4).
pub mod filter;

/// The graph store: mutable (C5) and read-only (C6) variants.
pub mod graph;

/// Best-first k-NN search, connectivity probing, and exploration (C7).
pub mod search;

/// Incremental extension, removal, and edge improvement (C8).
pub mod builder;

/// Graph invariant checks and descriptive statistics (C9).
pub mod analysis;

/// Graph file format: headers, reading, and writing.
pub mod persistence;

pub use builder::{BuildStatus, Builder, BuilderConfig, StopToken};
pub use error::{BuilderError, DegraphError, GraphError};
pub use filter::Filter;
pub use graph::{Graph, GraphLike, ReadonlyGraph};
pub use metric::Metric;
pub use persistence::PersistenceError;
pub use search::{SearchContext, SearchResult};

/// The crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_not_empty() {
        assert!(!version().is_empty());
    }
}
