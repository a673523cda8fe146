//! Binary persistence (§6): exact little-endian file format plus atomic
//! save/load.

/// Fixed 8-byte header layout.
pub mod header;
/// Save/load of [`crate::graph::Graph`] and [`crate::graph::ReadonlyGraph`].
pub mod io;

pub use header::{FileHeader, HEADER_LEN};
pub use io::{load_graph, load_readonly, save_graph, save_readonly};

use thiserror::Error;

/// Errors raised while reading or writing the binary graph format.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (filesystem or in-memory writer/reader).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer shorter than a fixed-size field required to decode.
    #[error("buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Trailing CRC32 did not match the recomputed checksum of the record
    /// region.
    #[error("checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the file.
        expected: u32,
        /// Checksum recomputed from the bytes read.
        actual: u32,
    },

    /// A structural load-validation rule from §6 was violated (non-ascending
    /// neighbor list, duplicate, self-reference, out-of-range index, vertex
    /// count exceeding capacity, or an unreadable header/tag).
    #[error("corrupted graph file: {0}")]
    Corrupted(String),
}
