//! Exact binary layout of the graph file header (§6).
//!
//! The header is deliberately unaligned (`dim: u16` sits at byte offset 1),
//! so it is hand-packed with explicit little-endian reads/writes rather
//! than a `#[repr(C)]` `Pod` struct, which would insert padding and change
//! the layout.

use crate::error::GraphError;
use crate::metric::Metric;

/// Size in bytes of the fixed header.
pub const HEADER_LEN: usize = 8;

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Metric tag (offset 0).
    pub metric: Metric,
    /// Feature dimension (offset 1, u16).
    pub dim: u16,
    /// Vertex count `N` (offset 3, u32).
    pub vertex_count: u32,
    /// Edges per vertex `d` (offset 7, u8).
    pub degree: u8,
}

impl FileHeader {
    /// Encode into the fixed 8-byte layout.
    #[must_use]
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.metric.tag();
        buf[1..3].copy_from_slice(&self.dim.to_le_bytes());
        buf[3..7].copy_from_slice(&self.vertex_count.to_le_bytes());
        buf[7] = self.degree;
        buf
    }

    /// Decode from the fixed 8-byte layout.
    ///
    /// # Errors
    ///
    /// Returns [`super::PersistenceError::BufferTooSmall`] if `bytes` is
    /// shorter than [`HEADER_LEN`], or propagates an unknown metric tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, super::PersistenceError> {
        if bytes.len() < HEADER_LEN {
            return Err(super::PersistenceError::BufferTooSmall {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let metric = Metric::from_tag(bytes[0])?;
        let dim = u16::from_le_bytes([bytes[1], bytes[2]]);
        let vertex_count = u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);
        let degree = bytes[7];
        Ok(Self {
            metric,
            dim,
            vertex_count,
            degree,
        })
    }
}

impl From<GraphError> for super::PersistenceError {
    fn from(err: GraphError) -> Self {
        super::PersistenceError::Corrupted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let header = FileHeader {
            metric: Metric::L2F32,
            dim: 128,
            vertex_count: 1000,
            degree: 20,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(FileHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn field_offsets_match_the_wire_format() {
        let header = FileHeader {
            metric: Metric::DotF32,
            dim: 3,
            vertex_count: 1,
            degree: 2,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 0x02);
        assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), 3);
        assert_eq!(
            u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
            1
        );
        assert_eq!(bytes[7], 2);
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(FileHeader::from_bytes(&[0x01, 0, 0]).is_err());
    }

    #[test]
    fn rejects_unknown_metric_tag() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = 0xFE;
        assert!(FileHeader::from_bytes(&bytes).is_err());
    }
}
