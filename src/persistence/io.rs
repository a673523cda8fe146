//! Save/load of [`Graph`] and [`ReadonlyGraph`] to and from the binary
//! format (§6), plus atomic file writes (write to a temp file, then
//! rename) per the error-handling design's requirement that partial writes
//! never corrupt an existing file.

use std::io::{Read, Write};
use std::path::Path;

use super::header::{FileHeader, HEADER_LEN};
use super::PersistenceError;
use crate::graph::{Graph, ReadonlyGraph};
use crate::storage::FeatureStore;

/// Serialize `graph` into the full (weight-carrying) format.
///
/// # Panics
///
/// Panics if `graph.degree() > 255` (violates the one-byte `d` field).
pub fn write_graph<W: Write>(graph: &Graph, writer: &mut W) -> Result<(), PersistenceError> {
    assert!(graph.degree() <= 255);
    let mut body = Vec::new();
    for idx in 0..graph.size() {
        body.extend_from_slice(graph.feature(idx));
        for &n in graph.neighbors(idx) {
            body.extend_from_slice(&n.to_le_bytes());
        }
        for &w in graph.weights_of(idx) {
            body.extend_from_slice(&w.to_le_bytes());
        }
        body.extend_from_slice(&graph.label_of(idx).to_le_bytes());
    }
    write_framed(graph_header(graph), &body, writer)
}

/// Serialize `graph` into the read-only (weight-free) format.
///
/// # Panics
///
/// Panics if `graph.degree() > 255`.
pub fn write_readonly<W: Write>(graph: &Graph, writer: &mut W) -> Result<(), PersistenceError> {
    assert!(graph.degree() <= 255);
    let mut body = Vec::new();
    for idx in 0..graph.size() {
        body.extend_from_slice(graph.feature(idx));
        for &n in graph.neighbors(idx) {
            body.extend_from_slice(&n.to_le_bytes());
        }
        body.extend_from_slice(&graph.label_of(idx).to_le_bytes());
    }
    write_framed(graph_header(graph), &body, writer)
}

fn graph_header(graph: &Graph) -> FileHeader {
    FileHeader {
        metric: graph.distance_space().metric(),
        #[allow(clippy::cast_possible_truncation)]
        dim: graph.distance_space().dim() as u16,
        #[allow(clippy::cast_possible_truncation)]
        vertex_count: graph.size() as u32,
        #[allow(clippy::cast_possible_truncation)]
        degree: graph.degree() as u8,
    }
}

fn write_framed<W: Write>(
    header: FileHeader,
    body: &[u8],
    writer: &mut W,
) -> Result<(), PersistenceError> {
    writer.write_all(&header.to_bytes())?;
    writer.write_all(body)?;
    let mut crc = crc32fast::Hasher::new();
    crc.update(body);
    writer.write_all(&crc.finalize().to_le_bytes())?;
    Ok(())
}

/// Parse `bytes` as the full format and rebuild a [`Graph`].
///
/// # Errors
///
/// Returns [`PersistenceError::Corrupted`] if any §6 load-validation rule is
/// violated (vertex count exceeding `capacity`, degree over 255,
/// non-ascending neighbor list, duplicate or self-referencing neighbor, or
/// an out-of-range index), or [`PersistenceError::ChecksumMismatch`] if the
/// trailing CRC32 does not match.
pub fn read_graph(bytes: &[u8], capacity: usize) -> Result<Graph, PersistenceError> {
    let (header, body) = read_framed(bytes)?;
    if header.vertex_count as usize > capacity {
        return Err(PersistenceError::Corrupted(format!(
            "vertex count {} exceeds capacity {}",
            header.vertex_count, capacity
        )));
    }
    let d = header.degree as usize;
    let dim = header.dim as usize;
    let data_size = dim * header.metric.elem_size();
    let stride = data_size + d * 4 + d * 4 + 4;
    let n = header.vertex_count as usize;
    if body.len() != stride * n {
        return Err(PersistenceError::Corrupted(format!(
            "record region length {} does not match {} records of stride {}",
            body.len(),
            n,
            stride
        )));
    }

    let mut graph = Graph::new(capacity, header.degree, header.metric, dim)
        .map_err(|e| PersistenceError::Corrupted(e.to_string()))?;

    let mut rows: Vec<(Vec<u32>, Vec<f32>)> = Vec::with_capacity(n);
    for rec in 0..n {
        let rec_start = rec * stride;
        let feature = &body[rec_start..rec_start + data_size];
        let mut off = rec_start + data_size;
        let mut nbrs = Vec::with_capacity(d);
        for _ in 0..d {
            nbrs.push(u32::from_le_bytes(body[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        let mut weights = Vec::with_capacity(d);
        for _ in 0..d {
            weights.push(f32::from_le_bytes(body[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        let label = u32::from_le_bytes(body[off..off + 4].try_into().unwrap());

        validate_row(&nbrs, n, rec)?;
        graph
            .add_vertex(label, feature)
            .map_err(|e| PersistenceError::Corrupted(e.to_string()))?;
        rows.push((nbrs, weights));
    }
    for (idx, (nbrs, weights)) in rows.into_iter().enumerate() {
        graph.change_edges(idx, &nbrs, &weights);
    }
    Ok(graph)
}

/// Parse `bytes` as the read-only format and rebuild a [`ReadonlyGraph`].
///
/// # Errors
///
/// Same validation rules as [`read_graph`], minus weight handling.
pub fn read_readonly(bytes: &[u8], capacity: usize) -> Result<ReadonlyGraph, PersistenceError> {
    let (header, body) = read_framed(bytes)?;
    if header.vertex_count as usize > capacity {
        return Err(PersistenceError::Corrupted(format!(
            "vertex count {} exceeds capacity {}",
            header.vertex_count, capacity
        )));
    }
    let d = header.degree as usize;
    let dim = header.dim as usize;
    let data_size = dim * header.metric.elem_size();
    let stride = data_size + d * 4 + 4;
    let n = header.vertex_count as usize;
    if body.len() != stride * n {
        return Err(PersistenceError::Corrupted(format!(
            "record region length {} does not match {} records of stride {}",
            body.len(),
            n,
            stride
        )));
    }

    let space = crate::metric::DistanceSpace::new(header.metric, dim);
    let mut features = FeatureStore::new(capacity, data_size);
    let mut neighbors = Vec::with_capacity(n * d);
    let mut labels = Vec::with_capacity(n);
    for rec in 0..n {
        let rec_start = rec * stride;
        let feature = &body[rec_start..rec_start + data_size];
        let mut off = rec_start + data_size;
        let mut nbrs = Vec::with_capacity(d);
        for _ in 0..d {
            nbrs.push(u32::from_le_bytes(body[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        let label = u32::from_le_bytes(body[off..off + 4].try_into().unwrap());
        validate_row(&nbrs, n, rec)?;
        features.push(feature);
        neighbors.extend_from_slice(&nbrs);
        labels.push(label);
    }
    Ok(ReadonlyGraph::from_parts(
        space, d, features, neighbors, labels,
    ))
}

fn validate_row(nbrs: &[u32], n: usize, vertex_idx: usize) -> Result<(), PersistenceError> {
    for w in nbrs.windows(2) {
        if w[0] >= w[1] {
            log::warn!("persistence: vertex {vertex_idx} neighbor list is not strictly ascending");
            return Err(PersistenceError::Corrupted(
                "neighbor list is not strictly ascending".into(),
            ));
        }
    }
    for &idx in nbrs {
        if idx as usize >= n {
            log::warn!("persistence: vertex {vertex_idx} neighbor index {idx} out of range for {n} vertices");
            return Err(PersistenceError::Corrupted(format!(
                "neighbor index {idx} out of range for {n} vertices"
            )));
        }
        if idx as usize == vertex_idx {
            log::warn!("persistence: vertex {vertex_idx} has a self-referencing neighbor slot");
            return Err(PersistenceError::Corrupted(format!(
                "vertex {vertex_idx} has a self-referencing neighbor slot"
            )));
        }
    }
    Ok(())
}

fn read_framed(bytes: &[u8]) -> Result<(FileHeader, &[u8]), PersistenceError> {
    let header = FileHeader::from_bytes(bytes)?;
    if bytes.len() < HEADER_LEN + 4 {
        log::warn!(
            "persistence: buffer too small (expected at least {}, got {})",
            HEADER_LEN + 4,
            bytes.len()
        );
        return Err(PersistenceError::BufferTooSmall {
            expected: HEADER_LEN + 4,
            actual: bytes.len(),
        });
    }
    let body_end = bytes.len() - 4;
    let body = &bytes[HEADER_LEN..body_end];
    let stored_crc = u32::from_le_bytes(bytes[body_end..].try_into().unwrap());
    let mut crc = crc32fast::Hasher::new();
    crc.update(body);
    let actual = crc.finalize();
    if actual != stored_crc {
        log::warn!("persistence: checksum mismatch (expected {stored_crc:#010x}, got {actual:#010x})");
        return Err(PersistenceError::ChecksumMismatch {
            expected: stored_crc,
            actual,
        });
    }
    Ok((header, body))
}

/// Save `graph` to `path` atomically: write to a sibling temp file, then
/// rename over the destination.
///
/// # Errors
///
/// Propagates any filesystem error encountered while creating the temp
/// file, writing, or renaming.
pub fn save_graph(graph: &Graph, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    atomic_write(path, |f| write_graph(graph, f))
}

/// Save `graph` to `path` in the read-only format, atomically.
///
/// # Errors
///
/// Same as [`save_graph`].
pub fn save_readonly(graph: &Graph, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    atomic_write(path, |f| write_readonly(graph, f))
}

fn atomic_write(
    path: impl AsRef<Path>,
    write: impl FnOnce(&mut std::fs::File) -> Result<(), PersistenceError>,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.persist(path)
        .map_err(|e| PersistenceError::Io(e.error))?;
    Ok(())
}

/// Load a [`Graph`] saved with [`save_graph`].
///
/// # Errors
///
/// Propagates filesystem errors and the validation errors documented on
/// [`read_graph`].
pub fn load_graph(path: impl AsRef<Path>, capacity: usize) -> Result<Graph, PersistenceError> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    read_graph(&bytes, capacity)
}

/// Load a [`ReadonlyGraph`] saved with [`save_readonly`].
///
/// # Errors
///
/// Propagates filesystem errors and the validation errors documented on
/// [`read_readonly`].
pub fn load_readonly(
    path: impl AsRef<Path>,
    capacity: usize,
) -> Result<ReadonlyGraph, PersistenceError> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    read_readonly(&bytes, capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;

    fn f32_feature(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn toy_graph() -> Graph {
        let mut g = Graph::new(8, 2, Metric::L2F32, 2).unwrap();
        for (label, x) in [(10, 0.0), (20, 1.0), (30, 2.0), (40, 3.0), (50, 4.0)] {
            g.add_vertex(label, &f32_feature(&[x, 0.0])).unwrap();
        }
        let edges = [
            (0u32, 1u32, 1.0f32),
            (1, 2, 1.0),
            (2, 3, 1.0),
            (3, 4, 1.0),
            (4, 0, 16.0),
        ];
        for &(u, v, w) in &edges {
            g.change_edge(u as usize, u, v, w).unwrap();
            g.change_edge(v as usize, v, u, w).unwrap();
        }
        g
    }

    #[test]
    fn save_then_load_round_trips_every_field() {
        let graph = toy_graph();
        let mut bytes = Vec::new();
        write_graph(&graph, &mut bytes).unwrap();
        let loaded = read_graph(&bytes, graph.capacity()).unwrap();
        assert_eq!(loaded.size(), graph.size());
        for idx in 0..graph.size() {
            assert_eq!(loaded.label_of(idx), graph.label_of(idx));
            assert_eq!(loaded.feature(idx), graph.feature(idx));
            assert_eq!(loaded.neighbors(idx), graph.neighbors(idx));
            assert_eq!(loaded.weights_of(idx), graph.weights_of(idx));
        }
    }

    #[test]
    fn save_is_idempotent_byte_for_byte() {
        let graph = toy_graph();
        let mut first = Vec::new();
        write_graph(&graph, &mut first).unwrap();
        let loaded = read_graph(&first, graph.capacity()).unwrap();
        let mut second = Vec::new();
        write_graph(&loaded, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn readonly_format_omits_weights_but_keeps_structure() {
        let graph = toy_graph();
        let mut bytes = Vec::new();
        write_readonly(&graph, &mut bytes).unwrap();
        let loaded = read_readonly(&bytes, graph.capacity()).unwrap();
        assert_eq!(loaded.size(), graph.size());
        assert_eq!(loaded.neighbors(0), graph.neighbors(0));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let graph = toy_graph();
        let mut bytes = Vec::new();
        write_graph(&graph, &mut bytes).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            read_graph(&bytes, graph.capacity()),
            Err(PersistenceError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn vertex_count_over_capacity_is_rejected() {
        let graph = toy_graph();
        let mut bytes = Vec::new();
        write_graph(&graph, &mut bytes).unwrap();
        assert!(matches!(
            read_graph(&bytes, 2),
            Err(PersistenceError::Corrupted(_))
        ));
    }

    #[test]
    fn save_and_load_round_trip_through_a_temp_file() {
        let graph = toy_graph();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.deg");
        save_graph(&graph, &path).unwrap();
        let loaded = load_graph(&path, graph.capacity()).unwrap();
        assert_eq!(loaded.size(), graph.size());
    }
}
