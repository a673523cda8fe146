//! Distance space (C1): maps two feature byte spans plus a dimension
//! parameter to a scalar distance, selecting a specialized kernel once at
//! construction from `(dim, metric)`.

pub mod scalar;
pub mod simd;

use crate::error::GraphError;

/// Supported distance metrics. The discriminant doubles as the on-disk
/// metric tag from the binary format (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Squared L2 (Euclidean) distance over `f32` features.
    L2F32 = 0x01,
    /// Inner product over `f32` features, returned as `1 - dot`.
    DotF32 = 0x02,
    /// Squared L2 distance over `u8` features.
    L2U8 = 0x11,
}

impl Metric {
    /// The on-disk metric tag (§6 offset 0).
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a metric tag read from a file header.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidConfig`] if `tag` is not one of the
    /// three metric tags in §6.
    pub fn from_tag(tag: u8) -> Result<Self, GraphError> {
        match tag {
            0x01 => Ok(Metric::L2F32),
            0x02 => Ok(Metric::DotF32),
            0x11 => Ok(Metric::L2U8),
            other => Err(GraphError::InvalidConfig(format!(
                "unknown metric tag: {other:#04x}"
            ))),
        }
    }

    /// Size in bytes of one feature element under this metric.
    #[must_use]
    pub fn elem_size(self) -> usize {
        match self {
            Metric::L2F32 | Metric::DotF32 => 4,
            Metric::L2U8 => 1,
        }
    }
}

type F32Kernel = fn(&[f32], &[f32]) -> f32;
type U8Kernel = fn(&[u8], &[u8]) -> u32;

#[derive(Clone, Copy)]
enum Kernel {
    F32(F32Kernel),
    U8(U8Kernel),
}

/// A distance space over fixed-dimension feature vectors: the metric, the
/// dimension, the derived per-vector byte size, and the kernel selected for
/// this `(dim, metric)` pair.
#[derive(Clone, Copy)]
pub struct DistanceSpace {
    metric: Metric,
    dim: usize,
    kernel: Kernel,
}

impl DistanceSpace {
    /// Construct a distance space for `metric` over `dim`-element feature
    /// vectors, selecting the fastest available kernel once.
    ///
    /// # Panics
    ///
    /// Panics if `dim == 0`.
    #[must_use]
    pub fn new(metric: Metric, dim: usize) -> Self {
        assert!(dim > 0, "dim must be positive");
        let kernel = match metric {
            Metric::L2F32 => Kernel::F32(select_f32_kernel(dim, KernelKind::L2)),
            Metric::DotF32 => Kernel::F32(select_f32_kernel(dim, KernelKind::Dot)),
            Metric::L2U8 => Kernel::U8(scalar::l2_squared_u8),
        };
        Self { metric, dim, kernel }
    }

    /// The configured metric.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The configured dimension (element count, not bytes).
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Byte size of one feature vector: `dim * elem_size`.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.dim * self.metric.elem_size()
    }

    /// Compute the distance between two feature vectors given as raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if either slice's length does not equal [`Self::data_size`].
    #[must_use]
    pub fn distance(&self, a: &[u8], b: &[u8]) -> f32 {
        assert_eq!(a.len(), self.data_size());
        assert_eq!(b.len(), self.data_size());
        match self.kernel {
            Kernel::F32(f) => {
                let a: &[f32] = bytemuck::cast_slice(a);
                let b: &[f32] = bytemuck::cast_slice(b);
                f(a, b)
            }
            #[allow(clippy::cast_precision_loss)]
            Kernel::U8(f) => f(a, b) as f32,
        }
    }
}

enum KernelKind {
    L2,
    Dot,
}

fn select_f32_kernel(dim: usize, kind: KernelKind) -> F32Kernel {
    cfg_if::cfg_if! {
        if #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))] {
            if dim >= simd::AVX2_THRESHOLD {
                return match kind {
                    KernelKind::L2 => simd::x86::l2_squared,
                    KernelKind::Dot => simd::x86::dot_product,
                };
            }
        }
    }
    match kind {
        KernelKind::L2 => scalar::l2_squared_f32,
        KernelKind::Dot => scalar::dot_product_f32,
    }
}
