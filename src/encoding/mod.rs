//! Per-strategy encoders that turn a slice of instance matrices into a batch.

pub mod software;
pub mod texture;
pub mod uniform_array;
pub mod uniform_buffer;
pub mod vertex_attribute;

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::str::FromStr;

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::error::CapacityError;
use crate::mesh::{BaseMesh, MeshAttributes};
use crate::settings::InstancingLimits;

pub use texture::TexturePayload;
pub use uniform_array::UniformArrayPayload;
pub use uniform_buffer::UniformBufferPayload;
pub use vertex_attribute::{InstanceAttributeStream, InstancedDrawable};

/// Bytes taken by one column-major `mat4x4<f32>`.
pub const BYTES_PER_MATRIX: u32 = 64;
pub const FLOATS_PER_MATRIX: usize = 16;

/// How per-instance transforms reach the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One transform node per instance, no hardware instancing.
    Software,
    #[default]
    UniformArray,
    Texture,
    UniformBufferObject,
    VertexAttribute,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Software,
        Strategy::UniformArray,
        Strategy::Texture,
        Strategy::UniformBufferObject,
        Strategy::VertexAttribute,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Software => "software",
            Strategy::UniformArray => "uniform_array",
            Strategy::Texture => "texture",
            Strategy::UniformBufferObject => "uniform_buffer_object",
            Strategy::VertexAttribute => "vertex_attribute",
        }
    }

    pub fn shader_file(self) -> &'static str {
        match self {
            Strategy::Software => "no_instancing.wgsl",
            Strategy::UniformArray => "instancing.wgsl",
            Strategy::Texture => "texture_instancing.wgsl",
            Strategy::UniformBufferObject => "ubo_instancing.wgsl",
            Strategy::VertexAttribute => "attribute_instancing.wgsl",
        }
    }

    pub fn required_attributes(self) -> MeshAttributes {
        match self {
            Strategy::VertexAttribute => MeshAttributes::all(),
            _ => MeshAttributes::POSITION,
        }
    }

    /// Software nodes get their matrices from ordinary transform
    /// propagation, everything else needs the per-frame publisher.
    pub fn publishes_frame_uniforms(self) -> bool {
        !matches!(self, Strategy::Software)
    }

    pub fn capacity(self, limits: &InstancingLimits) -> Result<Capacity, CapacityError> {
        match self {
            Strategy::Software => Ok(Capacity::bounded(1)),
            Strategy::UniformArray => {
                nonzero("max_uniform_matrices", limits.max_uniform_matrices).map(Capacity::Bounded)
            }
            Strategy::Texture => {
                let row_width = texture_row_width(limits)?;
                let rows = nonzero("max_texture_height", limits.max_texture_height)?;
                Ok(Capacity::Bounded(row_width.saturating_mul(rows)))
            }
            Strategy::UniformBufferObject => {
                let size = limits.max_uniform_block_size;
                if size == 0 {
                    return Err(CapacityError::ZeroLimit("max_uniform_block_size"));
                }
                let matrices = (size / BYTES_PER_MATRIX) as usize;
                NonZeroUsize::new(matrices)
                    .map(Capacity::Bounded)
                    .ok_or(CapacityError::LimitTooSmall {
                        limit: "max_uniform_block_size",
                        value: size,
                        required: BYTES_PER_MATRIX,
                    })
            }
            Strategy::VertexAttribute => Ok(Capacity::Unbounded),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy(pub String);

impl fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown instancing strategy `{}`", self.0)
    }
}

impl std::error::Error for UnknownStrategy {}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "software" | "none" => Ok(Strategy::Software),
            "uniform_array" | "uniform" => Ok(Strategy::UniformArray),
            "texture" => Ok(Strategy::Texture),
            "uniform_buffer_object" | "uniform_buffer" | "ubo" => {
                Ok(Strategy::UniformBufferObject)
            }
            "vertex_attribute" | "attribute" => Ok(Strategy::VertexAttribute),
            _ => Err(UnknownStrategy(s.to_owned())),
        }
    }
}

/// Maximum number of instances one batch may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl Capacity {
    /// `n` is clamped to at least one.
    pub fn bounded(n: usize) -> Self {
        Capacity::Bounded(NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn get(self) -> Option<usize> {
        match self {
            Capacity::Bounded(n) => Some(n.get()),
            Capacity::Unbounded => None,
        }
    }

    /// Number of batches `count` instances split into.
    pub fn batch_count(self, count: usize) -> usize {
        match self {
            _ if count == 0 => 0,
            Capacity::Bounded(n) => count.div_ceil(n.get()),
            Capacity::Unbounded => 1,
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Bounded(n) => write!(f, "{}", n),
            Capacity::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Matrices per texture row.
pub fn texture_row_width(limits: &InstancingLimits) -> Result<NonZeroUsize, CapacityError> {
    let width = limits.max_texture_width;
    if width == 0 {
        return Err(CapacityError::ZeroLimit("max_texture_width"));
    }
    NonZeroUsize::new(width as usize / texture::TEXELS_PER_MATRIX).ok_or(
        CapacityError::LimitTooSmall {
            limit: "max_texture_width",
            value: width,
            required: texture::TEXELS_PER_MATRIX as u32,
        },
    )
}

fn nonzero(limit: &'static str, value: u32) -> Result<NonZeroUsize, CapacityError> {
    NonZeroUsize::new(value as usize).ok_or(CapacityError::ZeroLimit(limit))
}

/// Contiguous ranges of at most `capacity` covering `0..count`. The last
/// range holds the remainder.
pub fn partition(count: usize, capacity: Capacity) -> Vec<Range<usize>> {
    match capacity {
        _ if count == 0 => Vec::new(),
        Capacity::Unbounded => vec![0..count],
        Capacity::Bounded(n) => {
            let n = n.get();
            (0..count)
                .step_by(n)
                .map(|start| start..(start + n).min(count))
                .collect()
        }
    }
}

/// Inputs shared by every batch of one build.
#[derive(Debug, Clone, Copy)]
pub struct EncodeInput<'a> {
    pub base: &'a BaseMesh,
    pub base_bounds: Aabb,
    pub instances: &'a [Mat4],
}

impl<'a> EncodeInput<'a> {
    pub fn new(base: &'a BaseMesh, instances: &'a [Mat4]) -> Self {
        Self {
            base,
            base_bounds: base.bounding_box(),
            instances,
        }
    }

    /// Batch-local mesh copy with hardware instancing enabled.
    pub(crate) fn instanced_mesh(&self, instance_count: usize) -> BaseMesh {
        let mut mesh = self.base.clone();
        mesh.prepare_for_instancing(instance_count as u32);
        mesh
    }
}

/// Strategy specific GPU data for one batch.
#[derive(Debug, Clone)]
pub enum InstancePayload {
    UniformArray(UniformArrayPayload),
    Texture(TexturePayload),
    UniformBuffer(UniformBufferPayload),
    VertexAttribute(InstanceAttributeStream),
}

impl InstancePayload {
    pub fn strategy(&self) -> Strategy {
        match self {
            InstancePayload::UniformArray(_) => Strategy::UniformArray,
            InstancePayload::Texture(_) => Strategy::Texture,
            InstancePayload::UniformBuffer(_) => Strategy::UniformBufferObject,
            InstancePayload::VertexAttribute(_) => Strategy::VertexAttribute,
        }
    }

    /// Matrices the payload actually carries, in local order.
    pub fn decode(&self) -> Vec<Mat4> {
        match self {
            InstancePayload::UniformArray(p) => p.array().with_populated(|m| m.to_vec()),
            InstancePayload::Texture(p) => p.matrices(),
            InstancePayload::UniformBuffer(p) => p.matrices(),
            InstancePayload::VertexAttribute(p) => p.matrices(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> InstancingLimits {
        InstancingLimits {
            max_uniform_matrices: 2,
            max_texture_width: 16,
            max_texture_height: 3,
            max_uniform_block_size: 200,
        }
    }

    #[test]
    fn capacity_follows_each_limit() {
        let limits = limits();
        assert_eq!(Strategy::Software.capacity(&limits), Ok(Capacity::bounded(1)));
        assert_eq!(Strategy::UniformArray.capacity(&limits), Ok(Capacity::bounded(2)));
        // 16 texels / 4 per matrix * 3 rows
        assert_eq!(Strategy::Texture.capacity(&limits), Ok(Capacity::bounded(12)));
        // floor(200 / 64)
        assert_eq!(
            Strategy::UniformBufferObject.capacity(&limits),
            Ok(Capacity::bounded(3))
        );
        assert_eq!(
            Strategy::VertexAttribute.capacity(&limits),
            Ok(Capacity::Unbounded)
        );
    }

    #[test]
    fn zero_limits_are_capacity_errors() {
        let limits = InstancingLimits {
            max_uniform_matrices: 0,
            max_texture_width: 0,
            max_texture_height: 0,
            max_uniform_block_size: 0,
        };
        assert_eq!(
            Strategy::UniformArray.capacity(&limits),
            Err(CapacityError::ZeroLimit("max_uniform_matrices"))
        );
        assert_eq!(
            Strategy::Texture.capacity(&limits),
            Err(CapacityError::ZeroLimit("max_texture_width"))
        );
        assert_eq!(
            Strategy::UniformBufferObject.capacity(&limits),
            Err(CapacityError::ZeroLimit("max_uniform_block_size"))
        );
        // Neither depends on a limit.
        assert!(Strategy::Software.capacity(&limits).is_ok());
        assert!(Strategy::VertexAttribute.capacity(&limits).is_ok());
    }

    #[test]
    fn limits_below_one_matrix_are_rejected() {
        let limits = InstancingLimits {
            max_texture_width: 3,
            max_uniform_block_size: 63,
            ..InstancingLimits::default()
        };
        assert!(matches!(
            Strategy::Texture.capacity(&limits),
            Err(CapacityError::LimitTooSmall { required: 4, .. })
        ));
        assert!(matches!(
            Strategy::UniformBufferObject.capacity(&limits),
            Err(CapacityError::LimitTooSmall { required: 64, .. })
        ));
    }

    #[test]
    fn partition_keeps_trailing_remainder() {
        assert_eq!(partition(5, Capacity::bounded(2)), vec![0..2, 2..4, 4..5]);
        assert_eq!(partition(4, Capacity::bounded(2)), vec![0..2, 2..4]);
        assert_eq!(partition(1, Capacity::bounded(2)), vec![0..1]);
        assert!(partition(0, Capacity::bounded(2)).is_empty());
        assert_eq!(partition(10_000, Capacity::Unbounded), vec![0..10_000]);
    }

    #[test]
    fn batch_count_is_ceiling_division() {
        let cap = Capacity::bounded(3);
        for count in 0..20 {
            assert_eq!(cap.batch_count(count), partition(count, cap).len());
        }
        assert_eq!(Capacity::Unbounded.batch_count(0), 0);
        assert_eq!(Capacity::Unbounded.batch_count(7), 1);
    }

    #[test]
    fn strategies_parse_from_names_and_aliases() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>(), Ok(strategy));
        }
        assert_eq!("UBO".parse::<Strategy>(), Ok(Strategy::UniformBufferObject));
        assert_eq!(
            "vertex-attribute".parse::<Strategy>(),
            Ok(Strategy::VertexAttribute)
        );
        assert!("geometry_shader".parse::<Strategy>().is_err());
    }

    #[test]
    fn only_vertex_attribute_needs_full_vertex_layout() {
        assert_eq!(
            Strategy::VertexAttribute.required_attributes(),
            MeshAttributes::all()
        );
        assert_eq!(
            Strategy::Texture.required_attributes(),
            MeshAttributes::POSITION
        );
    }
}
