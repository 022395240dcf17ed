use glam::Mat4;

use crate::bounds::BoundingVolumeEstimator;
use crate::encoding::{EncodeInput, InstancePayload};
use crate::mesh::PrimitiveSet;
use crate::node::{Batch, BatchGeometry};
use crate::vertex::{InstanceRaw, Vertex};

/// Per-instance vertex stream holding every instance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceAttributeStream {
    instances: Vec<InstanceRaw>,
}

impl InstanceAttributeStream {
    pub fn new(matrices: &[Mat4]) -> Self {
        Self {
            instances: matrices.iter().copied().map(InstanceRaw::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        InstanceRaw::layout()
    }

    pub fn matrices(&self) -> Vec<Mat4> {
        self.instances.iter().map(InstanceRaw::matrix).collect()
    }
}

/// Drawable that lets the GPU step through instances on its own. Unlike the
/// other strategies it is not a mesh copy: only the vertex streams and the
/// first (byte indexed) primitive set are carried over.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancedDrawable {
    vertices: Vec<Vertex>,
    primitive: PrimitiveSet,
}

impl InstancedDrawable {
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn primitive(&self) -> &PrimitiveSet {
        &self.primitive
    }

    pub fn instance_count(&self) -> u32 {
        self.primitive.instance_count
    }
}

/// Encodes every instance into one drawable. The base mesh must already be
/// validated for `Strategy::VertexAttribute`.
pub fn encode(input: &EncodeInput<'_>) -> Batch {
    let instances = input.instances;
    let mut primitive = input
        .base
        .primitives()
        .first()
        .cloned()
        .unwrap_or_else(|| PrimitiveSet::triangles(crate::mesh::Indices::U8(Vec::new())));
    primitive.instance_count = instances.len() as u32;

    let drawable = InstancedDrawable {
        vertices: input.base.to_vertices(),
        primitive,
    };

    Batch::new(
        0..instances.len(),
        BatchGeometry::Instanced(drawable),
        InstancePayload::VertexAttribute(InstanceAttributeStream::new(instances)),
        BoundingVolumeEstimator::snapshot(input.base_bounds, instances),
    )
}
