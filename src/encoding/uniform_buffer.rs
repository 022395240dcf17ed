use std::ops::Range;

use glam::Mat4;

use crate::bounds::BoundingVolumeEstimator;
use crate::encoding::{EncodeInput, InstancePayload, BYTES_PER_MATRIX, FLOATS_PER_MATRIX};
use crate::node::{Batch, BatchGeometry};
use crate::program::{INSTANCE_BLOCK, INSTANCE_BLOCK_BINDING};

/// Contents of the `instanceData` block. Always `capacity * 16` floats so
/// every batch of a build matches the shader's fixed-size declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBufferPayload {
    floats: Vec<f32>,
    count: usize,
}

impl UniformBufferPayload {
    pub fn pack(matrices: &[Mat4], capacity: usize) -> Self {
        let mut floats = vec![0.0; capacity.max(matrices.len()) * FLOATS_PER_MATRIX];
        for (chunk, matrix) in floats.chunks_exact_mut(FLOATS_PER_MATRIX).zip(matrices) {
            matrix.write_cols_to_slice(chunk);
        }
        Self {
            floats,
            count: matrices.len(),
        }
    }

    pub fn floats(&self) -> &[f32] {
        &self.floats
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.floats)
    }

    pub fn instance_count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.floats.len() / FLOATS_PER_MATRIX
    }

    /// Bytes bound to the block, independent of the instance count.
    pub fn binding_size(&self) -> u64 {
        self.capacity() as u64 * BYTES_PER_MATRIX as u64
    }

    pub fn block_name(&self) -> &'static str {
        INSTANCE_BLOCK
    }

    pub fn binding(&self) -> u32 {
        INSTANCE_BLOCK_BINDING
    }

    /// Written once at upload, never updated.
    pub fn usage(&self) -> wgpu::BufferUsages {
        wgpu::BufferUsages::UNIFORM
    }

    pub fn matrices(&self) -> Vec<Mat4> {
        self.floats
            .chunks_exact(FLOATS_PER_MATRIX)
            .take(self.count)
            .map(Mat4::from_cols_slice)
            .collect()
    }
}

pub fn encode(input: &EncodeInput<'_>, range: Range<usize>, capacity: usize) -> Batch {
    let instances = &input.instances[range.clone()];
    let payload = UniformBufferPayload::pack(instances, capacity);

    let estimator = BoundingVolumeEstimator::snapshot(input.base_bounds, instances);
    let mesh = input.instanced_mesh(instances.len());

    Batch::new(
        range,
        BatchGeometry::Mesh(mesh),
        InstancePayload::UniformBuffer(payload),
        estimator,
    )
}
