use std::ops::Range;

use glam::Mat4;

use crate::bounds::BoundingVolumeEstimator;
use crate::encoding::{EncodeInput, InstancePayload};
use crate::node::{Batch, BatchGeometry};
use crate::program::INSTANCE_TEXTURE_UNIT;

/// One RGBA32F texel per matrix column.
pub const TEXELS_PER_MATRIX: usize = 4;
const BYTES_PER_TEXEL: u32 = 16;

/// Matrices packed into an `Rgba32Float` texture, `row_width` per row.
///
/// Matrix `j` starts at texel `(4 * (j % row_width), j / row_width)` and
/// spans four texels holding columns 0..4.
#[derive(Debug, Clone, PartialEq)]
pub struct TexturePayload {
    width: u32,
    height: u32,
    row_width: usize,
    count: usize,
    texels: Vec<[f32; 4]>,
}

impl TexturePayload {
    pub fn pack(matrices: &[Mat4], row_width: usize) -> Self {
        let row_width = row_width.max(1);
        let count = matrices.len();
        let width = TEXELS_PER_MATRIX * count.min(row_width);
        let height = count.div_ceil(row_width);

        let mut texels = vec![[0.0; 4]; width * height];
        for (j, matrix) in matrices.iter().enumerate() {
            let (x, y) = Self::texel_origin(j, row_width);
            let start = y * width + x;
            for (k, column) in matrix.to_cols_array_2d().into_iter().enumerate() {
                texels[start + k] = column;
            }
        }

        Self {
            width: width as u32,
            height: height as u32,
            row_width,
            count,
            texels,
        }
    }

    fn texel_origin(j: usize, row_width: usize) -> (usize, usize) {
        (TEXELS_PER_MATRIX * (j % row_width), j / row_width)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    pub fn instance_count(&self) -> usize {
        self.count
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * BYTES_PER_TEXEL
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Rgba32Float
    }

    /// Texture unit exposed to shaders as `instanceMatrixTexture`.
    pub fn texture_unit(&self) -> u32 {
        INSTANCE_TEXTURE_UNIT
    }

    /// Exact texel fetches: no filtering, nothing sampled past the edge.
    pub fn sampler_descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        wgpu::SamplerDescriptor {
            label: Some("InstanceMatrixSampler"),
            address_mode_u: wgpu::AddressMode::ClampToBorder,
            address_mode_v: wgpu::AddressMode::ClampToBorder,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            border_color: Some(wgpu::SamplerBorderColor::TransparentBlack),
            ..Default::default()
        }
    }

    pub fn matrix(&self, j: usize) -> Option<Mat4> {
        if j >= self.count {
            return None;
        }
        let (x, y) = Self::texel_origin(j, self.row_width);
        let start = y * self.width as usize + x;
        let cols = &self.texels[start..start + TEXELS_PER_MATRIX];
        Some(Mat4::from_cols_array_2d(&[cols[0], cols[1], cols[2], cols[3]]))
    }

    pub fn matrices(&self) -> Vec<Mat4> {
        (0..self.count).filter_map(|j| self.matrix(j)).collect()
    }
}

pub fn encode(input: &EncodeInput<'_>, range: Range<usize>, row_width: usize) -> Batch {
    let instances = &input.instances[range.clone()];
    let payload = TexturePayload::pack(instances, row_width);

    // The texture is not cheap to read back, so bounds come from a copy.
    let estimator = BoundingVolumeEstimator::snapshot(input.base_bounds, instances);
    let mesh = input.instanced_mesh(instances.len());

    Batch::new(
        range,
        BatchGeometry::Mesh(mesh),
        InstancePayload::Texture(payload),
        estimator,
    )
}
