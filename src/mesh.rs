// mesh.rs
use std::ops::Range;

use glam::{Vec2, Vec3};

use crate::bounds::Aabb;
use crate::error::ConfigurationError;
use crate::vertex::Vertex;

bitflags::bitflags! {
    /// Vertex streams and index layouts a strategy can depend on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MeshAttributes: u8 {
        const POSITION = 1 << 0;
        const NORMAL = 1 << 1;
        const TEX_COORD = 1 << 2;
        /// First primitive set is indexed with 8-bit indices.
        const BYTE_INDICES = 1 << 3;
    }
}

impl MeshAttributes {
    /// Human readable name of a single attribute flag.
    pub fn name(self) -> &'static str {
        if self == Self::POSITION {
            "position"
        } else if self == Self::NORMAL {
            "normal"
        } else if self == Self::TEX_COORD {
            "texcoord"
        } else if self == Self::BYTE_INDICES {
            "byte-indexed primitive set"
        } else {
            "attribute set"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Indices {
    pub fn len(&self) -> usize {
        match self {
            Indices::U8(i) => i.len(),
            Indices::U16(i) => i.len(),
            Indices::U32(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index data in a format wgpu can bind. There is no 8-bit index
    /// format, so byte indices are widened to `u16`.
    pub fn to_index_buffer(&self) -> (wgpu::IndexFormat, Vec<u8>) {
        match self {
            Indices::U8(i) => {
                let wide: Vec<u16> = i.iter().map(|&x| x as u16).collect();
                (wgpu::IndexFormat::Uint16, bytemuck::cast_slice(&wide).to_vec())
            }
            Indices::U16(i) => (wgpu::IndexFormat::Uint16, bytemuck::cast_slice(i).to_vec()),
            Indices::U32(i) => (wgpu::IndexFormat::Uint32, bytemuck::cast_slice(i).to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elements {
    /// Non-indexed draw over a vertex range.
    Arrays(Range<u32>),
    Indexed(Indices),
}

/// One draw command's worth of geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveSet {
    pub topology: wgpu::PrimitiveTopology,
    pub elements: Elements,
    /// Hardware instance repeat count. `1` means a plain draw.
    pub instance_count: u32,
}

impl PrimitiveSet {
    pub fn triangles(indices: Indices) -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            elements: Elements::Indexed(indices),
            instance_count: 1,
        }
    }

    pub fn element_count(&self) -> u32 {
        match &self.elements {
            Elements::Arrays(range) => range.end.saturating_sub(range.start),
            Elements::Indexed(indices) => indices.len() as u32,
        }
    }

    pub fn byte_indices(&self) -> Option<&[u8]> {
        match &self.elements {
            Elements::Indexed(Indices::U8(i)) => Some(i),
            _ => None,
        }
    }
}

/// How vertex data reaches the GPU. Hardware instancing only works with
/// buffer-backed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexSubmission {
    #[default]
    DisplayList,
    BufferObjects,
}

/// The shared mesh every instance is a copy of.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseMesh {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    tex_coords: Option<Vec<Vec2>>,
    primitives: Vec<PrimitiveSet>,
    submission: VertexSubmission,
}

impl BaseMesh {
    pub fn new(positions: Vec<Vec3>, primitives: Vec<PrimitiveSet>) -> Self {
        Self {
            positions,
            normals: None,
            tex_coords: None,
            primitives,
            submission: VertexSubmission::default(),
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_tex_coords(mut self, tex_coords: Vec<Vec2>) -> Self {
        self.tex_coords = Some(tex_coords);
        self
    }

    /// Axis aligned box with 24 vertices (4 per face) and byte indices.
    pub fn cube(half_extent: f32) -> Self {
        // (normal, u axis, v axis)
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut tex_coords = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (face, (n, u, v)) in FACES.iter().enumerate() {
            let (n, u, v) = (Vec3::from(*n), Vec3::from(*u), Vec3::from(*v));
            let base = (face * 4) as u8;
            for [cu, cv] in CORNERS {
                positions.push((n + u * cu + v * cv) * half_extent);
                normals.push(n);
                tex_coords.push(Vec2::new(cu * 0.5 + 0.5, 0.5 - cv * 0.5));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(positions, vec![PrimitiveSet::triangles(Indices::U8(indices))])
            .with_normals(normals)
            .with_tex_coords(tex_coords)
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> Option<&[Vec3]> {
        self.normals.as_deref()
    }

    pub fn tex_coords(&self) -> Option<&[Vec2]> {
        self.tex_coords.as_deref()
    }

    pub fn primitives(&self) -> &[PrimitiveSet] {
        &self.primitives
    }

    pub fn submission(&self) -> VertexSubmission {
        self.submission
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Untransformed bounds of the positions.
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().copied())
    }

    /// Interleaved vertices for upload. Absent streams are zero filled.
    pub fn to_vertices(&self) -> Vec<Vertex> {
        let normals = self.normals.as_deref().unwrap_or_default();
        let tex_coords = self.tex_coords.as_deref().unwrap_or_default();
        self.positions
            .iter()
            .enumerate()
            .map(|(i, p)| Vertex {
                pos: p.to_array(),
                normal: normals.get(i).map_or([0.0; 3], |n| n.to_array()),
                uv: tex_coords.get(i).map_or([0.0; 2], |t| t.to_array()),
            })
            .collect()
    }

    pub fn attributes(&self) -> MeshAttributes {
        let mut attributes = MeshAttributes::empty();
        if !self.positions.is_empty() {
            attributes |= MeshAttributes::POSITION;
        }
        if self.normals.is_some() {
            attributes |= MeshAttributes::NORMAL;
        }
        if self.tex_coords.is_some() {
            attributes |= MeshAttributes::TEX_COORD;
        }
        if self
            .primitives
            .first()
            .and_then(PrimitiveSet::byte_indices)
            .is_some()
        {
            attributes |= MeshAttributes::BYTE_INDICES;
        }
        attributes
    }

    /// Checks every attribute in `required`, reporting the first one missing.
    pub fn validate(&self, required: MeshAttributes) -> Result<(), ConfigurationError> {
        let present = self.attributes();
        for flag in required.iter() {
            if !present.contains(flag) {
                return Err(ConfigurationError::missing(flag));
            }
        }

        let expected = self.positions.len();
        if required.contains(MeshAttributes::NORMAL) {
            check_len("normal", expected, self.normals.as_ref().map_or(0, Vec::len))?;
        }
        if required.contains(MeshAttributes::TEX_COORD) {
            check_len("texcoord", expected, self.tex_coords.as_ref().map_or(0, Vec::len))?;
        }
        Ok(())
    }

    /// Configures a batch-local copy for hardware instancing.
    pub(crate) fn prepare_for_instancing(&mut self, instance_count: u32) {
        for primitive in &mut self.primitives {
            primitive.instance_count = instance_count;
        }
        self.submission = VertexSubmission::BufferObjects;
    }
}

fn check_len(attribute: &'static str, expected: usize, found: usize) -> Result<(), ConfigurationError> {
    if expected == found {
        Ok(())
    } else {
        Err(ConfigurationError::AttributeLengthMismatch {
            attribute,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_all_attributes() {
        let cube = BaseMesh::cube(1.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.primitives()[0].element_count(), 36);
        assert!(cube.attributes().contains(MeshAttributes::all()));
        assert!(cube.validate(MeshAttributes::all()).is_ok());
    }

    #[test]
    fn cube_bounds_match_half_extent() {
        let bounds = BaseMesh::cube(1.0).bounding_box();
        assert!(bounds.min.abs_diff_eq(Vec3::splat(-1.0), 1e-6));
        assert!(bounds.max.abs_diff_eq(Vec3::splat(1.0), 1e-6));
    }

    #[test]
    fn missing_tex_coords_are_named() {
        let cube = BaseMesh::cube(1.0);
        let stripped = BaseMesh::new(cube.positions().to_vec(), cube.primitives().to_vec())
            .with_normals(cube.normals().unwrap().to_vec());

        let err = stripped.validate(MeshAttributes::all()).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingAttribute("texcoord"));
    }

    #[test]
    fn mismatched_normals_are_rejected() {
        let cube = BaseMesh::cube(1.0);
        let broken = cube.clone().with_normals(vec![Vec3::Y; 3]);
        let err = broken.validate(MeshAttributes::NORMAL).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::AttributeLengthMismatch {
                attribute: "normal",
                expected: 24,
                found: 3
            }
        );
    }

    #[test]
    fn instancing_preparation_only_touches_the_copy() {
        let original = BaseMesh::cube(1.0);
        let mut copy = original.clone();
        copy.prepare_for_instancing(7);

        assert_eq!(copy.primitives()[0].instance_count, 7);
        assert_eq!(copy.submission(), VertexSubmission::BufferObjects);
        assert_eq!(original.primitives()[0].instance_count, 1);
        assert_eq!(original.submission(), VertexSubmission::DisplayList);
    }

    #[test]
    fn inverted_array_range_draws_nothing() {
        let primitive = PrimitiveSet {
            topology: wgpu::PrimitiveTopology::TriangleList,
            elements: Elements::Arrays(6..3),
            instance_count: 1,
        };
        assert_eq!(primitive.element_count(), 0);
    }

    #[test]
    fn byte_indices_widen_to_u16() {
        let (format, bytes) = Indices::U8(vec![0, 1, 255]).to_index_buffer();
        assert_eq!(format, wgpu::IndexFormat::Uint16);
        let wide: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(wide, vec![0, 1, 255]);
    }
}
