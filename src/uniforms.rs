// uniforms.rs
use std::cell::RefCell;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};

use crate::camera::CameraState;

/// Per-batch block written every frame by [`DerivedMatrixPublisher`].
///
/// WGSL layout: `mat4x4<f32>` followed by `mat3x3<f32>`, whose columns are
/// padded to 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct FrameUniforms {
    pub model_view_proj: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 3],
}

impl FrameUniforms {
    pub fn new(model_view_proj: Mat4, normal_matrix: Mat3) -> Self {
        let cols = normal_matrix.to_cols_array_2d();
        Self {
            model_view_proj: model_view_proj.to_cols_array_2d(),
            normal_matrix: cols.map(|c| [c[0], c[1], c[2], 0.0]),
        }
    }

    pub fn model_view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model_view_proj)
    }

    pub fn normal_matrix(&self) -> Mat3 {
        let c = self.normal_matrix;
        Mat3::from_cols_array_2d(&c.map(|col| [col[0], col[1], col[2]]))
    }
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat3::IDENTITY)
    }
}

/// Recomputes the camera dependent matrices of one batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedMatrixPublisher {
    model: Mat4,
}

impl DerivedMatrixPublisher {
    /// Instanced batches bake placement into their payload, so their model
    /// matrix is the identity.
    pub const INSTANCED: Self = Self {
        model: Mat4::IDENTITY,
    };

    pub fn new(model: Mat4) -> Self {
        Self { model }
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn publish(&self, camera: &CameraState) -> FrameUniforms {
        let model_view = camera.view * self.model;
        let model_view_proj = camera.projection * model_view;
        FrameUniforms::new(model_view_proj, normal_matrix(model_view))
    }
}

impl Default for DerivedMatrixPublisher {
    fn default() -> Self {
        Self::INSTANCED
    }
}

/// Inverse transpose of the upper 3x3. Singular input yields the identity.
pub fn normal_matrix(model_view: Mat4) -> Mat3 {
    let upper = Mat3::from_mat4(model_view);
    if upper.determinant() == 0.0 {
        return Mat3::IDENTITY;
    }
    let inverse = upper.inverse();
    if !inverse.is_finite() {
        return Mat3::IDENTITY;
    }
    inverse.transpose()
}

#[derive(Debug)]
struct MatrixSlots {
    name: &'static str,
    elements: Vec<Mat4>,
    count: usize,
}

/// Fixed-size `mat4` uniform array shared between a batch payload and its
/// live bounding estimator. Slots past `count` are zero and never read.
#[derive(Debug, Clone)]
pub struct UniformMatrixArray {
    slots: Rc<RefCell<MatrixSlots>>,
}

impl UniformMatrixArray {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            slots: Rc::new(RefCell::new(MatrixSlots {
                name,
                elements: vec![Mat4::ZERO; capacity],
                count: 0,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.slots.borrow().name
    }

    pub fn capacity(&self) -> usize {
        self.slots.borrow().elements.len()
    }

    pub fn count(&self) -> usize {
        self.slots.borrow().count
    }

    /// Clamped to the capacity.
    pub fn set_count(&self, count: usize) {
        let mut slots = self.slots.borrow_mut();
        slots.count = count.min(slots.elements.len());
    }

    /// Returns false when `index` is outside the array.
    pub fn set_element(&self, index: usize, matrix: Mat4) -> bool {
        let mut slots = self.slots.borrow_mut();
        match slots.elements.get_mut(index) {
            Some(slot) => {
                *slot = matrix;
                true
            }
            None => {
                log::warn!(
                    "Ignoring write to {}[{}]: array holds {} slots",
                    slots.name,
                    index,
                    slots.elements.len()
                );
                false
            }
        }
    }

    pub fn element(&self, index: usize) -> Option<Mat4> {
        self.slots.borrow().elements.get(index).copied()
    }

    pub fn with_populated<R>(&self, f: impl FnOnce(&[Mat4]) -> R) -> R {
        let slots = self.slots.borrow();
        f(&slots.elements[..slots.count])
    }

    /// Every slot, column-major, ready for a uniform buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let slots = self.slots.borrow();
        let floats: Vec<[f32; 16]> = slots.elements.iter().map(Mat4::to_cols_array).collect();
        bytemuck::cast_slice(&floats).to_vec()
    }

    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slots, &other.slots)
    }
}
