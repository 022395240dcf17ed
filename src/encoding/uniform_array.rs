use std::ops::Range;

use crate::bounds::BoundingVolumeEstimator;
use crate::encoding::{EncodeInput, InstancePayload};
use crate::node::{Batch, BatchGeometry};
use crate::program::INSTANCE_MATRIX_UNIFORM;
use crate::uniforms::UniformMatrixArray;

/// `instanceModelMatrix[MAX_INSTANCES]` for one batch.
#[derive(Debug, Clone)]
pub struct UniformArrayPayload {
    array: UniformMatrixArray,
}

impl UniformArrayPayload {
    pub fn array(&self) -> &UniformMatrixArray {
        &self.array
    }

    pub fn instance_count(&self) -> usize {
        self.array.count()
    }

    pub fn capacity(&self) -> usize {
        self.array.capacity()
    }
}

pub fn encode(input: &EncodeInput<'_>, range: Range<usize>, capacity: usize) -> Batch {
    let instances = &input.instances[range.clone()];

    let array = UniformMatrixArray::new(INSTANCE_MATRIX_UNIFORM, capacity);
    for (slot, matrix) in instances.iter().enumerate() {
        array.set_element(slot, *matrix);
    }
    array.set_count(instances.len());

    let estimator = BoundingVolumeEstimator::live(input.base_bounds, array.clone());
    let mesh = input.instanced_mesh(instances.len());

    Batch::new(
        range,
        BatchGeometry::Mesh(mesh),
        InstancePayload::UniformArray(UniformArrayPayload { array }),
        estimator,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{BaseMesh, VertexSubmission};
    use glam::{Mat4, Vec3};

    fn instances(n: usize) -> Vec<Mat4> {
        (0..n)
            .map(|i| Mat4::from_translation(Vec3::new(i as f32 * 3.0, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn slots_hold_the_subrange_in_order() {
        let mesh = BaseMesh::cube(1.0);
        let all = instances(5);
        let input = EncodeInput::new(&mesh, &all);

        let batch = encode(&input, 2..5, 4);
        let InstancePayload::UniformArray(payload) = batch.payload() else {
            panic!("expected a uniform array payload");
        };

        assert_eq!(payload.capacity(), 4);
        assert_eq!(payload.instance_count(), 3);
        assert_eq!(payload.array().name(), "instanceModelMatrix");
        for j in 0..3 {
            assert_eq!(payload.array().element(j), Some(all[2 + j]));
        }
        assert_eq!(payload.array().element(3), Some(Mat4::ZERO));
    }

    #[test]
    fn mesh_copy_is_set_up_for_instancing() {
        let mesh = BaseMesh::cube(1.0);
        let all = instances(3);
        let batch = encode(&EncodeInput::new(&mesh, &all), 0..3, 8);

        let copy = batch.geometry().mesh().unwrap();
        assert_eq!(copy.primitives()[0].instance_count, 3);
        assert_eq!(copy.submission(), VertexSubmission::BufferObjects);
        assert_eq!(mesh.primitives()[0].instance_count, 1);
    }

    #[test]
    fn bound_follows_live_writes() {
        let mesh = BaseMesh::cube(1.0);
        let all = instances(2);
        let batch = encode(&EncodeInput::new(&mesh, &all), 0..2, 2);

        assert!(batch.estimator().is_live());
        assert_eq!(batch.bounding_box().max.x, 4.0);

        assert!(batch.set_instance_matrix(1, Mat4::from_translation(Vec3::X * 10.0)));
        assert_eq!(batch.bounding_box().max.x, 11.0);

        // Slots past the batch's own instances stay untouched.
        assert!(!batch.set_instance_matrix(2, Mat4::IDENTITY));
    }
}
