//! Bounding volumes reported by built nodes.
use std::sync::Arc;

use glam::{Mat4, Vec3};
use wgpu_instancing::{
    Aabb, BaseMesh, InstanceBatchBuilder, InstancingLimits, InstancingSettings, Strategy,
};

fn translations(xs: &[f32]) -> Vec<Mat4> {
    xs.iter()
        .map(|x| Mat4::from_translation(Vec3::new(*x, 0.0, 0.0)))
        .collect()
}

fn small_builder() -> InstanceBatchBuilder {
    let limits = InstancingLimits {
        max_uniform_matrices: 2,
        max_texture_width: 8,
        max_texture_height: 1,
        max_uniform_block_size: 128,
    };
    InstanceBatchBuilder::new(InstancingSettings::default().with_limits(limits))
}

#[test]
fn node_bound_encloses_every_instance() {
    let mesh = Arc::new(BaseMesh::cube(1.0));
    let all = translations(&[-10.0, 0.0, 10.0]);
    for strategy in Strategy::ALL {
        let node = small_builder().build(&mesh, &all, strategy).unwrap();
        let bound = node.bounding_box();
        assert!(bound.is_valid(), "{strategy}");
        assert_eq!(bound.min.x, -11.0, "{strategy}");
        assert_eq!(bound.max.x, 11.0, "{strategy}");
        assert_eq!(bound.min.y, -1.0, "{strategy}");
        assert_eq!(bound.max.z, 1.0, "{strategy}");
    }
}

#[test]
fn batch_bounds_only_cover_their_own_range() {
    let mesh = Arc::new(BaseMesh::cube(1.0));
    let all = translations(&[0.0, 5.0, 100.0]);
    let node = small_builder()
        .build(&mesh, &all, Strategy::UniformArray)
        .unwrap();

    let bounds: Vec<Aabb> = node.batches().iter().map(|b| b.bounding_box()).collect();
    assert_eq!(bounds.len(), 2);
    assert_eq!(bounds[0], Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(6.0, 1.0, 1.0)));
    assert_eq!(bounds[1], Aabb::new(Vec3::new(99.0, -1.0, -1.0), Vec3::new(101.0, 1.0, 1.0)));
}

#[test]
fn live_bound_follows_matrix_edits() {
    let mesh = Arc::new(BaseMesh::cube(1.0));
    let node = small_builder()
        .build(&mesh, &translations(&[0.0, 1.0]), Strategy::UniformArray)
        .unwrap();
    let batch = &node.batches()[0];
    assert!(batch.estimator().is_live());
    assert_eq!(batch.bounding_box().max.x, 2.0);

    assert!(batch.set_instance_matrix(1, Mat4::from_translation(Vec3::new(50.0, 0.0, 0.0))));
    assert_eq!(batch.bounding_box().max.x, 51.0);

    // Slots past the populated count are never part of the bound.
    assert!(!batch.set_instance_matrix(2, Mat4::IDENTITY));
}

#[test]
fn snapshot_bound_ignores_later_input_changes() {
    let mesh = Arc::new(BaseMesh::cube(1.0));
    let mut all = translations(&[0.0, 1.0]);
    let node = small_builder()
        .build(&mesh, &all, Strategy::UniformBufferObject)
        .unwrap();
    all[1] = Mat4::from_translation(Vec3::new(500.0, 0.0, 0.0));

    let batch = &node.batches()[0];
    assert!(!batch.estimator().is_live());
    assert_eq!(batch.bounding_box().max.x, 2.0);
    assert!(!batch.set_instance_matrix(0, Mat4::IDENTITY));
}
