use std::sync::Arc;

use glam::Mat4;

use crate::mesh::BaseMesh;
use crate::node::TransformNode;

/// One transform node per instance, all sharing the same mesh.
pub fn encode(mesh: &Arc<BaseMesh>, instances: &[Mat4]) -> Vec<TransformNode> {
    instances
        .iter()
        .map(|&matrix| TransformNode {
            matrix,
            mesh: Arc::clone(mesh),
        })
        .collect()
}
