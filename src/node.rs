// node.rs
use std::cell::Cell;
use std::ops::Range;
use std::sync::Arc;

use glam::Mat4;

use crate::bounds::{Aabb, BoundingVolumeEstimator};
use crate::camera::CameraState;
use crate::encoding::{Capacity, InstancePayload, InstancedDrawable, Strategy};
use crate::mesh::BaseMesh;
use crate::program::ShaderProgram;
use crate::uniforms::{DerivedMatrixPublisher, FrameUniforms};

/// What a batch actually draws.
#[derive(Debug, Clone)]
pub enum BatchGeometry {
    /// Deep copy of the base mesh with instance counts set.
    Mesh(BaseMesh),
    /// Vertex-attribute drawable carrying its own instance stream.
    Instanced(InstancedDrawable),
}

impl BatchGeometry {
    pub fn mesh(&self) -> Option<&BaseMesh> {
        match self {
            BatchGeometry::Mesh(mesh) => Some(mesh),
            BatchGeometry::Instanced(_) => None,
        }
    }
}

/// One hardware instanced draw unit.
#[derive(Debug)]
pub struct Batch {
    range: Range<usize>,
    geometry: BatchGeometry,
    payload: InstancePayload,
    estimator: BoundingVolumeEstimator,
    bound: Cell<Option<Aabb>>,
    publisher: DerivedMatrixPublisher,
    uniforms: FrameUniforms,
}

impl Batch {
    pub(crate) fn new(
        range: Range<usize>,
        geometry: BatchGeometry,
        payload: InstancePayload,
        estimator: BoundingVolumeEstimator,
    ) -> Self {
        Self {
            range,
            geometry,
            payload,
            estimator,
            bound: Cell::new(None),
            publisher: DerivedMatrixPublisher::INSTANCED,
            uniforms: FrameUniforms::default(),
        }
    }

    /// Indices into the builder's instance list.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn instance_count(&self) -> usize {
        self.range.len()
    }

    pub fn geometry(&self) -> &BatchGeometry {
        &self.geometry
    }

    pub fn payload(&self) -> &InstancePayload {
        &self.payload
    }

    pub fn estimator(&self) -> &BoundingVolumeEstimator {
        &self.estimator
    }

    /// Cached until [`Batch::invalidate_bound`].
    pub fn bounding_box(&self) -> Aabb {
        if let Some(bound) = self.bound.get() {
            return bound;
        }
        let bound = self.estimator.compute();
        self.bound.set(Some(bound));
        bound
    }

    pub fn invalidate_bound(&self) {
        self.bound.set(None);
    }

    /// Rewrites one slot of a uniform-array batch. Other payloads are
    /// immutable after upload and return false.
    pub fn set_instance_matrix(&self, local_index: usize, matrix: Mat4) -> bool {
        let InstancePayload::UniformArray(payload) = &self.payload else {
            return false;
        };
        if local_index >= self.instance_count() {
            return false;
        }
        let written = payload.array().set_element(local_index, matrix);
        if written {
            self.invalidate_bound();
        }
        written
    }

    pub fn publisher(&self) -> &DerivedMatrixPublisher {
        &self.publisher
    }

    /// Values from the last [`Batch::cull`].
    pub fn frame_uniforms(&self) -> &FrameUniforms {
        &self.uniforms
    }

    pub fn cull(&mut self, camera: &CameraState) -> &FrameUniforms {
        self.uniforms = self.publisher.publish(camera);
        &self.uniforms
    }
}

/// Software instancing: the shared mesh placed by an ordinary transform.
#[derive(Debug, Clone)]
pub struct TransformNode {
    pub matrix: Mat4,
    pub mesh: Arc<BaseMesh>,
}

impl TransformNode {
    pub fn bounding_box(&self) -> Aabb {
        self.mesh.bounding_box().transformed(self.matrix)
    }
}

#[derive(Debug)]
pub enum NodeContent {
    Single(Batch),
    /// Zero or more batches. An empty group means no instances.
    Group(Vec<Batch>),
    Transforms(Vec<TransformNode>),
}

/// Result of a build, handed to the host traversal.
#[derive(Debug)]
pub struct RenderNode {
    strategy: Strategy,
    capacity: Capacity,
    instance_count: usize,
    program: Option<Arc<ShaderProgram>>,
    content: NodeContent,
}

impl RenderNode {
    pub(crate) fn new(
        strategy: Strategy,
        capacity: Capacity,
        instance_count: usize,
        program: Option<Arc<ShaderProgram>>,
        content: NodeContent,
    ) -> Self {
        Self {
            strategy,
            capacity,
            instance_count,
            program,
            content,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    /// `None` when the shader could not be loaded.
    pub fn program(&self) -> Option<&Arc<ShaderProgram>> {
        self.program.as_ref()
    }

    pub fn content(&self) -> &NodeContent {
        &self.content
    }

    pub fn is_group(&self) -> bool {
        !matches!(self.content, NodeContent::Single(_))
    }

    pub fn is_empty(&self) -> bool {
        self.drawable_count() == 0
    }

    pub fn batches(&self) -> &[Batch] {
        match &self.content {
            NodeContent::Single(batch) => std::slice::from_ref(batch),
            NodeContent::Group(batches) => batches,
            NodeContent::Transforms(_) => &[],
        }
    }

    pub fn transform_nodes(&self) -> &[TransformNode] {
        match &self.content {
            NodeContent::Transforms(nodes) => nodes,
            _ => &[],
        }
    }

    /// Batches for hardware strategies, transform nodes for software.
    pub fn drawable_count(&self) -> usize {
        match &self.content {
            NodeContent::Transforms(nodes) => nodes.len(),
            _ => self.batches().len(),
        }
    }

    pub fn batch_ranges(&self) -> Vec<Range<usize>> {
        match &self.content {
            NodeContent::Transforms(nodes) => (0..nodes.len()).map(|i| i..i + 1).collect(),
            _ => self.batches().iter().map(Batch::range).collect(),
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match &self.content {
            NodeContent::Transforms(nodes) => nodes
                .iter()
                .fold(Aabb::EMPTY, |acc, n| acc.union(n.bounding_box())),
            _ => self
                .batches()
                .iter()
                .fold(Aabb::EMPTY, |acc, b| acc.union(b.bounding_box())),
        }
    }

    /// Per-frame callback. Publishes camera dependent uniforms into every
    /// batch; software nodes rely on transform propagation instead.
    pub fn cull(&mut self, camera: &CameraState) {
        if !self.strategy.publishes_frame_uniforms() {
            return;
        }
        match &mut self.content {
            NodeContent::Single(batch) => {
                batch.cull(camera);
            }
            NodeContent::Group(batches) => {
                for batch in batches {
                    batch.cull(camera);
                }
            }
            NodeContent::Transforms(_) => {}
        }
    }
}
