// builder.rs
use std::ops::Range;
use std::sync::Arc;

use glam::Mat4;

use crate::encoding::{self, partition, texture_row_width, Capacity, EncodeInput, Strategy};
use crate::error::InstancingError;
use crate::mesh::BaseMesh;
use crate::node::{Batch, NodeContent, RenderNode};
use crate::program::ShaderProgram;
use crate::settings::InstancingSettings;
use crate::shader::ShaderSourceLoader;

/// Turns a base mesh and a list of instance matrices into a render node.
#[derive(Debug, Clone)]
pub struct InstanceBatchBuilder {
    settings: InstancingSettings,
    loader: ShaderSourceLoader,
}

impl InstanceBatchBuilder {
    pub fn new(settings: InstancingSettings) -> Self {
        let loader = ShaderSourceLoader::new(settings.shader_dir.clone());
        Self { settings, loader }
    }

    pub fn settings(&self) -> &InstancingSettings {
        &self.settings
    }

    pub fn build(
        &self,
        mesh: &Arc<BaseMesh>,
        instances: &[Mat4],
        strategy: Strategy,
    ) -> Result<RenderNode, InstancingError> {
        mesh.validate(strategy.required_attributes())?;
        let capacity = strategy.capacity(&self.settings.limits)?;

        let content = if instances.is_empty() {
            NodeContent::Group(Vec::new())
        } else {
            let input = EncodeInput::new(mesh, instances);
            let slots = capacity.get().unwrap_or(instances.len());
            match strategy {
                Strategy::Software => {
                    NodeContent::Transforms(encoding::software::encode(mesh, instances))
                }
                Strategy::UniformArray => batched(&input, strategy, capacity, |input, range| {
                    encoding::uniform_array::encode(input, range, slots)
                }),
                Strategy::Texture => {
                    let row_width = texture_row_width(&self.settings.limits)?.get();
                    batched(&input, strategy, capacity, |input, range| {
                        encoding::texture::encode(input, range, row_width)
                    })
                }
                Strategy::UniformBufferObject => {
                    batched(&input, strategy, capacity, |input, range| {
                        encoding::uniform_buffer::encode(input, range, slots)
                    })
                }
                Strategy::VertexAttribute => {
                    NodeContent::Single(encoding::vertex_attribute::encode(&input))
                }
            }
        };

        let program = self.load_program(strategy, capacity);

        let node = RenderNode::new(strategy, capacity, instances.len(), program, content);
        log::info!(
            "Built {} node: {} instances, capacity {}, {} drawables",
            strategy,
            instances.len(),
            capacity,
            node.drawable_count()
        );
        Ok(node)
    }

    fn load_program(&self, strategy: Strategy, capacity: Capacity) -> Option<Arc<ShaderProgram>> {
        match ShaderProgram::load(&self.loader, strategy, capacity) {
            Ok(program) => Some(Arc::new(program)),
            Err(err) => {
                log::warn!("{}; {} node has no shader program", err, strategy);
                None
            }
        }
    }
}

/// Splits the instances by capacity and encodes each range. A single range
/// is returned as a lone batch rather than a group.
fn batched(
    input: &EncodeInput<'_>,
    strategy: Strategy,
    capacity: Capacity,
    encode: impl Fn(&EncodeInput<'_>, Range<usize>) -> Batch,
) -> NodeContent {
    let mut batches: Vec<Batch> = partition(input.instances.len(), capacity)
        .into_iter()
        .map(|range| {
            log::debug!("Encoding {} batch {:?}", strategy, range);
            encode(input, range)
        })
        .collect();

    match batches.len() {
        1 => NodeContent::Single(batches.remove(0)),
        _ => NodeContent::Group(batches),
    }
}

impl Default for InstanceBatchBuilder {
    fn default() -> Self {
        Self::new(InstancingSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::InstancePayload;
    use crate::error::{CapacityError, ConfigurationError};
    use crate::settings::InstancingLimits;
    use glam::Vec3;

    fn builder(limits: InstancingLimits) -> InstanceBatchBuilder {
        InstanceBatchBuilder::new(
            InstancingSettings::default()
                .with_limits(limits)
                .with_shader_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders")),
        )
    }

    fn instances(n: usize) -> Vec<Mat4> {
        (0..n)
            .map(|i| Mat4::from_translation(Vec3::new(i as f32 * 2.0, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn five_instances_at_capacity_two_make_three_batches() {
        let limits = InstancingLimits {
            max_uniform_matrices: 2,
            max_uniform_block_size: 128,
            ..InstancingLimits::default()
        };
        let mesh = Arc::new(BaseMesh::cube(1.0));
        for strategy in [Strategy::UniformArray, Strategy::UniformBufferObject] {
            let node = builder(limits).build(&mesh, &instances(5), strategy).unwrap();
            let sizes: Vec<usize> = node.batches().iter().map(Batch::instance_count).collect();
            assert_eq!(sizes, vec![2, 2, 1], "{strategy}");
            assert!(node.is_group());
        }
    }

    #[test]
    fn fits_in_one_batch_returns_single() {
        let mesh = Arc::new(BaseMesh::cube(1.0));
        let node = InstanceBatchBuilder::default()
            .build(&mesh, &instances(3), Strategy::Texture)
            .unwrap();
        assert!(matches!(node.content(), NodeContent::Single(_)));
        assert!(!node.is_group());
    }

    #[test]
    fn zero_instances_make_an_empty_group() {
        let mesh = Arc::new(BaseMesh::cube(1.0));
        for strategy in Strategy::ALL {
            let node = InstanceBatchBuilder::default()
                .build(&mesh, &[], strategy)
                .unwrap();
            assert!(matches!(node.content(), NodeContent::Group(b) if b.is_empty()));
            assert!(node.is_empty());
            assert!(!node.bounding_box().is_valid());
        }
    }

    #[test]
    fn default_texture_fits_default_device_limits() {
        let mesh = Arc::new(BaseMesh::cube(1.0));
        let builder = InstanceBatchBuilder::default();
        let row_width = texture_row_width(&builder.settings().limits).unwrap().get();
        let node = builder
            .build(&mesh, &instances(row_width + 1), Strategy::Texture)
            .unwrap();
        let InstancePayload::Texture(payload) = node.batches()[0].payload() else {
            panic!("expected a texture payload");
        };
        let device = wgpu::Limits::default();
        assert_eq!(payload.height(), 2);
        assert!(payload.width() <= device.max_texture_dimension_2d);
        assert!(payload.height() <= device.max_texture_dimension_2d);
        assert_eq!(
            InstancingLimits::default(),
            InstancingLimits {
                max_uniform_matrices: 64,
                max_uniform_block_size: 65536,
                ..InstancingLimits::from_device_limits(&device)
            }
        );
    }

    #[test]
    fn zero_limit_fails_before_encoding() {
        let limits = InstancingLimits {
            max_uniform_matrices: 0,
            ..InstancingLimits::default()
        };
        let mesh = Arc::new(BaseMesh::cube(1.0));
        let err = builder(limits)
            .build(&mesh, &instances(3), Strategy::UniformArray)
            .unwrap_err();
        assert_eq!(
            err,
            InstancingError::Capacity(CapacityError::ZeroLimit("max_uniform_matrices"))
        );
    }

    #[test]
    fn empty_mesh_is_a_configuration_error() {
        let mesh = Arc::new(BaseMesh::new(Vec::new(), Vec::new()));
        let err = InstanceBatchBuilder::default()
            .build(&mesh, &instances(1), Strategy::Software)
            .unwrap_err();
        assert_eq!(
            err,
            InstancingError::Configuration(ConfigurationError::MissingAttribute("position"))
        );
    }

    #[test]
    fn missing_shaders_leave_geometry_intact() {
        let settings = InstancingSettings::default().with_shader_dir("nowhere/shaders");
        let mesh = Arc::new(BaseMesh::cube(1.0));
        let node = InstanceBatchBuilder::new(settings)
            .build(&mesh, &instances(4), Strategy::UniformArray)
            .unwrap();
        assert!(node.program().is_none());
        assert_eq!(node.batches().len(), 1);
    }

    #[test]
    fn program_carries_capacity_macro() {
        let limits = InstancingLimits {
            max_uniform_matrices: 16,
            ..InstancingLimits::default()
        };
        let mesh = Arc::new(BaseMesh::cube(1.0));
        let node = builder(limits)
            .build(&mesh, &instances(40), Strategy::UniformArray)
            .unwrap();
        let program = node.program().expect("shader directory is checked in");
        assert_eq!(program.max_instances(), Some(16));
        assert_eq!(node.batches().len(), 3);
    }
}
