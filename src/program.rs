// program.rs
use crate::encoding::{Capacity, Strategy};
use crate::error::ResourceLoadError;
use crate::shader::{max_instances_definition, ShaderSource, ShaderSourceLoader};

pub const INSTANCE_MATRIX_UNIFORM: &str = "instanceModelMatrix";
pub const INSTANCE_TEXTURE_UNIFORM: &str = "instanceMatrixTexture";
pub const INSTANCE_BLOCK: &str = "instanceData";

/// Bind group 0 layout shared by every instanced shader.
pub const INSTANCE_BLOCK_BINDING: u32 = 0;
pub const INSTANCE_TEXTURE_UNIT: u32 = 1;
pub const FRAME_UNIFORMS_BINDING: u32 = 2;

pub const POSITION_LOCATION: u32 = 0;
pub const NORMAL_LOCATION: u32 = 1;
pub const TEX_COORD_LOCATION: u32 = 2;
/// First of four consecutive locations, one per matrix column.
pub const INSTANCE_MATRIX_LOCATION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: &'static str,
    pub location: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBlockBinding {
    pub name: &'static str,
    pub binding: u32,
}

/// One program shared by every batch of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    strategy: Strategy,
    source: ShaderSource,
    max_instances: Option<usize>,
    attributes: Vec<AttributeBinding>,
    blocks: Vec<UniformBlockBinding>,
}

impl ShaderProgram {
    pub fn load(
        loader: &ShaderSourceLoader,
        strategy: Strategy,
        capacity: Capacity,
    ) -> Result<Self, ResourceLoadError> {
        let max_instances = match (strategy, capacity) {
            (Strategy::UniformArray | Strategy::UniformBufferObject, Capacity::Bounded(n)) => {
                Some(n.get())
            }
            _ => None,
        };
        let definition = max_instances.map(max_instances_definition);
        let source = loader.load_with_definition(strategy.shader_file(), definition.as_deref())?;

        let attributes = match strategy {
            Strategy::VertexAttribute => vec![
                AttributeBinding {
                    name: "vPosition",
                    location: POSITION_LOCATION,
                },
                AttributeBinding {
                    name: "vNormal",
                    location: NORMAL_LOCATION,
                },
                AttributeBinding {
                    name: "vTexCoord",
                    location: TEX_COORD_LOCATION,
                },
                AttributeBinding {
                    name: "vInstanceModelMatrix",
                    location: INSTANCE_MATRIX_LOCATION,
                },
            ],
            _ => Vec::new(),
        };

        let blocks = match strategy {
            Strategy::UniformBufferObject => vec![UniformBlockBinding {
                name: INSTANCE_BLOCK,
                binding: INSTANCE_BLOCK_BINDING,
            }],
            _ => Vec::new(),
        };

        Ok(Self {
            strategy,
            source,
            max_instances,
            attributes,
            blocks,
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    /// Value injected as `MAX_INSTANCES`, if any.
    pub fn max_instances(&self) -> Option<usize> {
        self.max_instances
    }

    pub fn attribute_bindings(&self) -> &[AttributeBinding] {
        &self.attributes
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }

    pub fn uniform_block_bindings(&self) -> &[UniformBlockBinding] {
        &self.blocks
    }

    pub fn create_module(&self, device: &wgpu::Device) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.source.label),
            source: wgpu::ShaderSource::Wgsl(self.source.text.as_str().into()),
        })
    }
}
