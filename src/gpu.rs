// gpu.rs
use std::{mem, num::NonZeroU64};

use wgpu::util::DeviceExt;

use crate::encoding::{InstancePayload, Strategy, TexturePayload};
use crate::error::GpuInitError;
use crate::mesh::{BaseMesh, Elements, PrimitiveSet};
use crate::node::{Batch, BatchGeometry, RenderNode};
use crate::program::{FRAME_UNIFORMS_BINDING, INSTANCE_BLOCK_BINDING, INSTANCE_TEXTURE_UNIT};
use crate::uniforms::FrameUniforms;
use crate::vertex::Vertex;

/// Sampler for the matrix texture sits next to it.
pub const INSTANCE_SAMPLER_BINDING: u32 = 3;

pub struct GpuPrimitive {
    index: Option<(wgpu::Buffer, wgpu::IndexFormat)>,
    element_count: u32,
    first_vertex: u32,
    instance_count: u32,
}

pub struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    primitives: Vec<GpuPrimitive>,
}

impl GpuMesh {
    pub fn from_vertices(device: &wgpu::Device, vertices: &[Vertex], primitives: &[PrimitiveSet]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("InstancedMesh.VertexBuffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let primitives = primitives
            .iter()
            .map(|primitive| {
                let (index, first_vertex) = match &primitive.elements {
                    Elements::Indexed(indices) => {
                        let (format, bytes) = indices.to_index_buffer();
                        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("InstancedMesh.IndexBuffer"),
                            contents: &bytes,
                            usage: wgpu::BufferUsages::INDEX,
                        });
                        (Some((buffer, format)), 0)
                    }
                    Elements::Arrays(range) => (None, range.start),
                };
                GpuPrimitive {
                    index,
                    element_count: primitive.element_count(),
                    first_vertex,
                    instance_count: primitive.instance_count,
                }
            })
            .collect();

        Self {
            vertex_buffer,
            primitives,
        }
    }

    pub fn from_mesh(device: &wgpu::Device, mesh: &BaseMesh) -> Self {
        Self::from_vertices(device, &mesh.to_vertices(), mesh.primitives())
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        for primitive in &self.primitives {
            let instances = 0..primitive.instance_count;
            match &primitive.index {
                Some((buffer, format)) => {
                    pass.set_index_buffer(buffer.slice(..), *format);
                    pass.draw_indexed(0..primitive.element_count, 0, instances);
                }
                None => {
                    let first = primitive.first_vertex;
                    pass.draw(first..first + primitive.element_count, instances);
                }
            }
        }
    }
}

pub enum GpuInstanceData {
    UniformBuffer(wgpu::Buffer),
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        sampler: wgpu::Sampler,
    },
    VertexStream(wgpu::Buffer),
}

pub struct GpuBatch {
    pub mesh: GpuMesh,
    pub instance_data: GpuInstanceData,
    pub frame_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// Every wgpu object created for one render node. Dropping it releases them.
pub struct GpuInstanceResources {
    strategy: Strategy,
    bind_layout: Option<wgpu::BindGroupLayout>,
    shared_mesh: Option<GpuMesh>,
    batches: Vec<GpuBatch>,
}

impl GpuInstanceResources {
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, node: &RenderNode) -> Self {
        let strategy = node.strategy();

        if !strategy.publishes_frame_uniforms() {
            // Software nodes share one mesh; placement comes from the host.
            let shared_mesh = node
                .transform_nodes()
                .first()
                .map(|n| GpuMesh::from_mesh(device, &n.mesh));
            return Self {
                strategy,
                bind_layout: None,
                shared_mesh,
                batches: Vec::new(),
            };
        }

        let bind_layout = create_bind_layout(device, strategy);
        let batches = node
            .batches()
            .iter()
            .map(|batch| upload_batch(device, queue, &bind_layout, batch))
            .collect::<Vec<_>>();

        log::info!(
            "Uploaded {} {} batches ({} instances)",
            batches.len(),
            strategy,
            node.instance_count()
        );

        Self {
            strategy,
            bind_layout: Some(bind_layout),
            shared_mesh: None,
            batches,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn bind_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        self.bind_layout.as_ref()
    }

    pub fn shared_mesh(&self) -> Option<&GpuMesh> {
        self.shared_mesh.as_ref()
    }

    pub fn batches(&self) -> &[GpuBatch] {
        &self.batches
    }

    /// Pushes the uniforms published by the node's last cull.
    pub fn write_frame_uniforms(&self, queue: &wgpu::Queue, node: &RenderNode) {
        for (gpu, batch) in self.batches.iter().zip(node.batches()) {
            queue.write_buffer(&gpu.frame_buffer, 0, bytemuck::bytes_of(batch.frame_uniforms()));
        }
    }

    /// Records one draw per batch. The pipeline must already be set.
    pub fn record_draws(&self, pass: &mut wgpu::RenderPass<'_>) {
        for batch in &self.batches {
            pass.set_bind_group(0, &batch.bind_group, &[]);
            if let GpuInstanceData::VertexStream(buffer) = &batch.instance_data {
                pass.set_vertex_buffer(1, buffer.slice(..));
            }
            batch.mesh.draw(pass);
        }
    }
}

fn frame_uniforms_entry() -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: FRAME_UNIFORMS_BINDING,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(mem::size_of::<FrameUniforms>() as u64),
        },
        count: None,
    }
}

pub fn create_bind_layout(device: &wgpu::Device, strategy: Strategy) -> wgpu::BindGroupLayout {
    let mut entries = vec![frame_uniforms_entry()];
    match strategy {
        Strategy::UniformArray | Strategy::UniformBufferObject => {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: INSTANCE_BLOCK_BINDING,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        Strategy::Texture => {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: INSTANCE_TEXTURE_UNIT,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: INSTANCE_SAMPLER_BINDING,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            });
        }
        Strategy::Software | Strategy::VertexAttribute => {}
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("InstancingBindLayout"),
        entries: &entries,
    })
}

fn upload_batch(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    batch: &Batch,
) -> GpuBatch {
    let mesh = match batch.geometry() {
        BatchGeometry::Mesh(mesh) => GpuMesh::from_mesh(device, mesh),
        BatchGeometry::Instanced(drawable) => GpuMesh::from_vertices(
            device,
            drawable.vertices(),
            std::slice::from_ref(drawable.primitive()),
        ),
    };

    let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("FrameUniformsBuffer"),
        contents: bytemuck::bytes_of(batch.frame_uniforms()),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    let instance_data = match batch.payload() {
        InstancePayload::UniformArray(payload) => {
            GpuInstanceData::UniformBuffer(device.create_buffer_init(
                &wgpu::util::BufferInitDescriptor {
                    label: Some("InstanceModelMatrixBuffer"),
                    contents: &payload.array().to_bytes(),
                    usage: wgpu::BufferUsages::UNIFORM,
                },
            ))
        }
        InstancePayload::UniformBuffer(payload) => {
            GpuInstanceData::UniformBuffer(device.create_buffer_init(
                &wgpu::util::BufferInitDescriptor {
                    label: Some("InstanceDataBuffer"),
                    contents: payload.bytes(),
                    usage: payload.usage(),
                },
            ))
        }
        InstancePayload::Texture(payload) => upload_matrix_texture(device, queue, payload),
        InstancePayload::VertexAttribute(stream) => {
            GpuInstanceData::VertexStream(device.create_buffer_init(
                &wgpu::util::BufferInitDescriptor {
                    label: Some("InstanceMatrixStream"),
                    contents: stream.bytes(),
                    usage: wgpu::BufferUsages::VERTEX,
                },
            ))
        }
    };

    let mut entries = vec![wgpu::BindGroupEntry {
        binding: FRAME_UNIFORMS_BINDING,
        resource: frame_buffer.as_entire_binding(),
    }];
    match &instance_data {
        GpuInstanceData::UniformBuffer(buffer) => entries.push(wgpu::BindGroupEntry {
            binding: INSTANCE_BLOCK_BINDING,
            resource: buffer.as_entire_binding(),
        }),
        GpuInstanceData::Texture { view, sampler, .. } => {
            entries.push(wgpu::BindGroupEntry {
                binding: INSTANCE_TEXTURE_UNIT,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: INSTANCE_SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        GpuInstanceData::VertexStream(_) => {}
    }

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("InstancingBindGroup"),
        layout,
        entries: &entries,
    });

    GpuBatch {
        mesh,
        instance_data,
        frame_buffer,
        bind_group,
    }
}

fn upload_matrix_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    payload: &TexturePayload,
) -> GpuInstanceData {
    let size = payload.extent();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("InstanceMatrixTexture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: payload.format(),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        payload.bytes(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(payload.bytes_per_row()),
            rows_per_image: Some(payload.height()),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&supported_sampler(
        payload.sampler_descriptor(),
        device.features(),
    ));

    GpuInstanceData::Texture {
        texture,
        view,
        sampler,
    }
}

/// Swaps border clamping for edge clamping on devices without it.
pub fn supported_sampler(
    mut descriptor: wgpu::SamplerDescriptor<'static>,
    features: wgpu::Features,
) -> wgpu::SamplerDescriptor<'static> {
    if features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER) {
        return descriptor;
    }
    log::warn!("Device lacks ADDRESS_MODE_CLAMP_TO_BORDER. Clamping matrix texture to edge.");
    for mode in [
        &mut descriptor.address_mode_u,
        &mut descriptor.address_mode_v,
        &mut descriptor.address_mode_w,
    ] {
        if *mode == wgpu::AddressMode::ClampToBorder {
            *mode = wgpu::AddressMode::ClampToEdge;
        }
    }
    descriptor.border_color = None;
    descriptor
}

/// Headless device for uploads outside a windowed app.
pub async fn request_headless_device() -> Result<(wgpu::Device, wgpu::Queue), GpuInitError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await?;

    let required_features = adapter.features() & wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;

    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("InstancingDevice"),
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(GpuInitError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn is_send_sync_error<E: std::error::Error + Send + Sync + 'static>() {}

    #[test]
    fn init_failures_are_typed_errors() {
        is_send_sync_error::<GpuInitError>();
        is_send_sync_error::<crate::InstancingError>();
    }

    #[test]
    fn border_clamp_falls_back_without_feature() {
        let payload = TexturePayload::pack(&[Mat4::IDENTITY], 1);
        let sampler = supported_sampler(payload.sampler_descriptor(), wgpu::Features::empty());
        assert_eq!(sampler.address_mode_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(sampler.address_mode_v, wgpu::AddressMode::ClampToEdge);
        assert_eq!(sampler.border_color, None);
        assert_eq!(sampler.mag_filter, wgpu::FilterMode::Nearest);
    }

    #[test]
    fn border_clamp_is_kept_when_supported() {
        let payload = TexturePayload::pack(&[Mat4::IDENTITY], 1);
        let sampler = supported_sampler(
            payload.sampler_descriptor(),
            wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER,
        );
        assert_eq!(sampler.address_mode_u, wgpu::AddressMode::ClampToBorder);
        assert!(sampler.border_color.is_some());
    }
}
