//! The geometry raster pipeline.
//!
//! One pipeline for every mesh in the scene: vertex data comes from the
//! shared vertex arena, instance and material records are pulled from the
//! scene storage buffers, textures from the bindless table. Per-draw data
//! travels as push constants.

use std::path::PathBuf;

use crate::error::RenderError;
use crate::gbuffer::GBuffer;
use crate::resources::allocator::GpuAllocator;
use crate::scene::SceneResource;
use crate::shaderio::{PushConstants, Vertex};

pub struct GeometryPipeline {
    scene_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipeline: wgpu::RenderPipeline,
}

impl GeometryPipeline {
    pub fn new(
        device: &wgpu::Device,
        table_layout: &wgpu::BindGroupLayout,
        shader: &wgpu::ShaderModule,
    ) -> Result<Self, RenderError> {
        let scene_layout = scene_bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("geometry pipeline layout"),
            bind_group_layouts: &[&scene_layout, table_layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::VERTEX_FRAGMENT,
                range: 0..PushConstants::SIZE,
            }],
        });
        let pipeline = build_pipeline(device, &pipeline_layout, shader)?;
        Ok(Self {
            scene_layout,
            pipeline_layout,
            pipeline,
        })
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn scene_layout(&self) -> &wgpu::BindGroupLayout {
        &self.scene_layout
    }

    /// Swap in a freshly compiled shader. The old pipeline stays in place
    /// when the new module turns out to be incompatible, so a bad hot
    /// reload never leaves a null-bound stage.
    pub fn rebuild(
        &mut self,
        device: &wgpu::Device,
        shader: &wgpu::ShaderModule,
    ) -> Result<(), RenderError> {
        self.pipeline = build_pipeline(device, &self.pipeline_layout, shader)?;
        Ok(())
    }

    /// Bind group over the scene's current buffers. Rebuilt by the frame
    /// pipeline whenever any of the embedded addresses changes.
    pub fn make_scene_bind_group(
        &self,
        device: &wgpu::Device,
        allocator: &GpuAllocator,
        scene: &SceneResource,
    ) -> Result<wgpu::BindGroup, RenderError> {
        let buffers = scene.buffers()?;
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene bind group"),
            layout: &self.scene_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: allocator.buffer(buffers.scene_info)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: allocator.buffer(buffers.instances)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: allocator.buffer(buffers.materials)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: allocator.buffer(buffers.meshes)?.as_entire_binding(),
                },
            ],
        }))
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn scene_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("scene bind group layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage_entry(1),
            storage_entry(2),
            storage_entry(3),
        ],
    })
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
) -> Result<wgpu::RenderPipeline, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("geometry pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: GBuffer::RENDERED_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Double-sided rendering, same as the viewer's raster defaults.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: GBuffer::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(RenderError::ShaderCompile {
            path: PathBuf::from("foundation.wgsl"),
            diagnostic: error.to_string(),
        }),
        None => Ok(pipeline),
    }
}
