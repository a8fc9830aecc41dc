//! Procedural sky pass.
//!
//! A full-screen compute dispatch writing directly into the linear HDR
//! target, run before the geometry pass when the scene's sky toggle is on.
//! The program is embedded at build time and not hot-reloadable.

use cgmath::{Matrix4, SquareMatrix};

use crate::camera::{Camera, Projection, view_proj};
use crate::config::SkyParams;
use crate::gbuffer::{GBuffer, TargetImage};
use crate::shader::compile_embedded;

const SKY_SHADER: &str = include_str!("../../shaders/sky.wgsl");

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct SkyUniform {
    inv_view_proj: [[f32; 4]; 4],
    camera_position: [f32; 3],
    _pad0: f32,
    zenith_color: [f32; 3],
    sun_intensity: f32,
    horizon_color: [f32; 3],
    _pad1: f32,
    ground_color: [f32; 3],
    _pad2: f32,
    sun_direction: [f32; 3],
    _pad3: f32,
}

pub struct SkyPass {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    uniform: wgpu::Buffer,
    // Keyed by the gbuffer generation: a resize invalidates the stored
    // descriptor and forces a re-registration.
    bind_group: Option<(u64, wgpu::BindGroup)>,
}

impl SkyPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let module = compile_embedded(device, "sky.wgsl", SKY_SHADER);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sky pass layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: GBuffer::RENDERED_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sky pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sky pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sky uniform"),
            size: std::mem::size_of::<SkyUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            pipeline,
            layout,
            uniform,
            bind_group: None,
        }
    }

    pub fn run(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        gbuffer: &GBuffer,
        camera: &Camera,
        projection: &Projection,
        params: &SkyParams,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let vp = view_proj(camera, projection);
        let inv_view_proj = vp.invert().unwrap_or_else(Matrix4::identity);
        queue.write_buffer(
            &self.uniform,
            0,
            bytemuck::bytes_of(&SkyUniform {
                inv_view_proj: inv_view_proj.into(),
                camera_position: camera.eye.into(),
                _pad0: 0.0,
                zenith_color: params.zenith_color,
                sun_intensity: params.sun_intensity,
                horizon_color: params.horizon_color,
                _pad1: 0.0,
                ground_color: params.ground_color,
                _pad2: 0.0,
                sun_direction: params.sun_direction,
                _pad3: 0.0,
            }),
        );

        if self
            .bind_group
            .as_ref()
            .is_none_or(|(generation, _)| *generation != gbuffer.generation())
        {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sky bind group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            gbuffer.view(TargetImage::Rendered),
                        ),
                    },
                ],
            });
            self.bind_group = Some((gbuffer.generation(), bind_group));
        }
        let (_, bind_group) = self.bind_group.as_ref().unwrap();

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sky pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        let [width, height] = gbuffer.size();
        pass.dispatch_workgroups(width.div_ceil(8), height.div_ceil(8), 1);
    }
}
