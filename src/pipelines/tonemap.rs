//! Tonemap post-process pass.
//!
//! Reads the linear HDR target, writes the display-ready target. The curve
//! and exposure come from the user-adjustable [`TonemapSettings`] and are
//! pushed as constants each dispatch. Embedded program only.

use crate::config::TonemapSettings;
use crate::gbuffer::{GBuffer, TargetImage};
use crate::shader::compile_embedded;

const TONEMAP_SHADER: &str = include_str!("../../shaders/tonemap.wgsl");

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct TonemapParams {
    method: u32,
    exposure: f32,
    gamma: f32,
    _pad: u32,
}

pub struct TonemapPass {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    bind_group: Option<(u64, wgpu::BindGroup)>,
}

impl TonemapPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let module = compile_embedded(device, "tonemap.wgsl", TONEMAP_SHADER);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tonemap pass layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: GBuffer::TONEMAPPED_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tonemap pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::COMPUTE,
                range: 0..std::mem::size_of::<TonemapParams>() as u32,
            }],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("tonemap pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });
        Self {
            pipeline,
            layout,
            bind_group: None,
        }
    }

    pub fn run(
        &mut self,
        device: &wgpu::Device,
        gbuffer: &GBuffer,
        settings: &TonemapSettings,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        if self
            .bind_group
            .as_ref()
            .is_none_or(|(generation, _)| *generation != gbuffer.generation())
        {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tonemap bind group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            gbuffer.view(TargetImage::Rendered),
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            gbuffer.view(TargetImage::Tonemapped),
                        ),
                    },
                ],
            });
            self.bind_group = Some((gbuffer.generation(), bind_group));
        }
        let (_, bind_group) = self.bind_group.as_ref().unwrap();

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("tonemap pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_push_constants(
            0,
            bytemuck::bytes_of(&TonemapParams {
                method: settings.method.as_u32(),
                exposure: settings.exposure,
                gamma: settings.gamma,
                _pad: 0,
            }),
        );
        let [width, height] = gbuffer.size();
        pass.dispatch_workgroups(width.div_ceil(8), height.div_ceil(8), 1);
    }
}
