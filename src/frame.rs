//! The frame render pipeline.
//!
//! [`FrameRenderer`] owns every component of the core and drives the
//! strictly ordered per-frame sequence: scene-uniform refresh (fenced on
//! both sides), optional procedural sky, geometry raster over all instances
//! in array order, tonemap post-process. Each cross-pass dependency is
//! declared into the [`BarrierTimeline`] as it is encoded and validated in
//! debug builds.
//!
//! The renderer implements [`Element`] and is driven by the out-of-scope
//! host loop; see the `tests/` directory for a headless host.

use std::time::{Duration, Instant};

use crate::barrier::{Barrier, BarrierTimeline, ImageLayout, Pass, Stage};
use crate::config::{RendererConfig, SkyParams, TonemapSettings};
use crate::context::Context;
use crate::element::{Element, UiAction};
use crate::error::RenderError;
use crate::gbuffer::{GBuffer, TargetImage};
use crate::pipelines::geometry::GeometryPipeline;
use crate::pipelines::sky::SkyPass;
use crate::pipelines::tonemap::TonemapPass;
use crate::resources::allocator::{DeviceAddress, GpuAllocator};
use crate::resources::staging::StagingUploader;
use crate::resources::texture::Texture;
use crate::scene::SceneResource;
use crate::shader::{CompileState, ShaderCompiler};
use crate::shaderio::PushConstants;
use crate::texture_table::TextureTable;

const GEOMETRY_SHADER: &str = "foundation.wgsl";
const GEOMETRY_SHADER_EMBEDDED: &str = include_str!("../shaders/foundation.wgsl");

/// Override channels start disabled; any value below zero means "use the
/// material's own factor".
const OVERRIDE_DISABLED: [f32; 2] = [-0.01, -0.01];

pub struct FrameRenderer {
    pub scene: SceneResource,
    allocator: GpuAllocator,
    uploader: StagingUploader,
    texture_table: TextureTable,
    gbuffer: GBuffer,
    compiler: ShaderCompiler,
    geometry: GeometryPipeline,
    sky: SkyPass,
    tonemap: TonemapPass,
    timeline: BarrierTimeline,
    tonemap_settings: TonemapSettings,
    sky_params: SkyParams,
    metallic_roughness_override: [f32; 2],
    // Scene bind group keyed by the addresses it embeds; any reallocation
    // changes an address and forces a rebuild before the next draw.
    scene_bind_group: Option<([DeviceAddress; 4], wgpu::BindGroup)>,
}

impl FrameRenderer {
    pub fn new(ctx: &Context, config: &RendererConfig) -> Result<Self, RenderError> {
        let started = Instant::now();
        let mut allocator = GpuAllocator::new(&ctx.device);
        let gbuffer = GBuffer::new(&mut allocator, config.target_size)?;
        let texture_table = TextureTable::new(&ctx.device, config.texture_table_capacity);

        let mut compiler = ShaderCompiler::new();
        for path in &config.shader_search_paths {
            compiler.add_search_path(path.clone());
        }
        let module = compiler.compile(&ctx.device, GEOMETRY_SHADER, GEOMETRY_SHADER_EMBEDDED);
        let geometry = GeometryPipeline::new(&ctx.device, texture_table.layout(), &module)?;
        let sky = SkyPass::new(&ctx.device);
        let tonemap = TonemapPass::new(&ctx.device);

        let mut scene = SceneResource::new();
        scene.set_background_color(config.background_color);
        scene.set_sky(config.use_sky);
        scene
            .projection
            .resize(config.target_size[0], config.target_size[1]);

        log::debug!("frame renderer created in {:?}", started.elapsed());
        Ok(Self {
            scene,
            allocator,
            uploader: StagingUploader::new(),
            texture_table,
            gbuffer,
            compiler,
            geometry,
            sky,
            tonemap,
            timeline: BarrierTimeline::new(),
            tonemap_settings: config.tonemap,
            sky_params: config.sky,
            metallic_roughness_override: OVERRIDE_DISABLED,
            scene_bind_group: None,
        })
    }

    pub fn allocator(&self) -> &GpuAllocator {
        &self.allocator
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn texture_table(&self) -> &TextureTable {
        &self.texture_table
    }

    pub fn compiler(&self) -> &ShaderCompiler {
        &self.compiler
    }

    /// The synchronization declarations of the most recently encoded frame.
    pub fn barrier_timeline(&self) -> &BarrierTimeline {
        &self.timeline
    }

    pub fn tonemap_settings(&self) -> &TonemapSettings {
        &self.tonemap_settings
    }

    /// Decode and upload a texture, returning its slot in the scene's
    /// texture list (and thus in the bindless table after registration).
    pub fn add_texture_from_bytes(
        &mut self,
        bytes: &[u8],
        purpose: &str,
        format: Option<&str>,
    ) -> Result<u32, RenderError> {
        let texture =
            Texture::from_bytes(&mut self.allocator, &mut self.uploader, bytes, purpose, format)?;
        Ok(self.scene.add_texture(texture))
    }

    pub fn add_texture_from_rgba8(
        &mut self,
        size: [u32; 2],
        data: &[u8],
        purpose: &str,
    ) -> Result<u32, RenderError> {
        let texture =
            Texture::from_rgba8(&mut self.allocator, &mut self.uploader, size, data, purpose)?;
        Ok(self.scene.add_texture(texture))
    }

    /// Upload (or re-upload after further imports) the scene and register
    /// its textures. Blocks until the upload batch has completed on the
    /// device.
    pub fn upload_scene(&mut self, ctx: &Context) -> Result<(), RenderError> {
        let started = Instant::now();
        self.scene.upload(&mut self.allocator, &mut self.uploader)?;
        self.register_scene_textures(ctx)?;

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene upload"),
            });
        self.uploader.flush(&self.allocator, &mut encoder)?;
        ctx.queue.submit(std::iter::once(encoder.finish()));
        ctx.wait_idle(Duration::from_secs(10))?;
        self.scene_bind_group = None;
        log::debug!("scene upload finished in {:?}", started.elapsed());
        Ok(())
    }

    fn register_scene_textures(&mut self, ctx: &Context) -> Result<(), RenderError> {
        // The binding array must not be empty even for an untextured scene;
        // slot 0 falls back to a white pixel that no material references.
        if self.scene.textures().is_empty() {
            let fallback = Texture::solid_color(
                &mut self.allocator,
                &mut self.uploader,
                [255, 255, 255, 255],
                "texture table fallback",
            )?;
            self.scene.add_texture(fallback);
        }
        let textures: Vec<&Texture> = self.scene.textures().iter().collect();
        self.texture_table.register(&ctx.device, &textures)
    }

    /// Wait for the queue to drain, recompile the geometry shader and swap
    /// the pipeline. On compile failure the embedded program takes over; on
    /// an interface-incompatible module the previous pipeline stays bound.
    pub fn reload_shaders(&mut self, ctx: &Context) -> Result<(), RenderError> {
        ctx.wait_idle(Duration::from_secs(10))?;
        let module = self
            .compiler
            .compile(&ctx.device, GEOMETRY_SHADER, GEOMETRY_SHADER_EMBEDDED);
        if let Err(error) = self.geometry.rebuild(&ctx.device, &module) {
            log::error!("reloaded shader rejected, keeping the previous pipeline: {error}");
        } else if self.compiler.state() == CompileState::Compiled {
            log::info!("shaders reloaded");
        }
        Ok(())
    }

    /// Write the tonemapped target out as a PNG. Intended for the last
    /// frame of a headless run.
    pub fn save_tonemapped(&self, ctx: &Context, path: &std::path::Path) -> Result<(), RenderError> {
        let image = self.read_tonemapped(ctx)?;
        image
            .save(path)
            .map_err(|e| RenderError::Readback(e.to_string()))?;
        log::info!("saved tonemapped frame to {}", path.display());
        Ok(())
    }

    /// Copy the tonemapped target back to the host.
    pub fn read_tonemapped(&self, ctx: &Context) -> Result<image::RgbaImage, RenderError> {
        let [width, height] = self.gbuffer.size();
        let unpadded_row = width as u64 * 4;
        let padded_row =
            unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64)
                * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64;
        let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tonemap readback"),
            size: padded_row * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let entry = self.allocator.image(self.gbuffer.image(TargetImage::Tonemapped))?;
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tonemap readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        readback
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        ctx.wait_idle(Duration::from_secs(10))?;
        pollster::block_on(rx.receive())
            .ok_or_else(|| RenderError::Readback("map callback dropped".into()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let mapped = readback.slice(..).get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_row * height as u64) as usize);
        for row in 0..height as usize {
            let start = row * padded_row as usize;
            pixels.extend_from_slice(&mapped[start..start + unpadded_row as usize]);
        }
        drop(mapped);
        readback.unmap();
        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("readback size mismatch".into()))
    }

    /// Step 1 of the frame: refresh the camera-dependent fields and buffer
    /// addresses of the scene uniform and rewrite it on the device, fenced
    /// on both sides. The block is read by every draw and rewritten every
    /// frame on the same buffer, so both barriers are mandatory.
    fn update_scene_buffer(
        &mut self,
        ctx: &Context,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<(), RenderError> {
        let uniform = self.scene.build_uniform(&self.allocator)?;
        let buffers = *self.scene.buffers()?;

        self.timeline.record_barrier(Barrier::Buffer {
            buffer: buffers.scene_info.address(),
            src: Stage::FragmentShader,
            dst: Stage::Transfer,
        });
        self.uploader.stage_buffer(
            &self.allocator,
            buffers.scene_info,
            0,
            bytemuck::bytes_of(&uniform),
        )?;
        self.uploader.flush(&self.allocator, encoder)?;
        self.timeline.record_pass(Pass::UniformWrite);
        self.timeline.record_barrier(Barrier::Buffer {
            buffer: buffers.scene_info.address(),
            src: Stage::Transfer,
            dst: Stage::FragmentShader,
        });

        let key = [
            buffers.scene_info.address(),
            buffers.instances.address(),
            buffers.meshes.address(),
            buffers.materials.address(),
        ];
        if self
            .scene_bind_group
            .as_ref()
            .is_none_or(|(cached, _)| *cached != key)
        {
            let bind_group =
                self.geometry
                    .make_scene_bind_group(&ctx.device, &self.allocator, &self.scene)?;
            self.scene_bind_group = Some((key, bind_group));
        }
        Ok(())
    }

    /// Step 3 of the frame: rasterize every instance in array order into the
    /// rendered target. No culling, no sorting.
    fn raster_scene(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<(), RenderError> {
        let buffers = *self.scene.buffers()?;
        let scene_address = buffers.scene_info.address().0;
        let background = self.scene.background_color();

        self.timeline.record_barrier(Barrier::Image {
            image: TargetImage::Rendered,
            from: ImageLayout::General,
            to: ImageLayout::ColorAttachment,
        });

        let (_, scene_bind_group) = self
            .scene_bind_group
            .as_ref()
            .ok_or(RenderError::SceneNotUploaded)?;
        let table_bind_group = self
            .texture_table
            .bind_group()
            .ok_or_else(|| RenderError::Config("texture table was never registered".into()))?;
        let vertex_buffer = self.allocator.buffer(buffers.vertices)?;
        let index_buffer = self.allocator.buffer(buffers.indices)?;

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("geometry pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.gbuffer.view(TargetImage::Rendered),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        // The sky pass already filled the target; start from
                        // its output instead of clearing it away.
                        load: if self.scene.use_sky() {
                            wgpu::LoadOp::Load
                        } else {
                            wgpu::LoadOp::Clear(wgpu::Color {
                                r: background[0] as f64,
                                g: background[1] as f64,
                                b: background[2] as f64,
                                a: 1.0,
                            })
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.gbuffer.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(self.geometry.pipeline());
            render_pass.set_bind_group(0, scene_bind_group, &[]);
            // The bindless table is bound once for the whole pass.
            render_pass.set_bind_group(1, table_bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));

            for (i, instance) in self.scene.instances().iter().enumerate() {
                let Some(mesh) = self.scene.meshes().get(instance.mesh_index as usize) else {
                    log::error!("instance {i} references missing mesh {}", instance.mesh_index);
                    continue;
                };
                let Some(material) =
                    self.scene.materials().get(instance.material_index as usize)
                else {
                    log::error!(
                        "instance {i} references missing material {}",
                        instance.material_index
                    );
                    continue;
                };
                if let Some(slot) = material.texture {
                    if slot >= self.texture_table.registered() {
                        log::error!(
                            "instance {i} samples texture slot {slot}, only {} registered; draw skipped",
                            self.texture_table.registered()
                        );
                        continue;
                    }
                }
                if mesh.index_count == 0 {
                    continue;
                }

                let push = PushConstants {
                    scene_address,
                    instance_index: i as u32,
                    _pad0: 0,
                    metallic_roughness_override: self.metallic_roughness_override,
                    _pad1: [0.0; 2],
                    normal_matrix: instance.normal_matrix(),
                };
                render_pass.set_push_constants(
                    wgpu::ShaderStages::VERTEX_FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
                render_pass.set_index_buffer(
                    index_buffer
                        .slice(mesh.index_offset..mesh.index_offset + mesh.index_byte_len()),
                    mesh.index_format,
                );
                render_pass.draw_indexed(0..mesh.index_count, mesh.vertex_offset as i32, 0..1);
            }
        }

        self.timeline.record_pass(Pass::Geometry);
        // Release the target so the compute stage may read what the raster
        // wrote.
        self.timeline.record_barrier(Barrier::Image {
            image: TargetImage::Rendered,
            from: ImageLayout::ColorAttachment,
            to: ImageLayout::General,
        });
        Ok(())
    }

    /// Step 4 of the frame: tonemap into the display target.
    fn post_process(&mut self, ctx: &Context, encoder: &mut wgpu::CommandEncoder) {
        self.tonemap
            .run(&ctx.device, &self.gbuffer, &self.tonemap_settings, encoder);
        self.timeline.record_pass(Pass::Tonemap);
        self.timeline.record_barrier(Barrier::Memory {
            src: Stage::ComputeShader,
            dst: Stage::AllGraphics,
        });
    }
}

impl Element for FrameRenderer {
    fn on_attach(&mut self, ctx: &Context) -> Result<(), RenderError> {
        self.upload_scene(ctx)
    }

    fn on_detach(&mut self, ctx: &Context) {
        if let Err(error) = ctx.wait_idle(Duration::from_secs(10)) {
            log::warn!("detach continued despite an unfinished queue: {error}");
        }
        // Descriptor bindings go first, then the images they referenced.
        self.texture_table.release();
        self.scene_bind_group = None;
        self.gbuffer.free(&mut self.allocator);
        self.scene.free(&mut self.allocator);
        log::debug!(
            "detached with {} bytes still accounted",
            self.allocator.bytes_allocated()
        );
    }

    fn on_resize(&mut self, ctx: &Context, size: [u32; 2]) -> Result<(), RenderError> {
        if self.gbuffer.resize(ctx, &mut self.allocator, size)? {
            self.scene.projection.resize(size[0], size[1]);
        }
        Ok(())
    }

    fn on_render_frame(&mut self, ctx: &Context) -> Result<(), RenderError> {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        self.timeline.begin_frame();
        self.update_scene_buffer(ctx, &mut encoder)?;
        if self.scene.use_sky() {
            self.sky.run(
                &ctx.device,
                &ctx.queue,
                &self.gbuffer,
                &self.scene.camera,
                &self.scene.projection,
                &self.sky_params,
                &mut encoder,
            );
            self.timeline.record_pass(Pass::Sky);
        }
        self.raster_scene(&mut encoder)?;
        self.post_process(ctx, &mut encoder);
        self.timeline.debug_validate();

        ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn on_ui_menu(&mut self, ctx: &Context, action: UiAction) -> Result<(), RenderError> {
        match action {
            UiAction::ReloadShaders => self.reload_shaders(ctx),
            UiAction::SetSky(enabled) => {
                self.scene.set_sky(enabled);
                Ok(())
            }
            UiAction::SetBackgroundColor(color) => {
                self.scene.set_background_color(color);
                Ok(())
            }
            UiAction::SetLight(light) => self.scene.set_light(0, light),
            UiAction::SetTonemap(settings) => {
                self.tonemap_settings = settings;
                Ok(())
            }
            UiAction::SetMetallicRoughnessOverride(value) => {
                self.metallic_roughness_override = value;
                Ok(())
            }
        }
    }
}
