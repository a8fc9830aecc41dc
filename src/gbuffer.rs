//! The render target set.
//!
//! Two color attachments plus depth, sized to the viewport: `Rendered` is
//! the linear HDR target the sky and geometry passes produce, `Tonemapped`
//! is the display-ready result of the post-process pass. Resizing recreates
//! the backing images, which invalidates every descriptor referencing the
//! old ones; the `generation` counter is how dependent bind groups notice
//! they must re-register.

use std::time::Duration;

use crate::context::Context;
use crate::error::RenderError;
use crate::resources::allocator::{GpuAllocator, ImageDesc, ImageHandle};

/// Which color target of the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetImage {
    Rendered,
    Tonemapped,
}

pub struct GBuffer {
    size: [u32; 2],
    generation: u64,
    rendered: ImageHandle,
    rendered_view: wgpu::TextureView,
    tonemapped: ImageHandle,
    tonemapped_view: wgpu::TextureView,
    depth: ImageHandle,
    depth_view: wgpu::TextureView,
}

impl GBuffer {
    /// Linear HDR target the scene is rasterized into.
    pub const RENDERED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
    /// Display-ready output of the tonemap pass.
    pub const TONEMAPPED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(allocator: &mut GpuAllocator, size: [u32; 2]) -> Result<Self, RenderError> {
        let (rendered, rendered_view, tonemapped, tonemapped_view, depth, depth_view) =
            Self::allocate_attachments(allocator, size)?;
        Ok(Self {
            size,
            generation: 0,
            rendered,
            rendered_view,
            tonemapped,
            tonemapped_view,
            depth,
            depth_view,
        })
    }

    fn allocate_attachments(
        allocator: &mut GpuAllocator,
        size: [u32; 2],
    ) -> Result<
        (
            ImageHandle,
            wgpu::TextureView,
            ImageHandle,
            wgpu::TextureView,
            ImageHandle,
            wgpu::TextureView,
        ),
        RenderError,
    > {
        let rendered = allocator.allocate_image(
            ImageDesc {
                size,
                format: Self::RENDERED_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING,
            },
            "gbuffer rendered",
        )?;
        let tonemapped = allocator.allocate_image(
            ImageDesc {
                size,
                format: Self::TONEMAPPED_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            },
            "gbuffer tonemapped",
        )?;
        let depth = allocator.allocate_image(
            ImageDesc {
                size,
                format: Self::DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            },
            "gbuffer depth",
        )?;
        let rendered_view = allocator.image(rendered)?.view.clone();
        let tonemapped_view = allocator.image(tonemapped)?.view.clone();
        let depth_view = allocator.image(depth)?.view.clone();
        Ok((
            rendered,
            rendered_view,
            tonemapped,
            tonemapped_view,
            depth,
            depth_view,
        ))
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Bumped every time the attachments are recreated. Descriptor caches
    /// keyed on this value re-register lazily.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn view(&self, target: TargetImage) -> &wgpu::TextureView {
        match target {
            TargetImage::Rendered => &self.rendered_view,
            TargetImage::Tonemapped => &self.tonemapped_view,
        }
    }

    pub fn image(&self, target: TargetImage) -> ImageHandle {
        match target {
            TargetImage::Rendered => self.rendered,
            TargetImage::Tonemapped => self.tonemapped,
        }
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    /// Recreate the attachments at `new_size`. Calling with the current size
    /// is a no-op. Only valid between frames: the wait below drains every
    /// outstanding GPU read of the old attachments before they are freed.
    pub fn resize(
        &mut self,
        ctx: &Context,
        allocator: &mut GpuAllocator,
        new_size: [u32; 2],
    ) -> Result<bool, RenderError> {
        if new_size == self.size {
            return Ok(false);
        }
        ctx.wait_idle(Duration::from_secs(5))?;
        allocator.free_image(self.rendered);
        allocator.free_image(self.tonemapped);
        allocator.free_image(self.depth);
        let (rendered, rendered_view, tonemapped, tonemapped_view, depth, depth_view) =
            Self::allocate_attachments(allocator, new_size)?;
        self.rendered = rendered;
        self.rendered_view = rendered_view;
        self.tonemapped = tonemapped;
        self.tonemapped_view = tonemapped_view;
        self.depth = depth;
        self.depth_view = depth_view;
        self.size = new_size;
        self.generation += 1;
        log::info!(
            "gbuffer resized to {}x{} (generation {})",
            new_size[0],
            new_size[1],
            self.generation
        );
        Ok(true)
    }

    pub fn free(&mut self, allocator: &mut GpuAllocator) {
        allocator.free_image(self.rendered);
        allocator.free_image(self.tonemapped);
        allocator.free_image(self.depth);
    }
}
