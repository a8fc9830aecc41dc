//! Scene textures.
//!
//! A [`Texture`] pairs an allocator-owned image with the sampler it is bound
//! with. Texel data goes through the staging uploader so all of a scene's
//! uploads land in one batch; nothing here touches the queue directly.

use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

use crate::error::RenderError;
use crate::resources::allocator::{GpuAllocator, ImageDesc, ImageHandle};
use crate::resources::staging::StagingUploader;

#[derive(Debug, Clone)]
pub struct Texture {
    pub image: ImageHandle,
    pub view: wgpu::TextureView,
}

impl Texture {
    /// Load a texture from raw image file contents (PNG, JPEG, ...).
    ///
    /// `format` is an optional file format hint (e.g. "png"); if `None` the
    /// format is auto-detected.
    pub fn from_bytes(
        allocator: &mut GpuAllocator,
        uploader: &mut StagingUploader,
        bytes: &[u8],
        purpose: &str,
        format: Option<&str>,
    ) -> Result<Self, RenderError> {
        let img = match format.and_then(ImageFormat::from_extension) {
            Some(fmt) => load_from_memory_with_format(bytes, fmt),
            None => image::load_from_memory(bytes),
        }
        .map_err(|e| RenderError::Config(format!("cannot decode texture `{purpose}`: {e}")))?;
        Self::from_image(allocator, uploader, &img, purpose)
    }

    pub fn from_image(
        allocator: &mut GpuAllocator,
        uploader: &mut StagingUploader,
        img: &image::DynamicImage,
        purpose: &str,
    ) -> Result<Self, RenderError> {
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        Self::from_rgba8(allocator, uploader, [width, height], &rgba, purpose)
    }

    /// Create a texture from tightly packed RGBA8 texels.
    pub fn from_rgba8(
        allocator: &mut GpuAllocator,
        uploader: &mut StagingUploader,
        size: [u32; 2],
        data: &[u8],
        purpose: &str,
    ) -> Result<Self, RenderError> {
        let image = allocator.allocate_image(
            ImageDesc {
                size,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            },
            purpose,
        )?;
        uploader.stage_image(allocator, image, data, size, 4)?;
        let view = allocator.image(image)?.view.clone();
        Ok(Self { image, view })
    }

    /// A 1x1 single-color texture, used as the table's slot-0 fallback when
    /// a scene carries no textures of its own.
    pub fn solid_color(
        allocator: &mut GpuAllocator,
        uploader: &mut StagingUploader,
        rgba: [u8; 4],
        purpose: &str,
    ) -> Result<Self, RenderError> {
        Self::from_rgba8(allocator, uploader, [1, 1], &rgba, purpose)
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
