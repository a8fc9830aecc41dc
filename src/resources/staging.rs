//! Batched host-to-device uploads.
//!
//! Copies are queued against allocator handles and emitted as one batch by
//! [`StagingUploader::flush`], which is the only place handles are resolved
//! to live buffers. Staged data is valid to read on the device only after
//! the encoder that flushed it has been submitted and completed.

use crate::error::RenderError;
use crate::resources::allocator::{BufferHandle, GpuAllocator, ImageHandle};

fn pad_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

struct BufferUpload {
    staging: wgpu::Buffer,
    dst: BufferHandle,
    dst_offset: u64,
    size: u64,
}

struct ImageUpload {
    staging: wgpu::Buffer,
    dst: ImageHandle,
    bytes_per_row: u32,
    size: [u32; 2],
}

#[derive(Default)]
pub struct StagingUploader {
    buffers: Vec<BufferUpload>,
    images: Vec<ImageUpload>,
}

impl StagingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a copy of `data` into `dst` at `dst_offset`. The copy size is
    /// padded up to wgpu's 4-byte copy alignment; destination buffers must
    /// leave room for the padding (allocation sizes in this crate are always
    /// 4-aligned).
    pub fn stage_buffer(
        &mut self,
        allocator: &GpuAllocator,
        dst: BufferHandle,
        dst_offset: u64,
        data: &[u8],
    ) -> Result<(), RenderError> {
        // Resolve now to reject stale handles early; resolved again at flush.
        allocator.buffer(dst)?;
        let padded = pad_to(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT);
        let staging = allocator.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging upload"),
            size: padded,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        staging
            .slice(..)
            .get_mapped_range_mut()[..data.len()]
            .copy_from_slice(data);
        staging.unmap();
        self.buffers.push(BufferUpload {
            staging,
            dst,
            dst_offset,
            size: padded,
        });
        Ok(())
    }

    /// Queue a full-image upload of tightly packed texel `data`
    /// (`bytes_per_pixel` per texel). Rows are repacked to wgpu's 256-byte
    /// row alignment in the staging buffer.
    pub fn stage_image(
        &mut self,
        allocator: &GpuAllocator,
        dst: ImageHandle,
        data: &[u8],
        size: [u32; 2],
        bytes_per_pixel: u32,
    ) -> Result<(), RenderError> {
        allocator.image(dst)?;
        let unpadded_row = size[0] as u64 * bytes_per_pixel as u64;
        debug_assert_eq!(data.len() as u64, unpadded_row * size[1] as u64);
        let padded_row = pad_to(unpadded_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64);
        let staging = allocator.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging image upload"),
            size: padded_row * size[1] as u64,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        {
            let mut mapped = staging.slice(..).get_mapped_range_mut();
            for row in 0..size[1] as usize {
                let src = row * unpadded_row as usize;
                let dst_start = row * padded_row as usize;
                mapped[dst_start..dst_start + unpadded_row as usize]
                    .copy_from_slice(&data[src..src + unpadded_row as usize]);
            }
        }
        staging.unmap();
        self.images.push(ImageUpload {
            staging,
            dst,
            bytes_per_row: padded_row as u32,
            size,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.images.is_empty()
    }

    /// Emit every queued copy into `encoder` and clear the queue. The
    /// transient staging buffers are released once the submission retires.
    pub fn flush(
        &mut self,
        allocator: &GpuAllocator,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<(), RenderError> {
        for upload in self.buffers.drain(..) {
            let dst = allocator.buffer(upload.dst)?;
            encoder.copy_buffer_to_buffer(&upload.staging, 0, dst, upload.dst_offset, upload.size);
        }
        for upload in self.images.drain(..) {
            let entry = allocator.image(upload.dst)?;
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: &upload.staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(upload.bytes_per_row),
                        rows_per_image: Some(upload.size[1]),
                    },
                },
                wgpu::TexelCopyTextureInfo {
                    texture: &entry.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: upload.size[0],
                    height: upload.size[1],
                    depth_or_array_layers: 1,
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::pad_to;

    #[test]
    fn padding_respects_copy_alignments() {
        assert_eq!(pad_to(0, 4), 0);
        assert_eq!(pad_to(2, 4), 4);
        assert_eq!(pad_to(4, 4), 4);
        assert_eq!(pad_to(300, 256), 512);
    }
}
