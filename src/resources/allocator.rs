//! GPU memory allocator.
//!
//! Owns every long-lived device buffer and image behind generation-checked
//! handles. A [`DeviceAddress`] is the opaque 64-bit value other GPU records
//! embed to reference a buffer (slot index in the low half, generation in the
//! high half); it is resolved to a live `wgpu::Buffer` only at bind/copy
//! time and rejected once the slot has been freed or reused. Out-of-memory is
//! fatal for this core: an allocation failure is reported with its size and
//! purpose and there is no retry or eviction.

use crate::error::RenderError;

/// Opaque device-visible reference to an allocated buffer.
///
/// Never a raw pointer: the value only has meaning to the allocator that
/// minted it. A freshly minted address is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub u64);

impl DeviceAddress {
    fn pack(index: u32, generation: u32) -> Self {
        DeviceAddress(((generation as u64) << 32) | index as u64)
    }

    fn unpack(self) -> (u32, u32) {
        (self.0 as u32, (self.0 >> 32) as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

impl BufferHandle {
    pub fn address(self) -> DeviceAddress {
        DeviceAddress::pack(self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    index: u32,
    generation: u32,
}

/// Generation-checked slot arena. Pure bookkeeping, no GPU types, so the
/// handle discipline is testable on its own.
#[derive(Debug)]
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> (u32, u32) {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            (index, slot.generation)
        } else {
            // Generations start at 1 so a packed address is never zero.
            self.slots.push(Slot {
                generation: 1,
                value: Some(value),
            });
            (self.slots.len() as u32 - 1, 1)
        }
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref()
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        slot.generation += 1;
        self.free.push(index);
        value
    }
}

#[derive(Debug)]
pub(crate) struct BufferEntry {
    pub buffer: wgpu::Buffer,
    pub size: u64,
}

/// An allocated image together with its default view.
#[derive(Debug)]
pub struct ImageEntry {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: [u32; 2],
    pub format: wgpu::TextureFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub size: [u32; 2],
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

#[derive(Debug)]
pub struct GpuAllocator {
    device: wgpu::Device,
    buffers: Arena<BufferEntry>,
    images: Arena<ImageEntry>,
    bytes_allocated: u64,
}

impl GpuAllocator {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            device: device.clone(),
            buffers: Arena::new(),
            images: Arena::new(),
            bytes_allocated: 0,
        }
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn allocate_buffer(
        &mut self,
        size: u64,
        usage: wgpu::BufferUsages,
        purpose: &str,
    ) -> Result<BufferHandle, RenderError> {
        self.device
            .push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(purpose),
            size,
            usage,
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("buffer allocation failed ({purpose}, {size} bytes): {error}");
            return Err(RenderError::OutOfMemory {
                purpose: purpose.to_string(),
                size,
            });
        }
        self.bytes_allocated += size;
        let (index, generation) = self.buffers.insert(BufferEntry { buffer, size });
        Ok(BufferHandle { index, generation })
    }

    pub fn allocate_image(
        &mut self,
        desc: ImageDesc,
        purpose: &str,
    ) -> Result<ImageHandle, RenderError> {
        let byte_estimate =
            desc.size[0] as u64 * desc.size[1] as u64 * desc.format.block_copy_size(None).unwrap_or(4) as u64;
        self.device
            .push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(purpose),
            size: wgpu::Extent3d {
                width: desc.size[0].max(1),
                height: desc.size[1].max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("image allocation failed ({purpose}, ~{byte_estimate} bytes): {error}");
            return Err(RenderError::OutOfMemory {
                purpose: purpose.to_string(),
                size: byte_estimate,
            });
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.bytes_allocated += byte_estimate;
        let (index, generation) = self.images.insert(ImageEntry {
            texture,
            view,
            size: desc.size,
            format: desc.format,
        });
        Ok(ImageHandle { index, generation })
    }

    pub fn buffer(&self, handle: BufferHandle) -> Result<&wgpu::Buffer, RenderError> {
        self.buffers
            .get(handle.index, handle.generation)
            .map(|e| &e.buffer)
            .ok_or(RenderError::StaleAddress {
                address: handle.address().0,
            })
    }

    pub fn buffer_size(&self, handle: BufferHandle) -> Result<u64, RenderError> {
        self.buffers
            .get(handle.index, handle.generation)
            .map(|e| e.size)
            .ok_or(RenderError::StaleAddress {
                address: handle.address().0,
            })
    }

    /// Resolve an opaque address back to its buffer, failing when the
    /// referenced allocation no longer exists.
    pub fn resolve(&self, address: DeviceAddress) -> Result<&wgpu::Buffer, RenderError> {
        let (index, generation) = address.unpack();
        self.buffers
            .get(index, generation)
            .map(|e| &e.buffer)
            .ok_or(RenderError::StaleAddress { address: address.0 })
    }

    pub fn is_live(&self, address: DeviceAddress) -> bool {
        let (index, generation) = address.unpack();
        self.buffers.get(index, generation).is_some()
    }

    pub fn image(&self, handle: ImageHandle) -> Result<&ImageEntry, RenderError> {
        self.images
            .get(handle.index, handle.generation)
            .ok_or(RenderError::StaleAddress {
                address: DeviceAddress::pack(handle.index, handle.generation).0,
            })
    }

    pub fn free_buffer(&mut self, handle: BufferHandle) {
        match self.buffers.remove(handle.index, handle.generation) {
            Some(entry) => {
                self.bytes_allocated = self.bytes_allocated.saturating_sub(entry.size);
                entry.buffer.destroy();
            }
            None => log::warn!("free_buffer called with a stale handle"),
        }
    }

    pub fn free_image(&mut self, handle: ImageHandle) {
        match self.images.remove(handle.index, handle.generation) {
            Some(entry) => {
                let bytes = entry.size[0] as u64
                    * entry.size[1] as u64
                    * entry.format.block_copy_size(None).unwrap_or(4) as u64;
                self.bytes_allocated = self.bytes_allocated.saturating_sub(bytes);
                entry.texture.destroy();
            }
            None => log::warn!("free_image called with a stale handle"),
        }
    }

    pub fn bytes_allocated(&self) -> u64 {
        self.bytes_allocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_detects_stale_generations() {
        let mut arena: Arena<&str> = Arena::new();
        let (i, g) = arena.insert("first");
        assert_eq!(arena.get(i, g), Some(&"first"));
        assert_eq!(arena.remove(i, g), Some("first"));
        assert_eq!(arena.get(i, g), None);
        // The slot is reused with a new generation; the old handle stays dead.
        let (i2, g2) = arena.insert("second");
        assert_eq!(i2, i);
        assert_ne!(g2, g);
        assert_eq!(arena.get(i, g), None);
        assert_eq!(arena.get(i2, g2), Some(&"second"));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut arena: Arena<u32> = Arena::new();
        let (i, g) = arena.insert(7);
        assert!(arena.remove(i, g).is_some());
        assert!(arena.remove(i, g).is_none());
    }

    #[test]
    fn address_roundtrip() {
        let address = DeviceAddress::pack(42, 3);
        assert_eq!(address.unpack(), (42, 3));
        assert_ne!(address.0, 0);
    }

    #[test]
    fn first_minted_address_is_nonzero() {
        let mut arena: Arena<u32> = Arena::new();
        let (index, generation) = arena.insert(0);
        assert_ne!(DeviceAddress::pack(index, generation).0, 0);
    }
}
