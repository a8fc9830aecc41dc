//! Bindless texture table.
//!
//! A fixed-capacity `binding_array` of 2D textures plus one shared sampler,
//! exposed to the shading programs as group 1. Materials select a texture by
//! integer slot. Registration overwrites slots `0..N-1` in one batched
//! bind-group build; slots past the registered count stay unbound
//! (`PARTIALLY_BOUND_BINDING_ARRAY`) and are never sampled because no
//! material may reference them. Re-registering while a previous frame is
//! still in flight is safe: submissions hold their own reference to the bind
//! group they were recorded with, so in-flight draws keep seeing the table
//! contents of their recording time.

use std::num::NonZeroU32;

use crate::error::RenderError;
use crate::resources::texture::{Texture, create_default_sampler};

pub struct TextureTable {
    capacity: u32,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    bind_group: Option<wgpu::BindGroup>,
    registered: u32,
}

impl TextureTable {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture table layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: NonZeroU32::new(capacity),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        Self {
            capacity,
            layout,
            sampler: create_default_sampler(device),
            bind_group: None,
            registered: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots currently holding a texture.
    pub fn registered(&self) -> u32 {
        self.registered
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Overwrite slots `0..textures.len()` with the given textures, in order.
    ///
    /// Must be called after the textures' uploads were staged and before the
    /// first draw referencing a texture slot. Registering more textures than
    /// the table holds is a configuration error.
    pub fn register(
        &mut self,
        device: &wgpu::Device,
        textures: &[&Texture],
    ) -> Result<(), RenderError> {
        if textures.len() as u32 > self.capacity {
            return Err(RenderError::TextureTableOverflow {
                requested: textures.len() as u32,
                capacity: self.capacity,
            });
        }
        let views: Vec<&wgpu::TextureView> = textures.iter().map(|t| &t.view).collect();
        // The previous bind group is dropped here; submissions recorded
        // against it keep it alive until they retire.
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture table"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureViewArray(&views),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
        self.registered = textures.len() as u32;
        log::info!("texture table: registered {} of {} slots", self.registered, self.capacity);
        Ok(())
    }

    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.bind_group.as_ref()
    }

    /// Drop the descriptor bindings. Must happen before the underlying
    /// images are freed.
    pub fn release(&mut self) {
        self.bind_group = None;
        self.registered = 0;
    }
}
