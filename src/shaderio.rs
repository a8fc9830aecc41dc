//! GPU-visible record layouts shared with the shading programs.
//!
//! Every struct here is mirrored field-for-field by a WGSL struct in
//! `shaders/`. The layouts are byte-exact contracts: field order, padding and
//! total sizes are pinned by the unit tests at the bottom of this module, so
//! a reordering that would silently desynchronize CPU and GPU fails the
//! build's test run instead of producing garbage on screen.

use crate::resources::allocator::DeviceAddress;

/// Maximum number of punctual lights the scene uniform block can carry.
/// This is a capacity limit of the serialized block, not a hard single-light
/// requirement.
pub const MAX_PUNCTUAL_LIGHTS: usize = 1;

/// One vertex of scene geometry.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Material record as the fragment stage reads it.
///
/// `texture_index` is a slot into the bindless texture table; -1 means the
/// material is untextured.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMaterial {
    pub base_color_factor: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub texture_index: i32,
    pub _pad: f32,
}

/// Mesh record: a region of the shared vertex/index arenas plus the index
/// element width tag (0 = u16, 1 = u32). `index_offset` is in bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMesh {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub index_offset: u32,
    pub index_count: u32,
    pub index_format: u32,
    pub _pad: [u32; 3],
}

/// Instance record: model-to-world transform plus material and mesh indices.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuInstance {
    pub transform: [[f32; 4]; 4],
    pub material_index: u32,
    pub mesh_index: u32,
    pub _pad: [u32; 2],
}

/// Serialized punctual light. `light_type`: 0 point, 1 spot, 2 directional.
/// `cone_angle` is meaningful only for spot lights.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PunctualLight {
    pub position: [f32; 3],
    pub light_type: u32,
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub cone_angle: f32,
}

/// The per-frame scene uniform block.
///
/// The three `*_address` fields are opaque device addresses minted by the
/// allocator; they must be refreshed whenever the referenced buffers are
/// reallocated, before the next submission that reads this block.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub _pad0: f32,
    pub background_color: [f32; 3],
    /// Bool as u32: nonzero enables the procedural sky pass.
    pub use_sky: u32,
    pub instances_address: u64,
    pub meshes_address: u64,
    pub materials_address: u64,
    pub light_count: u32,
    pub _pad1: u32,
    pub lights: [PunctualLight; MAX_PUNCTUAL_LIGHTS],
}

impl SceneUniform {
    pub fn addresses(&self) -> [DeviceAddress; 3] {
        [
            DeviceAddress(self.instances_address),
            DeviceAddress(self.meshes_address),
            DeviceAddress(self.materials_address),
        ]
    }
}

/// Per-draw push constants.
///
/// `normal_matrix` columns are padded to vec4 to match the WGSL mat3x3
/// stride of 16 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PushConstants {
    pub scene_address: u64,
    pub instance_index: u32,
    pub _pad0: u32,
    pub metallic_roughness_override: [f32; 2],
    pub _pad1: [f32; 2],
    pub normal_matrix: [[f32; 4]; 3],
}

impl PushConstants {
    pub const SIZE: u32 = std::mem::size_of::<PushConstants>() as u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 32);
    }

    #[test]
    fn material_record_layout() {
        assert_eq!(size_of::<GpuMaterial>(), 32);
        assert_eq!(offset_of!(GpuMaterial, metallic), 16);
        assert_eq!(offset_of!(GpuMaterial, texture_index), 24);
    }

    #[test]
    fn mesh_record_layout() {
        assert_eq!(size_of::<GpuMesh>(), 32);
    }

    #[test]
    fn instance_record_layout() {
        assert_eq!(size_of::<GpuInstance>(), 80);
        assert_eq!(offset_of!(GpuInstance, material_index), 64);
        // Storage array stride must stay a multiple of 16.
        assert_eq!(size_of::<GpuInstance>() % 16, 0);
    }

    #[test]
    fn light_record_layout() {
        assert_eq!(size_of::<PunctualLight>(), 48);
        assert_eq!(offset_of!(PunctualLight, light_type), 12);
        assert_eq!(offset_of!(PunctualLight, direction), 16);
        assert_eq!(offset_of!(PunctualLight, intensity), 28);
        assert_eq!(offset_of!(PunctualLight, cone_angle), 44);
    }

    #[test]
    fn scene_uniform_field_order_is_the_wire_contract() {
        assert_eq!(offset_of!(SceneUniform, view_proj), 0);
        assert_eq!(offset_of!(SceneUniform, camera_position), 64);
        assert_eq!(offset_of!(SceneUniform, background_color), 80);
        assert_eq!(offset_of!(SceneUniform, use_sky), 92);
        assert_eq!(offset_of!(SceneUniform, instances_address), 96);
        assert_eq!(offset_of!(SceneUniform, meshes_address), 104);
        assert_eq!(offset_of!(SceneUniform, materials_address), 112);
        assert_eq!(offset_of!(SceneUniform, light_count), 120);
        assert_eq!(offset_of!(SceneUniform, lights), 128);
        assert_eq!(size_of::<SceneUniform>(), 176);
    }

    #[test]
    fn push_constants_fit_the_declared_range() {
        assert_eq!(offset_of!(PushConstants, scene_address), 0);
        assert_eq!(offset_of!(PushConstants, instance_index), 8);
        assert_eq!(offset_of!(PushConstants, metallic_roughness_override), 16);
        assert_eq!(offset_of!(PushConstants, normal_matrix), 32);
        assert_eq!(size_of::<PushConstants>(), 80);
        assert!(PushConstants::SIZE <= 128);
    }
}
