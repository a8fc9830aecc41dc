//! The scene resource.
//!
//! CPU-authored and GPU-mirrored description of everything the frame
//! pipeline draws: meshes appended through the import boundary, materials,
//! instances, lights, camera state and the scene textures. The scene
//! exclusively owns its GPU buffers and images; the frame pipeline borrows
//! them per frame. [`SceneResource::upload`] (re)creates the buffers, so the
//! opaque addresses embedded in the scene uniform change with it —
//! [`SceneResource::build_uniform`] re-resolves them every frame before the
//! block is written.

use bytemuck::Zeroable;
use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix};

use crate::camera::{Camera, Projection, view_proj};
use crate::error::RenderError;
use crate::resources::allocator::{BufferHandle, GpuAllocator};
use crate::resources::staging::StagingUploader;
use crate::resources::texture::Texture;
use crate::shaderio::{
    GpuInstance, GpuMaterial, GpuMesh, MAX_PUNCTUAL_LIGHTS, PunctualLight, SceneUniform, Vertex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    Point,
    Spot,
    Directional,
}

impl LightType {
    pub fn as_u32(self) -> u32 {
        match self {
            LightType::Point => 0,
            LightType::Spot => 1,
            LightType::Directional => 2,
        }
    }
}

/// One punctual light in CPU form.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub light_type: LightType,
    pub position: [f32; 3],
    pub direction: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
    /// Radians; meaningful only for spot lights.
    pub cone_angle: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            position: [1.0, 1.0, 1.0],
            direction: [1.0, 1.0, 1.0],
            color: [1.0, 1.0, 1.0],
            intensity: 4.0,
            cone_angle: 0.9,
        }
    }
}

impl Light {
    /// Serialize into the uniform-block record. Fields a light type cannot
    /// use are normalized out so the serialized bytes state exactly what the
    /// shading term consumes: a directional light has no position, a point
    /// light has no cone.
    pub fn serialize(&self) -> PunctualLight {
        let position = match self.light_type {
            LightType::Directional => [0.0; 3],
            _ => self.position,
        };
        let cone_angle = match self.light_type {
            LightType::Spot => self.cone_angle,
            _ => 0.0,
        };
        PunctualLight {
            position,
            light_type: self.light_type.as_u32(),
            direction: self.direction,
            intensity: self.intensity,
            color: self.color,
            cone_angle,
        }
    }
}

/// Immutable once uploaded; referenced by index from instances.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub base_color_factor: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    /// Slot in the bindless texture table, if the material is textured.
    pub texture: Option<u32>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            metallic: 0.0,
            roughness: 1.0,
            texture: None,
        }
    }
}

impl Material {
    fn to_gpu(self) -> GpuMaterial {
        GpuMaterial {
            base_color_factor: self.base_color_factor,
            metallic: self.metallic,
            roughness: self.roughness,
            texture_index: self.texture.map_or(-1, |t| t as i32),
            _pad: 0.0,
        }
    }
}

/// One drawn occurrence of a mesh. Many instances may share a mesh or a
/// material. Append-only during scene construction.
#[derive(Debug, Clone, Copy)]
pub struct Instance {
    pub transform: Matrix4<f32>,
    pub material_index: u32,
    pub mesh_index: u32,
}

impl Instance {
    fn to_gpu(&self) -> GpuInstance {
        GpuInstance {
            transform: self.transform.into(),
            material_index: self.material_index,
            mesh_index: self.mesh_index,
            _pad: [0; 2],
        }
    }

    /// Inverse-transpose of the upper 3x3, padded to the push-constant
    /// column layout. Falls back to the un-inverted basis for singular
    /// transforms.
    pub fn normal_matrix(&self) -> [[f32; 4]; 3] {
        let basis = Matrix3::from_cols(
            self.transform.x.truncate(),
            self.transform.y.truncate(),
            self.transform.z.truncate(),
        );
        let normal = basis.invert().unwrap_or(basis).transpose();
        [
            [normal.x.x, normal.x.y, normal.x.z, 0.0],
            [normal.y.x, normal.y.y, normal.y.z, 0.0],
            [normal.z.x, normal.z.y, normal.z.z, 0.0],
        ]
    }
}

/// Index data handed across the import boundary, tagged with its width.
#[derive(Debug, Clone)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    pub fn count(&self) -> u32 {
        match self {
            IndexData::U16(v) => v.len() as u32,
            IndexData::U32(v) => v.len() as u32,
        }
    }

    fn format(&self) -> wgpu::IndexFormat {
        match self {
            IndexData::U16(_) => wgpu::IndexFormat::Uint16,
            IndexData::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(v) => bytemuck::cast_slice(v),
            IndexData::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Pre-parsed mesh handed in by the asset-import collaborator.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: IndexData,
}

/// A region of the shared vertex/index storage. Immutable after import.
#[derive(Debug, Clone, Copy)]
pub struct MeshSlot {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    /// Byte offset into the index arena; 4-byte aligned.
    pub index_offset: u64,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
}

impl MeshSlot {
    fn to_gpu(self) -> GpuMesh {
        GpuMesh {
            vertex_offset: self.vertex_offset,
            vertex_count: self.vertex_count,
            index_offset: self.index_offset as u32,
            index_count: self.index_count,
            index_format: match self.index_format {
                wgpu::IndexFormat::Uint16 => 0,
                wgpu::IndexFormat::Uint32 => 1,
            },
            _pad: [0; 3],
        }
    }

    pub fn index_byte_len(&self) -> u64 {
        let width = match self.index_format {
            wgpu::IndexFormat::Uint16 => 2,
            wgpu::IndexFormat::Uint32 => 4,
        };
        self.index_count as u64 * width
    }
}

/// Handles of the scene's GPU buffers, valid for one upload generation.
#[derive(Debug, Clone, Copy)]
pub struct SceneBuffers {
    pub scene_info: BufferHandle,
    pub instances: BufferHandle,
    pub meshes: BufferHandle,
    pub materials: BufferHandle,
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
}

pub struct SceneResource {
    pub camera: Camera,
    pub projection: Projection,
    materials: Vec<Material>,
    instances: Vec<Instance>,
    meshes: Vec<MeshSlot>,
    textures: Vec<Texture>,
    lights: Vec<Light>,
    background_color: [f32; 3],
    use_sky: bool,
    cpu_vertices: Vec<Vertex>,
    cpu_indices: Vec<u8>,
    gpu: Option<SceneBuffers>,
}

impl SceneResource {
    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            projection: Projection::default(),
            materials: Vec::new(),
            instances: Vec::new(),
            meshes: Vec::new(),
            textures: Vec::new(),
            lights: vec![Light::default()],
            background_color: [0.85, 0.85, 0.85],
            use_sky: false,
            cpu_vertices: Vec::new(),
            cpu_indices: Vec::new(),
            gpu: None,
        }
    }

    /// Import boundary: append a pre-parsed mesh and return its opaque
    /// index. The vertices land in the shared vertex arena, the indices in
    /// the shared index arena at a 4-byte-aligned offset.
    pub fn append_mesh(&mut self, data: MeshData) -> usize {
        while self.cpu_indices.len() % 4 != 0 {
            self.cpu_indices.push(0);
        }
        let slot = MeshSlot {
            vertex_offset: self.cpu_vertices.len() as u32,
            vertex_count: data.vertices.len() as u32,
            index_offset: self.cpu_indices.len() as u64,
            index_count: data.indices.count(),
            index_format: data.indices.format(),
        };
        self.cpu_vertices.extend_from_slice(&data.vertices);
        self.cpu_indices.extend_from_slice(data.indices.as_bytes());
        self.meshes.push(slot);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        self.materials.len() as u32 - 1
    }

    pub fn add_instance(&mut self, instance: Instance) -> u32 {
        self.instances.push(instance);
        self.instances.len() as u32 - 1
    }

    pub fn add_texture(&mut self, texture: Texture) -> u32 {
        self.textures.push(texture);
        self.textures.len() as u32 - 1
    }

    pub fn meshes(&self) -> &[MeshSlot] {
        &self.meshes
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn set_light(&mut self, index: usize, light: Light) -> Result<(), RenderError> {
        if index >= MAX_PUNCTUAL_LIGHTS {
            return Err(RenderError::Config(format!(
                "light slot {index} exceeds the capacity of {MAX_PUNCTUAL_LIGHTS}"
            )));
        }
        if index < self.lights.len() {
            self.lights[index] = light;
        } else {
            self.lights.push(light);
        }
        Ok(())
    }

    pub fn light(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    pub fn set_background_color(&mut self, color: [f32; 3]) {
        self.background_color = color;
    }

    pub fn background_color(&self) -> [f32; 3] {
        self.background_color
    }

    pub fn set_sky(&mut self, enabled: bool) {
        self.use_sky = enabled;
    }

    pub fn use_sky(&self) -> bool {
        self.use_sky
    }

    /// (Re)create the scene's GPU buffers and stage their contents. Calling
    /// again after further imports reallocates, which invalidates every
    /// previously minted address — the next [`build_uniform`] picks up the
    /// fresh ones.
    ///
    /// [`build_uniform`]: SceneResource::build_uniform
    pub fn upload(
        &mut self,
        allocator: &mut GpuAllocator,
        uploader: &mut StagingUploader,
    ) -> Result<(), RenderError> {
        if let Some(old) = self.gpu.take() {
            self.free_buffers(allocator, &old);
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.cpu_vertices);
        let vertices = allocator.allocate_buffer(
            (vertex_bytes.len() as u64).max(4),
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            "scene vertex arena",
        )?;
        if !vertex_bytes.is_empty() {
            uploader.stage_buffer(allocator, vertices, 0, vertex_bytes)?;
        }

        let indices = allocator.allocate_buffer(
            (self.cpu_indices.len() as u64).max(4),
            wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            "scene index arena",
        )?;
        if !self.cpu_indices.is_empty() {
            uploader.stage_buffer(allocator, indices, 0, &self.cpu_indices)?;
        }

        let instances = self.upload_records(
            allocator,
            uploader,
            &self.instances.iter().map(Instance::to_gpu).collect::<Vec<_>>(),
            "scene instances",
        )?;
        let meshes = self.upload_records(
            allocator,
            uploader,
            &self.meshes.iter().map(|m| m.to_gpu()).collect::<Vec<_>>(),
            "scene meshes",
        )?;
        let materials = self.upload_records(
            allocator,
            uploader,
            &self.materials.iter().map(|m| m.to_gpu()).collect::<Vec<_>>(),
            "scene materials",
        )?;

        let scene_info = allocator.allocate_buffer(
            std::mem::size_of::<SceneUniform>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            "scene info",
        )?;

        self.gpu = Some(SceneBuffers {
            scene_info,
            instances,
            meshes,
            materials,
            vertices,
            indices,
        });

        // Seed the uniform block so the buffer never holds garbage; the
        // frame pipeline rewrites it every frame.
        let uniform = self.build_uniform(allocator)?;
        uploader.stage_buffer(allocator, scene_info, 0, bytemuck::bytes_of(&uniform))?;
        log::debug!(
            "scene uploaded: {} meshes, {} instances, {} materials, {} textures",
            self.meshes.len(),
            self.instances.len(),
            self.materials.len(),
            self.textures.len()
        );
        Ok(())
    }

    fn upload_records<T: bytemuck::Pod>(
        &self,
        allocator: &mut GpuAllocator,
        uploader: &mut StagingUploader,
        records: &[T],
        purpose: &str,
    ) -> Result<BufferHandle, RenderError> {
        // Storage bindings reject zero-sized buffers; keep one zeroed record.
        let size = (std::mem::size_of_val(records) as u64).max(std::mem::size_of::<T>() as u64);
        let handle = allocator.allocate_buffer(
            size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            purpose,
        )?;
        if !records.is_empty() {
            uploader.stage_buffer(allocator, handle, 0, bytemuck::cast_slice(records))?;
        }
        Ok(handle)
    }

    pub fn buffers(&self) -> Result<&SceneBuffers, RenderError> {
        self.gpu.as_ref().ok_or(RenderError::SceneNotUploaded)
    }

    /// Serialize the per-frame uniform block with the *current* camera
    /// fields and the *current* buffer addresses. Every address is checked
    /// live against the allocator before it is embedded.
    pub fn build_uniform(&self, allocator: &GpuAllocator) -> Result<SceneUniform, RenderError> {
        let gpu = self.buffers()?;
        for handle in [gpu.instances, gpu.meshes, gpu.materials] {
            allocator.buffer(handle)?;
        }
        let mut lights = [PunctualLight::zeroed(); MAX_PUNCTUAL_LIGHTS];
        let light_count = self.lights.len().min(MAX_PUNCTUAL_LIGHTS);
        for (slot, light) in lights.iter_mut().zip(self.lights.iter()) {
            *slot = light.serialize();
        }
        Ok(SceneUniform {
            view_proj: view_proj(&self.camera, &self.projection).into(),
            camera_position: self.camera.eye.into(),
            _pad0: 0.0,
            background_color: self.background_color,
            use_sky: self.use_sky as u32,
            instances_address: gpu.instances.address().0,
            meshes_address: gpu.meshes.address().0,
            materials_address: gpu.materials.address().0,
            light_count: light_count as u32,
            _pad1: 0,
            lights,
        })
    }

    fn free_buffers(&self, allocator: &mut GpuAllocator, buffers: &SceneBuffers) {
        allocator.free_buffer(buffers.scene_info);
        allocator.free_buffer(buffers.instances);
        allocator.free_buffer(buffers.meshes);
        allocator.free_buffer(buffers.materials);
        allocator.free_buffer(buffers.vertices);
        allocator.free_buffer(buffers.indices);
    }

    /// Release every GPU resource the scene owns. The caller must have
    /// dropped descriptor bindings into the textures (the texture table)
    /// first.
    pub fn free(&mut self, allocator: &mut GpuAllocator) {
        if let Some(gpu) = self.gpu.take() {
            self.free_buffers(allocator, &gpu);
        }
        for texture in self.textures.drain(..) {
            allocator.free_image(texture.image);
        }
    }
}

impl Default for SceneResource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_light_routes_position_and_direction() {
        let light = Light {
            light_type: LightType::Spot,
            position: [1.0, 2.0, 3.0],
            direction: [0.0, -1.0, 0.0],
            cone_angle: 0.9,
            ..Light::default()
        };
        let record = light.serialize();
        assert_eq!(record.light_type, 1);
        assert_eq!(record.position, [1.0, 2.0, 3.0]);
        assert_eq!(record.direction, [0.0, -1.0, 0.0]);
        assert_eq!(record.cone_angle, 0.9);
    }

    #[test]
    fn directional_light_omits_position() {
        let light = Light {
            light_type: LightType::Directional,
            position: [5.0, 5.0, 5.0],
            direction: [0.0, -1.0, 0.2],
            ..Light::default()
        };
        let record = light.serialize();
        assert_eq!(record.light_type, 2);
        assert_eq!(record.position, [0.0; 3]);
        assert_eq!(record.direction, [0.0, -1.0, 0.2]);
        assert_eq!(record.cone_angle, 0.0);
    }

    #[test]
    fn point_light_has_no_cone() {
        let record = Light::default().serialize();
        assert_eq!(record.light_type, 0);
        assert_eq!(record.cone_angle, 0.0);
        assert_eq!(record.intensity, 4.0);
    }

    #[test]
    fn light_slots_are_capacity_checked() {
        let mut scene = SceneResource::new();
        assert!(scene.set_light(0, Light::default()).is_ok());
        assert!(scene.set_light(MAX_PUNCTUAL_LIGHTS, Light::default()).is_err());
    }

    #[test]
    fn meshes_land_at_aligned_offsets() {
        let mut scene = SceneResource::new();
        let tri = MeshData {
            vertices: vec![Vertex::zeroed(); 3],
            indices: IndexData::U16(vec![0, 1, 2]),
        };
        let first = scene.append_mesh(tri.clone());
        let second = scene.append_mesh(tri);
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        let slots = scene.meshes();
        // Three u16 indices occupy 6 bytes; the next region starts padded.
        assert_eq!(slots[0].index_offset, 0);
        assert_eq!(slots[1].index_offset, 8);
        assert_eq!(slots[1].vertex_offset, 3);
    }

    #[test]
    fn normal_matrix_undoes_nonuniform_scale() {
        let instance = Instance {
            transform: Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0),
            material_index: 0,
            mesh_index: 0,
        };
        let n = instance.normal_matrix();
        // Inverse-transpose of diag(2,1,1) is diag(0.5,1,1).
        assert!((n[0][0] - 0.5).abs() < 1e-6);
        assert!((n[1][1] - 1.0).abs() < 1e-6);
        assert!((n[2][2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn uniform_requires_uploaded_buffers() {
        let scene = SceneResource::new();
        assert!(scene.buffers().is_err());
    }
}
