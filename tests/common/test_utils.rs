use cgmath::Matrix4;

use raster_ngin::config::RendererConfig;
use raster_ngin::context::Context;
use raster_ngin::error::RenderError;
use raster_ngin::frame::FrameRenderer;
use raster_ngin::scene::{IndexData, Instance, Material, MeshData};
use raster_ngin::shaderio::Vertex;

/// Acquire a headless GPU context, or `None` when the machine offers no
/// adapter with the required features (the test then skips).
pub fn test_context() -> Option<Context> {
    let _ = env_logger::builder().is_test(true).try_init();
    match Context::new() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test, no usable adapter: {e}");
            None
        }
    }
}

pub fn small_config() -> RendererConfig {
    RendererConfig {
        target_size: [256, 192],
        ..RendererConfig::default()
    }
}

/// An axis-aligned unit cube with per-face normals and uvs, u16 indices.
pub fn cube_mesh() -> MeshData {
    // (normal, u axis, v axis) per face.
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u16;
        for (du, dv, uv) in [
            (-0.5, -0.5, [0.0, 1.0]),
            (0.5, -0.5, [1.0, 1.0]),
            (0.5, 0.5, [1.0, 0.0]),
            (-0.5, 0.5, [0.0, 0.0]),
        ] {
            let position = [
                normal[0] * 0.5 + u[0] * du + v[0] * dv,
                normal[1] * 0.5 + u[1] * du + v[1] * dv,
                normal[2] * 0.5 + u[2] * du + v[2] * dv,
            ];
            vertices.push(Vertex {
                position,
                normal,
                uv,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData {
        vertices,
        indices: IndexData::U16(indices),
    }
}

/// A 1x1 quad in the XZ plane facing +Y, u32 indices (the two meshes
/// deliberately exercise both index widths).
pub fn plane_mesh() -> MeshData {
    let vertices = vec![
        Vertex {
            position: [-0.5, 0.0, -0.5],
            normal: [0.0, 1.0, 0.0],
            uv: [0.0, 0.0],
        },
        Vertex {
            position: [0.5, 0.0, -0.5],
            normal: [0.0, 1.0, 0.0],
            uv: [4.0, 0.0],
        },
        Vertex {
            position: [0.5, 0.0, 0.5],
            normal: [0.0, 1.0, 0.0],
            uv: [4.0, 4.0],
        },
        Vertex {
            position: [-0.5, 0.0, 0.5],
            normal: [0.0, 1.0, 0.0],
            uv: [0.0, 4.0],
        },
    ];
    MeshData {
        vertices,
        indices: IndexData::U32(vec![0, 1, 2, 0, 2, 3]),
    }
}

pub fn checker_texture() -> ([u32; 2], Vec<u8>) {
    let size = 8u32;
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let bright = (x + y) % 2 == 0;
            let value = if bright { 220 } else { 40 };
            data.extend_from_slice(&[value, value, value, 255]);
        }
    }
    ([size, size], data)
}

/// The reference scene: a half-size cube standing in for the teapot, a
/// large textured floor plane, one textured material, and the default
/// point light (intensity 4.0 at (1,1,1)). Sky off, background 0.85 grey.
pub fn build_demo_scene(ctx: &Context) -> Result<FrameRenderer, RenderError> {
    let mut renderer = FrameRenderer::new(ctx, &small_config())?;

    let ([w, h], texels) = checker_texture();
    let floor_texture = renderer.add_texture_from_rgba8([w, h], &texels, "tiled floor")?;

    let cube = renderer.scene.append_mesh(cube_mesh());
    let plane = renderer.scene.append_mesh(plane_mesh());

    let cube_material = renderer.scene.add_material(Material {
        base_color_factor: [0.8, 1.0, 0.6, 1.0],
        metallic: 0.5,
        roughness: 0.5,
        texture: None,
    });
    let plane_material = renderer.scene.add_material(Material {
        base_color_factor: [1.0, 1.0, 1.0, 1.0],
        metallic: 0.1,
        roughness: 0.8,
        texture: Some(floor_texture),
    });

    renderer.scene.add_instance(Instance {
        transform: Matrix4::from_scale(0.5),
        material_index: cube_material,
        mesh_index: cube as u32,
    });
    renderer.scene.add_instance(Instance {
        transform: Matrix4::from_translation([0.0, -0.9, 0.0].into()) * Matrix4::from_scale(4.0),
        material_index: plane_material,
        mesh_index: plane as u32,
    });

    Ok(renderer)
}

/// Expected tonemapped value of a linear channel under the default
/// settings (linear curve, exposure 1, gamma 2.2).
pub fn tonemapped_u8(linear: f32) -> u8 {
    (linear.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8
}
