mod common;

use common::test_utils::{build_demo_scene, checker_texture, cube_mesh, test_context};
use raster_ngin::config::RendererConfig;
use raster_ngin::element::Element;
use raster_ngin::error::RenderError;
use raster_ngin::frame::FrameRenderer;
use raster_ngin::resources::allocator::DeviceAddress;

/// `resize` with the current size must be a no-op: no reallocation, no
/// descriptor invalidation.
#[test]
fn resize_to_current_size_is_idempotent() {
    let Some(ctx) = test_context() else { return };
    let mut renderer = build_demo_scene(&ctx).unwrap();
    renderer.on_attach(&ctx).unwrap();
    renderer.on_render_frame(&ctx).unwrap();

    let generation = renderer.gbuffer().generation();
    let size = renderer.gbuffer().size();
    renderer.on_resize(&ctx, size).unwrap();
    assert_eq!(renderer.gbuffer().generation(), generation);

    renderer.on_resize(&ctx, [320, 240]).unwrap();
    assert_eq!(renderer.gbuffer().generation(), generation + 1);
    assert_eq!(renderer.gbuffer().size(), [320, 240]);

    // The frame keeps rendering against the re-registered attachments.
    renderer.on_render_frame(&ctx).unwrap();
    let image = renderer.read_tonemapped(&ctx).unwrap();
    assert_eq!(image.dimensions(), (320, 240));

    renderer.on_detach(&ctx);
}

/// After a forced reallocation the uniform block must carry the fresh
/// addresses before the next frame reads it: no stale-address window.
#[test]
fn uniform_addresses_follow_reallocation() {
    let Some(ctx) = test_context() else { return };
    let mut renderer = build_demo_scene(&ctx).unwrap();
    renderer.on_attach(&ctx).unwrap();

    let before = renderer
        .scene
        .build_uniform(renderer.allocator())
        .unwrap()
        .addresses();
    for address in before {
        assert!(renderer.allocator().is_live(address));
    }

    // Importing another mesh and re-uploading reallocates every scene
    // buffer.
    renderer.scene.append_mesh(cube_mesh());
    renderer.upload_scene(&ctx).unwrap();

    let after = renderer
        .scene
        .build_uniform(renderer.allocator())
        .unwrap()
        .addresses();
    for (old, new) in before.iter().zip(after.iter()) {
        assert_ne!(old, new, "reallocation must mint fresh addresses");
        assert!(!renderer.allocator().is_live(*old));
        assert!(renderer.allocator().is_live(*new));
    }

    // The next frame renders against the refreshed addresses.
    renderer.on_render_frame(&ctx).unwrap();
    renderer.on_detach(&ctx);
}

/// Stale addresses must be rejected, not silently resolved.
#[test]
fn stale_addresses_are_rejected() {
    let Some(ctx) = test_context() else { return };
    let mut renderer = build_demo_scene(&ctx).unwrap();
    renderer.on_attach(&ctx).unwrap();

    let old = renderer
        .scene
        .build_uniform(renderer.allocator())
        .unwrap()
        .addresses()[0];
    renderer.upload_scene(&ctx).unwrap();

    match renderer.allocator().resolve(old) {
        Err(RenderError::StaleAddress { address }) => assert_eq!(address, old.0),
        other => panic!("expected a stale-address rejection, got {other:?}"),
    }
    assert!(renderer.allocator().resolve(DeviceAddress(0)).is_err());

    renderer.on_detach(&ctx);
}

/// Index-to-slot identity: registering N textures fills slots 0..N-1 in
/// order, for any N up to the capacity; one past the capacity is refused.
#[test]
fn texture_table_capacity_is_enforced() {
    let Some(ctx) = test_context() else { return };
    let config = RendererConfig {
        target_size: [64, 64],
        texture_table_capacity: 3,
        ..RendererConfig::default()
    };
    let mut renderer = FrameRenderer::new(&ctx, &config).unwrap();
    assert_eq!(renderer.texture_table().capacity(), 3);

    let ([w, h], texels) = checker_texture();
    for n in 0..3 {
        let slot = renderer
            .add_texture_from_rgba8([w, h], &texels, &format!("texture {n}"))
            .unwrap();
        assert_eq!(slot, n, "slots are handed out in registration order");
    }
    renderer.scene.append_mesh(common::test_utils::plane_mesh());
    renderer.scene.add_material(Default::default());
    renderer.on_attach(&ctx).unwrap();
    assert_eq!(renderer.texture_table().registered(), 3);

    // A fourth texture exceeds the table.
    renderer
        .add_texture_from_rgba8([w, h], &texels, "one too many")
        .unwrap();
    match renderer.upload_scene(&ctx) {
        Err(RenderError::TextureTableOverflow {
            requested,
            capacity,
        }) => {
            assert_eq!((requested, capacity), (4, 3));
        }
        other => panic!("expected a table overflow, got {other:?}"),
    }

    renderer.on_detach(&ctx);
}

/// A material pointing past the registered count fails its draw (skipped
/// with a logged error) instead of sampling undefined memory; the frame
/// itself still completes.
#[test]
fn out_of_table_material_fails_only_its_draw() {
    let Some(ctx) = test_context() else { return };
    let mut renderer = build_demo_scene(&ctx).unwrap();
    renderer.scene.add_material(raster_ngin::scene::Material {
        texture: Some(99),
        ..Default::default()
    });
    renderer.scene.add_instance(raster_ngin::scene::Instance {
        transform: cgmath::Matrix4::from_scale(1.0),
        material_index: 2,
        mesh_index: 0,
    });
    renderer.on_attach(&ctx).unwrap();
    renderer.on_render_frame(&ctx).unwrap();
    renderer.on_detach(&ctx);
}
