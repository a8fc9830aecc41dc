mod common;

use std::fs;

use common::test_utils::{build_demo_scene, test_context};
use raster_ngin::config::RendererConfig;
use raster_ngin::element::{Element, UiAction};
use raster_ngin::frame::FrameRenderer;
use raster_ngin::shader::CompileState;

const GOOD_SHADER: &str = include_str!("../shaders/foundation.wgsl");

/// With the repository's `shaders/` directory on the search path the
/// startup compile succeeds from source.
#[test]
fn startup_compiles_from_source() {
    let Some(ctx) = test_context() else { return };
    let renderer = build_demo_scene(&ctx).unwrap();
    assert_eq!(renderer.compiler().state(), CompileState::Compiled);
    assert!(renderer.compiler().last_diagnostic().is_none());
}

/// Forcing a compile failure must leave the previously bound program fully
/// functional: a diagnostic is produced, the embedded program takes over,
/// and the next frame renders without error.
#[test]
fn failed_reload_falls_back_and_keeps_rendering() {
    let Some(ctx) = test_context() else { return };
    let dir = tempfile::tempdir().unwrap();
    let shader_path = dir.path().join("foundation.wgsl");
    fs::write(&shader_path, GOOD_SHADER).unwrap();

    let config = RendererConfig {
        target_size: [128, 128],
        shader_search_paths: vec![dir.path().to_path_buf()],
        ..RendererConfig::default()
    };
    let mut renderer = FrameRenderer::new(&ctx, &config).unwrap();
    assert_eq!(renderer.compiler().state(), CompileState::Compiled);
    renderer.scene.append_mesh(common::test_utils::cube_mesh());
    renderer.scene.add_material(Default::default());
    renderer.scene.add_instance(raster_ngin::scene::Instance {
        transform: cgmath::Matrix4::from_scale(0.5),
        material_index: 0,
        mesh_index: 0,
    });
    renderer.on_attach(&ctx).unwrap();
    renderer.on_render_frame(&ctx).unwrap();

    // Break the source on disk and trigger the reload.
    fs::write(&shader_path, "fn vs_main( {{{ not wgsl").unwrap();
    renderer.on_ui_menu(&ctx, UiAction::ReloadShaders).unwrap();
    assert_eq!(renderer.compiler().state(), CompileState::CompileFailed);
    assert!(renderer.compiler().last_diagnostic().is_some());

    // Rendering continues on the fallback program.
    renderer.on_render_frame(&ctx).unwrap();

    // Fixing the source recovers on the next explicit reload.
    fs::write(&shader_path, GOOD_SHADER).unwrap();
    renderer.on_ui_menu(&ctx, UiAction::ReloadShaders).unwrap();
    assert_eq!(renderer.compiler().state(), CompileState::Compiled);
    assert!(renderer.compiler().last_diagnostic().is_none());
    renderer.on_render_frame(&ctx).unwrap();

    renderer.on_detach(&ctx);
}

/// A missing source file is a compile failure like any other: diagnostic,
/// fallback, no crash.
#[test]
fn missing_source_uses_embedded_program() {
    let Some(ctx) = test_context() else { return };
    let dir = tempfile::tempdir().unwrap();
    let config = RendererConfig {
        target_size: [64, 64],
        shader_search_paths: vec![dir.path().to_path_buf()],
        ..RendererConfig::default()
    };
    let mut renderer = FrameRenderer::new(&ctx, &config).unwrap();
    assert_eq!(renderer.compiler().state(), CompileState::CompileFailed);
    assert!(
        renderer
            .compiler()
            .last_diagnostic()
            .is_some_and(|d| d.contains("not found"))
    );

    renderer.scene.append_mesh(common::test_utils::plane_mesh());
    renderer.scene.add_material(Default::default());
    renderer.scene.add_instance(raster_ngin::scene::Instance {
        transform: cgmath::Matrix4::from_scale(1.0),
        material_index: 0,
        mesh_index: 0,
    });
    renderer.on_attach(&ctx).unwrap();
    renderer.on_render_frame(&ctx).unwrap();
    renderer.on_detach(&ctx);
}
