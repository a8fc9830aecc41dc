//! The capability boundary between the core and its host.
//!
//! The out-of-scope host loop (window, input, settings UI) drives the core
//! exclusively through [`Element`]: attach once, render every frame, resize
//! between frames, forward user controls as [`UiAction`] values, detach at
//! shutdown. The boundary is deliberately narrow — plain data in, no
//! inheritance depth, no callbacks out.

use crate::config::TonemapSettings;
use crate::context::Context;
use crate::error::RenderError;
use crate::scene::Light;

/// User-facing controls, delivered by the host's UI layer.
#[derive(Debug, Clone)]
pub enum UiAction {
    /// Explicit hot-reload trigger (e.g. an F5 press). This is the one
    /// action that may stall the frame loop: shader replacement waits for
    /// the queue to drain first.
    ReloadShaders,
    SetSky(bool),
    SetBackgroundColor([f32; 3]),
    SetLight(Light),
    SetTonemap(TonemapSettings),
    /// Global metallic/roughness override; a channel below zero disables
    /// that override.
    SetMetallicRoughnessOverride([f32; 2]),
}

pub trait Element {
    /// Upload scene data and build GPU state. Called once, before the first
    /// frame.
    fn on_attach(&mut self, ctx: &Context) -> Result<(), RenderError>;

    /// Release every GPU resource. The queue is drained first, so nothing
    /// in flight can still reference what gets freed.
    fn on_detach(&mut self, ctx: &Context);

    /// Viewport size change. Only called between frames.
    fn on_resize(&mut self, ctx: &Context, size: [u32; 2]) -> Result<(), RenderError>;

    /// Record and submit one frame.
    fn on_render_frame(&mut self, ctx: &Context) -> Result<(), RenderError>;

    /// A user control changed.
    fn on_ui_menu(&mut self, ctx: &Context, action: UiAction) -> Result<(), RenderError>;
}
