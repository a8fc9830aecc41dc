//! raster-ngin
//!
//! The frame-rendering core of an interactive 3D viewer. The crate owns
//! GPU-resident scene data, compiles and hot-reloads shading programs, and
//! orchestrates a per-frame sequence of GPU passes (procedural sky, geometry
//! raster, tonemap post-process) with explicit cross-pass synchronization
//! declarations. Windowing, input widgets, settings UI and asset parsing are
//! host concerns: the host drives the core through the narrow
//! [`element::Element`] boundary and hands it pre-parsed scene data.
//!
//! High-level modules
//! - `context`: headless GPU context owning device and the single queue
//! - `config`: renderer configuration (TOML-loadable)
//! - `resources`: allocator arena, staging uploader, texture creation
//! - `scene`: CPU-authored + GPU-mirrored scene resource
//! - `shaderio`: byte-exact record layouts shared with the shaders
//! - `texture_table`: fixed-capacity bindless texture table
//! - `gbuffer`: the render target set
//! - `shader`: shader compiler with hot reload and embedded fallback
//! - `barrier`: declared synchronization timeline
//! - `pipelines`: geometry raster and the sky/tonemap compute passes
//! - `frame`: the frame render pipeline orchestrator
//! - `element`: the capability interface the host loop invokes
//!

pub mod barrier;
pub mod camera;
pub mod config;
pub mod context;
pub mod element;
pub mod error;
pub mod frame;
pub mod gbuffer;
pub mod pipelines;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod shaderio;
pub mod texture_table;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use wgpu::*;
