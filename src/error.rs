//! Error taxonomy for the rendering core.
//!
//! Resource exhaustion is fatal and carries the requested size and purpose so
//! the host can report it before terminating. Shader compilation failures are
//! *not* surfaced through this type during rendering: the compiler falls back
//! to the embedded program and only logs the diagnostic. The variant exists
//! for callers that want to inspect a failed compile explicitly.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// GPU allocation failed. There is no eviction or retry policy; callers
    /// must treat this as process-terminating.
    #[error("GPU allocation of {size} bytes for `{purpose}` failed")]
    OutOfMemory { purpose: String, size: u64 },

    #[error("shader `{path}` failed to compile: {diagnostic}")]
    ShaderCompile { path: PathBuf, diagnostic: String },

    #[error("cannot register {requested} textures, the table holds {capacity}")]
    TextureTableOverflow { requested: u32, capacity: u32 },

    /// A device address referenced a buffer or image that has been freed or
    /// reallocated since the address was minted.
    #[error("stale device address {address:#x}")]
    StaleAddress { address: u64 },

    #[error("no suitable GPU adapter available: {0}")]
    AdapterUnavailable(String),

    #[error("device request failed: {0}")]
    DeviceRequest(String),

    #[error("waiting for the GPU queue to drain failed: {0}")]
    Wait(String),

    #[error("render target readback failed: {0}")]
    Readback(String),

    #[error("scene has no uploaded GPU buffers yet")]
    SceneNotUploaded,

    #[error("invalid renderer configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
