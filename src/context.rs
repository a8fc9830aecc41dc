//! Central GPU context.
//!
//! Owns the device and the single submission queue. The context is headless:
//! surfaces, swapchains and window handles are a host concern, the core only
//! renders into its own offscreen targets. Created once at startup and
//! passed by reference into every per-frame call; its lifetime strictly
//! encloses everything allocated from it.

use std::sync::Arc;
use std::time::Duration;

use crate::error::RenderError;

/// Callback invoked for device-level errors the core does not capture
/// itself. The policy behind it (crash diagnostics, telemetry) is external.
pub type DeviceErrorCallback = Box<dyn Fn(wgpu::Error) + Send + Sync + 'static>;

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl Context {
    /// Features the frame pipeline depends on: push constants for per-draw
    /// data and descriptor-indexing support for the bindless texture table.
    pub fn required_features() -> wgpu::Features {
        wgpu::Features::PUSH_CONSTANTS
            | wgpu::Features::TEXTURE_BINDING_ARRAY
            | wgpu::Features::PARTIALLY_BOUND_BINDING_ARRAY
            | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING
    }

    pub fn new() -> Result<Self, RenderError> {
        Self::with_error_callback(None)
    }

    /// Create the context with a hook for uncaptured device errors. With no
    /// callback the errors are logged.
    pub fn with_error_callback(callback: Option<DeviceErrorCallback>) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::AdapterUnavailable(e.to_string()))?;
        let adapter_info = adapter.get_info();
        log::info!(
            "using adapter `{}` ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("raster-ngin device"),
            required_features: Self::required_features(),
            required_limits: wgpu::Limits {
                max_push_constant_size: 128,
                max_binding_array_elements_per_shader_stage: 64,
                ..wgpu::Limits::default()
            },
            memory_hints: Default::default(),
            experimental_features: Default::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

        match callback {
            Some(callback) => device.on_uncaptured_error(Arc::new(move |error| callback(error))),
            None => device.on_uncaptured_error(Arc::new(|error| {
                log::error!("uncaptured device error: {error}");
            })),
        }

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Block until every submitted command buffer has retired.
    ///
    /// This is one of the few deliberate stalls in the core: startup/resize
    /// and shader hot reload use it before mutating resources that in-flight
    /// work might still reference.
    pub fn wait_idle(&self, timeout: Duration) -> Result<(), RenderError> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(timeout),
            })
            .map_err(|e| RenderError::Wait(e.to_string()))?;
        Ok(())
    }
}
