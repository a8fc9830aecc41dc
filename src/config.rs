//! Renderer configuration.
//!
//! Everything the host can decide before attaching the core: initial render
//! target size, bindless table capacity, shader search paths, environment
//! defaults and tonemap settings. Loadable from TOML so hosts can keep a
//! config file next to the executable; every field has a sensible default.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::RenderError;

/// Tonemap curve applied by the post-process pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TonemapMethod {
    Linear,
    Reinhard,
    AcesApprox,
}

impl TonemapMethod {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            TonemapMethod::Linear => 0,
            TonemapMethod::Reinhard => 1,
            TonemapMethod::AcesApprox => 2,
        }
    }
}

/// User-adjustable tonemap parameters, passed to the compute pass each frame.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TonemapSettings {
    pub method: TonemapMethod,
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for TonemapSettings {
    fn default() -> Self {
        Self {
            method: TonemapMethod::Linear,
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}

/// Parameters of the procedural sky pass.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SkyParams {
    pub zenith_color: [f32; 3],
    pub horizon_color: [f32; 3],
    pub ground_color: [f32; 3],
    /// Direction the sun shines *towards* (from the sun to the scene).
    pub sun_direction: [f32; 3],
    pub sun_intensity: f32,
}

impl Default for SkyParams {
    fn default() -> Self {
        Self {
            zenith_color: [0.17, 0.37, 0.65],
            horizon_color: [0.80, 0.87, 0.93],
            ground_color: [0.40, 0.35, 0.30],
            sun_direction: [-0.33, -0.88, -0.33],
            sun_intensity: 8.0,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Initial size of the offscreen render targets in pixels.
    pub target_size: [u32; 2],
    /// Number of slots in the bindless texture table.
    pub texture_table_capacity: u32,
    /// Directories searched for shader sources on (re)compile, in order.
    pub shader_search_paths: Vec<PathBuf>,
    pub background_color: [f32; 3],
    pub use_sky: bool,
    pub tonemap: TonemapSettings,
    pub sky: SkyParams,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            target_size: [1280, 720],
            texture_table_capacity: 10,
            shader_search_paths: vec![PathBuf::from("shaders")],
            background_color: [0.85, 0.85, 0.85],
            use_sky: false,
            tonemap: TonemapSettings::default(),
            sky: SkyParams::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_toml(text: &str) -> Result<Self, RenderError> {
        toml::from_str(text).map_err(|e| RenderError::Config(e.to_string()))
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, RenderError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RendererConfig::default();
        assert_eq!(config.texture_table_capacity, 10);
        assert_eq!(config.background_color, [0.85, 0.85, 0.85]);
        assert!(!config.use_sky);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = RendererConfig::from_toml(
            r#"
            target_size = [640, 480]
            use_sky = true

            [tonemap]
            method = "reinhard"
            exposure = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(config.target_size, [640, 480]);
        assert!(config.use_sky);
        assert_eq!(config.tonemap.method, TonemapMethod::Reinhard);
        assert_eq!(config.tonemap.exposure, 1.5);
        // Untouched sections keep their defaults.
        assert_eq!(config.tonemap.gamma, 2.2);
        assert_eq!(config.texture_table_capacity, 10);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = RendererConfig::from_toml("target_size = \"wide\"").unwrap_err();
        assert!(matches!(err, RenderError::Config(_)));
    }
}
