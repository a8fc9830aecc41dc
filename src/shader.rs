//! Shader compilation and hot reload.
//!
//! The compiler resolves a shader by file name against a list of search
//! paths and validates it through a device error scope. When compilation
//! fails (missing file, parse error, validation error) the diagnostic is
//! logged, the state machine moves to `CompileFailed`, and the returned
//! module is built from the embedded source that was known good at build
//! time — the pipeline keeps rendering, never crashes, never binds a null
//! stage.

use std::path::{Path, PathBuf};

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Uncompiled,
    Compiled,
    CompileFailed,
}

pub struct ShaderCompiler {
    search_paths: Vec<PathBuf>,
    state: CompileState,
    last_diagnostic: Option<String>,
}

impl ShaderCompiler {
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            state: CompileState::Uncompiled,
            last_diagnostic: None,
        }
    }

    pub fn add_search_path<P: Into<PathBuf>>(&mut self, path: P) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn state(&self) -> CompileState {
        self.state
    }

    /// Diagnostic text of the most recent failed compile, if any.
    pub fn last_diagnostic(&self) -> Option<&str> {
        self.last_diagnostic.as_deref()
    }

    pub fn find_file(&self, file_name: &str) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
    }

    /// Compile `file_name` from the search paths, falling back to the
    /// embedded source on any failure. Always returns a usable module.
    pub fn compile(
        &mut self,
        device: &wgpu::Device,
        file_name: &str,
        embedded: &str,
    ) -> wgpu::ShaderModule {
        match self.try_compile(device, file_name) {
            Ok(module) => {
                self.state = CompileState::Compiled;
                self.last_diagnostic = None;
                log::info!("compiled shader `{file_name}` from source");
                module
            }
            Err(RenderError::ShaderCompile { path, diagnostic }) => {
                log::error!("error compiling shader {}: {diagnostic}", path.display());
                self.state = CompileState::CompileFailed;
                self.last_diagnostic = Some(diagnostic);
                compile_embedded(device, file_name, embedded)
            }
            Err(other) => {
                log::error!("error compiling shader `{file_name}`: {other}");
                self.state = CompileState::CompileFailed;
                self.last_diagnostic = Some(other.to_string());
                compile_embedded(device, file_name, embedded)
            }
        }
    }

    fn try_compile(
        &self,
        device: &wgpu::Device,
        file_name: &str,
    ) -> Result<wgpu::ShaderModule, RenderError> {
        let path = self.find_file(file_name).ok_or_else(|| {
            RenderError::ShaderCompile {
                path: PathBuf::from(file_name),
                diagnostic: format!(
                    "not found in search paths {:?}",
                    self.search_paths
                ),
            }
        })?;
        let source = std::fs::read_to_string(&path)?;
        validate_wgsl(device, &path, file_name, &source)
    }
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a module from source that is trusted to be valid (the embedded
/// programs). No state machine involved.
pub fn compile_embedded(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn validate_wgsl(
    device: &wgpu::Device,
    path: &Path,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(RenderError::ShaderCompile {
            path: path.to_path_buf(),
            diagnostic: error.to_string(),
        }),
        None => Ok(module),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_search_paths() {
        let mut compiler = ShaderCompiler::new();
        compiler.add_search_path("does/not/exist");
        assert!(compiler.find_file("foundation.wgsl").is_none());
        let err = compiler
            .try_compile_diagnostic_for_test("foundation.wgsl")
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    impl ShaderCompiler {
        // Path-resolution half of try_compile, testable without a device.
        fn try_compile_diagnostic_for_test(&self, file_name: &str) -> Result<PathBuf, String> {
            self.find_file(file_name)
                .ok_or_else(|| format!("not found in search paths {:?}", self.search_paths))
        }
    }
}
