use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::encoding::Strategy;

/// Hardware limits that bound how many instances one batch may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancingLimits {
    /// Slots in the `instanceModelMatrix` uniform array.
    #[serde(default = "InstancingLimits::default_max_uniform_matrices")]
    pub max_uniform_matrices: u32,
    /// Texels per row of the matrix texture. Each matrix takes four.
    #[serde(default = "InstancingLimits::default_max_texture_width")]
    pub max_texture_width: u32,
    #[serde(default = "InstancingLimits::default_max_texture_height")]
    pub max_texture_height: u32,
    /// Bytes available to the `instanceData` block.
    #[serde(default = "InstancingLimits::default_max_uniform_block_size")]
    pub max_uniform_block_size: u32,
}

impl Default for InstancingLimits {
    fn default() -> Self {
        Self {
            max_uniform_matrices: Self::default_max_uniform_matrices(),
            max_texture_width: Self::default_max_texture_width(),
            max_texture_height: Self::default_max_texture_height(),
            max_uniform_block_size: Self::default_max_uniform_block_size(),
        }
    }
}

impl InstancingLimits {
    /// Texture and uniform block limits as reported by a device.
    pub fn from_device_limits(limits: &wgpu::Limits) -> Self {
        Self {
            max_texture_width: limits.max_texture_dimension_2d,
            max_texture_height: limits.max_texture_dimension_2d,
            max_uniform_block_size: limits.max_uniform_buffer_binding_size,
            ..Self::default()
        }
    }

    const fn default_max_uniform_matrices() -> u32 {
        64
    }

    const fn default_max_texture_width() -> u32 {
        8192
    }

    const fn default_max_texture_height() -> u32 {
        8192
    }

    const fn default_max_uniform_block_size() -> u32 {
        65536
    }

    fn warn_on_zero_limits(&self) {
        let limits = [
            ("max_uniform_matrices", self.max_uniform_matrices),
            ("max_texture_width", self.max_texture_width),
            ("max_texture_height", self.max_texture_height),
            ("max_uniform_block_size", self.max_uniform_block_size),
        ];
        for (name, value) in limits {
            if value == 0 {
                warn!("Instancing limit {} is zero; builds depending on it will fail.", name);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstancingSettings {
    #[serde(default)]
    pub limits: InstancingLimits,
    /// Directory the WGSL sources are read from.
    #[serde(default = "InstancingSettings::default_shader_dir")]
    pub shader_dir: PathBuf,
    #[serde(default)]
    pub strategy: Strategy,
}

impl Default for InstancingSettings {
    fn default() -> Self {
        Self {
            limits: InstancingLimits::default(),
            shader_dir: Self::default_shader_dir(),
            strategy: Strategy::default(),
        }
    }
}

impl InstancingSettings {
    pub fn load() -> Self {
        Self::load_from_path("instancing.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Failed to parse {:?} ({}). Falling back to default instancing settings.",
                    path, err
                );
                InstancingSettings::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Instancing settings file {:?} not found. Using default settings.",
                    path
                );
                InstancingSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default instancing settings.",
                    path, err
                );
                InstancingSettings::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let settings = serde_json::from_str::<InstancingSettings>(contents)?;
        settings.limits.warn_on_zero_limits();
        Ok(settings)
    }

    pub fn with_limits(mut self, limits: InstancingLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_shader_dir(mut self, shader_dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = shader_dir.into();
        self
    }

    fn default_shader_dir() -> PathBuf {
        PathBuf::from("shaders")
    }
}
