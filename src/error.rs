use std::path::PathBuf;

use thiserror::Error;

use crate::mesh::MeshAttributes;

/// The base mesh cannot be encoded with the requested strategy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("base mesh is missing required attribute `{0}`")]
    MissingAttribute(&'static str),
    #[error("base mesh attribute `{attribute}` has {found} entries, expected {expected}")]
    AttributeLengthMismatch {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },
}

impl ConfigurationError {
    pub(crate) fn missing(attribute: MeshAttributes) -> Self {
        Self::MissingAttribute(attribute.name())
    }
}

/// A configured limit would produce empty or negative batches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("limit `{0}` must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("limit `{limit}` = {value} cannot hold a single instance matrix (needs at least {required})")]
    LimitTooSmall {
        limit: &'static str,
        value: u32,
        required: u32,
    },
}

/// Fatal errors returned by [`crate::InstanceBatchBuilder::build`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstancingError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("capacity computation error: {0}")]
    Capacity(#[from] CapacityError),
}

/// No headless wgpu device could be created.
#[derive(Debug, Error)]
pub enum GpuInitError {
    #[error("no suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Shader text could not be read. Never fatal to a build.
#[derive(Debug, Error)]
pub enum ResourceLoadError {
    #[error("could not open shader file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("shader file {0:?} is empty")]
    Empty(PathBuf),
}
