pub mod bounds;
pub mod builder;
pub mod camera;
pub mod encoding;
pub mod error;
pub mod gpu;
pub mod mesh;
pub mod node;
pub mod program;
pub mod settings;
pub mod shader;
pub mod uniforms;
pub mod vertex;

pub use bounds::{Aabb, BoundingVolumeEstimator};
pub use builder::InstanceBatchBuilder;
pub use camera::{Camera, CameraState};
pub use encoding::{Capacity, InstancePayload, Strategy};
pub use error::{
    CapacityError, ConfigurationError, GpuInitError, InstancingError, ResourceLoadError,
};
pub use mesh::{BaseMesh, MeshAttributes};
pub use node::{Batch, NodeContent, RenderNode};
pub use settings::{InstancingLimits, InstancingSettings};

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
