pub mod backend;
pub mod handle;
pub mod pipeline_builder;
pub mod recording;
pub mod resources;
pub mod types;
pub mod vertex;
pub mod wgpu_backend;

pub use backend::RenderBackend;
pub use handle::{Handle, ResourcePool};
pub use recording::{AllocationCounters, Command, DrawCall, RecordingBackend};
pub use resources::{DepthBuffer, FrameBuffer, Texture2D};
pub use types::*;
pub use vertex::{MeshData, Vertex};
pub use wgpu_backend::{WgpuBackend, MAX_TEXTURE_SLOTS, UNIFORM_BLOCK_SIZE};
