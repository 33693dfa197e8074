pub mod collector;
pub mod gbuffer;
pub mod hdr;
pub mod item;
pub mod pass;
pub mod renderer;
pub mod stats;

pub use collector::RenderCollector;
pub use gbuffer::GBuffer;
pub use hdr::{HdrBuffers, HdrPingPong};
pub use item::{CameraRef, ItemId, RenderItem, RenderItemArena, RenderList};
pub use pass::{render_pass, render_pass_in_bounds};
pub use renderer::Renderer;
pub use stats::RendererStats;
