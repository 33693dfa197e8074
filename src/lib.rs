pub mod camera;
pub mod effect;
pub mod error;
pub mod gpu;
pub mod light;
pub mod material;
pub mod math;
pub mod render;
pub mod scene;
pub mod settings;
pub mod shadow;

pub use camera::Camera;
pub use error::{RenderError, Result};
pub use render::Renderer;
pub use settings::RenderSettings;

/// Installs `env_logger` at info level unless `RUST_LOG` says otherwise. Safe to call more
/// than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
