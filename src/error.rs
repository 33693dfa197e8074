use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("shader compilation failed for '{label}': {message}")]
    ShaderCompilation { label: String, message: String },

    #[error("program link failed for '{label}': {message}")]
    ProgramLink { label: String, message: String },

    #[error("invalid shadow configuration: {0}")]
    InvalidShadowConfig(String),

    #[error("split ratios must be strictly increasing and end at 1.0, got {0:?}")]
    InvalidSplitRatios(Vec<f32>),

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    RequestDevice(String),
}
