
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error
{
    /// Device, pipeline or resource creation failed. Not recoverable.
    #[error("GPU error: {0}")]
    Gpu(String),

    /// A wait on submitted work failed. Not recoverable.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Presentation surface failure other than out-of-date/suboptimal.
    #[error("Surface error: {0}")]
    Surface(String),

    #[error("The selected adapter does not support hardware ray queries")]
    RayTracingUnsupported,

    #[error("Failed to load shader '{path}': {source}")]
    ShaderLoad { path: PathBuf, source: std::io::Error },

    #[error("Mesh data is empty")]
    EmptyMesh,

    #[error("Invalid mesh data: {0}")]
    InvalidMesh(String),

    #[error("Mesh index {index} out of range (count: {count})")]
    MeshIndexOutOfRange { index: usize, count: usize },

    #[error("Invalid or empty path")]
    InvalidPath,

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
