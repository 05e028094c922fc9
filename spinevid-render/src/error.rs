use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Runtime(#[from] spinevid::Error),

    #[error(transparent)]
    Raster(#[from] spinevid_wgpu::RasterError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid index file '{path}': {message}")]
    Index { path: PathBuf, message: String },

    #[error("failed to load '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: spinevid::Error,
    },

    #[error("bone follower references unknown skeleton '{skeleton}'")]
    UnknownSkeleton { skeleton: String },

    #[error("frame rate must be positive and finite, got {fps}")]
    InvalidFrameRate { fps: f32 },

    #[error("animation '{animation}' has zero duration")]
    EmptyAnimation { animation: String },

    #[error("encoder failed: {message}")]
    Encoder { message: String },

    #[error("render cancelled")]
    Cancelled,

    #[error("renderer pool has shut down")]
    PoolClosed,

    #[error("failed to build job thread pool: {message}")]
    ThreadPool { message: String },
}
