use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("no suitable graphics adapter: {message}")]
    NoAdapter { message: String },

    #[error("failed to create graphics device: {message}")]
    RequestDevice { message: String },

    #[error("failed to read atlas page '{path}': {source}")]
    PageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode atlas page '{path}': {source}")]
    PageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("draw references texture page {page} but only {available} are loaded")]
    MissingPage { page: usize, available: usize },

    #[error("invalid canvas size {width}x{height}")]
    CanvasSize { width: u32, height: u32 },

    #[error("frame readback failed: {message}")]
    Readback { message: String },
}
