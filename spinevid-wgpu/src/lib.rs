//! Offscreen wgpu rasterization of [`spinevid::DrawList`]s into RGBA8 frames.
//!
//! [`FrameRasterizer`] owns one device and queue. Atlas pages are decoded on the CPU into a
//! [`PageSet`] that any number of rasterizers can share; each rasterizer uploads the set it is
//! asked to draw with and keeps it until a different set arrives.

mod error;
mod page;
mod rasterizer;
mod renderer;

pub use error::RasterError;
pub use page::{PageImage, PageSet};
pub use rasterizer::{FrameRasterizer, padded_bytes_per_row};
pub use renderer::{DrawListRenderer, canvas_projection};
