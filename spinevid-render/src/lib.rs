//! Renders every shared animation of a set of Spine rigs to video files.
//!
//! An index file names the rigs and how they are placed on one canvas. Each job loads its
//! rigs into a [`Scene`], steps a [`FrameScheduler`] through every animation, rasterizes
//! frames on a [`RendererPool`] and streams them to an encoder process through a bounded
//! queue.

mod cancel;
pub mod cli;
mod codec;
mod encoder;
mod error;
mod index;
mod job;
mod pipeline;
mod pool;
mod scene;
mod scheduler;
mod stats;

pub use cancel::CancellationToken;
pub use codec::Codec;
pub use encoder::{EncodeSettings, FfmpegEncoder, FrameEncoder};
pub use error::RenderError;
pub use index::{BoneFollower, Entry, IndexFile, LoadedRig, RenderQuirk, load_rig};
pub use job::{JobConfig, JobOutcome, JobReport, fingerprint, run_job, run_jobs};
pub use pipeline::{FRAME_QUEUE_DEPTH, generate_video};
pub use pool::{Frame, FrameRenderer, RasterBackend, RendererPool};
pub use scene::{Placement, RendererSettings, Scene, SceneRig};
pub use scheduler::{DurationPolicy, FrameScheduler};
pub use stats::{RenderStats, StatsSnapshot};

#[cfg(test)]
mod test_support;


#[cfg(test)]
mod pipeline_tests;

#[cfg(test)]
mod job_tests;
