//! # First-Frame
//!
//! Replace the opening frame of a video with a still image.
//!
//! The library drives an external transcoding engine through a four-stage pipeline:
//! it probes the output dimensions, loops the image into a clip one lead-in interval
//! long, cuts the rest of the video, and splices both segments without re-encoding.
//! Finished results can be converted into MOV or MKV on demand.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use first_frame::{
//!     config::Config,
//!     engine::{EngineHandle, FfmpegEngine},
//!     media::{MediaAsset, Options, ScaleTarget},
//!     pipeline::PipelineCoordinator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let engine = FfmpegEngine::new(config.engine.clone())?;
//! let handle = Arc::new(EngineHandle::new(Arc::new(engine)));
//!
//! let coordinator = PipelineCoordinator::new(handle, config.pipeline.clone());
//! coordinator.load_engine().await?;
//!
//! let options = Options {
//!     scale_target: ScaleTarget::Image,
//!     framerate: Some(30),
//!     ..Options::default()
//! };
//! let output = coordinator
//!     .run(
//!         &MediaAsset::load("clip.mp4").await?,
//!         &MediaAsset::load("cover.png").await?,
//!         &options,
//!     )
//!     .await?;
//! tokio::fs::write(output.name(), output.data()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`media`] - Assets, dimensions and run options
//! - [`engine`] - The transcoding engine boundary and its implementations
//! - [`pipeline`] - Stages, encode planning and run coordination
//! - [`config`] - Configuration management

pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod pipeline;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    engine::{EngineHandle, TranscodeEngine},
    error::{FirstFrameError, Result},
    media::{MediaAsset, Options},
    pipeline::PipelineCoordinator,
};
