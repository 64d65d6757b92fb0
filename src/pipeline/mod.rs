//! # Frame-Replacement Pipeline
//!
//! Replaces the opening frame of a video with a still image. A run goes through
//! four stages, each consuming the artifacts the previous one left on the engine's
//! virtual filesystem:
//!
//! 1. **Probe** - resolve even output dimensions from the video or the image
//! 2. **Frame synthesis** - loop the image into a clip one lead-in interval long
//! 3. **Trim** - cut the rest of the video, re-encoding only when parameters change
//! 4. **Concat** - splice both segments by manifest, without re-encoding
//!
//! Container conversion runs separately against a finished result.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use first_frame::{
//!     config::Config,
//!     engine::{EngineHandle, FfmpegEngine},
//!     media::{MediaAsset, Options, TargetContainer},
//!     pipeline::PipelineCoordinator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let engine = Arc::new(EngineHandle::new(Arc::new(FfmpegEngine::new(config.engine.clone())?)));
//! engine.load().await?;
//!
//! let coordinator = PipelineCoordinator::new(engine, config.pipeline.clone());
//! let video = MediaAsset::load("clip.mp4").await?;
//! let image = MediaAsset::load("cover.png").await?;
//!
//! let output = coordinator.run(&video, &image, &Options::default()).await?;
//! let mkv = coordinator.convert_container(&output, TargetContainer::Mkv).await?;
//! # Ok(())
//! # }
//! ```

pub mod concat;
pub mod convert;
pub mod coordinator;
pub mod plan;
pub mod probe;
pub mod run;
pub mod synthesis;
pub mod trim;

pub use concat::ConcatStage;
pub use convert::ContainerConverter;
pub use coordinator::PipelineCoordinator;
pub use plan::{EncodePlan, RemainderPlan, SynthesisPlan};
pub use probe::{ProbeReport, ProbeStage};
pub use run::{PublishedOutput, RunState, RunStatus};
pub use synthesis::FrameSynthesisStage;
pub use trim::TrimStage;

/// Fixed names of the artifacts a run keeps on the virtual filesystem
pub mod artifacts {
    use crate::media::TargetContainer;

    pub const INPUT_VIDEO: &str = "input.mp4";
    pub const INPUT_IMAGE: &str = "image.png";
    pub const PROBE_FRAME: &str = "probe.png";
    pub const FRAME_CLIP: &str = "frame.mp4";
    pub const REMAINDER: &str = "rest.mp4";
    pub const MANIFEST: &str = "list.txt";
    pub const OUTPUT: &str = "output.mp4";
    pub const CONVERT_SOURCE: &str = "convert-input.mp4";

    /// Everything a run writes, removed before the next run stages its inputs
    pub const RUN_ARTIFACTS: [&str; 7] = [
        INPUT_VIDEO,
        INPUT_IMAGE,
        PROBE_FRAME,
        FRAME_CLIP,
        REMAINDER,
        MANIFEST,
        OUTPUT,
    ];

    /// Everything except the spliced output
    pub const INTERMEDIATES: [&str; 6] = [
        INPUT_VIDEO,
        INPUT_IMAGE,
        PROBE_FRAME,
        FRAME_CLIP,
        REMAINDER,
        MANIFEST,
    ];

    /// Name of the converted variant of the output
    pub fn converted(container: TargetContainer) -> String {
        format!("output.{}", container.extension())
    }
}
