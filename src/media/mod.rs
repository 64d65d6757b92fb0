//! # Media Types
//!
//! Assets, dimensions and per-run options shared by the engine and the pipeline.

pub mod types;

pub use types::{
    Dimensions, FrameRate, MediaAsset, MediaInfo, MediaKind, Options, ScaleTarget, TargetContainer,
    VideoStreamInfo, MAX_FRAMERATE,
};
