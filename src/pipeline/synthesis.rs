use tracing::info;

use crate::engine::{EngineHandle, Operation};
use crate::error::PipelineError;
use crate::pipeline::artifacts::{FRAME_CLIP, INPUT_IMAGE, INPUT_VIDEO};
use crate::pipeline::plan::SynthesisPlan;

/// Loops the still image into the short clip that replaces the opening frame
pub struct FrameSynthesisStage<'a> {
    engine: &'a EngineHandle,
}

impl<'a> FrameSynthesisStage<'a> {
    pub fn new(engine: &'a EngineHandle) -> Self {
        Self { engine }
    }

    pub async fn run(&self, plan: &SynthesisPlan) -> Result<(), PipelineError> {
        info!(
            "   Frame clip: {} for {:.3}s{}",
            plan.dimensions,
            plan.clip_seconds,
            plan.framerate.map(|fps| format!(" at {} fps", fps)).unwrap_or_default()
        );

        self.engine
            .transform(&Operation::SynthesizeClip {
                image: INPUT_IMAGE.to_string(),
                audio_source: INPUT_VIDEO.to_string(),
                dimensions: plan.dimensions,
                framerate: plan.framerate,
                clip_seconds: plan.clip_seconds,
                video_codec: plan.video_codec.clone(),
                pixel_format: plan.pixel_format.clone(),
                output: FRAME_CLIP.to_string(),
            })
            .await
            .map_err(|e| PipelineError::FrameSynthesis { reason: e.to_string() })
    }
}
