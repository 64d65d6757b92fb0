use tracing::{info, warn};

use crate::engine::{EngineHandle, Operation, VideoEncode};
use crate::error::PipelineError;
use crate::pipeline::artifacts::{INPUT_VIDEO, REMAINDER};
use crate::pipeline::plan::RemainderPlan;

/// Cuts the source video after the replaced lead-in
pub struct TrimStage<'a> {
    engine: &'a EngineHandle,
    tolerance_seconds: f64,
}

impl<'a> TrimStage<'a> {
    pub fn new(engine: &'a EngineHandle, tolerance_seconds: f64) -> Self {
        Self { engine, tolerance_seconds }
    }

    /// Produce the remainder segment
    ///
    /// `source_duration` is the length of the source video when known; a requested
    /// length beyond it (plus the tolerance) is an error rather than a silent clamp.
    pub async fn run(&self, plan: &RemainderPlan, source_duration: Option<f64>) -> Result<(), PipelineError> {
        if let Some(requested) = plan.duration_seconds {
            match source_duration {
                Some(total) => {
                    let available = total - plan.start_seconds;
                    if requested > available + self.tolerance_seconds {
                        return Err(PipelineError::Trim {
                            reason: format!(
                                "requested {:.2}s but only {:.2}s of video follow the first frame",
                                requested, available.max(0.0)
                            ),
                        });
                    }
                }
                None => warn!("Source duration unknown, skipping length check"),
            }
        }

        match &plan.video {
            VideoEncode::Copy => info!("   Remainder: stream copy"),
            VideoEncode::Reencode { codec, scale, framerate, .. } => info!(
                "   Remainder: re-encode with {}{}{}",
                codec,
                scale.map(|d| format!(", scaled to {}", d)).unwrap_or_default(),
                framerate.map(|fps| format!(", {} fps", fps)).unwrap_or_default()
            ),
        }

        self.engine
            .transform(&Operation::Trim {
                input: INPUT_VIDEO.to_string(),
                start_seconds: plan.start_seconds,
                duration_seconds: plan.duration_seconds,
                video: plan.video.clone(),
                output: REMAINDER.to_string(),
            })
            .await
            .map_err(|e| PipelineError::Trim { reason: e.to_string() })
    }
}
