use image::GenericImageView;
use tracing::{debug, info, warn};

use crate::engine::{EngineHandle, Operation};
use crate::error::PipelineError;
use crate::media::{Dimensions, FrameRate, MediaInfo, ScaleTarget};
use crate::pipeline::artifacts::{INPUT_IMAGE, INPUT_VIDEO, PROBE_FRAME};

/// Dimensions resolved for a run
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Even-floored output size
    pub target: Dimensions,

    /// Native size of the video, when the video was probed
    pub native_video: Option<Dimensions>,

    /// Stream layout of the source video, if the engine could report it
    pub source: Option<MediaInfo>,
}

impl ProbeReport {
    pub fn source_framerate(&self) -> Option<FrameRate> {
        self.source.as_ref()?.video.as_ref()?.framerate
    }

    pub fn source_codec(&self) -> Option<&str> {
        Some(self.source.as_ref()?.video.as_ref()?.codec.as_str())
    }

    pub fn source_pixel_format(&self) -> Option<&str> {
        Some(self.source.as_ref()?.video.as_ref()?.pixel_format.as_str())
    }

    pub fn source_duration(&self) -> Option<f64> {
        self.source.as_ref()?.duration
    }
}

/// Resolves output dimensions from whichever asset the options name
pub struct ProbeStage<'a> {
    engine: &'a EngineHandle,
}

impl<'a> ProbeStage<'a> {
    pub fn new(engine: &'a EngineHandle) -> Self {
        Self { engine }
    }

    pub async fn run(&self, scale_target: ScaleTarget) -> Result<ProbeReport, PipelineError> {
        let report = match scale_target {
            ScaleTarget::Image => {
                let native = self.decode_artifact(INPUT_IMAGE).await?;
                ProbeReport {
                    target: Dimensions::even_floor(native.width, native.height),
                    native_video: None,
                    source: self.inspect_source().await,
                }
            }
            ScaleTarget::Video => {
                self.engine
                    .transform(&Operation::ExtractFrame {
                        input: INPUT_VIDEO.to_string(),
                        output: PROBE_FRAME.to_string(),
                    })
                    .await
                    .map_err(|e| PipelineError::ProbeDecode {
                        reason: format!("could not extract a frame from the video: {}", e),
                    })?;

                let native = self.decode_artifact(PROBE_FRAME).await?;
                ProbeReport {
                    target: Dimensions::even_floor(native.width, native.height),
                    native_video: Some(native),
                    source: self.inspect_source().await,
                }
            }
        };

        if report.target.is_empty() {
            return Err(PipelineError::ProbeDecode {
                reason: format!("{} is too small to encode", report.target),
            });
        }

        info!("   Target dimensions: {} (from {})", report.target, scale_target);
        Ok(report)
    }

    async fn inspect_source(&self) -> Option<MediaInfo> {
        match self.engine.inspect(INPUT_VIDEO).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Could not inspect source video: {}", e);
                None
            }
        }
    }

    async fn decode_artifact(&self, name: &str) -> Result<Dimensions, PipelineError> {
        let data = self
            .engine
            .read_file(name)
            .await
            .map_err(|e| PipelineError::ProbeDecode { reason: e.to_string() })?;

        let dimensions = decode_dimensions(&data).map_err(|e| PipelineError::ProbeDecode {
            reason: format!("{} is not a readable image: {}", name, e),
        })?;
        debug!("Decoded {} as {}", name, dimensions);
        Ok(dimensions)
    }
}

/// Decode an image fully and report its native size
pub fn decode_dimensions(data: &[u8]) -> Result<Dimensions, image::ImageError> {
    let image = image::load_from_memory(data)?;
    let (width, height) = image.dimensions();
    Ok(Dimensions { width, height })
}
