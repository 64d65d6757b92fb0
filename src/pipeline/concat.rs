use tracing::info;

use crate::engine::operation::concat_manifest;
use crate::engine::{EngineHandle, Operation};
use crate::error::PipelineError;
use crate::media::{MediaAsset, MediaKind};
use crate::pipeline::artifacts::{FRAME_CLIP, MANIFEST, OUTPUT, REMAINDER};

/// Splices the frame clip and the remainder without re-encoding
pub struct ConcatStage<'a> {
    engine: &'a EngineHandle,
}

impl<'a> ConcatStage<'a> {
    pub fn new(engine: &'a EngineHandle) -> Self {
        Self { engine }
    }

    /// Join both segments and read the result back as `output_name`
    pub async fn run(&self, output_name: &str) -> Result<MediaAsset, PipelineError> {
        let manifest = concat_manifest(&[FRAME_CLIP, REMAINDER]);
        self.engine
            .write_file(MANIFEST, manifest.as_bytes())
            .await
            .map_err(|e| PipelineError::Concat { reason: e.to_string() })?;

        self.engine
            .transform(&Operation::Concat {
                manifest: MANIFEST.to_string(),
                output: OUTPUT.to_string(),
            })
            .await
            .map_err(|e| PipelineError::Concat { reason: e.to_string() })?;

        let data = self
            .engine
            .read_file(OUTPUT)
            .await
            .map_err(|e| PipelineError::Concat { reason: e.to_string() })?;

        let asset = MediaAsset::new(output_name, MediaKind::Video, data);
        info!("   Spliced {} ({:.2} MB)", asset.name(), asset.size_mb());
        Ok(asset)
    }
}
