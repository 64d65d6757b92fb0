use std::path::Path;

use tracing::info;

use crate::config::ConversionMode;
use crate::engine::{EngineHandle, Operation};
use crate::error::ConversionError;
use crate::media::{MediaAsset, MediaKind, TargetContainer};
use crate::pipeline::artifacts::{self, CONVERT_SOURCE};

/// Moves a finished result into another container on demand
///
/// Works on its own copy of the bytes, so the converted asset and the original
/// never share workspace entries.
pub struct ContainerConverter<'a> {
    engine: &'a EngineHandle,
    mode: ConversionMode,
}

impl<'a> ContainerConverter<'a> {
    pub fn new(engine: &'a EngineHandle, mode: ConversionMode) -> Self {
        Self { engine, mode }
    }

    pub async fn convert(
        &self,
        output: &MediaAsset,
        target: TargetContainer,
    ) -> Result<MediaAsset, ConversionError> {
        if !self.engine.is_ready() {
            return Err(ConversionError::EngineNotReady);
        }

        let _session = self.engine.session().await;
        let converted = artifacts::converted(target);
        let failed = |reason: String| ConversionError::Failed {
            container: target.to_string(),
            reason,
        };

        self.engine.discard(&converted).await;
        self.engine
            .write_file(CONVERT_SOURCE, output.data())
            .await
            .map_err(|e| failed(e.to_string()))?;

        let result = self
            .engine
            .transform(&Operation::Remux {
                input: CONVERT_SOURCE.to_string(),
                output: converted.clone(),
                mode: self.mode,
            })
            .await;
        let data = match result {
            Ok(()) => self.engine.read_file(&converted).await,
            Err(e) => Err(e),
        };
        self.engine.discard(CONVERT_SOURCE).await;

        let data = data.map_err(|e| failed(e.to_string()))?;
        let asset = MediaAsset::new(converted_name(output.name(), target), MediaKind::Video, data);
        info!("🎞️  Converted to {}: {} ({:.2} MB)", target, asset.name(), asset.size_mb());
        Ok(asset)
    }
}

/// `clip.mp4` becomes `clip.mkv`
fn converted_name(original: &str, target: TargetContainer) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    format!("{}.{}", stem, target.extension())
}
