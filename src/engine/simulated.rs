use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageOutputFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::engine::operation::{
    parse_concat_manifest, produced_codec, Operation, OperationKind, VideoEncode,
};
use crate::engine::TranscodeEngine;
use crate::error::EngineError;
use crate::media::{Dimensions, FrameRate, MediaInfo, VideoStreamInfo};

/// Framerate the simulated image loop runs at when none is requested
pub const DEFAULT_LOOP_FRAMERATE: f64 = 25.0;

/// Stream description stored in place of real encoded media
///
/// The simulated engine reads and writes these as JSON, so tests can build
/// inputs and check outputs without any codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedMedia {
    pub dimensions: Dimensions,
    pub codec: String,
    pub pixel_format: String,
    pub framerate: f64,
    pub duration: f64,
    pub has_audio: bool,
    pub container: String,
}

impl SimulatedMedia {
    /// An H.264 MP4 with the given geometry, framerate and length
    pub fn video(width: u32, height: u32, framerate: f64, duration: f64) -> Self {
        Self {
            dimensions: Dimensions { width, height },
            codec: "h264".to_string(),
            pixel_format: "yuv420p".to_string(),
            framerate,
            duration,
            has_audio: true,
            container: "mp4".to_string(),
        }
    }

    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: &str) -> Self {
        self.pixel_format = pixel_format.to_string();
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

/// In-memory transcoding engine that models stream parameters
///
/// Operations update [`SimulatedMedia`] descriptors the way the real engine would
/// change the corresponding streams. Concatenation refuses segments whose codec,
/// pixel format, size or framerate differ.
pub struct SimulatedEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    log: Mutex<Vec<Operation>>,
    loads: AtomicUsize,
    load_failure: Option<String>,
    failing: Option<OperationKind>,
    pixel_format_overrides: HashMap<OperationKind, String>,
    delay: Option<Duration>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            loads: AtomicUsize::new(0),
            load_failure: None,
            failing: None,
            pixel_format_overrides: HashMap::new(),
            delay: None,
        }
    }

    /// Make `load` fail with the given reason
    pub fn with_load_failure(mut self, reason: &str) -> Self {
        self.load_failure = Some(reason.to_string());
        self
    }

    /// Make every operation of `kind` fail
    pub fn with_failure(mut self, kind: OperationKind) -> Self {
        self.failing = Some(kind);
        self
    }

    /// Encode outputs of `kind` at `pixel_format`, ignoring the request
    pub fn with_pixel_format_override(mut self, kind: OperationKind, pixel_format: &str) -> Self {
        self.pixel_format_overrides.insert(kind, pixel_format.to_string());
        self
    }

    /// Sleep this long inside every operation
    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `load` ran
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Operations executed so far, in order
    pub async fn operations(&self) -> Vec<Operation> {
        self.log.lock().await.clone()
    }

    pub async fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.files.lock().await.contains_key(name)
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ArtifactNotFound { name: name.to_string() })
    }

    async fn media(&self, kind: OperationKind, name: &str) -> Result<SimulatedMedia, EngineError> {
        let data = self.get(name).await.map_err(|_| fail(kind, format!("{}: No such file or directory", name)))?;
        SimulatedMedia::from_bytes(&data)
            .ok_or_else(|| fail(kind, format!("{}: Invalid data found when processing input", name)))
    }

    async fn put(&self, name: &str, data: Vec<u8>) {
        self.files.lock().await.insert(name.to_string(), data);
    }

    fn pixel_format_for(&self, kind: OperationKind, requested: &str) -> String {
        self.pixel_format_overrides
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }

    async fn apply(&self, operation: &Operation) -> Result<(), EngineError> {
        let kind = operation.kind();
        match operation {
            Operation::ExtractFrame { input, output } => {
                let source = self.media(kind, input).await?;
                if source.duration <= 0.0 {
                    return Err(fail(kind, "Output file is empty, nothing was encoded".into()));
                }
                let frame = encode_png(source.dimensions).map_err(|e| fail(kind, e))?;
                self.put(output, frame).await;
            }
            Operation::SynthesizeClip {
                image: image_name,
                audio_source,
                dimensions,
                framerate,
                clip_seconds,
                video_codec,
                pixel_format,
                output,
            } => {
                let data = self.get(image_name).await.map_err(|e| fail(kind, e.to_string()))?;
                image::load_from_memory(&data)
                    .map_err(|e| fail(kind, format!("{}: {}", image_name, e)))?;
                let audio = self.media(kind, audio_source).await?;

                let clip = SimulatedMedia {
                    dimensions: *dimensions,
                    codec: produced_codec(video_codec),
                    pixel_format: self.pixel_format_for(kind, pixel_format),
                    framerate: framerate.map_or(DEFAULT_LOOP_FRAMERATE, |rate| rate.as_f64()),
                    duration: *clip_seconds,
                    has_audio: audio.has_audio,
                    container: container_of(output),
                };
                self.put(output, clip.to_bytes()).await;
            }
            Operation::Trim {
                input,
                start_seconds,
                duration_seconds,
                video,
                output,
            } => {
                let source = self.media(kind, input).await?;
                let available = source.duration - start_seconds;
                if available <= 0.0 {
                    return Err(fail(kind, "Output file is empty, nothing was encoded".into()));
                }

                let mut rest = source.clone();
                rest.duration = duration_seconds.map_or(available, |d| d.min(available));
                rest.container = container_of(output);
                if let VideoEncode::Reencode { codec, pixel_format, scale, framerate } = video {
                    rest.codec = produced_codec(codec);
                    rest.pixel_format = self.pixel_format_for(kind, pixel_format);
                    if let Some(dimensions) = scale {
                        rest.dimensions = *dimensions;
                    }
                    if let Some(fps) = framerate {
                        rest.framerate = f64::from(*fps);
                    }
                }
                self.put(output, rest.to_bytes()).await;
            }
            Operation::Concat { manifest, output } => {
                let list = self.get(manifest).await.map_err(|e| fail(kind, e.to_string()))?;
                let names = parse_concat_manifest(&String::from_utf8_lossy(&list));
                let Some((first_name, rest_names)) = names.split_first() else {
                    return Err(fail(kind, format!("{}: no files listed", manifest)));
                };

                let mut joined = self.media(kind, first_name).await?;
                for name in rest_names {
                    let segment = self.media(kind, name).await?;
                    check_compatible(&joined, &segment)
                        .map_err(|reason| fail(kind, format!("{}: {}", name, reason)))?;
                    joined.duration += segment.duration;
                }
                joined.container = container_of(output);
                self.put(output, joined.to_bytes()).await;
            }
            Operation::Remux { input, output, .. } => {
                let mut media = self.media(kind, input).await?;
                media.container = container_of(output);
                self.put(output, media.to_bytes()).await;
            }
        }
        Ok(())
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscodeEngine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn load(&self) -> Result<(), EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.load_failure {
            Some(reason) => Err(EngineError::LoadFailed { reason: reason.clone() }),
            None => Ok(()),
        }
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        self.put(name, data.to_vec()).await;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.get(name).await
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.files.lock().await.remove(name);
        Ok(())
    }

    async fn transform(&self, operation: &Operation) -> Result<(), EngineError> {
        self.log.lock().await.push(operation.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing == Some(operation.kind()) {
            return Err(fail(operation.kind(), "injected failure".to_string()));
        }

        debug!("simulated {} -> {}", operation.kind(), operation.output());
        self.apply(operation).await
    }

    async fn inspect(&self, name: &str) -> Result<MediaInfo, EngineError> {
        let data = self.get(name).await?;
        let media = SimulatedMedia::from_bytes(&data).ok_or_else(|| EngineError::InspectFailed {
            name: name.to_string(),
            reason: "Invalid data found when processing input".to_string(),
        })?;

        Ok(MediaInfo {
            duration: Some(media.duration),
            has_audio: media.has_audio,
            video: Some(VideoStreamInfo {
                codec: media.codec,
                pixel_format: media.pixel_format,
                dimensions: media.dimensions,
                framerate: FrameRate::approximate(media.framerate),
            }),
        })
    }
}

fn fail(kind: OperationKind, diagnostics: String) -> EngineError {
    EngineError::TransformFailed {
        operation: kind.to_string(),
        diagnostics,
    }
}

fn container_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

fn check_compatible(a: &SimulatedMedia, b: &SimulatedMedia) -> Result<(), String> {
    if a.codec != b.codec {
        return Err(format!("codec mismatch ({} vs {})", a.codec, b.codec));
    }
    if a.pixel_format != b.pixel_format {
        return Err(format!("pixel format mismatch ({} vs {})", a.pixel_format, b.pixel_format));
    }
    if a.dimensions != b.dimensions {
        return Err(format!("size mismatch ({} vs {})", a.dimensions, b.dimensions));
    }
    if (a.framerate - b.framerate).abs() > 0.01 {
        return Err(format!("framerate mismatch ({} vs {})", a.framerate, b.framerate));
    }
    Ok(())
}

fn encode_png(dimensions: Dimensions) -> Result<Vec<u8>, String> {
    let frame = RgbImage::new(dimensions.width, dimensions.height);
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(frame)
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::probe::decode_dimensions;

    async fn loaded_with_video(media: SimulatedMedia) -> SimulatedEngine {
        let engine = SimulatedEngine::new();
        engine.load().await.unwrap();
        engine.write_file("input.mp4", &media.to_bytes()).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_extract_frame_keeps_native_size() {
        let engine = loaded_with_video(SimulatedMedia::video(1921, 1081, 25.0, 3.0)).await;
        engine
            .transform(&Operation::ExtractFrame { input: "input.mp4".into(), output: "probe.png".into() })
            .await
            .unwrap();

        let png = engine.read_file("probe.png").await.unwrap();
        assert_eq!(decode_dimensions(&png).unwrap(), Dimensions { width: 1921, height: 1081 });
    }

    #[tokio::test]
    async fn test_trim_copy_keeps_parameters() {
        let engine = loaded_with_video(SimulatedMedia::video(640, 480, 30.0, 5.0)).await;
        engine
            .transform(&Operation::Trim {
                input: "input.mp4".into(),
                start_seconds: 0.04,
                duration_seconds: Some(2.0),
                video: VideoEncode::Copy,
                output: "rest.mp4".into(),
            })
            .await
            .unwrap();

        let rest = SimulatedMedia::from_bytes(&engine.read_file("rest.mp4").await.unwrap()).unwrap();
        assert_eq!(rest.dimensions, Dimensions { width: 640, height: 480 });
        assert_eq!(rest.framerate, 30.0);
        assert_eq!(rest.duration, 2.0);
    }

    #[tokio::test]
    async fn test_concat_rejects_mismatched_segments() {
        let engine = loaded_with_video(SimulatedMedia::video(640, 480, 25.0, 5.0)).await;
        let odd = SimulatedMedia::video(640, 480, 25.0, 1.0).with_pixel_format("yuv444p");
        engine.write_file("odd.mp4", &odd.to_bytes()).await.unwrap();
        engine.write_file("list.txt", b"file 'input.mp4'\nfile 'odd.mp4'\n").await.unwrap();

        let err = engine
            .transform(&Operation::Concat { manifest: "list.txt".into(), output: "output.mp4".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pixel format mismatch"));
        assert!(!engine.contains("output.mp4").await);
    }

    #[tokio::test]
    async fn test_injected_failure_is_logged() {
        let engine = SimulatedEngine::new().with_failure(OperationKind::Remux);
        let op = Operation::Remux {
            input: "a.mp4".into(),
            output: "a.mkv".into(),
            mode: crate::config::ConversionMode::Remux,
        };
        assert!(engine.transform(&op).await.is_err());
        assert_eq!(engine.operations().await, vec![op]);
    }

    #[tokio::test]
    async fn test_inspect_rejects_garbage() {
        let engine = SimulatedEngine::new();
        engine.write_file("junk.mp4", b"\x00\x01garbage").await.unwrap();
        assert!(matches!(
            engine.inspect("junk.mp4").await,
            Err(EngineError::InspectFailed { .. })
        ));
    }
}
