use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{ConversionMode, EngineConfig};
use crate::engine::operation::{Operation, VideoEncode};
use crate::engine::TranscodeEngine;
use crate::error::EngineError;
use crate::media::{Dimensions, FrameRate, MediaInfo, VideoStreamInfo};

/// Lines of ffmpeg stderr kept in error diagnostics
const DIAGNOSTIC_LINES: usize = 20;

/// Transcoding engine backed by external `ffmpeg` and `ffprobe` processes
///
/// The virtual filesystem is a private temp directory that lives as long as the
/// engine; every operation runs with that directory as its working directory.
pub struct FfmpegEngine {
    config: EngineConfig,
    root: TempDir,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("first-frame-");

        let root = match &config.workdir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };

        debug!("FFmpeg workspace: {}", root.path().display());
        Ok(Self { config, root })
    }

    /// Whether an `ffmpeg` binary answers on the default path
    pub async fn is_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, EngineError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if valid {
            Ok(self.root.path().join(name))
        } else {
            Err(EngineError::InvalidArtifactName { name: name.to_string() })
        }
    }

    async fn check_binary(path: &Path) -> Result<(), EngineError> {
        let output = Command::new(path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::LoadFailed {
                reason: format!("{}: {}", path.display(), e),
            })?;

        if !output.status.success() {
            return Err(EngineError::LoadFailed {
                reason: format!("{} -version exited with {}", path.display(), output.status),
            });
        }

        if let Some(banner) = String::from_utf8_lossy(&output.stdout).lines().next() {
            info!("Found {}", banner);
        }
        Ok(())
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&self) -> Result<(), EngineError> {
        Self::check_binary(&self.config.ffmpeg_path).await?;
        Self::check_binary(&self.config.ffprobe_path).await?;
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.resolve(name)?;
        match tokio::fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::ArtifactNotFound { name: name.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn transform(&self, operation: &Operation) -> Result<(), EngineError> {
        let args = command_args(operation);
        debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.config.ffmpeg_path)
            .args(["-hide_banner", "-nostdin", "-loglevel", self.config.log_level.as_str(), "-y"])
            .args(&args)
            .current_dir(self.root.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::TransformFailed {
                operation: operation.kind().to_string(),
                diagnostics: format!("failed to spawn ffmpeg: {}", e),
            })?;

        if !output.status.success() {
            return Err(EngineError::TransformFailed {
                operation: operation.kind().to_string(),
                diagnostics: tail_lines(&String::from_utf8_lossy(&output.stderr), DIAGNOSTIC_LINES),
            });
        }

        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<MediaInfo, EngineError> {
        self.resolve(name)?;

        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams", name])
            .current_dir(self.root.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::InspectFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EngineError::InspectFailed {
                name: name.to_string(),
                reason: tail_lines(&String::from_utf8_lossy(&output.stderr), DIAGNOSTIC_LINES),
            });
        }

        parse_probe_json(&String::from_utf8_lossy(&output.stdout)).map_err(|e| {
            EngineError::InspectFailed {
                name: name.to_string(),
                reason: format!("invalid ffprobe output: {}", e),
            }
        })
    }
}

/// ffmpeg arguments (after the global flags) for one operation
pub fn command_args(operation: &Operation) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

    match operation {
        Operation::ExtractFrame { input, output } => {
            push(&["-i", input, "-frames:v", "1", output]);
        }
        Operation::SynthesizeClip {
            image,
            audio_source,
            dimensions,
            framerate,
            clip_seconds,
            video_codec,
            pixel_format,
            output,
        } => {
            push(&["-loop", "1", "-i", image, "-i", audio_source]);
            push(&["-map", "0:v", "-map", "1:a?"]);
            push(&["-vf", &scale_filter(*dimensions)]);
            push(&["-t", &format_seconds(*clip_seconds)]);
            push(&["-c:v", video_codec, "-pix_fmt", pixel_format]);
            if let Some(fps) = framerate {
                push(&["-r", &fps.to_string()]);
            }
            push(&[output.as_str()]);
        }
        Operation::Trim {
            input,
            start_seconds,
            duration_seconds,
            video,
            output,
        } => {
            push(&["-i", input, "-ss", &format_seconds(*start_seconds)]);
            if let Some(duration) = duration_seconds {
                push(&["-t", &format_seconds(*duration)]);
            }
            match video {
                VideoEncode::Copy => push(&["-c", "copy"]),
                VideoEncode::Reencode {
                    codec,
                    pixel_format,
                    scale,
                    framerate,
                } => {
                    if let Some(dimensions) = scale {
                        push(&["-vf", &scale_filter(*dimensions)]);
                    }
                    if let Some(fps) = framerate {
                        push(&["-r", &fps.to_string()]);
                    }
                    push(&["-c:v", codec, "-pix_fmt", pixel_format, "-c:a", "copy"]);
                }
            }
            push(&[output.as_str()]);
        }
        Operation::Concat { manifest, output } => {
            push(&["-f", "concat", "-safe", "0", "-i", manifest, "-c", "copy", output]);
        }
        Operation::Remux { input, output, mode } => {
            push(&["-i", input]);
            if *mode == ConversionMode::Remux {
                push(&["-map", "0", "-c", "copy"]);
            }
            push(&[output.as_str()]);
        }
    }

    args
}

/// Rescale to exact dimensions with square pixels, no letterboxing
fn scale_filter(dimensions: Dimensions) -> String {
    format!(
        "scale={}:{}:force_original_aspect_ratio=disable,setsar=1",
        dimensions.width, dimensions.height
    )
}

fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    let tail = lines[start..].join("\n");
    if tail.is_empty() {
        "no diagnostics reported".to_string()
    } else {
        tail
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    pix_fmt: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Convert `ffprobe -print_format json` output into [`MediaInfo`]
pub fn parse_probe_json(json: &str) -> Result<MediaInfo, serde_json::Error> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let video = video_stream.and_then(|s| {
        let (width, height) = (s.width?, s.height?);
        Some(VideoStreamInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            pixel_format: s.pix_fmt.clone().unwrap_or_default(),
            dimensions: Dimensions { width, height },
            framerate: s
                .avg_frame_rate
                .as_deref()
                .and_then(FrameRate::parse)
                .or_else(|| s.r_frame_rate.as_deref().and_then(FrameRate::parse)),
        })
    });

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video_stream.and_then(|s| s.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok());

    Ok(MediaInfo {
        duration,
        video,
        has_audio: probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn test_synthesize_args() {
        let op = Operation::SynthesizeClip {
            image: "image.png".into(),
            audio_source: "input.mp4".into(),
            dimensions: dims(800, 600),
            framerate: Some(FrameRate::whole(30)),
            clip_seconds: 0.04,
            video_codec: "libx264".into(),
            pixel_format: "yuv420p".into(),
            output: "frame.mp4".into(),
        };

        let args = command_args(&op).join(" ");
        assert_eq!(
            args,
            "-loop 1 -i image.png -i input.mp4 -map 0:v -map 1:a? \
             -vf scale=800:600:force_original_aspect_ratio=disable,setsar=1 \
             -t 0.040 -c:v libx264 -pix_fmt yuv420p -r 30 frame.mp4"
        );
    }

    #[test]
    fn test_synthesize_keeps_ntsc_rate_exact() {
        let op = Operation::SynthesizeClip {
            image: "image.png".into(),
            audio_source: "input.mp4".into(),
            dimensions: dims(720, 480),
            framerate: FrameRate::parse("30000/1001"),
            clip_seconds: 0.04,
            video_codec: "libx264".into(),
            pixel_format: "yuv420p".into(),
            output: "frame.mp4".into(),
        };

        let args = command_args(&op);
        let rate = args.iter().position(|a| a == "-r").map(|i| args[i + 1].as_str());
        assert_eq!(rate, Some("30000/1001"));
    }

    #[test]
    fn test_trim_copy_args() {
        let op = Operation::Trim {
            input: "input.mp4".into(),
            start_seconds: 0.04,
            duration_seconds: None,
            video: VideoEncode::Copy,
            output: "rest.mp4".into(),
        };
        assert_eq!(command_args(&op).join(" "), "-i input.mp4 -ss 0.040 -c copy rest.mp4");
    }

    #[test]
    fn test_trim_reencode_args() {
        let op = Operation::Trim {
            input: "input.mp4".into(),
            start_seconds: 0.04,
            duration_seconds: Some(4.96),
            video: VideoEncode::Reencode {
                codec: "libx264".into(),
                pixel_format: "yuv420p".into(),
                scale: Some(dims(800, 600)),
                framerate: Some(24),
            },
            output: "rest.mp4".into(),
        };
        assert_eq!(
            command_args(&op).join(" "),
            "-i input.mp4 -ss 0.040 -t 4.960 \
             -vf scale=800:600:force_original_aspect_ratio=disable,setsar=1 \
             -r 24 -c:v libx264 -pix_fmt yuv420p -c:a copy rest.mp4"
        );
    }

    #[test]
    fn test_concat_and_remux_args() {
        let concat = Operation::Concat { manifest: "list.txt".into(), output: "output.mp4".into() };
        assert_eq!(
            command_args(&concat).join(" "),
            "-f concat -safe 0 -i list.txt -c copy output.mp4"
        );

        let remux = Operation::Remux {
            input: "convert-input.mp4".into(),
            output: "output.mkv".into(),
            mode: ConversionMode::Remux,
        };
        assert_eq!(command_args(&remux).join(" "), "-i convert-input.mp4 -map 0 -c copy output.mkv");

        let transcode = Operation::Remux {
            input: "convert-input.mp4".into(),
            output: "output.mov".into(),
            mode: ConversionMode::Transcode,
        };
        assert_eq!(command_args(&transcode).join(" "), "-i convert-input.mp4 output.mov");
    }

    #[test]
    fn test_parse_probe_json() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "pix_fmt": "yuv420p",
                 "width": 1920, "height": 1080, "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"duration": "12.480000"}
        }"#;

        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.duration, Some(12.48));
        assert!(info.has_audio);

        let video = info.video.unwrap();
        assert_eq!(video.codec, "h264");
        assert_eq!(video.dimensions, dims(1920, 1080));
        assert_eq!(video.framerate, Some(FrameRate { num: 30000, den: 1001 }));
    }

    #[test]
    fn test_parse_probe_json_without_video() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        let info = parse_probe_json(json).unwrap();
        assert!(info.video.is_none());
        assert_eq!(info.duration, None);
        assert!(parse_probe_json("not json").is_err());
    }

    #[test]
    fn test_rejects_path_like_names() {
        let engine = FfmpegEngine::new(EngineConfig::default()).unwrap();
        assert!(engine.resolve("output.mp4").is_ok());
        assert!(engine.resolve("../escape.mp4").is_err());
        assert!(engine.resolve("..").is_err());
        assert!(engine.resolve("").is_err());
    }

    #[tokio::test]
    async fn test_workspace_files_without_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            workdir: Some(dir.path().join("nested")),
            ..EngineConfig::default()
        };
        let engine = FfmpegEngine::new(config).unwrap();

        engine.write_file("list.txt", b"file 'a.mp4'\n").await.unwrap();
        assert_eq!(engine.read_file("list.txt").await.unwrap(), b"file 'a.mp4'\n");

        engine.delete_file("list.txt").await.unwrap();
        engine.delete_file("list.txt").await.unwrap();
        assert!(matches!(
            engine.read_file("list.txt").await,
            Err(EngineError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("", 5), "no diagnostics reported");
    }
}
