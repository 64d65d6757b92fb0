use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConversionMode;
use crate::media::{Dimensions, FrameRate};

/// One declarative transcoding request against named virtual files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Decode a single frame at native resolution into an image file
    ExtractFrame { input: String, output: String },

    /// Loop a still image into a short clip, carrying the audio of `audio_source` if it has any
    SynthesizeClip {
        image: String,
        audio_source: String,
        dimensions: Dimensions,
        framerate: Option<FrameRate>,
        clip_seconds: f64,
        video_codec: String,
        pixel_format: String,
        output: String,
    },

    /// Cut `input` from `start_seconds`, optionally capped at `duration_seconds`
    Trim {
        input: String,
        start_seconds: f64,
        duration_seconds: Option<f64>,
        video: VideoEncode,
        output: String,
    },

    /// Join the files listed in `manifest` without re-encoding
    Concat { manifest: String, output: String },

    /// Move `input` into the container implied by `output`'s extension
    Remux {
        input: String,
        output: String,
        mode: ConversionMode,
    },
}

/// Coarse operation category, used for logging and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ExtractFrame,
    SynthesizeClip,
    Trim,
    Concat,
    Remux,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExtractFrame => "extract-frame",
            Self::SynthesizeClip => "synthesize-clip",
            Self::Trim => "trim",
            Self::Concat => "concat",
            Self::Remux => "remux",
        };
        f.write_str(name)
    }
}

/// How the video stream of a trimmed segment is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VideoEncode {
    /// Stream copy; encoded parameters stay as they are
    Copy,
    /// Re-encode, optionally rescaling and changing framerate
    Reencode {
        codec: String,
        pixel_format: String,
        scale: Option<Dimensions>,
        framerate: Option<u32>,
    },
}

impl VideoEncode {
    pub fn is_copy(&self) -> bool {
        matches!(self, Self::Copy)
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::ExtractFrame { .. } => OperationKind::ExtractFrame,
            Self::SynthesizeClip { .. } => OperationKind::SynthesizeClip,
            Self::Trim { .. } => OperationKind::Trim,
            Self::Concat { .. } => OperationKind::Concat,
            Self::Remux { .. } => OperationKind::Remux,
        }
    }

    /// Name of the virtual file the operation writes
    pub fn output(&self) -> &str {
        match self {
            Self::ExtractFrame { output, .. }
            | Self::SynthesizeClip { output, .. }
            | Self::Trim { output, .. }
            | Self::Concat { output, .. }
            | Self::Remux { output, .. } => output,
        }
    }
}

/// Codec name an encoder writes into the stream, as the engine reports it back
pub fn produced_codec(encoder: &str) -> String {
    match encoder {
        "libx264" | "libopenh264" | "h264" => "h264".to_string(),
        "libx265" | "hevc" => "hevc".to_string(),
        "libvpx-vp9" | "vp9" => "vp9".to_string(),
        "libaom-av1" | "libsvtav1" | "av1" => "av1".to_string(),
        other => other.to_string(),
    }
}

/// Build a concat manifest listing `segments` in order
pub fn concat_manifest(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|name| format!("file '{}'\n", name))
        .collect()
}

/// Parse the file names back out of a concat manifest
pub fn parse_concat_manifest(manifest: &str) -> Vec<String> {
    manifest
        .lines()
        .filter_map(|line| line.trim().strip_prefix("file "))
        .map(|entry| entry.trim().trim_matches('\'').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
