use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Highest framerate accepted for re-encoding
pub const MAX_FRAMERATE: u32 = 240;

/// Kind of media an asset declares itself to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Guess the kind from a file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "mp4" | "mov" | "mkv" | "webm" | "m4v" | "avi" => Some(Self::Video),
            "png" | "jpg" | "jpeg" | "bmp" | "webp" | "gif" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Binary media content captured from input or read back from the engine
///
/// Assets are immutable; cloning shares the underlying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    name: String,
    kind: MediaKind,
    data: Arc<[u8]>,
}

impl MediaAsset {
    pub fn new<S: Into<String>>(name: S, kind: MediaKind, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind,
            data: data.into(),
        }
    }

    /// Read an asset from disk, inferring its kind from the extension
    pub async fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let kind = MediaKind::from_path(path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported media type: {}", path.display()),
            )
        })?;
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("asset")
            .to_string();
        Ok(Self::new(name, kind, data))
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size in megabytes, for reporting
    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / 1024.0 / 1024.0
    }
}

/// Output frame size; both sides are always even
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Floor both sides to the nearest even number, as the encoder requires
    pub fn even_floor(width: u32, height: u32) -> Self {
        Self {
            width: width / 2 * 2,
            height: height / 2 * 2,
        }
    }

    pub fn is_even(&self) -> bool {
        self.width % 2 == 0 && self.height % 2 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame rate kept as the rational the engine reports, e.g. 30000/1001
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn whole(fps: u32) -> Self {
        Self { num: fps, den: 1 }
    }

    /// Parse "30000/1001" or "25"; zero rates ("0/0") count as unknown
    pub fn parse(value: &str) -> Option<Self> {
        let (num, den) = match value.split_once('/') {
            Some((num, den)) => (num.trim().parse().ok()?, den.trim().parse().ok()?),
            None => (value.trim().parse().ok()?, 1),
        };
        if num == 0 || den == 0 {
            None
        } else {
            Some(Self { num, den })
        }
    }

    /// Nearest rate with millisecond precision
    pub fn approximate(fps: f64) -> Option<Self> {
        let scaled = (fps * 1000.0).round();
        if !scaled.is_finite() || scaled < 1.0 || scaled > f64::from(u32::MAX) {
            return None;
        }
        let num = scaled as u32;
        let divisor = gcd(num, 1000);
        Some(Self { num: num / divisor, den: 1000 / divisor })
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Which asset's dimensions the output takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleTarget {
    #[default]
    Video,
    Image,
}

impl FromStr for ScaleTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            other => Err(format!("unknown scale target '{}' (expected video or image)", other)),
        }
    }
}

impl fmt::Display for ScaleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Image => f.write_str("image"),
        }
    }
}

/// Alternate containers a finished MP4 can be converted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetContainer {
    Mov,
    Mkv,
}

impl TargetContainer {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mov => "mov",
            Self::Mkv => "mkv",
        }
    }
}

impl FromStr for TargetContainer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_lowercase().as_str() {
            "mov" => Ok(Self::Mov),
            "mkv" => Ok(Self::Mkv),
            other => Err(format!("unsupported container '{}' (expected mov or mkv)", other)),
        }
    }
}

impl fmt::Display for TargetContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Per-run re-encoding options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Which asset's dimensions win
    pub scale_target: ScaleTarget,

    /// Output framerate; forces the re-encode path when set
    pub framerate: Option<u32>,

    /// Requested output length in seconds
    pub duration: Option<f64>,

    /// Base file name of the produced artifacts
    pub output_base_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            scale_target: ScaleTarget::Video,
            framerate: None,
            duration: None,
            output_base_name: "output".to_string(),
        }
    }
}

impl Options {
    /// Check the options against the replaced lead-in interval
    pub fn validate(&self, lead_in_seconds: f64) -> Result<(), PipelineError> {
        if let Some(fps) = self.framerate {
            if fps == 0 || fps > MAX_FRAMERATE {
                return Err(PipelineError::InvalidOptions {
                    details: format!("framerate must be between 1 and {}, got {}", MAX_FRAMERATE, fps),
                });
            }
        }

        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration <= lead_in_seconds {
                return Err(PipelineError::InvalidOptions {
                    details: format!(
                        "duration must be longer than {:.2}s, got {}",
                        lead_in_seconds, duration
                    ),
                });
            }
        }

        let name = self.output_base_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(PipelineError::InvalidOptions {
                details: format!("invalid output base name '{}'", self.output_base_name),
            });
        }

        Ok(())
    }

    /// File name of the primary MP4 result
    pub fn output_file_name(&self) -> String {
        format!("{}.mp4", self.output_base_name)
    }
}

/// Stream layout reported by the engine for a virtual file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds, when known
    pub duration: Option<f64>,

    /// First video stream, if any
    pub video: Option<VideoStreamInfo>,

    pub has_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub pixel_format: String,
    pub dimensions: Dimensions,
    pub framerate: Option<FrameRate>,
}
